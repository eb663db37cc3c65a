//! Directory scan: find image and video files under an image set root.

use anyhow::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::engine::tools::{
    MediaKind, canonicalize_root, is_excluded, is_os_hidden_file, media_kind, path_relative_to,
    split_relative,
};
use crate::utils::config::PackagePaths;

/// Files found by [`scan_dir`], as `(relative_path, file_name)` pairs, plus walk errors skipped.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<(String, String)>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Walk `root` and collect every image or video file not matching `exclude`.
/// Walk errors are logged and collected, never fatal. Output is sorted by path then name.
pub fn scan_dir(root: &Path, exclude: &[String], follow_links: bool) -> Result<ScanResult> {
    let root = canonicalize_root(root)?;
    let pkg = PackagePaths::get();
    let mut result = ScanResult::default();

    for entry in WalkDir::new(&root).follow_links(follow_links) {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(PathBuf::from).unwrap_or_else(|| root.clone());
                warn!("skipping {}: {}", path.display(), err);
                result.skipped.push((path, err.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with(pkg.db_filename()) || name == pkg.config_filename() {
            continue;
        }
        if is_os_hidden_file(path) || media_kind(path) == MediaKind::Other {
            continue;
        }
        let Some(rel) = path_relative_to(path, &root) else {
            continue;
        };
        if is_excluded(&rel, exclude) {
            continue;
        }
        if let Some(pair) = split_relative(&rel) {
            result.files.push(pair);
        }
    }

    result.files.sort();
    debug!(
        "scan: {} media files under {} ({} skipped)",
        result.files.len(),
        root.display(),
        result.skipped.len()
    );
    Ok(result)
}
