//! Path, media-type and filter utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::utils::config::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};

/// Kind of media a file holds, judged by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Other,
}

/// Classify `path` by its (case-insensitive) extension.
pub fn media_kind(path: &Path) -> MediaKind {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return MediaKind::Other;
    };
    let ext = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Path as stored in the database: forward slashes on every platform.
pub fn path_to_db_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Split a root-relative file path into its stored `(relative_path, file_name)` pair.
/// Files directly under the root get an empty `relative_path`.
pub fn split_relative(rel: &Path) -> Option<(String, String)> {
    let name = rel.file_name()?.to_string_lossy().into_owned();
    let dir = rel
        .parent()
        .map(path_to_db_string)
        .unwrap_or_default();
    Some((dir, name))
}

/// Absolute path of a stored file under `root`.
pub fn absolute_path(root: &Path, relative_path: &str, file_name: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in relative_path.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path.push(file_name);
    path
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(".DS_Store" | ".AppleDouble" | "Thumbs.db" | "ehthumbs.db" | "Desktop.ini") => true,
        Some(name) => name.starts_with("._"),
        None => false,
    }
}

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0_usize, 0_usize);
    // Position of the last '*' and the text index it was tried against.
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

/// True when `path` (or its file name) matches any of `exclude_patterns`.
pub fn is_excluded(path: &Path, exclude_patterns: &[String]) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let path_str = path_to_db_string(path);
    exclude_patterns
        .iter()
        .any(|pattern| glob_match(pattern, name) || glob_match(pattern, &path_str))
}

pub fn canonicalize_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("canonicalize {}", path.display()))
}
