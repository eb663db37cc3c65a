//! Load `.trapscan.toml` from the image set root (CLI only). Library callers build `Opts` and
//! `PipelineTuning` themselves.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::jobs::DarkThresholds;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TrapscanToml {
    #[serde(default)]
    settings: SettingsSection,
    /// Replaces the default thresholds as a whole; missing keys fall back to defaults.
    thresholds: Option<DarkThresholds>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    db_path: Option<String>,
    verbose: Option<bool>,
    exclude: Option<Vec<String>>,
    follow_links: Option<bool>,
    io_workers: Option<usize>,
    compute_workers: Option<usize>,
    batch_size: Option<usize>,
    atom_size: Option<usize>,
    exiftool: Option<String>,
}

/// Parse config text. Errors are logged and yield `None`.
pub(crate) fn parse_trapscan_toml(s: &str, origin: &Path) -> Option<TrapscanToml> {
    toml::from_str(s)
        .map_err(|e| log::warn!("{}: {}", origin.display(), e))
        .ok()
}

/// Load the config file from `dir` if present. Returns None if missing or unreadable.
pub(crate) fn load_trapscan_toml(dir: &Path) -> Option<TrapscanToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_trapscan_toml(&s, &path)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $sec.$field.clone() {
            $opts.$field = v;
        }
    };
}

/// Overwrite an optional opts field from file when present.
macro_rules! apply_file_override {
    ($sec:expr, $opts:expr, $field:ident) => {
        if $sec.$field.is_some() {
            $opts.$field = $sec.$field;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI flags.
pub(crate) fn apply_file_to_opts(file: &TrapscanToml, opts: &mut Opts) {
    let sec = &file.settings;
    if let Some(ref p) = sec.db_path {
        opts.db_path = Some(PathBuf::from(p));
    }
    if let Some(ref p) = sec.exiftool {
        opts.exiftool = Some(PathBuf::from(p));
    }
    apply_file_opt!(sec, opts, verbose);
    apply_file_opt!(sec, opts, exclude);
    apply_file_opt!(sec, opts, follow_links);
    apply_file_override!(sec, opts, io_workers);
    apply_file_override!(sec, opts, compute_workers);
    apply_file_override!(sec, opts, batch_size);
    apply_file_override!(sec, opts, atom_size);
    if let Some(ref t) = file.thresholds {
        opts.thresholds = t.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_overlay_defaults() {
        let text = r#"
            [settings]
            verbose = true
            batch_size = 50
            exclude = ["trash/*"]

            [thresholds]
            dark_pixel_ratio = 0.65
        "#;
        let file = parse_trapscan_toml(text, Path::new("test.toml")).unwrap();
        let mut opts = Opts::default();
        apply_file_to_opts(&file, &mut opts);
        assert!(opts.verbose);
        assert_eq!(opts.batch_size, Some(50));
        assert_eq!(opts.atom_size, None);
        assert_eq!(opts.exclude, vec!["trash/*".to_string()]);
        assert_eq!(opts.thresholds.dark_pixel_ratio, 0.65);
        assert_eq!(
            opts.thresholds.luminance_threshold,
            DarkThresholds::default().luminance_threshold
        );
    }

    #[test]
    fn malformed_file_is_ignored() {
        assert!(parse_trapscan_toml("settings = [", Path::new("bad.toml")).is_none());
    }
}
