use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Classify and annotate a camera-trap image set.
#[derive(Clone, Parser)]
#[command(name = "trapscan")]
#[command(about = "Scan an image set into its index, then run classification jobs over it.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Register image and video files found under DIR in the index.
    Scan {
        #[command(flatten)]
        common: CommonArgs,

        /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2
        #[arg(long, short = 'e', num_args = 1..)]
        exclude: Vec<String>,

        /// Follow symbolic links.
        #[arg(long, short = 'f', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        follow_links: Option<bool>,
    },
    /// Mark images Dark or Ok.
    Dark {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Reclassify images as Dark, Color or Greyscale.
    Classify {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Copy an embedded metadata tag into a data field.
    Metadata {
        #[command(flatten)]
        common: CommonArgs,

        /// Metadata tag, e.g. `Model` or `EXIF:Model`.
        #[arg(long, short = 't')]
        tag: String,

        /// Data field label. Default: the tag name.
        #[arg(long, short = 'L')]
        label: Option<String>,

        /// Clear the field on files without the tag.
        #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        clear_if_absent: Option<bool>,

        #[command(flatten)]
        exif: ExifArgs,
    },
    /// Re-read capture date/time from embedded metadata.
    Datetime {
        #[command(flatten)]
        common: CommonArgs,

        /// UTC offset for files without a stored date, e.g. `+02:00`. Default: UTC.
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<String>,

        #[command(flatten)]
        exif: ExifArgs,
    },
}

/// Arguments shared by every subcommand.
#[derive(Clone, Args)]
pub struct CommonArgs {
    /// Image set root. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Path to the index file. Default: `.trapscan.db` in DIR.
    #[arg(long, short)]
    pub db: Option<PathBuf>,

    /// Verbose output with a progress bar.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Decode (I/O) workers.
    #[arg(long)]
    pub io_workers: Option<usize>,

    /// Classify (compute) workers.
    #[arg(long)]
    pub compute_workers: Option<usize>,

    /// Changed records per database transaction.
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Files per work unit.
    #[arg(long)]
    pub atom_size: Option<usize>,
}

impl CommonArgs {
    /// Database path, defaulting to the package db filename in the target directory.
    pub fn db_path(&self) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| self.dir.join(PackagePaths::get().db_filename()))
    }
}

#[derive(Clone, Args)]
pub struct ThresholdArgs {
    /// Luminance (0-255) at or below which a pixel is dark.
    #[arg(long, short = 'l')]
    pub luminance: Option<u8>,

    /// Fraction of dark pixels (0-1) at or above which an image is dark.
    #[arg(long, short = 'r')]
    pub ratio: Option<f64>,
}

#[derive(Clone, Args)]
pub struct ExifArgs {
    /// exiftool executable. Default: `exiftool` on PATH.
    #[arg(long)]
    pub exiftool: Option<PathBuf>,
}
