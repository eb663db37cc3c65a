//! Public and internal types for the trapscan API and pipeline.

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::jobs::DarkThresholds;
use crate::pipeline::PipelineTuning;
use crate::utils::config::WorkerThreadLimits;

/// Derived category of a file. Stored in the `files.classification` column by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Classification {
    #[default]
    Ok,
    Dark,
    Greyscale,
    Color,
    Video,
    Corrupt,
    NoLongerAvailable,
}

impl Classification {
    pub const ALL: [Classification; 7] = [
        Classification::Ok,
        Classification::Dark,
        Classification::Greyscale,
        Classification::Color,
        Classification::Video,
        Classification::Corrupt,
        Classification::NoLongerAvailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Ok => "Ok",
            Classification::Dark => "Dark",
            Classification::Greyscale => "Greyscale",
            Classification::Color => "Color",
            Classification::Video => "Video",
            Classification::Corrupt => "Corrupt",
            Classification::NoLongerAvailable => "NoLongerAvailable",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Classification::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("unknown classification '{}'", s))
    }
}

/// One row of the `files` table, held in memory while a job runs.
///
/// Moved into exactly one [`LoadAtom`](crate::pipeline::LoadAtom) at a time and handed back to
/// the record set when that atom is disposed.
#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    /// Directory relative to the image set root, forward slashes, empty for the root itself.
    pub relative_path: String,
    pub file_name: String,
    pub classification: Classification,
    pub date_time: Option<DateTime<FixedOffset>>,
    /// User-defined data fields (`file_data` rows) keyed by label.
    pub data: BTreeMap<String, String>,
    /// Set by the compute stage when any targeted column changed during this run.
    pub has_changes: bool,
}

impl FileRecord {
    pub fn new(id: i64, relative_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id,
            relative_path: relative_path.into(),
            file_name: file_name.into(),
            classification: Classification::Ok,
            date_time: None,
            data: BTreeMap::new(),
            has_changes: false,
        }
    }

    /// Path relative to the image set root (`relative_path/file_name`).
    pub fn relative_file_path(&self) -> String {
        if self.relative_path.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.relative_path, self.file_name)
        }
    }

    /// Current value of `column` as it would be persisted.
    pub fn column_value(&self, column: &Column) -> ColumnValue {
        match column {
            Column::Classification => ColumnValue::Text(self.classification.as_str().to_string()),
            Column::DateTime => match self.date_time {
                Some(dt) => ColumnValue::Text(dt.to_rfc3339()),
                None => ColumnValue::Null,
            },
            Column::Data(label) => match self.data.get(label) {
                Some(v) => ColumnValue::Text(v.clone()),
                None => ColumnValue::Null,
            },
        }
    }
}

/// A persisted column a job may update.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    Classification,
    DateTime,
    /// User-defined field stored in `file_data` under this label.
    Data(String),
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Classification => f.write_str("classification"),
            Column::DateTime => f.write_str("date_time"),
            Column::Data(label) => write!(f, "data:{}", label),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    Null,
}

impl ColumnValue {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s.as_str()),
            ColumnValue::Null => None,
        }
    }
}

/// One entry of a transaction batch: the changed column values of one record.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedUpdate {
    pub id: i64,
    pub values: Vec<(Column, ColumnValue)>,
}

impl StagedUpdate {
    /// Snapshot `columns` of `record`.
    pub fn from_record(record: &FileRecord, columns: &[Column]) -> Self {
        Self {
            id: record.id,
            values: columns
                .iter()
                .map(|c| (c.clone(), record.column_value(c)))
                .collect(),
        }
    }
}

/// Pixel statistics behind a luminosity/color decision. Lives for one compute iteration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassificationResult {
    /// Fraction of sampled pixels at or below the luminance threshold.
    pub dark_pixel_fraction: f64,
    /// Fraction of sampled pixels whose channels differ by more than the color tolerance.
    pub colored_pixel_fraction: f64,
    /// Mean luminance over sampled pixels, 0..=255.
    pub mean_luminosity: f64,
    /// Sampled luminance in eight equal-width bins.
    pub luminosity_histogram: [u32; 8],
    pub is_color: bool,
}

/// Small RGB thumbnail carried on the coarse preview channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Preview {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixels, `width * height * 3` bytes.
    pub rgb: Vec<u8>,
}

/// What a job reports for one file.
#[derive(Clone, Debug, PartialEq)]
pub struct FileOutcome {
    /// Tally key, e.g. a classification name or "No metadata found".
    pub label: String,
    /// True when a targeted column changed and must be persisted.
    pub changed: bool,
    /// Human readable feedback row for the observer.
    pub feedback: String,
    pub preview: Option<Preview>,
}

impl FileOutcome {
    pub fn new(label: impl Into<String>, changed: bool, feedback: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            changed,
            feedback: feedback.into(),
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: Option<Preview>) -> Self {
        self.preview = preview;
        self
    }
}

/// Per-file feedback row as shown by an observer.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackRow {
    pub file: String,
    pub message: String,
}

/// Resolved CLI options: defaults, then `.trapscan.toml`, then command-line flags.
#[derive(Clone, Debug, Default)]
pub struct Opts {
    pub db_path: Option<PathBuf>,
    pub verbose: bool,
    pub exclude: Vec<String>,
    pub follow_links: bool,
    pub io_workers: Option<usize>,
    pub compute_workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub atom_size: Option<usize>,
    pub thresholds: DarkThresholds,
    /// `exiftool` executable; `None` means look it up on `PATH`.
    pub exiftool: Option<PathBuf>,
}

impl Opts {
    /// Pipeline tuning with any pool/batch/atom overrides applied.
    pub fn tuning(&self) -> PipelineTuning {
        let limits = WorkerThreadLimits::current();
        let mut tuning = PipelineTuning::new(
            self.io_workers.unwrap_or(limits.io_default),
            self.compute_workers
                .unwrap_or_else(|| limits.compute_threads()),
        );
        if let Some(n) = self.batch_size {
            tuning = tuning.with_batch_size(n);
        }
        if let Some(n) = self.atom_size {
            tuning = tuning.with_atom_size(n);
        }
        tuning
    }
}
