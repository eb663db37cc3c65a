//! Job drivers: what the compute stage does to each file.
//!
//! Every job is a [`Classifier`]: the pipeline asks it which columns it writes and what the
//! decode stage must prepare, then calls [`Classifier::classify`] once per file.

pub mod datetime;
pub mod luminosity;
pub mod metadata;
pub mod reclassify;

pub use datetime::RereadDateTime;
pub use luminosity::{ColorMode, DarkThresholds, analyze, decide, luminance, make_preview};
pub use metadata::PopulateMetadata;
pub use reclassify::{DarkReclassify, Reclassify};

use crate::engine::decode::DecodeNeeds;
use crate::pipeline::DecodeHandle;
use crate::{Column, FileOutcome, FileRecord};

/// Tally label for files whose metadata lacks the requested tag.
pub const NO_METADATA: &str = "No metadata found";
/// Tally label for files that disappeared since the last scan.
pub const NO_LONGER_AVAILABLE: &str = "NoLongerAvailable";

/// Per-file decision of one job.
///
/// `classify` runs concurrently on the compute pool. It mutates the targeted fields of `record`
/// and reports whether any of them changed; the handle is released by the caller afterwards.
pub trait Classifier: Send + Sync {
    /// Short job name used in logs and progress.
    fn name(&self) -> &'static str;

    /// Columns this job writes. The transaction handle of the run must cover them.
    fn columns(&self) -> Vec<Column>;

    fn needs(&self) -> DecodeNeeds;

    /// Jobs that decode pixels ask `preview_due` once they hold an image and attach a thumbnail
    /// to the outcome when it returns true. Asking claims the preview interval.
    fn classify(
        &self,
        record: &mut FileRecord,
        handle: &DecodeHandle,
        preview_due: &dyn Fn() -> bool,
    ) -> FileOutcome;
}
