//! Dark-threshold and general reclassification jobs.

use crate::engine::decode::DecodeNeeds;
use crate::pipeline::DecodeHandle;
use crate::{Column, FileOutcome, FileRecord};

use super::Classifier;
use super::luminosity::{ColorMode, DarkThresholds, decide, make_preview};

fn reclassify_record(
    record: &mut FileRecord,
    handle: &DecodeHandle,
    thresholds: &DarkThresholds,
    mode: ColorMode,
    preview_due: &dyn Fn() -> bool,
) -> FileOutcome {
    let decision = decide(handle, thresholds, mode);
    let before = record.classification;
    let after = decision.classification;
    let changed = before != after;
    record.classification = after;

    let mut feedback = if changed {
        format!("{} -> {}", before, after)
    } else {
        after.to_string()
    };
    if let Some(r) = &decision.result {
        feedback.push_str(&format!(
            " (dark {:.0}%, mean {:.0})",
            r.dark_pixel_fraction * 100.0,
            r.mean_luminosity
        ));
    }
    let preview = match &decision.image {
        Some(img) if preview_due() => Some(make_preview(img, &record.file_name)),
        _ => None,
    };
    FileOutcome::new(after.as_str(), changed, feedback).with_preview(preview)
}

/// Marks images `Dark` or `Ok` against a luminance/ratio threshold pair.
#[derive(Clone, Debug, Default)]
pub struct DarkReclassify {
    pub thresholds: DarkThresholds,
}

impl DarkReclassify {
    pub fn new(thresholds: DarkThresholds) -> Self {
        Self { thresholds }
    }
}

impl Classifier for DarkReclassify {
    fn name(&self) -> &'static str {
        "dark"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::Classification]
    }

    fn needs(&self) -> DecodeNeeds {
        DecodeNeeds {
            pixels: true,
            metadata: false,
        }
    }

    fn classify(
        &self,
        record: &mut FileRecord,
        handle: &DecodeHandle,
        preview_due: &dyn Fn() -> bool,
    ) -> FileOutcome {
        reclassify_record(
            record,
            handle,
            &self.thresholds,
            ColorMode::DarkOrOk,
            preview_due,
        )
    }
}

/// Full reclassification: `Dark`, otherwise `Color` or `Greyscale`.
#[derive(Clone, Debug, Default)]
pub struct Reclassify {
    pub thresholds: DarkThresholds,
}

impl Reclassify {
    pub fn new(thresholds: DarkThresholds) -> Self {
        Self { thresholds }
    }
}

impl Classifier for Reclassify {
    fn name(&self) -> &'static str {
        "classify"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::Classification]
    }

    fn needs(&self) -> DecodeNeeds {
        DecodeNeeds {
            pixels: true,
            metadata: false,
        }
    }

    fn classify(
        &self,
        record: &mut FileRecord,
        handle: &DecodeHandle,
        preview_due: &dyn Fn() -> bool,
    ) -> FileOutcome {
        reclassify_record(
            record,
            handle,
            &self.thresholds,
            ColorMode::DarkColorGreyscale,
            preview_due,
        )
    }
}
