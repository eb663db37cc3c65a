//! Populate a data field from an embedded metadata tag.

use crate::engine::decode::{DecodeNeeds, Probe, find_tag};
use crate::pipeline::DecodeHandle;
use crate::{Column, FileOutcome, FileRecord};

use super::{Classifier, NO_LONGER_AVAILABLE, NO_METADATA};

/// Copies metadata tag `tag` into data field `label`.
///
/// With `clear_if_absent`, files without the tag get the field cleared; otherwise the field is
/// left as it is.
#[derive(Clone, Debug)]
pub struct PopulateMetadata {
    pub tag: String,
    pub label: String,
    pub clear_if_absent: bool,
}

impl PopulateMetadata {
    pub fn new(tag: impl Into<String>, label: impl Into<String>, clear_if_absent: bool) -> Self {
        Self {
            tag: tag.into(),
            label: label.into(),
            clear_if_absent,
        }
    }
}

impl Classifier for PopulateMetadata {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::Data(self.label.clone())]
    }

    fn needs(&self) -> DecodeNeeds {
        DecodeNeeds {
            pixels: false,
            metadata: true,
        }
    }

    fn classify(
        &self,
        record: &mut FileRecord,
        handle: &DecodeHandle,
        _preview_due: &dyn Fn() -> bool,
    ) -> FileOutcome {
        if matches!(handle.probe(), Probe::Missing) {
            return FileOutcome::new(NO_LONGER_AVAILABLE, false, "File no longer available");
        }
        let value = handle.metadata().and_then(|m| find_tag(m, &self.tag));
        match value {
            Some(value) => {
                let changed = record.data.get(&self.label).map(String::as_str) != Some(value);
                if changed {
                    record.data.insert(self.label.clone(), value.to_string());
                    FileOutcome::new("Updated", true, value)
                } else {
                    FileOutcome::new("Unchanged", false, value)
                }
            }
            None if self.clear_if_absent && record.data.remove(&self.label).is_some() => {
                FileOutcome::new(NO_METADATA, true, format!("{}; cleared", NO_METADATA))
            }
            None => FileOutcome::new(NO_METADATA, false, NO_METADATA),
        }
    }
}
