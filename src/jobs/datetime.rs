//! Re-read capture date/time from embedded metadata.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

use crate::engine::decode::{DecodeNeeds, MetadataMap, Probe, find_tag};
use crate::pipeline::DecodeHandle;
use crate::{Column, FileOutcome, FileRecord};

use super::{Classifier, NO_LONGER_AVAILABLE, NO_METADATA};

/// Tags tried in order.
const DATE_TAGS: &[&str] = &["DateTimeOriginal", "CreateDate"];
const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S%.f";
const EXIF_FORMAT_TZ: &str = "%Y:%m:%d %H:%M:%S%.f%:z";

/// Replaces `date_time` with the capture time found in metadata.
///
/// Metadata timestamps without an offset keep the offset the record already has, or
/// `default_offset` for records without a date.
#[derive(Clone, Debug)]
pub struct RereadDateTime {
    pub default_offset: FixedOffset,
}

impl Default for RereadDateTime {
    fn default() -> Self {
        Self {
            default_offset: Utc.fix(),
        }
    }
}

impl RereadDateTime {
    pub fn new(default_offset: FixedOffset) -> Self {
        Self { default_offset }
    }
}

/// Parse an EXIF timestamp, with or without a trailing offset.
/// All-zero placeholder dates parse as `None`.
pub fn parse_exif_date_time(
    value: &str,
    fallback_offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_str(value, EXIF_FORMAT_TZ) {
        return Some(dt);
    }
    let naive = NaiveDateTime::parse_from_str(value, EXIF_FORMAT).ok()?;
    fallback_offset.from_local_datetime(&naive).single()
}

fn capture_time(
    metadata: &MetadataMap,
    fallback_offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    DATE_TAGS
        .iter()
        .filter_map(|tag| find_tag(metadata, tag))
        .find_map(|v| parse_exif_date_time(v, fallback_offset))
}

fn describe(dt: Option<&DateTime<FixedOffset>>) -> String {
    dt.map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "(none)".to_string())
}

impl Classifier for RereadDateTime {
    fn name(&self) -> &'static str {
        "datetime"
    }

    fn columns(&self) -> Vec<Column> {
        vec![Column::DateTime]
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
        let offset = record
            .date_time
            .map(|d| *d.offset())
            .unwrap_or(self.default_offset);
        let Some(after) = handle.metadata().and_then(|m| capture_time(m, offset)) else {
            return FileOutcome::new(NO_METADATA, false, NO_METADATA);
        };
        let before = record.date_time;
        // Same instant with a different offset still changes the stored text.
        let unchanged = before.is_some_and(|b| b == after && b.offset() == after.offset());
        if unchanged {
            return FileOutcome::new("Unchanged", false, "unchanged");
        }
        record.date_time = Some(after);
        FileOutcome::new(
            "Updated",
            true,
            format!("{} -> {}", describe(before.as_ref()), describe(Some(&after))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_offset_timestamps() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let dt = parse_exif_date_time("2021:06:01 12:30:00", plus_two).unwrap();
        assert_eq!(dt.to_rfc3339(), "2021-06-01T12:30:00+02:00");

        let dt = parse_exif_date_time("2021:06:01 12:30:00-05:00", plus_two).unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);

        assert!(parse_exif_date_time("0000:00:00 00:00:00", plus_two).is_none());
        assert!(parse_exif_date_time("garbage", plus_two).is_none());
    }
}
