//! Job tests over a real image set in a temp dir: scan, index, run, reload.

use chrono::{DateTime, FixedOffset};
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use trapscan::engine::decode::{FsDecoder, MetadataMap, MetadataReader};
use trapscan::engine::{SqliteTransaction, add_files, load_files, open_db, scan_dir};
use trapscan::jobs::{
    Classifier, DarkReclassify, DarkThresholds, PopulateMetadata, Reclassify, RereadDateTime,
};
use trapscan::pipeline::{Pipeline, PipelineTuning, RunOutcome, RunState};
use trapscan::{Classification, FileRecord};

fn save_solid(dir: &Path, rel: &str, rgb: [u8; 3]) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(32, 24, Rgb(rgb)).save(&path).unwrap();
}

/// Image set with dark, grey, colored, corrupt and video files; returns its root.
fn image_set() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    save_solid(root, "cam1/night_01.jpg", [3, 3, 3]);
    save_solid(root, "cam1/night_02.png", [10, 12, 8]);
    save_solid(root, "cam1/day_01.jpg", [150, 150, 150]);
    save_solid(root, "cam2/day_02.png", [40, 180, 60]);
    std::fs::write(root.join("cam2/broken.jpg"), b"\xff\xd8\xff not really").unwrap();
    std::fs::write(root.join("cam2/clip.mp4"), b"\0\0\0\x18ftypmp42").unwrap();
    std::fs::write(root.join("cam2/notes.txt"), b"ignored").unwrap();
    dir
}

/// Scan `root` into a fresh index and load its records.
fn index(root: &Path) -> (rusqlite::Connection, Vec<FileRecord>) {
    let mut conn = open_db(&root.join(".trapscan.db")).unwrap();
    let scan = scan_dir(root, &[], false).unwrap();
    add_files(&mut conn, &scan.files).unwrap();
    let records = load_files(&conn).unwrap();
    (conn, records)
}

fn run(
    root: &Path,
    job: Arc<dyn Classifier>,
    decoder: FsDecoder,
    conn: rusqlite::Connection,
    records: Vec<FileRecord>,
) -> RunOutcome<SqliteTransaction> {
    let tx = SqliteTransaction::new(conn, job.columns());
    Pipeline::new(root, job, Arc::new(decoder), tx)
        .with_tuning(PipelineTuning::new(2, 2).with_batch_size(2))
        .run(records)
        .unwrap()
}

fn class_of(records: &[FileRecord], name: &str) -> Classification {
    records
        .iter()
        .find(|r| r.file_name == name)
        .unwrap_or_else(|| panic!("{} not indexed", name))
        .classification
}

#[test]
fn test_scan_finds_media_only() {
    let dir = image_set();
    let scan = scan_dir(dir.path(), &[], false).unwrap();
    let names: Vec<&str> = scan.files.iter().map(|(_, f)| f.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "day_01.jpg",
            "night_01.jpg",
            "night_02.png",
            "broken.jpg",
            "clip.mp4",
            "day_02.png"
        ]
    );
    let excluded = scan_dir(dir.path(), &["*.mp4".to_string()], false).unwrap();
    assert_eq!(excluded.files.len(), 5);
}

#[test]
fn test_dark_job_end_to_end() {
    let dir = image_set();
    let root = dir.path();
    let (conn, records) = index(root);
    std::fs::remove_file(root.join("cam1/day_01.jpg")).unwrap();

    let job = Arc::new(DarkReclassify::new(DarkThresholds::default()));
    let outcome = run(root, job, FsDecoder::new(), conn, records);
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.processed, 6);
    assert_eq!(outcome.open_handles, 0);

    let conn = outcome.transaction.into_connection();
    let stored = load_files(&conn).unwrap();
    assert_eq!(class_of(&stored, "night_01.jpg"), Classification::Dark);
    assert_eq!(class_of(&stored, "night_02.png"), Classification::Dark);
    assert_eq!(class_of(&stored, "day_01.jpg"), Classification::NoLongerAvailable);
    assert_eq!(class_of(&stored, "day_02.png"), Classification::Ok);
    assert_eq!(class_of(&stored, "broken.jpg"), Classification::Corrupt);
    assert_eq!(class_of(&stored, "clip.mp4"), Classification::Video);

    // Running again over the stored state changes nothing.
    let again = run(root, Arc::new(DarkReclassify::default()), FsDecoder::new(), conn, stored);
    assert_eq!(again.changed, 0);
    assert_eq!(again.flushes, 0);
}

#[test]
fn test_reclassify_separates_color_and_greyscale() {
    let dir = image_set();
    let root = dir.path();
    let (conn, records) = index(root);
    let outcome = run(
        root,
        Arc::new(Reclassify::default()),
        FsDecoder::new(),
        conn,
        records,
    );
    let stored = load_files(outcome.transaction.connection()).unwrap();
    assert_eq!(class_of(&stored, "night_01.jpg"), Classification::Dark);
    assert_eq!(class_of(&stored, "day_01.jpg"), Classification::Greyscale);
    assert_eq!(class_of(&stored, "day_02.png"), Classification::Color);
    assert_eq!(outcome.tally.get("Greyscale"), Some(&1));
    assert_eq!(outcome.tally.get("Color"), Some(&1));
}

#[test]
fn test_stricter_ratio_keeps_images_ok() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    // Three quarters dark.
    let img = RgbImage::from_fn(32, 32, |x, _| {
        if x < 24 { Rgb([0, 0, 0]) } else { Rgb([220, 220, 220]) }
    });
    img.save(root.join("mostly_dark.png")).unwrap();
    let (conn, records) = index(root);

    let loose = DarkThresholds {
        dark_pixel_ratio: 0.65,
        ..Default::default()
    };
    let outcome = run(
        root,
        Arc::new(DarkReclassify::new(loose)),
        FsDecoder::new(),
        conn,
        records,
    );
    assert_eq!(outcome.records[0].classification, Classification::Dark);

    let conn = outcome.transaction.into_connection();
    let records = load_files(&conn).unwrap();
    let outcome = run(
        root,
        Arc::new(DarkReclassify::default()),
        FsDecoder::new(),
        conn,
        records,
    );
    assert_eq!(outcome.records[0].classification, Classification::Ok);
    assert_eq!(outcome.changed, 1);
}

/// Metadata keyed by file name; files not listed have none.
struct FakeExif(Vec<(&'static str, Vec<(&'static str, &'static str)>)>);

impl MetadataReader for FakeExif {
    fn read(&self, path: &Path) -> anyhow::Result<MetadataMap> {
        let name = path.file_name().unwrap().to_str().unwrap();
        Ok(self
            .0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, tags)| {
                tags.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn exif_set() -> (TempDir, FakeExif) {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        save_solid(dir.path(), name, [100, 100, 100]);
    }
    let exif = FakeExif(vec![
        (
            "a.jpg",
            vec![
                ("EXIF:Model", "HC600"),
                ("EXIF:DateTimeOriginal", "2021:07:04 23:15:00"),
            ],
        ),
        (
            "b.jpg",
            vec![
                ("XMP:Model", "Browning"),
                ("EXIF:CreateDate", "2020:01:02 03:04:05"),
            ],
        ),
    ]);
    (dir, exif)
}

#[test]
fn test_populate_metadata_job() {
    let (dir, exif) = exif_set();
    let root = dir.path();
    let (conn, records) = index(root);
    let job = Arc::new(PopulateMetadata::new("Model", "Camera", false));
    let outcome = run(
        root,
        job,
        FsDecoder::with_metadata_reader(Box::new(exif)),
        conn,
        records,
    );
    assert_eq!(outcome.changed, 2);
    assert_eq!(outcome.tally.get("No metadata found"), Some(&1));

    let stored = load_files(outcome.transaction.connection()).unwrap();
    let camera = |name: &str| {
        stored
            .iter()
            .find(|r| r.file_name == name)
            .and_then(|r| r.data.get("Camera").cloned())
    };
    assert_eq!(camera("a.jpg").as_deref(), Some("HC600"));
    assert_eq!(camera("b.jpg").as_deref(), Some("Browning"));
    assert_eq!(camera("c.jpg"), None);
}

#[test]
fn test_populate_metadata_clears_when_asked() {
    let (dir, exif) = exif_set();
    let root = dir.path();
    let (mut conn, _) = index(root);
    conn.execute(
        "INSERT INTO file_data (file_id, label, value)
         SELECT id, 'Camera', 'stale' FROM files WHERE file = 'c.jpg'",
        [],
    )
    .unwrap();
    let records = load_files(&conn).unwrap();

    let job = Arc::new(PopulateMetadata::new("Model", "Camera", true));
    let outcome = run(
        root,
        job,
        FsDecoder::with_metadata_reader(Box::new(exif)),
        conn,
        records,
    );
    assert_eq!(outcome.changed, 3);
    let stored = load_files(outcome.transaction.connection()).unwrap();
    let c = stored.iter().find(|r| r.file_name == "c.jpg").unwrap();
    assert!(c.data.get("Camera").is_none());
}

#[test]
fn test_reread_date_time_keeps_existing_offset() {
    let (dir, exif) = exif_set();
    let root = dir.path();
    let (conn, _) = index(root);
    conn.execute(
        "UPDATE files SET date_time = '2000-01-01T00:00:00-04:00' WHERE file = 'a.jpg'",
        [],
    )
    .unwrap();
    let records = load_files(&conn).unwrap();

    let plus_one = FixedOffset::east_opt(3600).unwrap();
    let outcome = run(
        root,
        Arc::new(RereadDateTime::new(plus_one)),
        FsDecoder::with_metadata_reader(Box::new(exif)),
        conn,
        records,
    );
    assert_eq!(outcome.changed, 2);
    assert_eq!(outcome.tally.get("No metadata found"), Some(&1));

    let stored = load_files(outcome.transaction.connection()).unwrap();
    let date = |name: &str| stored.iter().find(|r| r.file_name == name).unwrap().date_time;
    assert_eq!(
        date("a.jpg"),
        Some(DateTime::parse_from_rfc3339("2021-07-04T23:15:00-04:00").unwrap())
    );
    assert_eq!(
        date("b.jpg").map(|d| d.to_rfc3339()),
        Some("2020-01-02T03:04:05+01:00".to_string())
    );
    assert_eq!(date("c.jpg"), None);
}
