//! DB tests: schema, file registration, record loading, and the column writer.

use chrono::DateTime;
use trapscan::engine::{
    SqliteTransaction, add_files, file_count, load_files, open_db, open_db_in_memory,
};
use trapscan::pipeline::UpdateTransaction;
use trapscan::{Classification, Column, ColumnValue, StagedUpdate};

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(d, f)| (d.to_string(), f.to_string()))
        .collect()
}

#[test]
fn test_file_count_empty() {
    let conn = open_db_in_memory().unwrap();
    assert_eq!(file_count(&conn).unwrap(), 0);
}

#[test]
fn test_add_files_ignores_duplicates() {
    let mut conn = open_db_in_memory().unwrap();
    let files = pairs(&[("site1/cam2", "IMG_0001.JPG"), ("", "IMG_0002.JPG")]);
    assert_eq!(add_files(&mut conn, &files).unwrap(), 2);
    assert_eq!(add_files(&mut conn, &files).unwrap(), 0);
    let more = pairs(&[("site1/cam2", "IMG_0003.JPG")]);
    assert_eq!(add_files(&mut conn, &more).unwrap(), 1);
    assert_eq!(file_count(&conn).unwrap(), 3);
}

#[test]
fn test_load_files_ordered_with_defaults() {
    let mut conn = open_db_in_memory().unwrap();
    let files = pairs(&[("b", "2.jpg"), ("a", "9.jpg"), ("b", "1.jpg"), ("", "0.jpg")]);
    add_files(&mut conn, &files).unwrap();

    let records = load_files(&conn).unwrap();
    let order: Vec<String> = records.iter().map(|r| r.relative_file_path()).collect();
    assert_eq!(order, vec!["0.jpg", "a/9.jpg", "b/1.jpg", "b/2.jpg"]);
    assert!(records.iter().all(|r| r.classification == Classification::Ok));
    assert!(records.iter().all(|r| r.date_time.is_none() && r.data.is_empty()));
    assert!(records.iter().all(|r| !r.has_changes));
}

#[test]
fn test_load_files_tolerates_bad_values() {
    let mut conn = open_db_in_memory().unwrap();
    add_files(&mut conn, &pairs(&[("", "x.jpg")])).unwrap();
    conn.execute(
        "UPDATE files SET classification = 'Blurry', date_time = 'yesterday'",
        [],
    )
    .unwrap();
    let records = load_files(&conn).unwrap();
    assert_eq!(records[0].classification, Classification::Ok);
    assert!(records[0].date_time.is_none());
}

#[test]
fn test_transaction_writes_each_column_kind() {
    let mut conn = open_db_in_memory().unwrap();
    add_files(&mut conn, &pairs(&[("", "a.jpg"), ("", "b.jpg")])).unwrap();
    let ids: Vec<i64> = load_files(&conn).unwrap().iter().map(|r| r.id).collect();

    let columns = vec![
        Column::Classification,
        Column::DateTime,
        Column::Data("Camera".into()),
    ];
    let mut tx = SqliteTransaction::new(conn, columns.clone());
    tx.stage(StagedUpdate {
        id: ids[0],
        values: vec![
            (Column::Classification, ColumnValue::Text("Dark".into())),
            (
                Column::DateTime,
                ColumnValue::Text("2022-03-04T05:06:07+01:00".into()),
            ),
            (Column::Data("Camera".into()), ColumnValue::Text("Bushnell".into())),
        ],
    })
    .unwrap();
    tx.flush().unwrap();

    let records = load_files(tx.connection()).unwrap();
    assert_eq!(records[0].classification, Classification::Dark);
    assert_eq!(
        records[0].date_time,
        Some(DateTime::parse_from_rfc3339("2022-03-04T05:06:07+01:00").unwrap())
    );
    assert_eq!(records[0].data.get("Camera").map(String::as_str), Some("Bushnell"));
    assert_eq!(records[1].classification, Classification::Ok);

    // NULL clears the data field and the date.
    tx.stage(StagedUpdate {
        id: ids[0],
        values: vec![
            (Column::DateTime, ColumnValue::Null),
            (Column::Data("Camera".into()), ColumnValue::Null),
        ],
    })
    .unwrap();
    tx.flush().unwrap();
    let records = load_files(tx.connection()).unwrap();
    assert!(records[0].date_time.is_none());
    assert!(records[0].data.is_empty());
}

#[test]
fn test_transaction_rejects_foreign_column() {
    let conn = open_db_in_memory().unwrap();
    let mut tx = SqliteTransaction::new(conn, vec![Column::Classification]);
    let err = tx.stage(StagedUpdate {
        id: 1,
        values: vec![(Column::DateTime, ColumnValue::Null)],
    });
    assert!(err.is_err());
}

#[test]
fn test_failed_flush_commits_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    add_files(&mut conn, &pairs(&[("", "a.jpg")])).unwrap();
    let id = load_files(&conn).unwrap()[0].id;

    let mut tx = SqliteTransaction::new(conn, vec![Column::Classification]);
    tx.stage(StagedUpdate {
        id,
        values: vec![(Column::Classification, ColumnValue::Text("Dark".into()))],
    })
    .unwrap();
    // NULL classification violates the column contract and aborts the whole batch.
    tx.stage(StagedUpdate {
        id,
        values: vec![(Column::Classification, ColumnValue::Null)],
    })
    .unwrap();
    assert!(tx.flush().is_err());
    let records = load_files(tx.connection()).unwrap();
    assert_eq!(records[0].classification, Classification::Ok);
}

#[test]
fn test_file_db_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".trapscan.db");
    {
        let mut conn = open_db(&path).unwrap();
        add_files(&mut conn, &pairs(&[("x", "1.jpg"), ("x", "2.jpg")])).unwrap();
        let id = load_files(&conn).unwrap()[1].id;
        let mut tx = SqliteTransaction::new(conn, vec![Column::Classification]);
        tx.stage(StagedUpdate {
            id,
            values: vec![(Column::Classification, ColumnValue::Text("Video".into()))],
        })
        .unwrap();
        tx.flush().unwrap();
        tx.checkpoint().unwrap();
    }
    let conn = open_db(&path).unwrap();
    let records = load_files(&conn).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].classification, Classification::Video);
}
