//! Database operations: schema, open/load, and the batched column writer.

mod connection;
mod writer;

pub use connection::{add_files, file_count, load_files, open_db, open_db_in_memory};
pub use writer::SqliteTransaction;

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        PRAGMA foreign_keys = ON;
        "#;

/// Register a file; existing (relative_path, file) pairs are left alone.
pub(crate) const INSERT_FILE_SQL: &str =
    "INSERT OR IGNORE INTO files (relative_path, file) VALUES (?1, ?2)";

pub(crate) const UPDATE_CLASSIFICATION_SQL: &str =
    "UPDATE files SET classification = ?2 WHERE id = ?1";

pub(crate) const UPDATE_DATE_TIME_SQL: &str = "UPDATE files SET date_time = ?2 WHERE id = ?1";

pub(crate) const UPSERT_DATA_SQL: &str = "INSERT INTO file_data (file_id, label, value) VALUES (?1, ?2, ?3)
     ON CONFLICT(file_id, label) DO UPDATE SET value = excluded.value";

pub(crate) const DELETE_DATA_SQL: &str = "DELETE FROM file_data WHERE file_id = ?1 AND label = ?2";

/// Schema for the files and file_data tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    relative_path TEXT NOT NULL,
    file TEXT NOT NULL,
    classification TEXT NOT NULL DEFAULT 'Ok',
    date_time TEXT,
    UNIQUE (relative_path, file)
);

CREATE TABLE IF NOT EXISTS file_data (
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (file_id, label)
);
"#;
