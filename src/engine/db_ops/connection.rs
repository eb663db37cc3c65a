//! Open the store, register scanned files, and load file records.

use anyhow::{Context, Result};
use chrono::DateTime;
use log::warn;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

use crate::{Classification, FileRecord};

use super::{INSERT_FILE_SQL, SCHEMA, WAL_PRAGMAS};

/// Enable WAL and apply schema to an open connection (idempotent).
fn apply_wal_and_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(())
}

/// Open or create the store and ensure schema + WAL.
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open database {}", path.display()))?;
    apply_wal_and_schema(&conn)?;
    Ok(conn)
}

/// Open an in-memory store with the same schema (tests and dry runs; no WAL pragmas needed).
pub fn open_db_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory database")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("enable foreign keys")?;
    conn.execute_batch(SCHEMA).context("create schema")?;
    Ok(conn)
}

/// Register `(relative_path, file_name)` pairs in one transaction. Returns how many were new.
pub fn add_files(conn: &mut Connection, files: &[(String, String)]) -> Result<usize> {
    let tx = conn.transaction().context("begin transaction")?;
    let mut added = 0_usize;
    {
        let mut stmt = tx.prepare(INSERT_FILE_SQL).context("prepare insert")?;
        for (relative_path, file) in files {
            added += stmt
                .execute((relative_path.as_str(), file.as_str()))
                .context("insert file")?;
        }
    }
    tx.commit().context("commit transaction")?;
    Ok(added)
}

/// Number of registered files.
pub fn file_count(conn: &Connection) -> Result<usize> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
        .context("count files")?;
    Ok(n.max(0) as usize)
}

/// Load every file record ordered by relative path, then by name.
/// Unparseable stored values fall back to defaults with a warning.
pub fn load_files(conn: &Connection) -> Result<Vec<FileRecord>> {
    let mut data: HashMap<i64, Vec<(String, String)>> = HashMap::new();
    {
        let mut stmt = conn.prepare("SELECT file_id, label, value FROM file_data")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get(2)?))
        })?;
        for row in rows {
            let (id, label, value) = row?;
            data.entry(id).or_default().push((label, value));
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, relative_path, file, classification, date_time FROM files
         ORDER BY relative_path, file",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, relative_path, file, classification, date_time) = row?;
        let mut record = FileRecord::new(id, relative_path, file);
        record.classification = classification.parse().unwrap_or_else(|_| {
            warn!(
                "{}: unknown classification '{}', treating as Ok",
                record.relative_file_path(),
                classification
            );
            Classification::Ok
        });
        record.date_time = date_time.and_then(|s| match DateTime::parse_from_rfc3339(&s) {
            Ok(dt) => Some(dt),
            Err(e) => {
                warn!("{}: bad date_time '{}': {}", record.relative_file_path(), s, e);
                None
            }
        });
        if let Some(fields) = data.remove(&id) {
            record.data.extend(fields);
        }
        records.push(record);
    }
    Ok(records)
}
