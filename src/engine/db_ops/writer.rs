//! Column writer: the SQLite side of the pipeline's transaction contract.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, Transaction};

use crate::pipeline::UpdateTransaction;
use crate::{Column, ColumnValue, StagedUpdate};

use super::{DELETE_DATA_SQL, UPDATE_CLASSIFICATION_SQL, UPDATE_DATE_TIME_SQL, UPSERT_DATA_SQL};

/// Transaction handle bound to one column set. Staged updates are written in a single
/// SQLite transaction per [`flush`](UpdateTransaction::flush).
pub struct SqliteTransaction {
    conn: Connection,
    columns: Vec<Column>,
    staged: Vec<StagedUpdate>,
}

impl SqliteTransaction {
    pub fn new(conn: Connection, columns: Vec<Column>) -> Self {
        Self {
            conn,
            columns,
            staged: Vec::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Give the connection back (e.g. to read results after a run).
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Reclaim WAL space after a run (checkpoint and truncate WAL file).
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .context("WAL checkpoint")
    }
}

/// Execute one column write for record `id`.
fn write_value(tx: &Transaction<'_>, id: i64, column: &Column, value: &ColumnValue) -> Result<()> {
    match column {
        Column::Classification => {
            let Some(text) = value.as_deref() else {
                bail!("classification of file {} cannot be NULL", id);
            };
            tx.prepare_cached(UPDATE_CLASSIFICATION_SQL)?
                .execute((id, text))
                .context("update classification")?;
        }
        Column::DateTime => {
            tx.prepare_cached(UPDATE_DATE_TIME_SQL)?
                .execute((id, value.as_deref()))
                .context("update date_time")?;
        }
        Column::Data(label) => match value.as_deref() {
            Some(text) => {
                tx.prepare_cached(UPSERT_DATA_SQL)?
                    .execute((id, label.as_str(), text))
                    .context("upsert data field")?;
            }
            None => {
                tx.prepare_cached(DELETE_DATA_SQL)?
                    .execute((id, label.as_str()))
                    .context("clear data field")?;
            }
        },
    }
    Ok(())
}

impl UpdateTransaction for SqliteTransaction {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn stage(&mut self, update: StagedUpdate) -> Result<()> {
        if let Some((column, _)) = update
            .values
            .iter()
            .find(|(c, _)| !self.columns.contains(c))
        {
            bail!(
                "column {} is not part of this transaction ({:?})",
                column,
                self.columns
            );
        }
        self.staged.push(update);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction().context("begin transaction")?;
        for update in &self.staged {
            for (column, value) in &update.values {
                write_value(&tx, update.id, column, value)?;
            }
        }
        tx.commit().context("commit transaction")?;
        self.staged.clear();
        Ok(())
    }
}
