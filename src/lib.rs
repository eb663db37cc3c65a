//! trapscan: batch classification of camera-trap image sets.
//!
//! Files are registered in a SQLite index by [`scan_dir`](engine::scan_dir) +
//! [`add_files`](engine::add_files); a job ([`jobs::Classifier`]) then runs over every indexed
//! file through the [`pipeline::Pipeline`]: ordered atoms, a decode pool, a compute pool and a
//! batched persistence sink, with progress published from a single reporter thread.

pub mod engine;
pub mod jobs;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use std::path::Path;
use std::sync::Arc;

/// Result alias used by the public trapscan API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Run `job` over `records` of the image set at `root` with default tuning and no observer,
/// writing changes through `transaction`.
///
/// ```ignore
/// let conn = trapscan::engine::open_db(&db)?;
/// let records = trapscan::engine::load_files(&conn)?;
/// let job = Arc::new(trapscan::jobs::DarkReclassify::default());
/// let tx = trapscan::engine::SqliteTransaction::new(conn, job.columns());
/// let outcome = trapscan::run_job(root, job, records, tx)?;
/// ```
pub fn run_job<T>(
    root: &Path,
    job: Arc<dyn jobs::Classifier>,
    records: Vec<FileRecord>,
    transaction: T,
) -> Result<pipeline::RunOutcome<T>>
where
    T: pipeline::UpdateTransaction + 'static,
{
    let decoder: Arc<dyn engine::Decoder> = Arc::new(engine::FsDecoder::new());
    pipeline::Pipeline::new(root, job, decoder, transaction).run(records)
}
