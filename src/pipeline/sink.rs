//! Batched persistence sink: bounded batches of changed records, one transaction each.

use anyhow::{Result, anyhow, bail};
use log::debug;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::engine::progress::Throttle;
use crate::{Column, StagedUpdate};

/// Write contract the pipeline needs from the persistent store.
///
/// A handle is bound to one column set. `stage` buffers an update; `flush` commits everything
/// staged since the last flush atomically, or fails and commits nothing.
pub trait UpdateTransaction: Send {
    fn columns(&self) -> &[Column];
    fn stage(&mut self, update: StagedUpdate) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Counters reported after a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Updates handed to the sink.
    pub staged: usize,
    /// Successful flushes.
    pub flushes: usize,
}

/// Accumulates [`StagedUpdate`]s and commits them through `T` in batches of at most `ceiling`.
///
/// Appends take the batch lock only long enough to push (or swap out a full batch); the
/// transaction itself sits behind a second lock so appends continue while a batch commits.
/// A partial batch is also committed once `flush_interval` has passed since the sink was
/// created or last committed on that schedule (see [`flush_if_due`](BatchedSink::flush_if_due)).
pub struct BatchedSink<T> {
    ceiling: usize,
    batch: Mutex<Vec<StagedUpdate>>,
    writer: Mutex<T>,
    /// Message of the first failed flush. Once set, nothing else is committed.
    failure: Mutex<Option<String>>,
    flush_throttle: Throttle,
    staged: AtomicUsize,
    flushes: AtomicUsize,
}

impl<T: UpdateTransaction> BatchedSink<T> {
    pub fn new(writer: T, ceiling: usize, flush_interval: Duration) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            ceiling,
            batch: Mutex::new(Vec::with_capacity(ceiling)),
            writer: Mutex::new(writer),
            failure: Mutex::new(None),
            flush_throttle: Throttle::starting_now(flush_interval),
            staged: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Column set of the underlying transaction.
    pub fn columns(&self) -> Result<Vec<Column>> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("sink writer lock poisoned"))?;
        Ok(writer.columns().to_vec())
    }

    /// Append updates; every time the batch reaches the ceiling it is committed.
    pub fn extend(&self, updates: impl IntoIterator<Item = StagedUpdate>) -> Result<()> {
        for update in updates {
            let full = {
                let mut batch = self
                    .batch
                    .lock()
                    .map_err(|_| anyhow!("sink batch lock poisoned"))?;
                batch.push(update);
                self.staged.fetch_add(1, Ordering::Relaxed);
                debug_assert!(batch.len() <= self.ceiling, "batch exceeded its ceiling");
                if batch.len() >= self.ceiling {
                    Some(std::mem::replace(
                        &mut *batch,
                        Vec::with_capacity(self.ceiling),
                    ))
                } else {
                    None
                }
            };
            if let Some(full) = full {
                self.commit(full)?;
            }
        }
        Ok(())
    }

    /// Commit a non-empty partial batch when the flush interval has elapsed.
    /// Returns whether a commit happened. At most one caller wins each interval.
    pub fn flush_if_due(&self) -> Result<bool> {
        if self.pending()? == 0 || !self.flush_throttle.try_claim() {
            return Ok(false);
        }
        self.flush_pending()?;
        Ok(true)
    }

    /// Commit whatever is in the batch now, if anything.
    pub fn flush_pending(&self) -> Result<()> {
        let rest = {
            let mut batch = self
                .batch
                .lock()
                .map_err(|_| anyhow!("sink batch lock poisoned"))?;
            std::mem::take(&mut *batch)
        };
        if rest.is_empty() {
            return Ok(());
        }
        self.commit(rest)
    }

    /// Commit whatever is left in the batch (end of run or cancellation).
    pub fn finish(&self) -> Result<()> {
        self.flush_pending()
    }

    /// Updates waiting in the batch.
    pub fn pending(&self) -> Result<usize> {
        let batch = self
            .batch
            .lock()
            .map_err(|_| anyhow!("sink batch lock poisoned"))?;
        Ok(batch.len())
    }

    fn commit(&self, batch: Vec<StagedUpdate>) -> Result<()> {
        let n = batch.len();
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("sink writer lock poisoned"))?;
        let mut failure = self
            .failure
            .lock()
            .map_err(|_| anyhow!("sink failure lock poisoned"))?;
        if let Some(msg) = failure.as_ref() {
            bail!("earlier flush failed: {}", msg);
        }
        let result = batch
            .into_iter()
            .try_for_each(|update| writer.stage(update))
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            *failure = Some(format!("{:#}", e));
            return Err(e);
        }
        let flushes = self.flushes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("sink: committed {} updates (flush #{})", n, flushes);
        Ok(())
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            staged: self.staged.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Give the transaction handle back after the run.
    pub fn into_inner(self) -> Result<T> {
        self.writer
            .into_inner()
            .map_err(|_| anyhow!("sink writer lock poisoned"))
    }
}
