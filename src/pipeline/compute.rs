//! Compute stage: classify each decoded file, report progress, hand changes to the sink.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::progress::ProgressHandle;
use crate::jobs::Classifier;
use crate::{Column, FeedbackRow, FileOutcome, FileRecord, StagedUpdate};

use super::atom::LoadAtom;
use super::error_handler::FirstError;
use super::sink::{BatchedSink, UpdateTransaction};

/// A disposed atom on its way back to the orchestrator.
#[derive(Debug)]
pub struct CompletedAtom {
    pub offset: usize,
    pub records: Vec<FileRecord>,
    /// Outcome label of each record, same order.
    pub labels: Vec<String>,
}

/// Shared inputs of the compute workers.
pub struct ComputeStage<T> {
    pub classifier: Arc<dyn Classifier>,
    pub sink: Arc<BatchedSink<T>>,
    pub progress: ProgressHandle,
    pub columns: Vec<Column>,
    /// How often an idle worker wakes to commit a partial batch.
    pub flush_interval: Duration,
    pub first_error: FirstError,
}

impl<T> Clone for ComputeStage<T> {
    fn clone(&self) -> Self {
        Self {
            classifier: Arc::clone(&self.classifier),
            sink: Arc::clone(&self.sink),
            progress: self.progress.clone(),
            columns: self.columns.clone(),
            flush_interval: self.flush_interval,
            first_error: self.first_error.clone(),
        }
    }
}

impl<T: UpdateTransaction> ComputeStage<T> {
    /// Classify every slot of `atom`, releasing each handle right after use.
    /// Changed records are appended to `pending`.
    pub fn process_atom(&self, mut atom: LoadAtom, pending: &mut Vec<StagedUpdate>) -> CompletedAtom {
        let preview_due = || self.progress.preview_due();
        let mut labels = Vec::with_capacity(atom.len());
        for slot in &mut atom.slots {
            let handle = slot.handle.take();
            let mut outcome = match &handle {
                Some(h) => self.classifier.classify(&mut slot.record, h, &preview_due),
                None => FileOutcome::new("Corrupt", false, "no decode handle"),
            };
            drop(handle);

            if outcome.changed {
                slot.record.has_changes = true;
                pending.push(StagedUpdate::from_record(&slot.record, &self.columns));
            }
            if let Some(preview) = outcome.preview.take() {
                self.progress.send_preview(preview);
            }
            let record = &slot.record;
            self.progress.file_done(|| FeedbackRow {
                file: record.relative_file_path(),
                message: outcome.feedback.clone(),
            });
            labels.push(outcome.label);
        }
        let (offset, records) = atom.into_records();
        CompletedAtom {
            offset,
            records,
            labels,
        }
    }

    /// Move `pending` into the sink. After the first failure nothing more is persisted.
    pub fn hand_off(&self, pending: &mut Vec<StagedUpdate>) {
        if pending.is_empty() {
            return;
        }
        if self.first_error.is_set() {
            pending.clear();
            return;
        }
        if let Err(e) = self.sink.extend(pending.drain(..)) {
            self.first_error.record(e);
        }
        pending.clear();
    }

    /// Commit the sink's partial batch if the flush interval has elapsed.
    pub fn flush_if_due(&self) {
        if self.first_error.is_set() {
            return;
        }
        if let Err(e) = self.sink.flush_if_due() {
            self.first_error.record(e);
        }
    }
}

/// Shortest idle wake-up period of a compute worker.
const MIN_TICK: Duration = Duration::from_millis(1);

fn compute_worker_loop<T: UpdateTransaction>(
    decoded_rx: Receiver<LoadAtom>,
    done_tx: Sender<CompletedAtom>,
    stage: ComputeStage<T>,
) {
    let mut pending = Vec::new();
    let tick = stage.flush_interval.max(MIN_TICK);
    loop {
        match decoded_rx.recv_timeout(tick) {
            Ok(atom) => {
                let completed = stage.process_atom(atom, &mut pending);
                stage.hand_off(&mut pending);
                if done_tx.send(completed).is_err() {
                    log::warn!("compute: orchestrator stopped collecting");
                }
            }
            // Idle: changes already in the sink still get committed on schedule.
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        stage.flush_if_due();
    }
}

/// Spawn `num_workers` compute workers. The caller drops its own `done_tx` afterwards.
pub fn spawn_compute_workers<T: UpdateTransaction + 'static>(
    decoded_rx: Receiver<LoadAtom>,
    done_tx: &Sender<CompletedAtom>,
    stage: &ComputeStage<T>,
    num_workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..num_workers.max(1))
        .map(|_| {
            let decoded_rx = decoded_rx.clone();
            let done_tx = done_tx.clone();
            let stage = stage.clone();
            thread::spawn(move || compute_worker_loop(decoded_rx, done_tx, stage))
        })
        .collect()
}
