use anyhow::{Result, anyhow, bail};
use crossbeam_channel::bounded;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::FileRecord;
use crate::engine::decode::Decoder;
use crate::engine::progress::{NullObserver, ProgressObserver, ProgressSnapshot, spawn_reporter};
use crate::jobs::Classifier;

use super::atom::HandleLedger;
use super::compute::{CompletedAtom, ComputeStage, spawn_compute_workers};
use super::context::{CancelToken, PipelineTuning, RunState, SharedRunState};
use super::decode::{DecodeStage, spawn_decode_workers};
use super::error_handler::FirstError;
use super::partition::{sort_for_partition, spawn_partitioner};
use super::sink::{BatchedSink, UpdateTransaction};

/// What a finished (completed or cancelled) run hands back.
pub struct RunOutcome<T> {
    pub state: RunState,
    /// Files that went through the compute stage.
    pub processed: usize,
    /// Processed files with at least one changed column.
    pub changed: usize,
    /// Successful persistence flushes.
    pub flushes: usize,
    /// Outcome label → count over processed files.
    pub tally: BTreeMap<String, usize>,
    /// Every input record, in partition order. Undispatched records follow the processed prefix.
    pub records: Vec<FileRecord>,
    pub final_status: ProgressSnapshot,
    pub publishes: u64,
    /// Decode handles still open when the run ended. Zero unless something leaked.
    pub open_handles: usize,
    pub transaction: T,
}

/// Handle to a run started with [`Pipeline::spawn`].
pub struct RunHandle<T> {
    join: JoinHandle<Result<RunOutcome<T>>>,
    cancel: CancelToken,
    state: SharedRunState,
    ledger: HandleLedger,
}

impl<T> RunHandle<T> {
    /// Request cancellation. Atoms already dispatched still finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }

    pub fn handle_ledger(&self) -> HandleLedger {
        self.ledger.clone()
    }

    /// Wait for the run. A persistence failure (state `Failed`) comes back as `Err`.
    pub fn join(self) -> Result<RunOutcome<T>> {
        let result = self
            .join
            .join()
            .map_err(|_| anyhow!("pipeline coordinator thread panicked"));
        if result.is_err() {
            self.state.set(RunState::Failed);
        }
        result?
    }
}

/// One job over one image set: partition → decode pool → compute pool → batched sink.
pub struct Pipeline<T> {
    root: PathBuf,
    classifier: Arc<dyn Classifier>,
    decoder: Arc<dyn Decoder>,
    transaction: T,
    tuning: PipelineTuning,
    observer: Box<dyn ProgressObserver>,
    cancel: CancelToken,
    state: SharedRunState,
    ledger: HandleLedger,
}

impl<T: UpdateTransaction + 'static> Pipeline<T> {
    pub fn new(
        root: &Path,
        classifier: Arc<dyn Classifier>,
        decoder: Arc<dyn Decoder>,
        transaction: T,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            classifier,
            decoder,
            transaction,
            tuning: PipelineTuning::default(),
            observer: Box::new(NullObserver),
            cancel: CancelToken::new(),
            state: SharedRunState::default(),
            ledger: HandleLedger::new(),
        }
    }

    pub fn with_tuning(mut self, tuning: PipelineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use an externally owned token (e.g. wired to Ctrl-C).
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SharedRunState {
        self.state.clone()
    }

    pub fn handle_ledger(&self) -> HandleLedger {
        self.ledger.clone()
    }

    /// Start the run on a coordinator thread.
    pub fn spawn(self, records: Vec<FileRecord>) -> RunHandle<T> {
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        let ledger = self.ledger.clone();
        let join = thread::spawn(move || self.run(records));
        RunHandle {
            join,
            cancel,
            state,
            ledger,
        }
    }

    /// Run to completion on the calling thread.
    pub fn run(self, mut records: Vec<FileRecord>) -> Result<RunOutcome<T>> {
        let Pipeline {
            root,
            classifier,
            decoder,
            transaction,
            tuning,
            observer,
            cancel,
            state,
            ledger,
        } = self;

        let columns = classifier.columns();
        if let Some(missing) = columns
            .iter()
            .find(|c| !transaction.columns().contains(c))
        {
            state.set(RunState::Failed);
            bail!(
                "transaction does not cover column '{}' written by job '{}'",
                missing,
                classifier.name()
            );
        }

        sort_for_partition(&mut records);
        let total = records.len();
        state.set(RunState::Running);
        info!(
            "{}: {} files, {} decode / {} compute workers, atom {} batch {}",
            classifier.name(),
            total,
            tuning.io_workers,
            tuning.compute_workers,
            tuning.atom_size,
            tuning.batch_size
        );

        let first_error = FirstError::new(cancel.clone());
        let sink = Arc::new(BatchedSink::new(
            transaction,
            tuning.batch_size,
            tuning.flush_interval,
        ));
        let (progress, reporter) = spawn_reporter(
            classifier.name(),
            total,
            observer,
            tuning.status_interval,
            tuning.preview_interval,
        );

        let (atom_tx, atom_rx) = bounded(tuning.channel_cap);
        let (decoded_tx, decoded_rx) = bounded(tuning.channel_cap);
        let (done_tx, done_rx) = bounded::<CompletedAtom>(tuning.channel_cap);

        let partitioner = spawn_partitioner(records, tuning.atom_size, atom_tx, cancel.clone());

        let decode_stage = DecodeStage {
            root,
            decoder,
            needs: classifier.needs(),
            ledger: ledger.clone(),
        };
        let decode_workers =
            spawn_decode_workers(atom_rx, &decoded_tx, &decode_stage, tuning.io_workers);
        drop(decoded_tx);

        let compute_stage = ComputeStage {
            classifier: Arc::clone(&classifier),
            sink: Arc::clone(&sink),
            progress,
            columns,
            flush_interval: tuning.flush_interval,
            first_error: first_error.clone(),
        };
        let compute_workers = spawn_compute_workers(
            decoded_rx,
            &done_tx,
            &compute_stage,
            tuning.compute_workers,
        );
        // Only the workers may keep the reporter and done channel alive.
        drop(compute_stage);
        drop(done_tx);

        let mut slots: Vec<Option<FileRecord>> = (0..total).map(|_| None).collect();
        let mut tally: BTreeMap<String, usize> = BTreeMap::new();
        let (mut processed, mut changed) = (0_usize, 0_usize);
        while let Ok(done) = done_rx.recv() {
            for (i, (record, label)) in done.records.into_iter().zip(done.labels).enumerate() {
                processed += 1;
                if record.has_changes {
                    changed += 1;
                }
                *tally.entry(label).or_default() += 1;
                if let Some(slot) = slots.get_mut(done.offset + i) {
                    *slot = Some(record);
                }
            }
        }
        debug!("main: done channel closed, {} files processed", processed);

        let partition = partitioner
            .join()
            .map_err(|_| anyhow!("partitioner thread panicked"));
        let mut panicked = partition.is_err();
        for h in decode_workers {
            panicked |= h.join().is_err();
        }
        for h in compute_workers {
            panicked |= h.join().is_err();
        }

        if !first_error.is_set()
            && let Err(e) = sink.finish()
        {
            first_error.record(e);
        }
        let summary = reporter
            .join()
            .map_err(|_| anyhow!("progress reporter thread panicked"))?;

        if panicked {
            state.set(RunState::Failed);
            bail!("pipeline worker thread panicked");
        }
        if let Some(e) = first_error.take() {
            state.set(RunState::Failed);
            return Err(e);
        }

        let partition = partition?;
        let dispatched = partition.files;
        for (i, record) in partition.undispatched.into_iter().enumerate() {
            if let Some(slot) = slots.get_mut(dispatched + i) {
                *slot = Some(record);
            }
        }
        let records: Vec<FileRecord> = slots.into_iter().flatten().collect();
        debug_assert_eq!(records.len(), total, "records lost during the run");

        let stats = sink.stats();
        let transaction = Arc::into_inner(sink)
            .ok_or_else(|| anyhow!("sink still shared after workers joined"))?
            .into_inner()?;

        let final_state = if dispatched < total {
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        state.set(final_state);
        info!(
            "{}: {:?}, {}/{} processed, {} changed, {} flushes",
            classifier.name(),
            final_state,
            processed,
            total,
            changed,
            stats.flushes
        );

        Ok(RunOutcome {
            state: final_state,
            processed,
            changed,
            flushes: stats.flushes,
            tally,
            records,
            final_status: summary.final_status,
            publishes: summary.publishes,
            open_handles: ledger.open_count(),
            transaction,
        })
    }
}
