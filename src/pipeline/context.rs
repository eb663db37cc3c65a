//! Pipeline context and tuning: pool sizes, batching, throttles, cancellation and run state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use crate::utils::config::{PipelineConsts, WorkerThreadLimits};
use crate::utils::fd_limit::cap_io_workers;

/// Pool sizes, batch ceiling, atom size and throttle intervals for one run.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    /// Decode (I/O) workers.
    pub io_workers: usize,
    /// Classify (compute) workers.
    pub compute_workers: usize,
    /// Ceiling of the persistence batch; a flush is issued when it is reached.
    pub batch_size: usize,
    /// Files per atom.
    pub atom_size: usize,
    /// Capacity of the atom and decoded-atom channels.
    pub channel_cap: usize,
    pub status_interval: Duration,
    pub preview_interval: Duration,
    /// Minimum gap between a compute worker's hand-offs of changed records to the sink.
    pub flush_interval: Duration,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        let limits = WorkerThreadLimits::current();
        Self::new(limits.io_default, limits.compute_threads())
    }
}

impl PipelineTuning {
    /// Tuning with the given pool sizes (decode pool capped by the FD limit) and default batching.
    pub fn new(io_workers: usize, compute_workers: usize) -> Self {
        let io_workers = cap_io_workers(io_workers);
        let compute_workers = compute_workers.max(1);
        Self {
            io_workers,
            compute_workers,
            batch_size: PipelineConsts::DEFAULT_BATCH_SIZE,
            atom_size: PipelineConsts::DEFAULT_ATOM_SIZE,
            channel_cap: (io_workers.max(compute_workers)
                * PipelineConsts::ATOMS_IN_FLIGHT_PER_WORKER)
                .max(1),
            status_interval: PipelineConsts::STATUS_INTERVAL,
            preview_interval: PipelineConsts::PREVIEW_INTERVAL,
            flush_interval: PipelineConsts::FLUSH_INTERVAL,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_atom_size(mut self, atom_size: usize) -> Self {
        self.atom_size = atom_size.max(1);
        self
    }

    pub fn with_channel_cap(mut self, channel_cap: usize) -> Self {
        self.channel_cap = channel_cap.max(1);
        self
    }

    pub fn with_intervals(mut self, status: Duration, preview: Duration, flush: Duration) -> Self {
        self.status_interval = status;
        self.preview_interval = preview;
        self.flush_interval = flush;
        self
    }
}

/// Cooperative stop signal. Cheap to clone; observed at atom boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Lifecycle of one job run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Cancelled = 3,
    Failed = 4,
}

impl RunState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Cancelled,
            4 => RunState::Failed,
            _ => RunState::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

/// Shared, lock-free view of a run's [`RunState`].
#[derive(Clone, Debug)]
pub struct SharedRunState(Arc<AtomicU8>);

impl Default for SharedRunState {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(RunState::Idle as u8)))
    }
}

impl SharedRunState {
    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: RunState) {
        self.0.store(state as u8, Ordering::Release);
    }
}
