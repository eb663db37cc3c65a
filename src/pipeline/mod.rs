//! Job pipeline: partitioner, decode pool, compute pool, batched sink, reporter.

pub mod atom;
pub mod compute;
pub mod context;
pub mod decode;
pub mod error_handler;
pub mod orchestrator;
pub mod partition;
pub mod sink;

pub use atom::{AtomSlot, DecodeHandle, HandleLedger, LoadAtom};
pub use compute::{CompletedAtom, ComputeStage, spawn_compute_workers};
pub use context::{CancelToken, PipelineTuning, RunState, SharedRunState};
pub use decode::{DecodeStage, spawn_decode_workers};
pub use error_handler::FirstError;
pub use orchestrator::{Pipeline, RunHandle, RunOutcome};
pub use partition::{Atoms, PartitionSummary, sort_for_partition, spawn_partitioner};
pub use sink::{BatchedSink, SinkStats, UpdateTransaction};
