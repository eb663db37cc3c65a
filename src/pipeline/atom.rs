//! Work units: atoms of one or more file records plus their decode handles.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::FileRecord;
use crate::engine::decode::{MetadataMap, Probe};

/// Counts decode handles that are currently open. Shared by every handle of a run.
#[derive(Clone, Debug, Default)]
pub struct HandleLedger(Arc<AtomicUsize>);

impl HandleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

/// Decoder resources for one file. Released on drop, so every exit path of the compute stage
/// (including unwinding) gives them back.
#[derive(Debug)]
pub struct DecodeHandle {
    probe: Probe,
    metadata: Option<MetadataMap>,
    ledger: HandleLedger,
}

impl DecodeHandle {
    pub fn open(ledger: &HandleLedger, probe: Probe, metadata: Option<MetadataMap>) -> Self {
        ledger.0.fetch_add(1, Ordering::AcqRel);
        Self {
            probe,
            metadata,
            ledger: ledger.clone(),
        }
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn metadata(&self) -> Option<&MetadataMap> {
        self.metadata.as_ref()
    }
}

impl Drop for DecodeHandle {
    fn drop(&mut self) {
        self.ledger.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// One file of an atom.
#[derive(Debug)]
pub struct AtomSlot {
    pub record: FileRecord,
    /// Attached by the decode stage, taken and dropped by the compute stage.
    pub handle: Option<DecodeHandle>,
}

/// Minimal unit of work. Holds at least one record; `offset` is the position of its first
/// record in the ordered file sequence.
#[derive(Debug)]
pub struct LoadAtom {
    pub offset: usize,
    pub slots: Vec<AtomSlot>,
}

impl LoadAtom {
    pub fn new(offset: usize, records: Vec<FileRecord>) -> Self {
        debug_assert!(!records.is_empty(), "atom at offset {} has no records", offset);
        Self {
            offset,
            slots: records
                .into_iter()
                .map(|record| AtomSlot {
                    record,
                    handle: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every attached decode handle.
    pub fn release_handles(&mut self) {
        for slot in &mut self.slots {
            slot.handle = None;
        }
    }

    /// Dispose the atom, handing its records back. Handles are released first.
    pub fn into_records(mut self) -> (usize, Vec<FileRecord>) {
        self.release_handles();
        let records = self.slots.into_iter().map(|s| s.record).collect();
        (self.offset, records)
    }
}
