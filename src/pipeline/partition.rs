//! Work partitioner: ordered records → atoms → bounded channel.

use crossbeam_channel::Sender;
use log::debug;
use std::thread::{self, JoinHandle};

use crate::FileRecord;

use super::atom::LoadAtom;
use super::context::CancelToken;

/// Order records by relative path, then by file name. Deterministic for equal inputs.
pub fn sort_for_partition(records: &mut [FileRecord]) {
    records.sort_by(|a, b| {
        a.relative_path
            .cmp(&b.relative_path)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
}

/// Splits an ordered record sequence into atoms of up to `atom_size` records with increasing
/// offsets. Every record lands in exactly one atom.
pub struct Atoms {
    records: std::vec::IntoIter<FileRecord>,
    atom_size: usize,
    offset: usize,
}

impl Atoms {
    pub fn new(records: Vec<FileRecord>, atom_size: usize) -> Self {
        Self {
            records: records.into_iter(),
            atom_size: atom_size.max(1),
            offset: 0,
        }
    }

    /// Records not yet handed out.
    pub fn into_remaining(self) -> Vec<FileRecord> {
        self.records.collect()
    }
}

impl Iterator for Atoms {
    type Item = LoadAtom;

    fn next(&mut self) -> Option<LoadAtom> {
        let records: Vec<FileRecord> = self.records.by_ref().take(self.atom_size).collect();
        if records.is_empty() {
            return None;
        }
        let atom = LoadAtom::new(self.offset, records);
        self.offset += atom.len();
        Some(atom)
    }
}

/// What the partitioner thread reports when it stops.
#[derive(Debug, Default)]
pub struct PartitionSummary {
    pub atoms: usize,
    pub files: usize,
    /// Records never dispatched because the run was cancelled, in order.
    pub undispatched: Vec<FileRecord>,
}

/// Feed atoms into `atom_tx` until the records run out or `cancel` is observed.
/// The token is polled before each atom, so a dispatched atom is always complete.
pub fn run_partitioner(
    atoms: Atoms,
    atom_tx: Sender<LoadAtom>,
    cancel: CancelToken,
) -> PartitionSummary {
    let mut atoms = atoms;
    let mut summary = PartitionSummary::default();
    loop {
        if cancel.is_cancelled() {
            debug!(
                "partitioner: cancelled after {} atoms ({} files)",
                summary.atoms, summary.files
            );
            break;
        }
        let Some(atom) = atoms.next() else {
            break;
        };
        let n = atom.len();
        if let Err(returned) = atom_tx.send(atom) {
            // Receivers gone (workers panicked): keep the records.
            let (_, records) = returned.into_inner().into_records();
            summary.undispatched.extend(records);
            break;
        }
        summary.atoms += 1;
        summary.files += n;
    }
    summary.undispatched.extend(atoms.into_remaining());
    drop(atom_tx);
    summary
}

pub fn spawn_partitioner(
    records: Vec<FileRecord>,
    atom_size: usize,
    atom_tx: Sender<LoadAtom>,
    cancel: CancelToken,
) -> JoinHandle<PartitionSummary> {
    thread::spawn(move || run_partitioner(Atoms::new(records, atom_size), atom_tx, cancel))
}
