//! Decode (I/O) stage: attach a decode handle to every slot of an atom.

use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::decode::{DecodeNeeds, Decoder, Probe};
use crate::engine::tools::absolute_path;

use super::atom::{DecodeHandle, HandleLedger, LoadAtom};

/// Shared, read-only inputs of the decode workers.
#[derive(Clone)]
pub struct DecodeStage {
    pub root: PathBuf,
    pub decoder: Arc<dyn Decoder>,
    pub needs: DecodeNeeds,
    pub ledger: HandleLedger,
}

impl DecodeStage {
    /// Probe every file of `atom` and attach its handle.
    pub fn open_atom(&self, atom: &mut LoadAtom) {
        for slot in &mut atom.slots {
            let path = absolute_path(
                &self.root,
                &slot.record.relative_path,
                &slot.record.file_name,
            );
            let probe = self.decoder.probe(&path, self.needs);
            let metadata = match probe {
                Probe::Missing => None,
                _ if self.needs.metadata => self.decoder.metadata(&path),
                _ => None,
            };
            slot.handle = Some(DecodeHandle::open(&self.ledger, probe, metadata));
        }
    }
}

fn decode_worker_loop(atom_rx: Receiver<LoadAtom>, decoded_tx: Sender<LoadAtom>, stage: DecodeStage) {
    while let Ok(mut atom) = atom_rx.recv() {
        stage.open_atom(&mut atom);
        if let Err(returned) = decoded_tx.send(atom) {
            // Compute pool is gone, which only happens when every compute worker panicked; the
            // run then ends in `Err` and no outcome is built, so the atom's records are not needed.
            // Drop the handles and keep draining so the partitioner never blocks.
            let atom = returned.into_inner();
            log::warn!(
                "decode: compute stage closed, dropping atom at offset {}",
                atom.offset
            );
        }
    }
}

/// Spawn `num_workers` decode workers reading `atom_rx` and forwarding to `decoded_tx`.
/// The caller drops its own `decoded_tx` afterwards so the compute pool sees the channel close.
pub fn spawn_decode_workers(
    atom_rx: Receiver<LoadAtom>,
    decoded_tx: &Sender<LoadAtom>,
    stage: &DecodeStage,
    num_workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..num_workers.max(1))
        .map(|_| {
            let atom_rx = atom_rx.clone();
            let decoded_tx = decoded_tx.clone();
            let stage = stage.clone();
            thread::spawn(move || decode_worker_loop(atom_rx, decoded_tx, stage))
        })
        .collect()
}
