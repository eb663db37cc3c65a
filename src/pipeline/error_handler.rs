use anyhow::Error;
use std::sync::{Arc, Mutex};

use super::context::CancelToken;

/// First fatal error of a run, shared by every stage.
///
/// Recording an error also cancels the run so the partitioner stops dispatching.
#[derive(Clone, Default)]
pub struct FirstError {
    slot: Arc<Mutex<Option<Error>>>,
    cancel: CancelToken,
}

impl FirstError {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            slot: Arc::default(),
            cancel,
        }
    }

    /// Keep `err` if no error was recorded yet. Later errors are logged and dropped.
    pub fn record(&self, err: Error) {
        self.cancel.cancel();
        match self.slot.lock() {
            Ok(mut slot) if slot.is_none() => {
                log::error!("pipeline failed: {:#}", err);
                *slot = Some(err);
            }
            Ok(_) => log::debug!("further pipeline error: {:#}", err),
            Err(_) => log::error!("error slot poisoned; dropping: {:#}", err),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(true)
    }

    pub fn take(&self) -> Option<Error> {
        self.slot.lock().ok().and_then(|mut s| s.take())
    }
}
