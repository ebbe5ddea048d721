//! Shared pipeline store.
//!
//! Holds at most one data handle and at most one result set. The two slots are locked
//! independently; every read clones out and every write replaces the whole value, so
//! readers never observe a half-written slot. Last writer wins; readers validate.

use crate::model::{DataHandle, ResultSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct PipelineStore {
    data_handle: RwLock<Option<DataHandle>>,
    results: RwLock<Option<Arc<ResultSet>>>,
}

// A writer that panicked can only have left a complete value behind, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl PipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_handle(&self) -> Option<DataHandle> {
        read(&self.data_handle).clone()
    }

    /// Replace the handle slot, returning whatever it held before.
    pub fn publish_data_handle(&self, handle: DataHandle) -> Option<DataHandle> {
        info!(path = %handle.path.display(), name = %handle.display_name, "dataset handle published");
        write(&self.data_handle).replace(handle)
    }

    pub fn clear_data_handle(&self) -> Option<DataHandle> {
        let previous = write(&self.data_handle).take();
        if previous.is_some() {
            debug!("dataset handle cleared");
        }
        previous
    }

    /// Clear the handle slot only if it still holds `stale`. A newer handle published in
    /// the meantime is left alone.
    pub fn retract_data_handle(&self, stale: &DataHandle) -> bool {
        let mut slot = write(&self.data_handle);
        if slot.as_ref() == Some(stale) {
            *slot = None;
            debug!(path = %stale.path.display(), "stale dataset handle retracted");
            true
        } else {
            false
        }
    }

    pub fn results(&self) -> Option<Arc<ResultSet>> {
        read(&self.results).clone()
    }

    pub fn publish_results(&self, set: ResultSet) {
        info!(count = set.results.len(), "execution results published");
        *write(&self.results) = Some(Arc::new(set));
    }

    pub fn clear_results(&self) -> Option<Arc<ResultSet>> {
        let previous = write(&self.results).take();
        if previous.is_some() {
            debug!("execution results cleared");
        }
        previous
    }
}
