use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use common::normalize_dir;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::LibraryError;
use crate::store::IndexStore;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PathRequest {
    pub add: bool,
    pub path: String,
}

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<VecDeque<PathRequest>>,
    wake: Condvar,
}

/// FIFO of add/remove requests. Its mutex is also the worker's sleep lock.
#[derive(Clone, Debug, Default)]
pub struct PathQueue {
    shared: Arc<Shared>,
}

impl PathQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: &str) -> bool {
        self.enqueue(true, path)
    }

    pub fn remove(&self, path: &str) -> bool {
        self.enqueue(false, path)
    }

    /// Normalizes and appends; blank paths are ignored.
    pub fn enqueue(&self, add: bool, path: &str) -> bool {
        let path = normalize_dir(path);
        if path.is_empty() {
            return false;
        }
        let mut pending = self.shared.pending.lock();
        pending.push_back(PathRequest { add, path });
        self.shared.wake.notify_all();
        true
    }

    pub fn len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.pending.lock().is_empty()
    }

    pub fn pending(&self) -> Vec<PathRequest> {
        self.shared.pending.lock().iter().cloned().collect()
    }

    /// Runs `update` under the queue lock, then wakes the worker.
    pub fn signal(&self, update: impl FnOnce()) {
        let _pending = self.shared.pending.lock();
        update();
        self.shared.wake.notify_all();
    }

    /// Sleeps until `ready` holds or the deadline passes. `None` waits forever.
    /// Returns whether `ready` held on return.
    pub fn wait(&self, deadline: Option<Instant>, ready: impl Fn() -> bool) -> bool {
        let mut pending = self.shared.pending.lock();
        loop {
            if ready() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if self.shared.wake.wait_until(&mut pending, deadline).timed_out() {
                        return ready();
                    }
                }
                None => self.shared.wake.wait(&mut pending),
            }
        }
    }

    /// Applies the requests queued when the call starts, oldest first. An entry
    /// is popped only after its store write succeeded, so on error the
    /// remaining suffix stays queued.
    pub fn apply(&self, store: &IndexStore) -> Result<usize, LibraryError> {
        let queued = self.len();
        let mut applied = 0;
        while applied < queued {
            let request = match self.shared.pending.lock().front().cloned() {
                Some(request) => request,
                None => break,
            };
            let changed = if request.add {
                store.add_path(&request.path)?
            } else {
                store.remove_path(&request.path)?
            };
            if changed {
                info!(
                    "{} library path {}",
                    if request.add { "added" } else { "removed" },
                    request.path
                );
            } else {
                debug!("path request for {} was a no-op", request.path);
            }
            self.shared.pending.lock().pop_front();
            applied += 1;
        }
        store.delete_orphan_folders()?;
        Ok(applied)
    }
}
