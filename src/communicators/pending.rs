//! Handles on operations completing on another thread.
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CosimError;

type Slot<T> = Arc<(Mutex<Option<Result<T, CosimError>>>, Condvar)>;

/// A handle on an operation that completes asynchronously, e.g., a Peer advance or a remote send.
/// Clones observe the same operation.
pub struct Pending<T> {
    slot: Slot<T>,
    what: String,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Pending {
            slot: Arc::clone(&self.slot),
            what: self.what.clone(),
        }
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let resolved = self.slot.0.lock().is_some();
        f.debug_struct("Pending")
            .field("what", &self.what)
            .field("resolved", &resolved)
            .finish()
    }
}

/// The completing side of a [`Pending`] handle.
/// Dropping it before completion resolves the handle with a [`CosimError::Disconnected`] error.
pub struct Completer<T> {
    slot: Slot<T>,
    what: String,
    completed: bool,
}

impl<T> Pending<T> {
    /// Create a pending handle and its completer.
    pub fn channel(what: &str) -> (Completer<T>, Pending<T>) {
        let slot: Slot<T> = Arc::new((Mutex::new(None), Condvar::new()));
        (
            Completer {
                slot: Arc::clone(&slot),
                what: what.to_string(),
                completed: false,
            },
            Pending {
                slot,
                what: what.to_string(),
            },
        )
    }

    /// Create an already resolved handle.
    pub fn resolved(what: &str, result: Result<T, CosimError>) -> Self {
        Pending {
            slot: Arc::new((Mutex::new(Some(result)), Condvar::new())),
            what: what.to_string(),
        }
    }

    /// Returns true if the operation completed, successfully or not.
    pub fn poll(&self) -> bool {
        self.slot.0.lock().is_some()
    }

    /// Returns a description of the pending operation.
    pub fn what(&self) -> &str {
        &self.what
    }
}

impl<T: Clone> Pending<T> {
    /// Wait for the operation to complete and return its result.
    /// Waits forever if `timeout` is `None`; the handle stays usable after a timeout.
    pub fn join(&self, timeout: Option<Duration>) -> Result<T, CosimError> {
        let (lock, cvar) = &*self.slot;
        let mut result = lock.lock();
        match timeout {
            None => {
                while result.is_none() {
                    cvar.wait(&mut result);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while result.is_none() {
                    if cvar.wait_until(&mut result, deadline).timed_out() && result.is_none() {
                        return Err(CosimError::SynchronizationTimeout {
                            what: self.what.clone(),
                            waited: timeout,
                        });
                    }
                }
            }
        }
        match result.as_ref() {
            Some(result) => result.clone(),
            None => Err(CosimError::InvalidOperation(format!(
                "{} resolved without a result",
                self.what
            ))),
        }
    }
}

impl<T> Completer<T> {
    /// Resolve the pending handle. Only the first completion is kept.
    pub fn complete(mut self, result: Result<T, CosimError>) {
        self.resolve(result);
    }

    fn resolve(&mut self, result: Result<T, CosimError>) {
        if self.completed {
            return;
        }
        self.completed = true;
        let (lock, cvar) = &*self.slot;
        let mut slot = lock.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
        cvar.notify_all();
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if !self.completed {
            let what = self.what.clone();
            self.resolve(Err(CosimError::Disconnected(format!(
                "{} dropped before completion",
                what
            ))));
        }
    }
}
