//! Time-bounded calls into external collaborators.
//!
//! A call that overruns its timeout keeps running on its helper thread and
//! its result is discarded. Each [`CallGuard`] caps how many helper threads
//! may be alive at once, so a hung collaborator cannot accumulate threads:
//! once the cap is reached, calls fail fast with [`CallError::Saturated`]
//! until a stuck call returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Helper threads one collaborator may hold when none is configured.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("collaborator call timed out after {0:?}")]
    TimedOut(Duration),

    #[error("collaborator call panicked")]
    Panicked,

    #[error("collaborator saturated: {0} calls still in flight")]
    Saturated(usize),

    #[error("could not start collaborator call: {0}")]
    Spawn(String),
}

/// Releases its helper-thread slot when dropped, including on panic.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Timeout plus an in-flight cap for one external collaborator.
#[derive(Debug, Clone)]
pub struct CallGuard {
    name: &'static str,
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

impl CallGuard {
    pub fn new(name: &'static str, timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            name,
            timeout,
            max_in_flight: max_in_flight.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Helper threads currently alive, finished or not.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run `f` on a helper thread and wait at most the timeout for its result.
    /// No store lock is ever held across this call.
    pub fn call<T, F>(&self, f: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let max = self.max_in_flight;
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .map_err(|_| CallError::Saturated(max))?;
        let slot = Slot(Arc::clone(&self.in_flight));

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("lyceum-{}", self.name))
            .spawn(move || {
                let _slot = slot;
                let _ = tx.send(f());
            })
            .map_err(|e| CallError::Spawn(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(value) => Ok(value),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CallError::TimedOut(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CallError::Panicked),
        }
    }
}
