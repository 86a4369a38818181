//! Counting admission gate for the camera stream.
//!
//! The gate hands out at most `capacity` [`Permit`]s at a time. A permit is
//! returned to the pool when it is dropped, so a dispatch that fails still
//! gives its token back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Number of frames allowed in dispatch at once unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// A gate without tokens could never admit a frame.
    ZeroCapacity,
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::ZeroCapacity => write!(f, "admission capacity must be at least 1"),
        }
    }
}

impl std::error::Error for GateError {}

/// Point-in-time view of the gate's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub capacity: usize,
    pub checked_out: usize,
    pub inflight: usize,
    pub admitted_total: u64,
}

struct State {
    checked_out: usize,
    // Wraps back to zero when it reaches capacity. Telemetry only.
    inflight: usize,
    admitted_total: u64,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    released: Condvar,
}

/// Shared handle to a single admission gate. Clones refer to the same pool.
#[derive(Clone)]
pub struct AdmissionGate {
    shared: Arc<Shared>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Result<Self, GateError> {
        if capacity == 0 {
            return Err(GateError::ZeroCapacity);
        }
        Ok(Self {
            shared: Arc::new(Shared {
                capacity,
                state: Mutex::new(State {
                    checked_out: 0,
                    inflight: 0,
                    admitted_total: 0,
                }),
                released: Condvar::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until a token is free. Waiters are not served in FIFO order.
    pub fn acquire(&self) -> Permit {
        let mut state = self.lock();
        while state.checked_out >= self.shared.capacity {
            state = self
                .shared
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        self.check_out(&mut state)
    }

    pub fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.lock();
        if state.checked_out >= self.shared.capacity {
            return None;
        }
        Some(self.check_out(&mut state))
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Permit> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.checked_out >= self.shared.capacity {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .shared
                .released
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        Some(self.check_out(&mut state))
    }

    fn check_out(&self, state: &mut State) -> Permit {
        state.checked_out += 1;
        state.admitted_total += 1;
        state.inflight += 1;
        if state.inflight >= self.shared.capacity {
            state.inflight = 0;
        }
        trace!(
            checked_out = state.checked_out,
            inflight = state.inflight,
            "admission token checked out"
        );
        Permit { gate: self.clone() }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.checked_out = state.checked_out.saturating_sub(1);
        trace!(checked_out = state.checked_out, "admission token released");
        drop(state);
        self.shared.released.notify_one();
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn checked_out(&self) -> usize {
        self.lock().checked_out
    }

    pub fn available(&self) -> usize {
        self.shared.capacity - self.checked_out()
    }

    pub fn inflight(&self) -> usize {
        self.lock().inflight
    }

    pub fn stats(&self) -> GateStats {
        let state = self.lock();
        GateStats {
            capacity: self.shared.capacity,
            checked_out: state.checked_out,
            inflight: state.inflight,
            admitted_total: state.admitted_total,
        }
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("stats", &self.stats())
            .finish()
    }
}

/// One checked-out admission token. Released on drop.
pub struct Permit {
    gate: AdmissionGate,
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("capacity", &self.gate.capacity())
            .finish()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(AdmissionGate::new(0).unwrap_err(), GateError::ZeroCapacity);
    }

    #[test]
    fn try_acquire_stops_at_capacity() {
        let gate = AdmissionGate::new(2).unwrap();
        let a = gate.try_acquire().unwrap();
        let _b = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.available(), 0);
        drop(a);
        assert_eq!(gate.available(), 1);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn inflight_counter_wraps_without_releasing() {
        let gate = AdmissionGate::new(2).unwrap();
        let first = gate.acquire();
        assert_eq!(gate.inflight(), 1);
        let second = gate.acquire();
        assert_eq!(gate.inflight(), 0);
        assert_eq!(gate.checked_out(), 2);
        drop((first, second));
        assert_eq!(gate.stats().admitted_total, 2);
    }

    #[test]
    fn acquire_timeout_gives_up_when_full() {
        let gate = AdmissionGate::new(1).unwrap();
        let _held = gate.acquire();
        assert!(gate.acquire_timeout(Duration::from_millis(20)).is_none());
        assert_eq!(gate.checked_out(), 1);
    }

    #[test]
    fn blocked_acquire_resumes_after_release() {
        let gate = AdmissionGate::new(1).unwrap();
        let held = gate.acquire();
        let (tx, rx) = mpsc::channel();
        let waiter = gate.clone();
        let handle = thread::spawn(move || {
            let permit = waiter.acquire();
            tx.send(()).unwrap();
            drop(permit);
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert_eq!(gate.available(), 1);
    }
}
