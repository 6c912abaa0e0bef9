//! Single-flight actuation gate
//!
//! The busy flag and the last triggered class live under one mutex so the
//! arbiter's check-and-set is atomic. Busy is released by dropping the
//! `ActuationPermit`, which also runs during unwinding.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct GateState {
    pub(crate) busy: bool,
    pub(crate) last_triggered: Option<usize>,
}

/// Shared busy flag plus debounce memory
#[derive(Debug, Clone, Default)]
pub struct ActuationGate {
    state: Arc<Mutex<GateState>>,
}

impl ActuationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a sequence is in flight
    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Class index of the last accepted trigger, if any
    pub fn last_triggered(&self) -> Option<usize> {
        self.lock().last_triggered
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark busy under an already held lock and hand out the permit
    pub(crate) fn acquire(&self, state: &mut GateState) -> ActuationPermit {
        state.busy = true;
        ActuationPermit {
            state: self.state.clone(),
        }
    }
}

/// Proof of exclusive access to the actuator
///
/// Dropping it clears the busy flag.
#[derive(Debug)]
#[must_use = "dropping the permit releases the actuator immediately"]
pub struct ActuationPermit {
    state: Arc<Mutex<GateState>>,
}

impl Drop for ActuationPermit {
    fn drop(&mut self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.busy = false;
        debug!("actuation permit released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permit_drop_releases_busy() {
        let gate = ActuationGate::new();
        let permit = {
            let mut state = gate.lock();
            gate.acquire(&mut state)
        };
        assert!(gate.is_busy());
        drop(permit);
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_permit_released_on_panic() {
        let gate = ActuationGate::new();
        let permit = {
            let mut state = gate.lock();
            gate.acquire(&mut state)
        };

        let result = std::thread::spawn(move || {
            let _permit = permit;
            panic!("sequence blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!gate.is_busy());
    }
}
