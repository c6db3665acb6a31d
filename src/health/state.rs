//! Readiness state.
//!
//! # States
//! ```text
//! not ready ──(dependencies initialized)──▶ ready ──(shutdown begins)──▶ not ready
//! ```
//!
//! The flag lives behind a single exclusive lock. Readers (the readiness
//! probe) and writers (startup, shutdown) serialize through it, and the lock
//! is held only for the boolean access, never across I/O.

use std::sync::{Mutex, PoisonError};

/// Shared readiness flag, `false` until startup completes.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    ready: Mutex<bool>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag, logging when it actually changes.
    pub fn set_ready(&self, ready: bool) {
        let previous = {
            let mut guard = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, ready)
        };

        if previous != ready {
            tracing::info!(ready, "Readiness changed");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_unready() {
        assert!(!ReadinessGate::new().is_ready());
    }

    #[test]
    fn follows_lifecycle() {
        let gate = ReadinessGate::new();
        gate.set_ready(true);
        assert!(gate.is_ready());
        gate.set_ready(true);
        assert!(gate.is_ready());
        gate.set_ready(false);
        assert!(!gate.is_ready());
    }

    #[test]
    fn concurrent_readers_see_a_consistent_value() {
        let gate = Arc::new(ReadinessGate::new());
        gate.set_ready(true);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || (0..1_000).all(|_| gate.is_ready()))
            })
            .collect();

        for reader in readers {
            assert!(reader.join().unwrap());
        }
    }
}
