//! Test doubles for exercising the tracing core deterministically.
//!
//! Available to downstream crates through the `testing` feature.

use crate::sampler::RandomSource;
use crate::transaction::{Hub, TransactionEvent};
use std::sync::{Arc, Mutex, PoisonError};

/// A [`Hub`] that stores captured events in memory.
///
/// Clones share the same storage, so a clone can be handed to a transaction
/// while the test keeps another for assertions.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHub {
    events: Arc<Mutex<Vec<TransactionEvent>>>,
}

impl InMemoryHub {
    /// Create a new hub with empty storage.
    pub fn new() -> Self {
        Default::default()
    }

    /// Copy of every event captured so far, in capture order.
    pub fn captured_events(&self) -> Vec<TransactionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear the captured events.
    pub fn reset(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Hub for InMemoryHub {
    fn capture_event(&self, event: TransactionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// A [`RandomSource`] that always returns the same draw.
#[derive(Clone, Copy, Debug)]
pub struct FixedRandom(
    /// The draw returned by every call.
    pub f64,
);

impl RandomSource for FixedRandom {
    fn uniform(&self) -> f64 {
        self.0
    }
}
