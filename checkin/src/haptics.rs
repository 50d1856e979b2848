//! Haptics port.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Vibration feedback
///
/// Fire-and-forget: implementations must not block and have nothing to
/// report back.
pub trait Haptics: Send + Sync {
    /// A single short impact, played when a scan is accepted
    fn impact(&self);
}

/// Haptics for hosts without a vibration motor; logs the impulse instead
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn impact(&self) {
        tracing::debug!("Haptic impact");
    }
}

/// Counts impacts, for tests
#[derive(Clone, Debug, Default)]
pub struct CountingHaptics {
    impacts: Arc<AtomicUsize>,
}

impl CountingHaptics {
    /// Starts at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Impacts played so far
    #[must_use]
    pub fn impacts(&self) -> usize {
        self.impacts.load(Ordering::SeqCst)
    }
}

impl Haptics for CountingHaptics {
    fn impact(&self) {
        self.impacts.fetch_add(1, Ordering::SeqCst);
    }
}
