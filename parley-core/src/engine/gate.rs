//! Speaking gate — suppresses capture while the assistant's voice plays.
//!
//! The reference design used a single shared boolean toggled around playback
//! and an instantaneous queue-emptiness check, which can flap back to
//! listening between two fragments of the same reply. This gate instead
//! counts in-flight fragments: incremented when a fragment is enqueued for
//! synthesis, decremented when its playback completes. Muted ⇔ count > 0,
//! so the gate opens exactly once, when the last fragment has been spoken.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Atomic in-flight fragment counter.
///
/// Two states: **Idle** (count 0, capture active) and **Speaking**
/// (count > 0, capture suppressed).
#[derive(Debug, Default)]
pub struct SpeakingGate {
    in_flight: AtomicUsize,
}

impl SpeakingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment entering the synthesis queue.
    ///
    /// Returns `true` if this transitioned the gate from Idle to Speaking.
    pub fn begin_fragment(&self) -> bool {
        self.in_flight.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Register a fragment whose playback (or failed synthesis) finished.
    ///
    /// Returns `true` if this transitioned the gate from Speaking to Idle.
    pub fn finish_fragment(&self) -> bool {
        let prev = self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "finish_fragment without matching begin_fragment");
        prev == 1
    }

    /// Whether capture should currently be suppressed.
    pub fn is_muted(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    /// Current number of fragments awaiting or undergoing playback.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}
