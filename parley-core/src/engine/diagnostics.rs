//! Shared counters for pipeline observability.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct EngineDiagnostics {
    pub batches_captured: AtomicUsize,
    pub batches_muted: AtomicUsize,
    pub stt_passes: AtomicUsize,
    pub stt_errors: AtomicUsize,
    pub discarded_trivial: AtomicUsize,
    pub discarded_no_speech: AtomicUsize,
    pub debounce_holds: AtomicUsize,
    pub utterances_emitted: AtomicUsize,
    pub chat_requests: AtomicUsize,
    pub chat_retries: AtomicUsize,
    pub chat_failures: AtomicUsize,
    pub fragments_emitted: AtomicUsize,
    pub synth_errors: AtomicUsize,
    pub fragments_played: AtomicUsize,
}

impl EngineDiagnostics {
    pub fn reset(&self) {
        self.batches_captured.store(0, Ordering::Relaxed);
        self.batches_muted.store(0, Ordering::Relaxed);
        self.stt_passes.store(0, Ordering::Relaxed);
        self.stt_errors.store(0, Ordering::Relaxed);
        self.discarded_trivial.store(0, Ordering::Relaxed);
        self.discarded_no_speech.store(0, Ordering::Relaxed);
        self.debounce_holds.store(0, Ordering::Relaxed);
        self.utterances_emitted.store(0, Ordering::Relaxed);
        self.chat_requests.store(0, Ordering::Relaxed);
        self.chat_retries.store(0, Ordering::Relaxed);
        self.chat_failures.store(0, Ordering::Relaxed);
        self.fragments_emitted.store(0, Ordering::Relaxed);
        self.synth_errors.store(0, Ordering::Relaxed);
        self.fragments_played.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            batches_captured: self.batches_captured.load(Ordering::Relaxed),
            batches_muted: self.batches_muted.load(Ordering::Relaxed),
            stt_passes: self.stt_passes.load(Ordering::Relaxed),
            stt_errors: self.stt_errors.load(Ordering::Relaxed),
            discarded_trivial: self.discarded_trivial.load(Ordering::Relaxed),
            discarded_no_speech: self.discarded_no_speech.load(Ordering::Relaxed),
            debounce_holds: self.debounce_holds.load(Ordering::Relaxed),
            utterances_emitted: self.utterances_emitted.load(Ordering::Relaxed),
            chat_requests: self.chat_requests.load(Ordering::Relaxed),
            chat_retries: self.chat_retries.load(Ordering::Relaxed),
            chat_failures: self.chat_failures.load(Ordering::Relaxed),
            fragments_emitted: self.fragments_emitted.load(Ordering::Relaxed),
            synth_errors: self.synth_errors.load(Ordering::Relaxed),
            fragments_played: self.fragments_played.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub batches_captured: usize,
    pub batches_muted: usize,
    pub stt_passes: usize,
    pub stt_errors: usize,
    pub discarded_trivial: usize,
    pub discarded_no_speech: usize,
    pub debounce_holds: usize,
    pub utterances_emitted: usize,
    pub chat_requests: usize,
    pub chat_retries: usize,
    pub chat_failures: usize,
    pub fragments_emitted: usize,
    pub synth_errors: usize,
    pub fragments_played: usize,
}
