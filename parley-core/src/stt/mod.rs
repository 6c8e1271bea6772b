//! Speech-to-text abstraction.
//!
//! The `SpeechToText` trait decouples the transcriber from any specific
//! backend (stub echo, OpenAI-compatible transcription endpoint, etc.).
//!
//! `&mut self` on `transcribe` intentionally expresses that backends may be
//! stateful (connection pools, rolling language detection). All mutation is
//! serialised through `SttHandle`'s `parking_lot::Mutex`.

pub mod cloud;
pub mod stub;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::batch::FrameBatch;
use crate::error::Result;

/// Per-segment metadata from one transcription pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionSegment {
    /// Recognised text for this segment.
    pub text: String,
    /// Probability that the segment contains no speech, in [0.0, 1.0].
    pub no_speech_prob: f32,
}

/// Result of one speech-to-text pass over the rolling buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    /// Full recognised text.
    pub text: String,
    /// Per-segment metadata, in order. Empty when nothing was recognised.
    pub segments: Vec<TranscriptionSegment>,
}

impl Transcription {
    /// A pass that recognised nothing.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Contract for speech recognition backends.
pub trait SpeechToText: Send + 'static {
    /// One-time warm-up: validate credentials, prime connections. Called
    /// once at engine startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transcribe a mono f32 waveform.
    ///
    /// `language` is a hint (e.g. `"english"`); backends may ignore it.
    ///
    /// # Returns
    /// A `Transcription`; `segments` may be empty if no speech was detected.
    fn transcribe(&mut self, waveform: &FrameBatch, language: &str) -> Result<Transcription>;
}

/// Thread-safe reference-counted handle to any `SpeechToText` implementor.
#[derive(Clone)]
pub struct SttHandle(pub Arc<Mutex<dyn SpeechToText>>);

impl SttHandle {
    /// Wrap any `SpeechToText` in an `SttHandle`.
    pub fn new<S: SpeechToText>(backend: S) -> Self {
        Self(Arc::new(Mutex::new(backend)))
    }
}

impl std::fmt::Debug for SttHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SttHandle").finish_non_exhaustive()
    }
}
