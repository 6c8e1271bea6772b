//! Text-to-speech abstraction.
//!
//! `TextToSpeech` decouples the speaker worker from any specific synthesis
//! backend. Backends return a complete waveform per fragment; streaming
//! synthesis is not modelled — fragments are short by construction.

pub mod cloud;
pub mod stub;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Mono f32 audio produced by synthesis for one text fragment.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this waveform in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Contract for speech synthesis backends.
pub trait TextToSpeech: Send + 'static {
    /// One-time warm-up: validate credentials, load voice data. Called once
    /// at engine startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Synthesize a waveform for `text`.
    fn synthesize(&mut self, text: &str) -> Result<Waveform>;
}

/// Thread-safe reference-counted handle to any `TextToSpeech` implementor.
#[derive(Clone)]
pub struct TtsHandle(pub Arc<Mutex<dyn TextToSpeech>>);

impl TtsHandle {
    /// Wrap any `TextToSpeech` in a `TtsHandle`.
    pub fn new<T: TextToSpeech>(backend: T) -> Self {
        Self(Arc::new(Mutex::new(backend)))
    }
}

impl std::fmt::Debug for TtsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsHandle").finish_non_exhaustive()
    }
}
