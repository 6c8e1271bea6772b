//! `StubTts` — placeholder backend producing short silent waveforms.
//!
//! The waveform length is proportional to the text length, so playback
//! ordering and gate timing behave like a real backend without any model.

use tracing::debug;

use crate::error::Result;
use crate::tts::{TextToSpeech, Waveform};

/// Samples of silence per character of input text.
const SAMPLES_PER_CHAR: usize = 16;

pub struct StubTts {
    sample_rate: u32,
}

impl StubTts {
    pub fn new() -> Self {
        Self {
            sample_rate: 16_000,
        }
    }
}

impl Default for StubTts {
    fn default() -> Self {
        Self::new()
    }
}

impl TextToSpeech for StubTts {
    fn synthesize(&mut self, text: &str) -> Result<Waveform> {
        let samples = vec![0.0f32; text.chars().count() * SAMPLES_PER_CHAR];
        debug!(chars = text.len(), samples = samples.len(), "stub synthesis");
        Ok(Waveform::new(samples, self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveform_length_scales_with_text() {
        let mut tts = StubTts::new();
        let short = tts.synthesize("hi").unwrap();
        let long = tts.synthesize("hello there friend").unwrap();
        assert!(long.samples.len() > short.samples.len());
        assert_eq!(short.sample_rate, 16_000);
    }
}
