//! Cloud TTS backend for OpenAI-compatible speech endpoints.
//!
//! Requests raw PCM (`"response_format": "pcm"`) and decodes the 16-bit
//! little-endian mono body to f32 samples. The voice name stands in for the
//! reference design's fixed speaker-characteristic vector: one voice, chosen
//! at construction, for the lifetime of the backend.

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::{ParleyError, Result};
use crate::tts::{TextToSpeech, Waveform};

/// Sample rate of the raw PCM returned by OpenAI-compatible speech APIs.
const PCM_SAMPLE_RATE: u32 = 24_000;

/// Configuration for `CloudTts`.
#[derive(Debug, Clone)]
pub struct CloudTtsConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name, e.g. `tts-1`.
    pub model: String,
    /// Fixed voice name, e.g. `alloy`.
    pub voice: String,
    /// Request timeout.
    pub timeout: std::time::Duration,
}

impl Default for CloudTtsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "tts-1".into(),
            voice: "alloy".into(),
            timeout: std::time::Duration::from_secs(60),
        }
    }
}

/// OpenAI-compatible speech endpoint backend.
pub struct CloudTts {
    client: Client,
    config: CloudTtsConfig,
    api_key: String,
}

impl CloudTts {
    pub fn new(api_key: impl Into<String>, config: CloudTtsConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }
}

/// Decode 16-bit little-endian mono PCM bytes to f32 samples.
fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

impl TextToSpeech for CloudTts {
    fn warm_up(&mut self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ParleyError::Tts("empty API key".into()));
        }
        Ok(())
    }

    fn synthesize(&mut self, text: &str) -> Result<Waveform> {
        if text.trim().is_empty() {
            return Ok(Waveform::new(Vec::new(), PCM_SAMPLE_RATE));
        }

        debug!(voice = %self.config.voice, chars = text.len(), "synthesis request");

        let body = serde_json::json!({
            "model": self.config.model,
            "input": text,
            "voice": self.config.voice,
            "response_format": "pcm",
        });

        let response = self
            .client
            .post(format!("{}/audio/speech", self.config.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ParleyError::Tts(format!("API error {status}: {body}")));
        }

        let bytes = response.bytes()?;
        let samples = decode_pcm16(&bytes);
        debug!(samples = samples.len(), "synthesis complete");

        Ok(Waveform::new(samples, PCM_SAMPLE_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pcm16_little_endian() {
        // 0, i16::MAX, i16::MIN
        let bytes = [0u8, 0, 0xFF, 0x7F, 0x00, 0x80];
        let samples = decode_pcm16(&bytes);
        assert_eq!(samples.len(), 3);
        assert!((samples[0]).abs() < 1e-6);
        assert!((samples[1] - (32767.0 / 32768.0)).abs() < 1e-6);
        assert!((samples[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn odd_trailing_byte_is_ignored() {
        let bytes = [0u8, 0, 0x12];
        assert_eq!(decode_pcm16(&bytes).len(), 1);
    }
}
