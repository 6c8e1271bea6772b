//! Cloud STT backend for OpenAI-compatible transcription endpoints.
//!
//! Uploads the waveform as a 16-bit PCM WAV via multipart and requests
//! `verbose_json` so the response carries per-segment no-speech
//! probabilities, which the transcriber's filtering policy depends on.

use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use tracing::debug;

use crate::buffering::batch::FrameBatch;
use crate::error::{ParleyError, Result};
use crate::stt::{SpeechToText, Transcription, TranscriptionSegment};

/// Configuration for `CloudStt`.
#[derive(Debug, Clone)]
pub struct CloudSttConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name, e.g. `whisper-1`.
    pub model: String,
    /// Request timeout.
    pub timeout: std::time::Duration,
}

impl Default for CloudSttConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "whisper-1".into(),
            timeout: std::time::Duration::from_secs(60),
        }
    }
}

/// OpenAI-compatible transcription endpoint backend.
pub struct CloudStt {
    client: Client,
    config: CloudSttConfig,
    api_key: String,
}

impl CloudStt {
    pub fn new(api_key: impl Into<String>, config: CloudSttConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }
}

/// Encode f32 mono samples as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| ParleyError::Stt(format!("WAV encode: {e}")))?;
        for &sample in samples {
            let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer
                .write_sample(pcm)
                .map_err(|e| ParleyError::Stt(format!("WAV encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ParleyError::Stt(format!("WAV encode: {e}")))?;
    }

    Ok(cursor.into_inner())
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    text: String,
    #[serde(default)]
    no_speech_prob: f32,
}

impl SpeechToText for CloudStt {
    fn warm_up(&mut self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ParleyError::Stt("empty API key".into()));
        }
        Ok(())
    }

    fn transcribe(&mut self, waveform: &FrameBatch, language: &str) -> Result<Transcription> {
        let wav = encode_wav(&waveform.samples, waveform.sample_rate)?;
        debug!(
            bytes = wav.len(),
            seconds = waveform.duration_secs(),
            "uploading audio for transcription"
        );

        let file_part = multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| ParleyError::Stt(e.to_string()))?;

        let mut form = multipart::Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .part("file", file_part);
        if !language.trim().is_empty() {
            form = form.text("language", language.trim().to_string());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ParleyError::Stt(format!("API error {status}: {body}")));
        }

        let parsed: VerboseTranscription = response
            .json()
            .map_err(|e| ParleyError::Stt(format!("malformed response: {e}")))?;

        Ok(Transcription {
            text: parsed.text,
            segments: parsed
                .segments
                .into_iter()
                .map(|s| TranscriptionSegment {
                    text: s.text,
                    no_speech_prob: s.no_speech_prob,
                })
                .collect(),
        })
    }
}
