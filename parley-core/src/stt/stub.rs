//! `StubStt` — placeholder backend that recognises metadata without a model.
//!
//! Two modes:
//! - `StubStt::new()` reports silence until two seconds of audio have
//!   accumulated, then a fixed canned text. Consecutive passes over a grown
//!   buffer therefore match, the debounce commits, and the full capture →
//!   transcribe → respond loop can be exercised without credentials.
//! - `StubStt::scripted(...)` returns a fixed sequence of results, used by
//!   transcriber tests to drive the filtering policy precisely.

use tracing::debug;

use crate::buffering::batch::FrameBatch;
use crate::error::Result;
use crate::stt::{SpeechToText, Transcription, TranscriptionSegment};

enum Mode {
    Echo,
    Scripted(Vec<Result<Transcription>>),
}

pub struct StubStt {
    mode: Mode,
}

impl StubStt {
    /// Echo-style stub.
    pub fn new() -> Self {
        Self { mode: Mode::Echo }
    }

    /// Return the given results one per call, then empty transcriptions.
    pub fn scripted(results: Vec<Result<Transcription>>) -> Self {
        // Stored reversed so each call can pop from the back.
        let mut results = results;
        results.reverse();
        Self {
            mode: Mode::Scripted(results),
        }
    }

    /// Convenience: a speech result with a single confident segment.
    pub fn speech(text: &str, no_speech_prob: f32) -> Result<Transcription> {
        Ok(Transcription {
            text: text.to_string(),
            segments: vec![TranscriptionSegment {
                text: text.to_string(),
                no_speech_prob,
            }],
        })
    }
}

impl Default for StubStt {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechToText for StubStt {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubStt::warm_up — no-op");
        Ok(())
    }

    fn transcribe(&mut self, waveform: &FrameBatch, _language: &str) -> Result<Transcription> {
        match &mut self.mode {
            Mode::Echo => {
                if waveform.duration_secs() < 2.0 {
                    return Ok(Transcription::empty());
                }
                let text = "This is a stub transcription.".to_string();
                Ok(Transcription {
                    segments: vec![TranscriptionSegment {
                        text: text.clone(),
                        no_speech_prob: 0.0,
                    }],
                    text,
                })
            }
            Mode::Scripted(results) => match results.pop() {
                Some(result) => result,
                None => Ok(Transcription::empty()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_is_silent_until_two_seconds_then_stable() {
        let mut stt = StubStt::new();
        let short = FrameBatch::new(vec![0.1; 16_000], 16_000);
        let long = FrameBatch::new(vec![0.1; 32_000], 16_000);

        assert!(stt.transcribe(&short, "english").unwrap().text.is_empty());

        let first = stt.transcribe(&long, "english").unwrap();
        let second = stt.transcribe(&long, "english").unwrap();
        assert!(!first.text.is_empty());
        assert_eq!(first.text, second.text, "stable text is what debounce needs");
        assert_eq!(first.segments[0].no_speech_prob, 0.0);
    }

    #[test]
    fn scripted_results_pop_in_order_then_fall_silent() {
        let mut stt = StubStt::scripted(vec![
            StubStt::speech("one", 0.1),
            StubStt::speech("two", 0.2),
        ]);
        let batch = FrameBatch::new(vec![0.1; 1600], 16_000);

        assert_eq!(stt.transcribe(&batch, "english").unwrap().text, "one");
        assert_eq!(stt.transcribe(&batch, "english").unwrap().text, "two");
        assert!(stt.transcribe(&batch, "english").unwrap().text.is_empty());
    }
}
