//! # parley-core
//!
//! Reusable voice-assistant loop engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → CaptureStream → SPSC RingBuffer → capture worker
//!                                                    │ FrameBatch
//!                                              transcribe worker (rolling buffer,
//!                                                    │            debounce, filters)
//!                                                    │ Utterance
//!                                               respond worker (bounded history,
//!                                                    │          streamed completion)
//!                                                    │ TextFragment
//!                                                speak worker (TTS, FIFO playback,
//!                                                              speaking gate)
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens on worker threads.
//! Capture is suppressed while the speaking gate holds any in-flight
//! fragment, so the assistant never transcribes its own voice.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod chat;
pub mod engine;
pub mod error;
pub mod events;
pub mod history;
pub mod playback;
pub mod stt;
pub mod tts;

// Convenience re-exports for downstream crates
pub use buffering::batch::FrameBatch;
pub use chat::{ChatBackend, ChatHandle, TokenSink};
pub use engine::{gate::SpeakingGate, EngineConfig, ParleyEngine};
pub use error::ParleyError;
pub use events::{
    ActivityEvent, ConversationEvent, ConversationKind, EngineStatus, EngineStatusEvent,
};
pub use history::{ChatMessage, ConversationHistory, Role};
pub use playback::{NullPlayer, Player, PlayerFactory};
pub use stt::{SpeechToText, SttHandle, Transcription, TranscriptionSegment};
pub use tts::{TextToSpeech, TtsHandle, Waveform};

#[cfg(feature = "audio-cpal")]
pub use playback::RodioPlayer;
