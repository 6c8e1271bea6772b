//! Event types broadcast by the engine to embedding hosts.
//!
//! Three broadcast channels:
//!
//! | Event | Purpose |
//! |-------|---------|
//! | `ConversationEvent` | utterances, streamed reply tokens, spoken fragments |
//! | `ActivityEvent` | per-batch RMS level + mute state (level meters) |
//! | `EngineStatusEvent` | lifecycle transitions |

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Conversation events
// ---------------------------------------------------------------------------

/// Emitted as the conversation advances: one event per finalized utterance,
/// per streamed reply token, per fragment handed to synthesis, and one when
/// a reply completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    pub kind: ConversationKind,
    pub text: String,
}

/// What a `ConversationEvent` carries in `text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// A finalized, debounced unit of recognized speech.
    Utterance,
    /// One streamed token of the assistant reply.
    ReplyToken,
    /// A punctuation-delimited slice of the reply, queued for synthesis.
    Fragment,
    /// The complete assistant reply (stream ended).
    ReplyComplete,
    /// A canned apology spoken when the chat service could not be reached.
    Fallback,
}

// ---------------------------------------------------------------------------
// Audio activity events
// ---------------------------------------------------------------------------

/// Emitted for each completed capture batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Root-mean-square level of the batch in [0.0, 1.0].
    pub rms: f32,
    /// Whether capture was suppressed (assistant speaking) for this batch.
    pub muted: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the Parley engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Warming up backends (credential checks, dummy calls).
    WarmingUp,
    /// Capturing audio and waiting for speech.
    Listening,
    /// Playing synthesized reply audio; capture suppressed.
    Speaking,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}
