//! Chat completion abstraction.
//!
//! `ChatBackend` decouples the responder from any specific service. Tokens
//! are streamed into a `TokenSink` as they arrive so sentence fragments can
//! be spoken before the full reply has finished generating.

pub mod cloud;
pub mod splitter;
pub mod sse;
pub mod stub;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::history::ChatMessage;

/// Receives streamed reply tokens in arrival order.
pub trait TokenSink {
    fn token(&mut self, token: &str);
}

impl<F: FnMut(&str)> TokenSink for F {
    fn token(&mut self, token: &str) {
        self(token);
    }
}

/// Contract for chat completion backends.
pub trait ChatBackend: Send + 'static {
    /// One-time warm-up: validate credentials. Called once at engine startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stream a completion for `messages`, pushing each token into `sink`.
    ///
    /// # Returns
    /// The full reply text (the concatenation of all tokens pushed).
    fn complete(&mut self, messages: &[ChatMessage], sink: &mut dyn TokenSink) -> Result<String>;
}

/// Thread-safe reference-counted handle to any `ChatBackend` implementor.
#[derive(Clone)]
pub struct ChatHandle(pub Arc<Mutex<dyn ChatBackend>>);

impl ChatHandle {
    /// Wrap any `ChatBackend` in a `ChatHandle`.
    pub fn new<C: ChatBackend>(backend: C) -> Self {
        Self(Arc::new(Mutex::new(backend)))
    }
}

impl std::fmt::Debug for ChatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatHandle").finish_non_exhaustive()
    }
}
