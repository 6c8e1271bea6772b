//! Cloud chat backend for OpenAI-compatible chat-completion endpoints.
//!
//! Opens a streaming request (`"stream": true`) and reads the SSE response
//! line by line off the blocking response body, pushing each content delta
//! into the caller's `TokenSink`. Retry policy lives in the responder, not
//! here — a transport failure surfaces as an error for a single attempt.

use std::io::{BufRead, BufReader};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::sse::{parse_line, SseEvent};
use crate::chat::{ChatBackend, TokenSink};
use crate::error::{ParleyError, Result};
use crate::history::ChatMessage;

/// Configuration for `CloudChat`.
#[derive(Debug, Clone)]
pub struct CloudChatConfig {
    /// Base URL of the API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name, e.g. `gpt-4o-mini`.
    pub model: String,
    /// Request timeout covering the whole stream. Bounds the pipeline stall
    /// a hung request can cause.
    pub timeout: std::time::Duration,
}

impl Default for CloudChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            timeout: std::time::Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion backend.
pub struct CloudChat {
    client: Client,
    config: CloudChatConfig,
    api_key: String,
}

impl CloudChat {
    pub fn new(api_key: impl Into<String>, config: CloudChatConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }
}

impl ChatBackend for CloudChat {
    fn warm_up(&mut self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(ParleyError::Chat("empty API key".into()));
        }
        Ok(())
    }

    fn complete(&mut self, messages: &[ChatMessage], sink: &mut dyn TokenSink) -> Result<String> {
        let request = CompletionRequest {
            model: &self.config.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ParleyError::Chat(format!("API error {status}: {body}")));
        }

        let mut reply = String::new();
        let reader = BufReader::new(response);

        for line in reader.lines() {
            let line = line.map_err(|e| ParleyError::Chat(format!("stream read: {e}")))?;
            match parse_line(&line) {
                Some(SseEvent::Done) => break,
                Some(SseEvent::Data(data)) => {
                    let chunk: StreamChunk = serde_json::from_str(&data)
                        .map_err(|e| ParleyError::Chat(format!("malformed chunk: {e}")))?;
                    let Some(choice) = chunk.choices.first() else {
                        continue;
                    };
                    if let Some(content) = &choice.delta.content {
                        if !content.is_empty() {
                            reply.push_str(content);
                            sink.token(content);
                        }
                    }
                }
                None => {}
            }
        }

        debug!(chars = reply.len(), "completion stream finished");
        Ok(reply)
    }
}
