//! `StubChat` — placeholder backend that streams canned replies.
//!
//! Replies are streamed word by word so the sentence splitter and the
//! speaking gate see the same shape of traffic a real service produces.

use tracing::debug;

use crate::chat::{ChatBackend, TokenSink};
use crate::error::Result;
use crate::history::{ChatMessage, Role};

enum Mode {
    /// Echo the last user message back as a full sentence.
    Echo,
    /// Pop one scripted reply per call; attempts may be scripted to fail.
    Scripted(Vec<Result<String>>),
}

pub struct StubChat {
    mode: Mode,
}

impl StubChat {
    pub fn new() -> Self {
        Self { mode: Mode::Echo }
    }

    /// Return the given replies (or failures) one per `complete` call.
    pub fn scripted(replies: Vec<Result<String>>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            mode: Mode::Scripted(replies),
        }
    }

    fn stream_reply(reply: &str, sink: &mut dyn TokenSink) {
        // Split inclusive of whitespace so concatenating tokens round-trips.
        for token in reply.split_inclusive(' ') {
            sink.token(token);
        }
    }
}

impl Default for StubChat {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBackend for StubChat {
    fn complete(&mut self, messages: &[ChatMessage], sink: &mut dyn TokenSink) -> Result<String> {
        let reply = match &mut self.mode {
            Mode::Echo => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.trim())
                    .unwrap_or("nothing");
                format!("You said: {last_user}.")
            }
            Mode::Scripted(replies) => match replies.pop() {
                Some(Ok(reply)) => reply,
                Some(Err(e)) => return Err(e),
                None => "I have nothing more to say.".to_string(),
            },
        };

        debug!(chars = reply.len(), "streaming stub reply");
        Self::stream_reply(&reply, sink);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_mode_streams_tokens_that_reconstruct_the_reply() {
        let mut chat = StubChat::new();
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello there")];

        let mut streamed = String::new();
        let mut sink = |t: &str| streamed.push_str(t);
        let reply = chat.complete(&messages, &mut sink).unwrap();

        assert_eq!(reply, "You said: hello there.");
        assert_eq!(streamed, reply);
    }

    #[test]
    fn scripted_mode_pops_replies_in_order() {
        let mut chat = StubChat::scripted(vec![Ok("First.".into()), Ok("Second.".into())]);
        let messages = vec![ChatMessage::user("hi")];
        let mut sink = |_: &str| {};

        assert_eq!(chat.complete(&messages, &mut sink).unwrap(), "First.");
        assert_eq!(chat.complete(&messages, &mut sink).unwrap(), "Second.");
    }
}
