//! Respond worker — bounded history, streamed completion, fragment split.
//!
//! One utterance is handled at a time (strict single-request-in-flight).
//! Tokens stream into the sentence splitter; each completed fragment is
//! registered with the speaking gate *before* it is enqueued for synthesis,
//! so capture is already suppressed when the first waveform starts playing.
//!
//! ## Retry policy
//!
//! Transport failures are retried with exponential backoff, but only while
//! no token has arrived — once part of a reply has been spoken, a retry
//! would speak duplicated text, so a mid-stream failure ends the reply with
//! whatever was already streamed. When every attempt fails before the first
//! token, a canned fallback fragment is spoken instead and no assistant
//! message is recorded.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    chat::{splitter::SentenceSplitter, ChatHandle},
    engine::{diagnostics::EngineDiagnostics, gate::SpeakingGate, EngineConfig, QUEUE_POLL},
    events::{ConversationEvent, ConversationKind},
    history::ConversationHistory,
};

/// All context the respond worker needs, passed as one struct.
pub struct ResponderContext {
    pub config: EngineConfig,
    pub chat: ChatHandle,
    pub utterance_rx: Receiver<String>,
    pub fragment_tx: Sender<String>,
    pub gate: Arc<SpeakingGate>,
    pub conversation_tx: broadcast::Sender<ConversationEvent>,
    pub seq: Arc<AtomicU64>,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<EngineDiagnostics>,
}

/// Run the respond loop until the running flag clears.
pub fn run(ctx: ResponderContext) {
    info!(
        window = ctx.config.max_turn_messages,
        attempts = ctx.config.chat_attempts,
        "respond worker started"
    );

    let mut history = ConversationHistory::new(
        ctx.config.system_prompt.clone(),
        ctx.config.max_turn_messages,
    );

    loop {
        let utterance = match ctx.utterance_rx.recv_timeout(QUEUE_POLL) {
            Ok(utterance) => utterance,
            Err(RecvTimeoutError::Timeout) => {
                if !ctx.running.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        handle_utterance(&ctx, &mut history, utterance);
    }

    info!("respond worker stopped");
}

fn handle_utterance(ctx: &ResponderContext, history: &mut ConversationHistory, utterance: String) {
    history.push_user(utterance);
    let messages = history.messages();

    let mut splitter = SentenceSplitter::new();
    let mut received_any = false;
    let mut backoff = ctx.config.chat_initial_backoff;

    for attempt in 1..=ctx.config.chat_attempts.max(1) {
        ctx.diagnostics.chat_requests.fetch_add(1, Ordering::Relaxed);

        let result = {
            let conversation_tx = &ctx.conversation_tx;
            let seq = &ctx.seq;
            let received = &mut received_any;
            let splitter = &mut splitter;
            let mut sink = |token: &str| {
                *received = true;
                let _ = conversation_tx.send(ConversationEvent {
                    seq: seq.fetch_add(1, Ordering::Relaxed),
                    kind: ConversationKind::ReplyToken,
                    text: token.to_string(),
                });
                if let Some(fragment) = splitter.push_token(token) {
                    emit_fragment(ctx, fragment, ConversationKind::Fragment);
                }
            };
            ctx.chat.0.lock().complete(&messages, &mut sink)
        };

        match result {
            Ok(reply) => {
                if let Some(remainder) = splitter.finish() {
                    emit_fragment(ctx, remainder, ConversationKind::Fragment);
                }
                let _ = ctx.conversation_tx.send(ConversationEvent {
                    seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
                    kind: ConversationKind::ReplyComplete,
                    text: reply.clone(),
                });
                debug!(chars = reply.len(), "reply complete");
                history.push_assistant(reply);
                return;
            }
            Err(e) if received_any => {
                // Part of the reply has already been spoken; retrying would
                // duplicate it. End the reply with what we have.
                warn!(error = %e, "stream failed mid-reply — keeping partial text");
                ctx.diagnostics.chat_failures.fetch_add(1, Ordering::Relaxed);
                if let Some(remainder) = splitter.finish() {
                    emit_fragment(ctx, remainder, ConversationKind::Fragment);
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, attempt, "chat request failed");
                if attempt < ctx.config.chat_attempts {
                    ctx.diagnostics.chat_retries.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    // Every attempt failed before the first token: apologize out loud.
    ctx.diagnostics.chat_failures.fetch_add(1, Ordering::Relaxed);
    warn!(
        attempts = ctx.config.chat_attempts,
        "chat attempts exhausted — speaking fallback"
    );
    emit_fragment(
        ctx,
        ctx.config.fallback_reply.clone(),
        ConversationKind::Fallback,
    );
}

/// Register a fragment with the gate, broadcast it, and enqueue it for
/// synthesis. Gate registration happens first so capture is suppressed
/// before any audio could start.
fn emit_fragment(ctx: &ResponderContext, fragment: String, kind: ConversationKind) {
    ctx.gate.begin_fragment();
    ctx.diagnostics
        .fragments_emitted
        .fetch_add(1, Ordering::Relaxed);

    let _ = ctx.conversation_tx.send(ConversationEvent {
        seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
        kind,
        text: fragment.clone(),
    });

    if ctx.fragment_tx.send(fragment).is_err() {
        // Speaker is gone; undo the gate so capture is not muted forever.
        ctx.gate.finish_fragment();
        warn!("fragment queue disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use crate::chat::stub::StubChat;
    use crate::error::ParleyError;

    struct Harness {
        utterance_tx: Sender<String>,
        fragment_rx: Receiver<String>,
        conversation_rx: broadcast::Receiver<ConversationEvent>,
        gate: Arc<SpeakingGate>,
        running: Arc<AtomicBool>,
        diagnostics: Arc<EngineDiagnostics>,
        handle: std::thread::JoinHandle<()>,
    }

    impl Harness {
        fn spawn(chat: StubChat, config: EngineConfig) -> Self {
            let (utterance_tx, utterance_rx) = unbounded();
            let (fragment_tx, fragment_rx) = unbounded();
            let (conversation_tx, conversation_rx) = broadcast::channel(256);
            let gate = Arc::new(SpeakingGate::new());
            let running = Arc::new(AtomicBool::new(true));
            let diagnostics = Arc::new(EngineDiagnostics::default());

            let ctx = ResponderContext {
                config,
                chat: ChatHandle::new(chat),
                utterance_rx,
                fragment_tx,
                gate: Arc::clone(&gate),
                conversation_tx,
                seq: Arc::new(AtomicU64::new(0)),
                running: Arc::clone(&running),
                diagnostics: Arc::clone(&diagnostics),
            };
            let handle = std::thread::spawn(move || run(ctx));

            Self {
                utterance_tx,
                fragment_rx,
                conversation_rx,
                gate,
                running,
                diagnostics,
                handle,
            }
        }

        fn stop(self) -> Arc<EngineDiagnostics> {
            self.running.store(false, Ordering::SeqCst);
            self.handle.join().expect("responder thread panicked");
            self.diagnostics
        }
    }

    fn fast_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.chat_initial_backoff = Duration::from_millis(1);
        config
    }

    #[test]
    fn streamed_reply_becomes_one_fragment_and_history_message() {
        // Tokens "Hi", " there", "." arrive as one stub reply; the splitter
        // flushes once on the period.
        let mut harness = Harness::spawn(
            StubChat::scripted(vec![Ok("Hi there.".into())]),
            fast_config(),
        );

        harness.utterance_tx.send("hello".into()).unwrap();

        let fragment = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("fragment");
        assert_eq!(fragment, "Hi there.");

        // ReplyComplete carries the full reply text that entered history.
        let mut complete = None;
        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while std::time::Instant::now() < deadline {
            match harness.conversation_rx.try_recv() {
                Ok(ev) if ev.kind == ConversationKind::ReplyComplete => {
                    complete = Some(ev.text);
                    break;
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => {
                    std::thread::sleep(Duration::from_millis(5))
                }
                Err(_) => break,
            }
        }
        assert_eq!(complete.as_deref(), Some("Hi there."));

        harness.stop();
    }

    #[test]
    fn fragments_keep_generation_order() {
        let harness = Harness::spawn(
            StubChat::scripted(vec![Ok("One. Two? Three!".into())]),
            fast_config(),
        );

        harness.utterance_tx.send("go".into()).unwrap();

        let first = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap();
        let second = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap();
        let third = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap();

        assert!(first.contains("One"));
        assert!(second.contains("Two"));
        assert!(third.contains("Three"));
        assert_eq!(format!("{first}{second}{third}"), "One. Two? Three!");

        harness.stop();
    }

    #[test]
    fn gate_counts_every_emitted_fragment() {
        let harness = Harness::spawn(
            StubChat::scripted(vec![Ok("A. B. C.".into())]),
            fast_config(),
        );

        harness.utterance_tx.send("go".into()).unwrap();
        for _ in 0..3 {
            harness
                .fragment_rx
                .recv_timeout(Duration::from_secs(1))
                .unwrap();
        }

        assert_eq!(harness.gate.in_flight(), 3);
        assert!(harness.gate.is_muted());
        harness.stop();
    }

    #[test]
    fn exhausted_retries_speak_the_fallback() {
        let harness = Harness::spawn(
            StubChat::scripted(vec![
                Err(ParleyError::Chat("connect refused".into())),
                Err(ParleyError::Chat("connect refused".into())),
                Err(ParleyError::Chat("connect refused".into())),
            ]),
            fast_config(),
        );

        harness.utterance_tx.send("anyone there".into()).unwrap();

        let fragment = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("fallback fragment");
        assert_eq!(fragment, "Sorry, I didn't catch that.");

        let diagnostics = harness.stop();
        assert_eq!(diagnostics.chat_retries.load(Ordering::Relaxed), 2);
        assert_eq!(diagnostics.chat_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn transient_failure_then_success_produces_a_normal_reply() {
        let harness = Harness::spawn(
            StubChat::scripted(vec![
                Err(ParleyError::Chat("timeout".into())),
                Ok("Recovered.".into()),
            ]),
            fast_config(),
        );

        harness.utterance_tx.send("hi".into()).unwrap();

        let fragment = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("fragment after retry");
        assert_eq!(fragment, "Recovered.");

        let diagnostics = harness.stop();
        assert_eq!(diagnostics.chat_retries.load(Ordering::Relaxed), 1);
        assert_eq!(diagnostics.chat_failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn trailing_remainder_without_punctuation_is_spoken() {
        let harness = Harness::spawn(
            StubChat::scripted(vec![Ok("Done. And one more thing".into())]),
            fast_config(),
        );

        harness.utterance_tx.send("go".into()).unwrap();

        let first = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap();
        let second = harness
            .fragment_rx
            .recv_timeout(Duration::from_secs(1))
            .unwrap();
        assert_eq!(format!("{first}{second}"), "Done. And one more thing");

        harness.stop();
    }
}
