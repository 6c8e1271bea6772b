//! Transcribe worker — rolling buffer, filtering policy, stability debounce.
//!
//! One speech-to-text pass runs per batch arrival, over the concatenated
//! rolling buffer. The filtering policy, applied in order:
//!
//! 1. STT call failed → log, count, skip the pass (the worker survives).
//! 2. Empty/whitespace-only text (or a lone `.`) → discard.
//! 3. No segments, or the leading segment's no-speech probability above
//!    threshold → discard.
//! 4. Text differs from the previous pass → remember it, do not emit.
//! 5. Text equals the previous pass (both non-trivial) → commit exactly one
//!    utterance, clear the rolling buffer, reset the remembered text.
//!
//! The two-identical-passes debounce means a single unstable pass never
//! emits; short phrases commit on their second stable pass.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    buffering::batch::FrameBatch,
    engine::{diagnostics::EngineDiagnostics, EngineConfig, QUEUE_POLL},
    events::{ConversationEvent, ConversationKind},
    stt::SttHandle,
};

/// All context the transcribe worker needs, passed as one struct.
pub struct TranscriberContext {
    pub config: EngineConfig,
    pub stt: SttHandle,
    pub batch_rx: Receiver<FrameBatch>,
    pub utterance_tx: Sender<String>,
    pub conversation_tx: broadcast::Sender<ConversationEvent>,
    pub seq: Arc<AtomicU64>,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<EngineDiagnostics>,
}

/// Text too thin to debounce on: empty, whitespace, or a bare period
/// (a common hallucination on near-silent audio).
fn is_trivial(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || trimmed == "."
}

/// Run the transcribe loop until the running flag clears.
pub fn run(ctx: TranscriberContext) {
    info!(
        max_buffer_batches = ctx.config.max_buffer_batches,
        no_speech_threshold = ctx.config.no_speech_threshold,
        "transcribe worker started"
    );

    // Rolling audio buffer, capped at max_buffer_batches (oldest first out).
    let mut buffer: Vec<FrameBatch> = Vec::new();
    // Text of the previous pass — the debounce comparator.
    let mut last_seen = String::new();

    loop {
        let batch = match ctx.batch_rx.recv_timeout(QUEUE_POLL) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => {
                if !ctx.running.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        buffer.push(batch);
        if buffer.len() > ctx.config.max_buffer_batches {
            // Explicit policy: cap per-pass inference cost; a very long
            // utterance loses its oldest audio.
            let excess = buffer.len() - ctx.config.max_buffer_batches;
            buffer.drain(..excess);
            debug!(dropped = excess, "rolling buffer capped");
        }

        let waveform = concat_buffer(&buffer, ctx.config.target_sample_rate);

        ctx.diagnostics.stt_passes.fetch_add(1, Ordering::Relaxed);
        let transcription = {
            let mut stt = ctx.stt.0.lock();
            match stt.transcribe(&waveform, &ctx.config.language_hint) {
                Ok(t) => t,
                Err(e) => {
                    ctx.diagnostics.stt_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "transcription pass failed — skipping");
                    continue;
                }
            }
        };

        let text = transcription.text.trim();

        if is_trivial(text) {
            ctx.diagnostics
                .discarded_trivial
                .fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let no_speech = transcription
            .segments
            .first()
            .map(|s| s.no_speech_prob)
            .unwrap_or(1.0);
        if no_speech > ctx.config.no_speech_threshold {
            ctx.diagnostics
                .discarded_no_speech
                .fetch_add(1, Ordering::Relaxed);
            debug!(no_speech, text, "discarding low-confidence pass");
            continue;
        }

        if text != last_seen {
            // Unstable — remember and wait for a second identical pass.
            last_seen = text.to_string();
            ctx.diagnostics
                .debounce_holds
                .fetch_add(1, Ordering::Relaxed);
            debug!(text, "debounce hold");
            continue;
        }

        // Two consecutive identical non-trivial passes — commit.
        let utterance = text.to_string();
        info!(text = %utterance, "utterance committed");
        ctx.diagnostics
            .utterances_emitted
            .fetch_add(1, Ordering::Relaxed);

        let _ = ctx.conversation_tx.send(ConversationEvent {
            seq: ctx.seq.fetch_add(1, Ordering::Relaxed),
            kind: ConversationKind::Utterance,
            text: utterance.clone(),
        });

        buffer.clear();
        last_seen.clear();

        if ctx.utterance_tx.send(utterance).is_err() {
            // Responder is gone; keep transcribing for event subscribers.
            warn!("utterance queue disconnected");
            break;
        }
    }

    info!("transcribe worker stopped");
}

fn concat_buffer(buffer: &[FrameBatch], sample_rate: u32) -> FrameBatch {
    let total: usize = buffer.iter().map(|b| b.samples.len()).sum();
    let mut samples = Vec::with_capacity(total);
    for batch in buffer {
        samples.extend_from_slice(&batch.samples);
    }
    FrameBatch::new(samples, sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use crate::stt::stub::StubStt;
    use crate::stt::Transcription;

    fn batch() -> FrameBatch {
        FrameBatch::new(vec![0.1f32; 1600], 16_000)
    }

    struct Harness {
        batch_tx: Sender<FrameBatch>,
        utterance_rx: Receiver<String>,
        running: Arc<AtomicBool>,
        diagnostics: Arc<EngineDiagnostics>,
        handle: std::thread::JoinHandle<()>,
    }

    impl Harness {
        fn spawn(stt: StubStt) -> Self {
            let (batch_tx, batch_rx) = unbounded();
            let (utterance_tx, utterance_rx) = unbounded();
            let (conversation_tx, _) = broadcast::channel(64);
            let running = Arc::new(AtomicBool::new(true));
            let diagnostics = Arc::new(EngineDiagnostics::default());

            let ctx = TranscriberContext {
                config: EngineConfig::default(),
                stt: SttHandle::new(stt),
                batch_rx,
                utterance_tx,
                conversation_tx,
                seq: Arc::new(AtomicU64::new(0)),
                running: Arc::clone(&running),
                diagnostics: Arc::clone(&diagnostics),
            };
            let handle = std::thread::spawn(move || run(ctx));

            Self {
                batch_tx,
                utterance_rx,
                running,
                diagnostics,
                handle,
            }
        }

        fn stop(self) -> Arc<EngineDiagnostics> {
            self.running.store(false, Ordering::SeqCst);
            self.handle.join().expect("transcriber thread panicked");
            self.diagnostics
        }
    }

    #[test]
    fn two_identical_passes_commit_exactly_one_utterance() {
        let harness = Harness::spawn(StubStt::scripted(vec![
            StubStt::speech("turn on the lights", 0.1),
            StubStt::speech("turn on the lights", 0.1),
        ]));

        harness.batch_tx.send(batch()).unwrap();
        harness.batch_tx.send(batch()).unwrap();

        let utterance = harness
            .utterance_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("utterance");
        assert_eq!(utterance, "turn on the lights");

        assert!(
            harness
                .utterance_rx
                .recv_timeout(Duration::from_millis(100))
                .is_err(),
            "exactly one utterance expected"
        );

        harness.stop();
    }

    #[test]
    fn single_unstable_pass_never_emits() {
        let harness = Harness::spawn(StubStt::scripted(vec![
            StubStt::speech("hello", 0.1),
            StubStt::speech("hello there", 0.1),
            StubStt::speech("hello there friend", 0.1),
        ]));

        for _ in 0..3 {
            harness.batch_tx.send(batch()).unwrap();
        }

        assert!(
            harness
                .utterance_rx
                .recv_timeout(Duration::from_millis(200))
                .is_err(),
            "changing text must never emit"
        );
        let diagnostics = harness.stop();
        assert_eq!(diagnostics.debounce_holds.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn high_no_speech_probability_is_discarded() {
        let harness = Harness::spawn(StubStt::scripted(vec![
            StubStt::speech("ghost words", 0.9),
            StubStt::speech("ghost words", 0.9),
        ]));

        harness.batch_tx.send(batch()).unwrap();
        harness.batch_tx.send(batch()).unwrap();

        assert!(
            harness
                .utterance_rx
                .recv_timeout(Duration::from_millis(200))
                .is_err(),
            "no-speech passes must be discarded regardless of text"
        );
        let diagnostics = harness.stop();
        assert_eq!(diagnostics.discarded_no_speech.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn empty_text_is_discarded_silently() {
        let harness = Harness::spawn(StubStt::scripted(vec![
            Ok(Transcription::empty()),
            StubStt::speech("  ", 0.0),
            StubStt::speech(" .", 0.0),
        ]));

        for _ in 0..3 {
            harness.batch_tx.send(batch()).unwrap();
        }

        assert!(
            harness
                .utterance_rx
                .recv_timeout(Duration::from_millis(200))
                .is_err()
        );
        let diagnostics = harness.stop();
        assert_eq!(diagnostics.discarded_trivial.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn stt_error_skips_the_pass_and_worker_survives() {
        let harness = Harness::spawn(StubStt::scripted(vec![
            Err(crate::error::ParleyError::Stt("boom".into())),
            StubStt::speech("still here", 0.1),
            StubStt::speech("still here", 0.1),
        ]));

        for _ in 0..3 {
            harness.batch_tx.send(batch()).unwrap();
        }

        let utterance = harness
            .utterance_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("utterance after recovered error");
        assert_eq!(utterance, "still here");

        let diagnostics = harness.stop();
        assert_eq!(diagnostics.stt_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn buffer_clears_after_commit() {
        let harness = Harness::spawn(StubStt::scripted(vec![
            StubStt::speech("lights on", 0.0),
            StubStt::speech("lights on", 0.0),
        ]));

        harness.batch_tx.send(batch()).unwrap();
        harness.batch_tx.send(batch()).unwrap();
        let _ = harness
            .utterance_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("utterance");

        let diagnostics = harness.stop();
        // Two passes ran; the commit on the second cleared the buffer and
        // reset the debounce comparator.
        assert_eq!(diagnostics.stt_passes.load(Ordering::Relaxed), 2);
        assert_eq!(diagnostics.utterances_emitted.load(Ordering::Relaxed), 1);
    }
}
