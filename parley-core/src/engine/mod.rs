//! `ParleyEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! ParleyEngine::new()
//!     └─► warm_up()          → backends validated, status = WarmingUp → Idle
//!         └─► start()        → device open, four workers spawned, status = Listening
//!             └─► stop()     → running=false, workers joined, status = Stopped
//! ```
//!
//! `start()`/`stop()` are idempotent: calling them in the wrong state returns
//! an error rather than panicking.
//!
//! ## Worker topology
//!
//! ```text
//! mic → CaptureStream → SPSC ring ─┐
//!                                  capture worker ──batches──► transcriber
//!                                                                   │ utterances
//!                                                               responder
//!                                                                   │ fragments
//!                                                                speaker → output device
//! ```
//!
//! Stage queues are unbounded crossbeam channels: a push never blocks, a pop
//! blocks with a short timeout so every worker observes cancellation within
//! one poll interval. The speaking gate is the only other shared state
//! between stages.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, and the rodio output stream
//! has the same constraint. Both are therefore created *inside* their worker
//! threads. Sync mpsc channels propagate open errors back to the `start()`
//! caller. After a successful start, a failed capture stream is reopened
//! with bounded backoff on the capture thread without touching the rest of
//! the pipeline.

pub mod capture;
pub mod diagnostics;
pub mod gate;
pub mod responder;
pub mod speaker;
pub mod transcriber;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::CaptureStream,
    buffering::create_capture_ring,
    chat::ChatHandle,
    error::{ParleyError, Result},
    events::{ActivityEvent, ConversationEvent, EngineStatus, EngineStatusEvent},
    playback::{Player, PlayerFactory},
    stt::SttHandle,
    tts::TtsHandle,
};

use diagnostics::{DiagnosticsSnapshot, EngineDiagnostics};
use gate::SpeakingGate;

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// How long a worker blocks on its queue before re-checking the running flag.
pub(crate) const QUEUE_POLL: Duration = Duration::from_millis(50);

/// Backoff bounds for reopening a failed capture device.
const REOPEN_BACKOFF_INITIAL: Duration = Duration::from_millis(250);
const REOPEN_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Configuration for `ParleyEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate for transcription and batching (Hz). Audio captured at
    /// other rates is resampled. Default: 16000.
    pub target_sample_rate: u32,
    /// Samples per frame batch at `target_sample_rate`. Default: 16000 (1 s).
    pub batch_samples: usize,
    /// Rolling buffer cap in batches; oldest dropped first. Default: 50.
    pub max_buffer_batches: usize,
    /// Passes whose leading segment exceeds this no-speech probability are
    /// discarded. Default: 0.4.
    pub no_speech_threshold: f32,
    /// Language hint forwarded to the STT backend. Default: "english".
    pub language_hint: String,
    /// System prompt pinned at position zero of the history.
    pub system_prompt: String,
    /// Retained non-system history messages. Default: 4.
    pub max_turn_messages: usize,
    /// Chat request attempts before giving up. Default: 3.
    pub chat_attempts: usize,
    /// Initial retry backoff, doubled per attempt. Default: 500 ms.
    pub chat_initial_backoff: Duration,
    /// Spoken when every chat attempt fails.
    pub fallback_reply: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            batch_samples: 16_000,
            max_buffer_batches: 50,
            no_speech_threshold: 0.4,
            language_hint: "english".into(),
            system_prompt: "You are a friendly voice assistant. \
                            Be very brief with your responses!"
                .into(),
            max_turn_messages: 4,
            chat_attempts: 3,
            chat_initial_backoff: Duration::from_millis(500),
            fallback_reply: "Sorry, I didn't catch that.".into(),
        }
    }
}

/// Update the canonical status and broadcast the transition. Repeats of the
/// current status without a detail are suppressed.
pub(crate) fn set_status(
    status: &Mutex<EngineStatus>,
    status_tx: &broadcast::Sender<EngineStatusEvent>,
    new_status: EngineStatus,
    detail: Option<String>,
) {
    {
        let mut current = status.lock();
        if *current == new_status && detail.is_none() {
            return;
        }
        *current = new_status;
    }
    let _ = status_tx.send(EngineStatusEvent {
        status: new_status,
        detail,
    });
}

/// The top-level engine handle.
///
/// `ParleyEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<ParleyEngine>` to share between the host application and
/// event-forwarding tasks.
pub struct ParleyEngine {
    config: EngineConfig,
    stt: SttHandle,
    chat: ChatHandle,
    tts: TtsHandle,
    /// Shared so each start() can build a fresh player on the speak thread
    /// (players may be `!Send`).
    player_factory: Arc<dyn Fn() -> Result<Box<dyn Player>> + Send + Sync>,
    /// `true` while the workers are active.
    running: Arc<AtomicBool>,
    /// Canonical status (written via Mutex, read from host commands).
    status: Arc<Mutex<EngineStatus>>,
    /// In-flight fragment counter shared by capture, respond, and speak.
    gate: Arc<SpeakingGate>,
    conversation_tx: broadcast::Sender<ConversationEvent>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Monotonically increasing conversation event sequence counter.
    seq: Arc<AtomicU64>,
    /// Independent sequence for activity events.
    activity_seq: Arc<AtomicU64>,
    diagnostics: Arc<EngineDiagnostics>,
    workers: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl ParleyEngine {
    /// Create a new engine. Does not start capturing — call `warm_up()` then
    /// `start()`.
    pub fn new(
        config: EngineConfig,
        stt: SttHandle,
        chat: ChatHandle,
        tts: TtsHandle,
        player_factory: PlayerFactory,
    ) -> Self {
        let (conversation_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            stt,
            chat,
            tts,
            player_factory: Arc::from(player_factory),
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            gate: Arc::new(SpeakingGate::new()),
            conversation_tx,
            activity_tx,
            status_tx,
            seq: Arc::new(AtomicU64::new(0)),
            activity_seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(EngineDiagnostics::default()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Warm up all backends (credential checks, voice loads).
    ///
    /// Call once at application startup, before `start()`.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        info!("warming up backends");
        self.stt.0.lock().warm_up()?;
        self.chat.0.lock().warm_up()?;
        self.tts.0.lock().warm_up()?;
        self.set_status(EngineStatus::Idle, None);
        info!("backends ready");
        Ok(())
    }

    /// Start audio capture and the four pipeline workers.
    ///
    /// Blocks until the audio device and the output player are confirmed
    /// open (or fail), then returns. The workers continue in background
    /// threads.
    ///
    /// # Errors
    /// - `ParleyError::AlreadyRunning` if already started.
    /// - `ParleyError::NoDefaultInputDevice` / `ParleyError::AudioStream` on
    ///   device error.
    /// - `ParleyError::Playback` if the output device cannot be opened.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    ///
    /// If `preferred_input_device` is `None`, default input selection is used.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ParleyError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);
        self.set_status(EngineStatus::Listening, None);

        let (batch_tx, batch_rx) = crossbeam_channel::unbounded();
        let (utterance_tx, utterance_rx) = crossbeam_channel::unbounded();
        let (fragment_tx, fragment_rx) = crossbeam_channel::unbounded();

        // Sync oneshots: worker threads confirm device/player open to start().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();
        let (player_tx, player_rx) = std::sync::mpsc::channel::<Result<()>>();

        let mut workers = self.workers.lock();

        // ── Capture thread (owns the !Send cpal stream, reopens on failure) ──
        {
            let config = self.config.clone();
            let running = Arc::clone(&self.running);
            let gate = Arc::clone(&self.gate);
            let activity_tx = self.activity_tx.clone();
            let activity_seq = Arc::clone(&self.activity_seq);
            let diagnostics = Arc::clone(&self.diagnostics);
            let status = Arc::clone(&self.status);
            let status_tx = self.status_tx.clone();

            let handle = std::thread::Builder::new()
                .name("parley-capture".into())
                .spawn(move || {
                    capture_thread(
                        config,
                        preferred_input_device,
                        running,
                        gate,
                        batch_tx,
                        activity_tx,
                        activity_seq,
                        diagnostics,
                        status,
                        status_tx,
                        open_tx,
                    )
                })
                .expect("spawn capture thread");
            workers.push(handle);
        }

        // ── Transcribe thread ────────────────────────────────────────────────
        {
            let ctx = transcriber::TranscriberContext {
                config: self.config.clone(),
                stt: self.stt.clone(),
                batch_rx,
                utterance_tx,
                conversation_tx: self.conversation_tx.clone(),
                seq: Arc::clone(&self.seq),
                running: Arc::clone(&self.running),
                diagnostics: Arc::clone(&self.diagnostics),
            };
            let handle = std::thread::Builder::new()
                .name("parley-transcribe".into())
                .spawn(move || transcriber::run(ctx))
                .expect("spawn transcribe thread");
            workers.push(handle);
        }

        // ── Respond thread ───────────────────────────────────────────────────
        {
            let ctx = responder::ResponderContext {
                config: self.config.clone(),
                chat: self.chat.clone(),
                utterance_rx,
                fragment_tx,
                gate: Arc::clone(&self.gate),
                conversation_tx: self.conversation_tx.clone(),
                seq: Arc::clone(&self.seq),
                running: Arc::clone(&self.running),
                diagnostics: Arc::clone(&self.diagnostics),
            };
            let handle = std::thread::Builder::new()
                .name("parley-respond".into())
                .spawn(move || responder::run(ctx))
                .expect("spawn respond thread");
            workers.push(handle);
        }

        // ── Speak thread (owns the !Send player) ─────────────────────────────
        {
            let ctx = speaker::SpeakerContext {
                tts: self.tts.clone(),
                fragment_rx,
                gate: Arc::clone(&self.gate),
                status: Arc::clone(&self.status),
                status_tx: self.status_tx.clone(),
                running: Arc::clone(&self.running),
                diagnostics: Arc::clone(&self.diagnostics),
            };
            let factory = Arc::clone(&self.player_factory);
            let handle = std::thread::Builder::new()
                .name("parley-speak".into())
                .spawn(move || match (factory.as_ref())() {
                    Ok(player) => {
                        let _ = player_tx.send(Ok(()));
                        speaker::run(ctx, player)
                    }
                    Err(e) => {
                        let _ = player_tx.send(Err(e));
                    }
                })
                .expect("spawn speak thread");
            workers.push(handle);
        }

        drop(workers);

        // Block start() until the device and player are confirmed.
        let open_result = open_rx
            .recv()
            .unwrap_or_else(|_| Err(ParleyError::AudioStream("capture thread died".into())));
        let player_result = player_rx
            .recv()
            .unwrap_or_else(|_| Err(ParleyError::Playback("speak thread died".into())));

        match open_result.and(player_result) {
            Ok(()) => {
                info!("engine started — listening");
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                self.join_workers();
                Err(e)
            }
        }
    }

    /// Stop the workers and release the audio devices.
    ///
    /// # Errors
    /// - `ParleyError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(ParleyError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        info!("engine stop requested");
        self.join_workers();
        self.set_status(EngineStatus::Stopped, None);

        let snap = self.diagnostics.snapshot();
        info!(
            batches_captured = snap.batches_captured,
            stt_passes = snap.stt_passes,
            utterances = snap.utterances_emitted,
            chat_requests = snap.chat_requests,
            fragments_played = snap.fragments_played,
            "engine stopped — diagnostics"
        );
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to conversation events (utterances, tokens, fragments).
    pub fn subscribe_conversation(&self) -> broadcast::Receiver<ConversationEvent> {
        self.conversation_tx.subscribe()
    }

    /// Subscribe to per-batch activity events (RMS level + mute state).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        set_status(&self.status, &self.status_tx, new_status, detail);
    }

    fn join_workers(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.join() {
                warn!("worker thread panicked: {e:?}");
            }
        }
    }
}

/// Body of the capture thread: open the device, run the capture worker, and
/// reopen with bounded backoff when the stream fails. The first open result
/// is reported to `start()`; a first-open failure aborts the engine, while
/// later failures only degrade capture until the device returns.
#[allow(clippy::too_many_arguments)]
fn capture_thread(
    config: EngineConfig,
    preferred_input_device: Option<String>,
    running: Arc<AtomicBool>,
    gate: Arc<SpeakingGate>,
    batch_tx: crossbeam_channel::Sender<crate::buffering::batch::FrameBatch>,
    activity_tx: broadcast::Sender<ActivityEvent>,
    activity_seq: Arc<AtomicU64>,
    diagnostics: Arc<EngineDiagnostics>,
    status: Arc<Mutex<EngineStatus>>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    open_tx: std::sync::mpsc::Sender<Result<u32>>,
) {
    let mut first_open = Some(open_tx);
    let mut backoff = REOPEN_BACKOFF_INITIAL;

    while running.load(Ordering::SeqCst) {
        let (producer, consumer) = create_capture_ring();

        let stream = match CaptureStream::open(
            producer,
            Arc::clone(&running),
            preferred_input_device.as_deref(),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                if let Some(tx) = first_open.take() {
                    let _ = tx.send(Err(e));
                    return;
                }
                warn!(error = %e, backoff_ms = backoff.as_millis() as u64, "device reopen failed");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(REOPEN_BACKOFF_MAX);
                continue;
            }
        };

        if let Some(tx) = first_open.take() {
            let _ = tx.send(Ok(stream.sample_rate));
        }
        backoff = REOPEN_BACKOFF_INITIAL;

        let exit = capture::run(capture::CaptureContext {
            config: config.clone(),
            consumer,
            capture_sample_rate: stream.sample_rate,
            stream_failed: stream.failure_flag(),
            running: Arc::clone(&running),
            gate: Arc::clone(&gate),
            batch_tx: batch_tx.clone(),
            activity_tx: activity_tx.clone(),
            activity_seq: Arc::clone(&activity_seq),
            diagnostics: Arc::clone(&diagnostics),
        });

        // Stream drops here, releasing the input device on this thread.
        drop(stream);

        match exit {
            capture::CaptureExit::Stopped => break,
            capture::CaptureExit::StreamFailed => {
                set_status(
                    &status,
                    &status_tx,
                    EngineStatus::Listening,
                    Some("audio stream failed; reopening input device".into()),
                );
                std::thread::sleep(backoff);
            }
        }
    }
}
