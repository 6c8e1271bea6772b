//! Speak worker — synthesis and strict-FIFO playback.
//!
//! A single thread pops fragments in arrival order, so waveforms are always
//! spoken in generation order. Playback blocks until the audio has finished;
//! only then is the fragment's gate registration released. The engine status
//! tracks the gate: Speaking while any fragment is in flight, Listening once
//! the counter returns to zero.
//!
//! Synthesis and playback errors release the gate for the failed fragment
//! and move on — one bad fragment must not mute the microphone forever.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    engine::{diagnostics::EngineDiagnostics, gate::SpeakingGate, set_status, QUEUE_POLL},
    events::{EngineStatus, EngineStatusEvent},
    playback::Player,
    tts::TtsHandle,
};

/// All context the speak worker needs, passed as one struct.
///
/// The `Player` is passed separately because it may be `!Send` and must be
/// constructed on this worker's thread.
pub struct SpeakerContext {
    pub tts: TtsHandle,
    pub fragment_rx: Receiver<String>,
    pub gate: Arc<SpeakingGate>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<EngineDiagnostics>,
}

/// Run the speak loop until the running flag clears.
pub fn run(ctx: SpeakerContext, mut player: Box<dyn Player>) {
    info!("speak worker started");

    loop {
        let fragment = match ctx.fragment_rx.recv_timeout(QUEUE_POLL) {
            Ok(fragment) => fragment,
            Err(RecvTimeoutError::Timeout) => {
                if !ctx.running.load(Ordering::Relaxed) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        set_status(&ctx.status, &ctx.status_tx, EngineStatus::Speaking, None);

        let waveform = {
            let mut tts = ctx.tts.0.lock();
            match tts.synthesize(&fragment) {
                Ok(w) => w,
                Err(e) => {
                    ctx.diagnostics.synth_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "synthesis failed — skipping fragment");
                    release(&ctx);
                    continue;
                }
            }
        };

        debug!(
            chars = fragment.len(),
            seconds = waveform.duration_secs(),
            "playing fragment"
        );

        if let Err(e) = player.play(&waveform) {
            warn!(error = %e, "playback failed");
        } else {
            ctx.diagnostics
                .fragments_played
                .fetch_add(1, Ordering::Relaxed);
        }

        release(&ctx);
    }

    info!("speak worker stopped");
}

/// Release one gate registration; back to Listening when none remain.
fn release(ctx: &SpeakerContext) {
    if ctx.gate.finish_fragment() {
        set_status(&ctx.status, &ctx.status_tx, EngineStatus::Listening, None);
    }
}
