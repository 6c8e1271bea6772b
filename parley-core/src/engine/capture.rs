//! Capture worker — drains the RT ring buffer into one-second frame batches.
//!
//! ## Per-iteration stages
//!
//! ```text
//! 1. Drain ring buffer → raw device-rate samples (one chunk per iteration)
//! 2. Resample to the target rate (passthrough when rates match)
//! 3. If the speaking gate is muted → discard (never transcribe our own voice)
//! 4. Accumulate samples; every `batch_samples` → emit one FrameBatch
//! 5. Broadcast an RMS activity event per batch
//! ```
//!
//! Returns `CaptureExit::StreamFailed` when the cpal error callback has
//! flagged the stream, so the owning thread can reopen the device with
//! backoff and call back in with a fresh ring consumer.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::{
    audio::resample::RateConverter,
    buffering::{batch::FrameBatch, CaptureConsumer, Consumer},
    engine::{diagnostics::EngineDiagnostics, gate::SpeakingGate, EngineConfig},
    events::ActivityEvent,
};

/// Chunk size drained from the ring buffer per iteration: 100 ms at 16 kHz.
pub(crate) const DRAIN_CHUNK: usize = 1600;

/// Minimum sleep when the ring is empty (avoids busy-wait burning a core).
const SLEEP_EMPTY: Duration = Duration::from_millis(5);

/// Why the capture loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// The running flag was cleared — engine stopping.
    Stopped,
    /// The audio stream reported a fatal error — reopen and retry.
    StreamFailed,
}

/// All context the capture worker needs, passed as one struct.
pub struct CaptureContext {
    pub config: EngineConfig,
    pub consumer: CaptureConsumer,
    pub capture_sample_rate: u32,
    pub stream_failed: Arc<AtomicBool>,
    pub running: Arc<AtomicBool>,
    pub gate: Arc<SpeakingGate>,
    pub batch_tx: Sender<FrameBatch>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub activity_seq: Arc<AtomicU64>,
    pub diagnostics: Arc<EngineDiagnostics>,
}

/// Run the capture loop until stop or stream failure.
pub fn run(mut ctx: CaptureContext) -> CaptureExit {
    info!(
        capture_rate = ctx.capture_sample_rate,
        target_rate = ctx.config.target_sample_rate,
        "capture worker started"
    );

    let mut resampler = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.config.target_sample_rate,
        DRAIN_CHUNK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            return CaptureExit::Stopped;
        }
    };

    // Scratch buffer reused each iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    // Samples accumulated toward the next batch.
    let mut pending: Vec<f32> = Vec::with_capacity(ctx.config.batch_samples);

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            return CaptureExit::Stopped;
        }
        if ctx.stream_failed.load(Ordering::Acquire) {
            return CaptureExit::StreamFailed;
        }

        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }

        let resampled = resampler.process(&raw[..n]);
        if resampled.is_empty() {
            // Partial chunk — waiting for more data to fill rubato's input buffer
            continue;
        }

        if ctx.gate.is_muted() {
            // Assistant audio is playing; drop everything captured meanwhile,
            // including any half-built batch from before playback began.
            pending.clear();
            ctx.diagnostics.batches_muted.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        pending.extend_from_slice(&resampled);

        while pending.len() >= ctx.config.batch_samples {
            let rest = pending.split_off(ctx.config.batch_samples);
            let batch = FrameBatch::new(
                std::mem::replace(&mut pending, rest),
                ctx.config.target_sample_rate,
            );

            let rms = batch.rms();
            let _ = ctx.activity_tx.send(ActivityEvent {
                seq: ctx.activity_seq.fetch_add(1, Ordering::Relaxed),
                rms,
                muted: false,
            });

            debug!(samples = batch.samples.len(), rms, "batch complete");
            ctx.diagnostics
                .batches_captured
                .fetch_add(1, Ordering::Relaxed);

            if ctx.batch_tx.send(batch).is_err() {
                // Transcriber is gone; nothing left to feed.
                return CaptureExit::Stopped;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crossbeam_channel::unbounded;

    use crate::buffering::{create_capture_ring, Producer};

    fn test_context(
        consumer: CaptureConsumer,
        batch_tx: Sender<FrameBatch>,
        gate: Arc<SpeakingGate>,
        running: Arc<AtomicBool>,
    ) -> CaptureContext {
        let (activity_tx, _) = broadcast::channel(64);
        let mut config = EngineConfig::default();
        config.batch_samples = 3200; // small batches keep the test fast

        CaptureContext {
            config,
            consumer,
            capture_sample_rate: 16_000, // passthrough — no resampling
            stream_failed: Arc::new(AtomicBool::new(false)),
            running,
            gate,
            batch_tx,
            activity_tx,
            activity_seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(EngineDiagnostics::default()),
        }
    }

    #[test]
    fn assembles_fixed_size_batches_in_order() {
        let (mut producer, consumer) = create_capture_ring();
        let (batch_tx, batch_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let ctx = test_context(
            consumer,
            batch_tx,
            Arc::new(SpeakingGate::new()),
            Arc::clone(&running),
        );

        // Two full batches plus a remainder that must stay pending.
        producer.push_slice(&vec![0.25f32; 3200 * 2 + 100]);

        let handle = std::thread::spawn(move || run(ctx));

        let first = batch_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("first batch");
        let second = batch_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("second batch");
        assert_eq!(first.samples.len(), 3200);
        assert_eq!(second.samples.len(), 3200);
        assert!((first.rms() - 0.25).abs() < 1e-5);

        assert!(
            batch_rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "remainder below batch size must not be emitted"
        );

        running.store(false, Ordering::SeqCst);
        assert_eq!(handle.join().unwrap(), CaptureExit::Stopped);
    }

    #[test]
    fn discards_audio_while_gate_is_muted() {
        let (mut producer, consumer) = create_capture_ring();
        let (batch_tx, batch_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let gate = Arc::new(SpeakingGate::new());
        gate.begin_fragment();

        let ctx = test_context(consumer, batch_tx, Arc::clone(&gate), Arc::clone(&running));
        producer.push_slice(&vec![0.5f32; 3200 * 3]);

        let handle = std::thread::spawn(move || run(ctx));

        assert!(
            batch_rx.recv_timeout(Duration::from_millis(150)).is_err(),
            "muted capture must not emit batches"
        );

        running.store(false, Ordering::SeqCst);
        assert_eq!(handle.join().unwrap(), CaptureExit::Stopped);
    }

    #[test]
    fn returns_stream_failed_when_flagged() {
        let (_producer, consumer) = create_capture_ring();
        let (batch_tx, _batch_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let mut ctx = test_context(
            consumer,
            batch_tx,
            Arc::new(SpeakingGate::new()),
            running,
        );
        ctx.stream_failed = Arc::new(AtomicBool::new(true));

        assert_eq!(run(ctx), CaptureExit::StreamFailed);
    }
}
