//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by writing directly into an SPSC ring
//! buffer producer whose `push_slice` is lock-free and allocation-free. The
//! only per-callback allocation is the reused channel-downmix scratch buffer,
//! which reaches a steady size after the first callback.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `CaptureStream` therefore must be created and dropped on the same
//! thread. The engine accomplishes this by opening it inside the capture
//! worker thread, which also lets the worker reopen the device with backoff
//! after a stream failure.

pub mod device;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::{
    buffering::{CaptureProducer, Producer},
    error::{ParleyError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct CaptureStream {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Set by the cpal error callback when the stream dies. The capture
    /// worker polls this and reopens the device.
    failed: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Downmix an interleaved frame buffer to mono, converting samples via `conv`.
#[cfg(feature = "audio-cpal")]
fn downmix_to_mono<T: Copy>(out: &mut Vec<f32>, data: &[T], channels: usize, conv: impl Fn(T) -> f32) {
    let frames = data.len() / channels;
    out.resize(frames, 0.0);
    if channels == 1 {
        for (dst, src) in out.iter_mut().zip(data.iter()) {
            *dst = conv(*src);
        }
        return;
    }
    for (frame, dst) in out.iter_mut().enumerate() {
        let base = frame * channels;
        let mut sum = 0f32;
        for c in 0..channels {
            sum += conv(data[base + c]);
        }
        *dst = sum / channels as f32;
    }
}

impl CaptureStream {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    ///
    /// Mono f32 frames are pushed into `producer` from the RT callback.
    /// The callback no-ops while `running` is false.
    ///
    /// # Errors
    /// Returns `ParleyError::NoDefaultInputDevice` when no microphone is
    /// available, or `ParleyError::AudioStream` if cpal fails to build the
    /// stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        mut producer: CaptureProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(ParleyError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels: channels as u16,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let failed = Arc::new(AtomicBool::new(false));
        let err_failed = Arc::clone(&failed);
        let err_cb = move |err| {
            error!("audio stream error: {err}");
            err_failed.store(true, Ordering::Release);
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_to_mono(&mut mix_buf, data, channels, |s| s);
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
                        }
                    },
                    err_cb,
                    None,
                )
            }

            SampleFormat::I16 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_to_mono(&mut mix_buf, data, channels, |s| s as f32 / 32768.0);
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
                        }
                    },
                    err_cb,
                    None,
                )
            }

            SampleFormat::U8 => {
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }
                        downmix_to_mono(&mut mix_buf, data, channels, |s| {
                            (s as f32 - 128.0) / 128.0
                        });
                        let written = producer.push_slice(&mix_buf);
                        if written < mix_buf.len() {
                            warn!("capture ring full: dropped {} frames", mix_buf.len() - written);
                        }
                    },
                    err_cb,
                    None,
                )
            }

            fmt => {
                return Err(ParleyError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            failed,
            sample_rate,
        })
    }

    /// Whether the stream has reported a fatal error since opening.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Shared failure flag, polled by the capture worker to trigger a reopen.
    pub fn failure_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.failed)
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl CaptureStream {
    pub fn open(
        _producer: CaptureProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(ParleyError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
