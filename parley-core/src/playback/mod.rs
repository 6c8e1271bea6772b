//! Waveform playback through the system output device.
//!
//! The `Player` trait is the seam the speaker worker talks to. The real
//! implementation serializes each waveform to a transient WAV file and plays
//! it to completion through rodio; the file is removed when playback ends.
//!
//! # Threading note
//!
//! `rodio::OutputStream` is bound to its creation thread on some platforms,
//! so `RodioPlayer` is created *inside* the speaker worker thread via a
//! factory closure, never moved across threads.

use crate::error::{ParleyError, Result};
use crate::tts::Waveform;

/// Contract for waveform playback. `play` blocks until audio finishes —
/// the speaker worker relies on this to keep fragments in order and to
/// release the speaking gate only after the sound has actually ended.
pub trait Player {
    fn play(&mut self, waveform: &Waveform) -> Result<()>;
}

/// Factory that builds a `Player` on the thread that will use it. Called
/// once per engine start, so restarts get a fresh device handle.
pub type PlayerFactory = Box<dyn Fn() -> Result<Box<dyn Player>> + Send + Sync>;

/// Discards all audio. Used in tests and headless runs.
#[derive(Debug, Default)]
pub struct NullPlayer;

impl Player for NullPlayer {
    fn play(&mut self, _waveform: &Waveform) -> Result<()> {
        Ok(())
    }
}

/// Write `waveform` as a 16-bit PCM WAV to `path`.
pub fn write_wav(path: &std::path::Path, waveform: &Waveform) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| ParleyError::Playback(format!("WAV write: {e}")))?;
    for &sample in &waveform.samples {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| ParleyError::Playback(format!("WAV write: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| ParleyError::Playback(format!("WAV write: {e}")))?;
    Ok(())
}

#[cfg(feature = "audio-cpal")]
pub use rodio_player::RodioPlayer;

#[cfg(feature = "audio-cpal")]
mod rodio_player {
    use std::fs::File;
    use std::io::BufReader;

    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
    use tracing::debug;

    use super::{write_wav, Player};
    use crate::error::{ParleyError, Result};
    use crate::tts::Waveform;

    /// Plays waveforms through the default output device.
    ///
    /// **Not `Send`** — construct on the speaker worker thread.
    pub struct RodioPlayer {
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl RodioPlayer {
        /// Open the default audio output device.
        pub fn new() -> Result<Self> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|e| ParleyError::Playback(format!("output device: {e}")))?;
            Ok(Self {
                _stream: stream,
                handle,
            })
        }
    }

    impl Player for RodioPlayer {
        fn play(&mut self, waveform: &Waveform) -> Result<()> {
            if waveform.is_empty() {
                return Ok(());
            }

            // Transient WAV: written, played, removed when the guard drops.
            let tmp = tempfile::Builder::new()
                .prefix("parley-speech-")
                .suffix(".wav")
                .tempfile()
                .map_err(|e| ParleyError::Playback(format!("temp file: {e}")))?;
            write_wav(tmp.path(), waveform)?;

            let file = File::open(tmp.path())
                .map_err(|e| ParleyError::Playback(format!("temp file open: {e}")))?;
            let source = Decoder::new(BufReader::new(file))
                .map_err(|e| ParleyError::Playback(format!("WAV decode: {e}")))?;

            let sink = Sink::try_new(&self.handle)
                .map_err(|e| ParleyError::Playback(format!("sink: {e}")))?;
            sink.append(source);
            sink.sleep_until_end();

            debug!(
                seconds = waveform.duration_secs(),
                "playback complete, removing transient file"
            );
            Ok(())
        }
    }
}
