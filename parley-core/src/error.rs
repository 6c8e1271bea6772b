use thiserror::Error;

/// All errors produced by parley-core.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("speech-to-text error: {0}")]
    Stt(String),

    #[error("chat completion error: {0}")]
    Chat(String),

    #[error("chat completion failed after {attempts} attempts: {last}")]
    ChatExhausted { attempts: usize, last: String },

    #[error("speech synthesis error: {0}")]
    Tts(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("missing API credential: set the {0} environment variable")]
    MissingCredential(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;
