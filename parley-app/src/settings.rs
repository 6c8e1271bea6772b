//! Persistent application settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub persona: String,
    pub preferred_input_device: Option<String>,
    pub chat_model: String,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub api_base_url: String,
    pub language_hint: String,
    pub no_speech_threshold: f32,
    pub history_window: usize,
    pub chat_attempts: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            persona: "assistant".into(),
            preferred_input_device: None,
            chat_model: "gpt-4o-mini".into(),
            stt_model: "whisper-1".into(),
            tts_model: "tts-1".into(),
            tts_voice: "alloy".into(),
            api_base_url: "https://api.openai.com/v1".into(),
            language_hint: "english".into(),
            no_speech_threshold: 0.4,
            history_window: 4,
            chat_attempts: 3,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.persona = self.persona.trim().to_ascii_lowercase();
        if self.persona.is_empty() {
            self.persona = "assistant".into();
        }
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        if self.api_base_url.is_empty() {
            self.api_base_url = "https://api.openai.com/v1".into();
        }
        self.no_speech_threshold = self.no_speech_threshold.clamp(0.0, 1.0);
        self.history_window = self.history_window.clamp(1, 64);
        self.chat_attempts = self.chat_attempts.clamp(1, 10);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Parley")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("parley")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_round_trip() {
        let dir = std::env::temp_dir().join(format!("parley-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");

        let settings = AppSettings::default();
        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path);

        assert_eq!(loaded.persona, "assistant");
        assert_eq!(loaded.history_window, 4);
        assert_eq!(loaded.api_base_url, "https://api.openai.com/v1");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn normalize_clamps_and_defaults() {
        let mut settings = AppSettings {
            persona: "  CATTY ".into(),
            api_base_url: "https://example.com/v1///".into(),
            no_speech_threshold: 7.0,
            history_window: 0,
            chat_attempts: 99,
            ..AppSettings::default()
        };
        settings.normalize();

        assert_eq!(settings.persona, "catty");
        assert_eq!(settings.api_base_url, "https://example.com/v1");
        assert_eq!(settings.no_speech_threshold, 1.0);
        assert_eq!(settings.history_window, 1);
        assert_eq!(settings.chat_attempts, 10);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = load_settings(Path::new("/nonexistent/parley/settings.json"));
        assert_eq!(settings.persona, "assistant");
    }
}
