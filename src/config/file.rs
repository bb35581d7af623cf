//! TOML configuration file loading
//!
//! Supports `~/.config/tutor-mascot/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::FailedTurnPolicy;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MascotConfigFile {
    /// Inference backend
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Voice capture and synthesis
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Microphone endpointing
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Mascot behaviour
    #[serde(default)]
    pub mascot: MascotFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Development backend
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Inference backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL of the `/query` and `/chat` endpoints
    pub url: Option<String>,
}

/// Voice configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Whisper-compatible API base URL
    pub stt_url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Recognition language hint (e.g. "en")
    pub language: Option<String>,

    /// Speech API base URL
    pub tts_url: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// Voices offered by the speech engine, as `name` or `name:lang`
    pub voices: Option<Vec<String>>,

    /// Voice name fragments tried first, in order
    pub preferred: Option<Vec<String>>,

    /// Pitch multiplier
    pub pitch: Option<f32>,

    /// Rate multiplier
    pub rate: Option<f32>,

    /// Output volume (0.0 to 1.0)
    pub volume: Option<f32>,
}

/// Microphone endpointing configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Seconds to wait for speech to begin
    pub listen_timeout_secs: Option<f32>,

    /// Longest utterance in seconds
    pub max_utterance_secs: Option<f32>,

    /// RMS energy above which a chunk counts as speech
    pub energy_threshold: Option<f32>,
}

/// Mascot behaviour configuration
#[derive(Debug, Default, Deserialize)]
pub struct MascotFileConfig {
    /// Seconds before a non-neutral emotion falls back to neutral
    pub emotion_revert_secs: Option<u64>,

    /// What happens to the question when the backend call fails
    pub failed_turn_policy: Option<FailedTurnPolicy>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

/// Development backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Listen port
    pub port: Option<u16>,

    /// CORS origins allowed to call the backend
    pub allowed_origins: Option<Vec<String>>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MascotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MascotConfigFile {
    config_file_path().map_or_else(MascotConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files yield defaults.
pub fn load_config_file_from(path: &Path) -> MascotConfigFile {
    if !path.exists() {
        return MascotConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                MascotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MascotConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/tutor-mascot/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("tutor-mascot").join("config.toml"))
}
