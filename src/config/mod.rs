//! Configuration management for the tutor mascot

pub mod file;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::voice::{DEFAULT_ENGINE_VOICES, DEFAULT_PREFERRED_VOICES, Prosody, Voice};
use crate::{Error, Result};

/// Default inference backend
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default OpenAI-compatible API base for STT and TTS
pub const DEFAULT_SPEECH_API_URL: &str = "https://api.openai.com/v1";

/// Tutor mascot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the inference backend
    pub api_url: String,

    /// API keys
    pub api_keys: ApiKeys,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Microphone endpointing
    pub capture: CaptureConfig,

    /// Mascot behaviour
    pub mascot: MascotConfig,

    /// Development backend
    pub server: ServerConfig,
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<String>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("openai", &self.openai.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Voice capture and synthesis configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Whisper-compatible API base URL
    pub stt_url: String,

    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// Recognition language hint
    pub language: String,

    /// Speech API base URL
    pub tts_url: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// Voices offered by the speech engine
    pub voices: Vec<Voice>,

    /// Voice name fragments tried first, in order
    pub preferred_voices: Vec<String>,

    /// Pitch, rate and volume applied to every utterance
    pub prosody: Prosody,
}

/// Microphone endpointing configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// How long to wait for speech to begin before giving up
    pub listen_timeout: Duration,

    /// Longest utterance accepted
    pub max_utterance: Duration,

    /// RMS energy above which a chunk counts as speech
    pub energy_threshold: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            listen_timeout: Duration::from_secs(8),
            max_utterance: Duration::from_secs(15),
            energy_threshold: 0.03,
        }
    }
}

/// Mascot behaviour configuration
#[derive(Debug, Clone)]
pub struct MascotConfig {
    /// How long a non-neutral emotion stays on screen
    pub emotion_revert: Duration,

    /// What happens to the question when the backend call fails
    pub failed_turn_policy: FailedTurnPolicy,
}

impl Default for MascotConfig {
    fn default() -> Self {
        Self {
            emotion_revert: Duration::from_secs(5),
            failed_turn_policy: FailedTurnPolicy::default(),
        }
    }
}

/// Development backend configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,

    /// CORS origins allowed to call the backend
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Whether a question survives a failed backend call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailedTurnPolicy {
    /// The question is logged together with its answer, so a failure logs nothing
    #[default]
    Discard,
    /// The question is logged as soon as it is heard and stays on failure
    KeepQuestion,
}

impl FromStr for FailedTurnPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "discard" => Ok(Self::Discard),
            "keep-question" | "keep" => Ok(Self::KeepQuestion),
            other => Err(Error::Config(format!(
                "unknown failed turn policy '{other}' (expected 'discard' or 'keep-question')"
            ))),
        }
    }
}

impl fmt::Display for FailedTurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => write!(f, "discard"),
            Self::KeepQuestion => write!(f, "keep-question"),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a setting has an invalid value
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > file > default.
    ///
    /// # Errors
    ///
    /// Returns error if a setting has an invalid value
    pub fn from_sources(
        fc: file::MascotConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_url = env("MASCOT_API_URL")
            .or_else(|| env("REACT_APP_API_URL"))
            .or(fc.api.url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
        };

        let defaults = Prosody::default();
        let prosody = Prosody {
            pitch: env("MASCOT_VOICE_PITCH")
                .and_then(|s| s.parse().ok())
                .or(fc.voice.pitch)
                .unwrap_or(defaults.pitch),
            rate: env("MASCOT_VOICE_RATE")
                .and_then(|s| s.parse().ok())
                .or(fc.voice.rate)
                .unwrap_or(defaults.rate),
            volume: fc.voice.volume.unwrap_or(defaults.volume).clamp(0.0, 1.0),
        };
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(prosody.pitch) || !positive(prosody.rate) {
            return Err(Error::Config(format!(
                "voice pitch and rate must be positive and finite (pitch {}, rate {})",
                prosody.pitch, prosody.rate
            )));
        }

        let voices = fc.voice.voices.map_or_else(
            || {
                DEFAULT_ENGINE_VOICES
                    .iter()
                    .map(|name| Voice::new(*name, "en-US"))
                    .collect()
            },
            |entries| entries.iter().map(|e| Voice::parse(e)).collect(),
        );

        let voice = VoiceConfig {
            stt_url: env("MASCOT_STT_URL")
                .or(fc.voice.stt_url)
                .unwrap_or_else(|| DEFAULT_SPEECH_API_URL.to_string()),
            stt_model: env("MASCOT_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            language: fc.voice.language.unwrap_or_else(|| "en".to_string()),
            tts_url: env("MASCOT_TTS_URL")
                .or(fc.voice.tts_url)
                .unwrap_or_else(|| DEFAULT_SPEECH_API_URL.to_string()),
            tts_model: env("MASCOT_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            voices,
            preferred_voices: fc.voice.preferred.unwrap_or_else(|| {
                DEFAULT_PREFERRED_VOICES
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
            prosody,
        };

        let capture_defaults = CaptureConfig::default();
        let capture = CaptureConfig {
            listen_timeout: fc
                .capture
                .listen_timeout_secs
                .map_or(capture_defaults.listen_timeout, Duration::from_secs_f32),
            max_utterance: fc
                .capture
                .max_utterance_secs
                .map_or(capture_defaults.max_utterance, Duration::from_secs_f32),
            energy_threshold: fc
                .capture
                .energy_threshold
                .unwrap_or(capture_defaults.energy_threshold),
        };

        let failed_turn_policy = match env("MASCOT_FAILED_TURN_POLICY") {
            Some(value) => value.parse()?,
            None => fc.mascot.failed_turn_policy.unwrap_or_default(),
        };
        let mascot = MascotConfig {
            emotion_revert: env("MASCOT_EMOTION_REVERT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.mascot.emotion_revert_secs)
                .map_or(MascotConfig::default().emotion_revert, Duration::from_secs),
            failed_turn_policy,
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            port: env("MASCOT_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(server_defaults.port),
            allowed_origins: fc
                .server
                .allowed_origins
                .unwrap_or(server_defaults.allowed_origins),
        };

        Ok(Self {
            api_url,
            api_keys,
            voice,
            capture,
            mascot,
            server,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::file::MascotConfigFile;
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(MascotConfigFile::default(), env_of(&[])).unwrap();

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.voice.stt_model, "whisper-1");
        assert_eq!(config.voice.tts_model, "tts-1");
        assert!((config.voice.prosody.pitch - 1.2).abs() < f32::EPSILON);
        assert!((config.voice.prosody.rate - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.voice.preferred_voices[0], "Google UK Female");
        assert!(config.voice.voices.iter().all(Voice::is_english));
        assert_eq!(config.mascot.emotion_revert, Duration::from_secs(5));
        assert_eq!(config.mascot.failed_turn_policy, FailedTurnPolicy::Discard);
        assert_eq!(config.server.port, 8000);
        assert!(config.api_keys.openai.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = MascotConfigFile::default();
        fc.api.url = Some("http://from-file:8000".to_string());
        fc.mascot.emotion_revert_secs = Some(9);

        let config = Config::from_sources(
            fc,
            env_of(&[
                ("MASCOT_API_URL", "http://from-env:7000/"),
                ("MASCOT_EMOTION_REVERT_SECS", "2"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_url, "http://from-env:7000");
        assert_eq!(config.mascot.emotion_revert, Duration::from_secs(2));
    }

    #[test]
    fn test_react_app_url_fallback() {
        let config = Config::from_sources(
            MascotConfigFile::default(),
            env_of(&[("REACT_APP_API_URL", "http://legacy:8000")]),
        )
        .unwrap();

        assert_eq!(config.api_url, "http://legacy:8000");
    }

    #[test]
    fn test_file_voices_parsed() {
        let mut fc = MascotConfigFile::default();
        fc.voice.voices = Some(vec!["Daniel:en-GB".to_string(), "nova".to_string()]);

        let config = Config::from_sources(fc, env_of(&[])).unwrap();

        assert_eq!(config.voice.voices[0].name, "Daniel");
        assert_eq!(config.voice.voices[0].lang, "en-GB");
        assert_eq!(config.voice.voices[1].lang, "en-US");
    }

    #[test]
    fn test_policy_from_env() {
        let config = Config::from_sources(
            MascotConfigFile::default(),
            env_of(&[("MASCOT_FAILED_TURN_POLICY", "keep_question")]),
        )
        .unwrap();

        assert_eq!(
            config.mascot.failed_turn_policy,
            FailedTurnPolicy::KeepQuestion
        );
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let result = Config::from_sources(
            MascotConfigFile::default(),
            env_of(&[("MASCOT_FAILED_TURN_POLICY", "sometimes")]),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_non_positive_pitch_rejected() {
        let result = Config::from_sources(
            MascotConfigFile::default(),
            env_of(&[("MASCOT_VOICE_PITCH", "0")]),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_non_finite_prosody_rejected() {
        for (key, value) in [
            ("MASCOT_VOICE_PITCH", "NaN"),
            ("MASCOT_VOICE_PITCH", "inf"),
            ("MASCOT_VOICE_RATE", "NaN"),
        ] {
            let result = Config::from_sources(MascotConfigFile::default(), env_of(&[(key, value)]));
            assert!(matches!(result, Err(Error::Config(_))), "{key}={value}");
        }
    }

    #[test]
    fn test_policy_display_roundtrips() {
        for policy in [FailedTurnPolicy::Discard, FailedTurnPolicy::KeepQuestion] {
            assert_eq!(policy.to_string().parse::<FailedTurnPolicy>().unwrap(), policy);
        }
    }
}
