//! Single-shot speech recognition
//!
//! One call to [`SpeechRecognizer::capture`] records one question and
//! settles exactly once: a non-empty transcript or a [`CaptureError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::detector::{DetectorState, UtteranceDetector};
use super::stt::SpeechToText;
use crate::config::CaptureConfig;

/// Poll interval for the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a capture produced no transcript
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No usable microphone or recognition service
    #[error("speech recognition not supported: {0}")]
    NotSupported(String),

    /// Capture ended without any recognised speech
    #[error("no speech detected")]
    NoSpeech,

    /// The recogniser failed
    #[error("recognition error: {0}")]
    Recognition(String),
}

/// Captures one spoken utterance as text
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Record and transcribe a single utterance
    async fn capture(&self) -> Result<String, CaptureError>;
}

/// Normalise a raw transcript, treating blank results as no speech
///
/// # Errors
///
/// Returns [`CaptureError::NoSpeech`] for an empty or whitespace transcript
pub fn finalize_transcript(raw: &str) -> Result<String, CaptureError> {
    let text = raw.trim();
    if text.is_empty() {
        Err(CaptureError::NoSpeech)
    } else {
        Ok(text.to_string())
    }
}

/// Microphone capture with energy endpointing and remote transcription
pub struct MicrophoneRecognizer {
    stt: SpeechToText,
    settings: CaptureConfig,
}

impl MicrophoneRecognizer {
    /// Create a recognizer using the default input device
    #[must_use]
    pub const fn new(stt: SpeechToText, settings: CaptureConfig) -> Self {
        Self { stt, settings }
    }
}

#[async_trait]
impl SpeechRecognizer for MicrophoneRecognizer {
    async fn capture(&self) -> Result<String, CaptureError> {
        let settings = self.settings.clone();

        // cpal streams are not Send, so the whole recording lives on one blocking thread
        let samples = tokio::task::spawn_blocking(move || record_utterance(&settings))
            .await
            .map_err(|e| CaptureError::Recognition(format!("capture task failed: {e}")))??;

        let wav = samples_to_wav(&samples, SAMPLE_RATE)
            .map_err(|e| CaptureError::Recognition(e.to_string()))?;

        let raw = self
            .stt
            .transcribe(&wav)
            .await
            .map_err(|e| CaptureError::Recognition(e.to_string()))?;

        finalize_transcript(&raw)
    }
}

/// Record from the microphone until the utterance ends
fn record_utterance(settings: &CaptureConfig) -> Result<Vec<f32>, CaptureError> {
    let mut capture =
        AudioCapture::new().map_err(|e| CaptureError::NotSupported(e.to_string()))?;
    capture
        .start()
        .map_err(|e| CaptureError::NotSupported(e.to_string()))?;

    let mut detector = UtteranceDetector::new(settings.energy_threshold);
    let started = Instant::now();

    tracing::debug!(
        listen_timeout_ms = settings.listen_timeout.as_millis(),
        "listening for utterance"
    );

    loop {
        std::thread::sleep(POLL_INTERVAL);

        let chunk = capture.take_buffer();
        let state = if chunk.is_empty() {
            detector.state()
        } else {
            detector.process(&chunk)
        };

        if state == DetectorState::Complete {
            break;
        }

        let elapsed = started.elapsed();
        if !detector.heard_speech() && elapsed > settings.listen_timeout {
            capture.stop();
            tracing::debug!("listen timeout without speech");
            return Err(CaptureError::NoSpeech);
        }
        if elapsed > settings.max_utterance {
            tracing::debug!("utterance cut at maximum length");
            break;
        }
    }

    capture.stop();

    if detector.heard_speech() {
        Ok(detector.take_speech_buffer())
    } else {
        Err(CaptureError::NoSpeech)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_trims() {
        assert_eq!(
            finalize_transcript("  What is two plus two \n").unwrap(),
            "What is two plus two"
        );
    }

    #[test]
    fn test_blank_transcript_is_no_speech() {
        assert_eq!(finalize_transcript(""), Err(CaptureError::NoSpeech));
        assert_eq!(finalize_transcript(" \t\n"), Err(CaptureError::NoSpeech));
    }
}
