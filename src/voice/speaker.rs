//! Speech playback with start/end/failure events
//!
//! [`Speaker`] owns the single synthesis engine. Each call to
//! [`Speaker::speak`] cancels the utterance before it and returns a stream
//! of [`PlaybackEvent`]s for the new one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::playback::{AudioPlayback, apply_volume, decode_mp3, shift_pitch};
use super::tts::TextToSpeech;
use super::voices::{Prosody, Voice, select_voice};

/// Why an utterance did not play to the end
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// No output device or synthesis backend
    #[error("speech synthesis unavailable")]
    Unsupported,

    /// Nothing to say
    #[error("empty text")]
    EmptyText,

    /// Cancelled by `stop()` or a newer utterance
    #[error("interrupted")]
    Interrupted,

    /// The engine failed while synthesizing or playing
    #[error("synthesis failed: {0}")]
    Engine(String),
}

/// Observable moments of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Audio began playing
    Started,
    /// Audio played to the end
    Ended,
    /// The utterance failed, before or after starting
    Failed(PlaybackError),
}

/// Text plus the voice and prosody to speak it with
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub prosody: Prosody,
}

/// Handle an engine uses to report that audio started
#[derive(Clone)]
pub struct PlaybackSink {
    started: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackSink {
    fn new(tx: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self {
            started: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Report that audio is playing; only the first call emits an event
    pub fn started(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(PlaybackEvent::Started);
        }
    }

    /// Whether `started` has been reported
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }
}

/// A speech synthesis backend
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Whether the engine can speak at all
    fn is_available(&self) -> bool;

    /// Voices the engine offers
    fn voices(&self) -> Vec<Voice>;

    /// Speak one utterance to completion
    ///
    /// Implementations call [`PlaybackSink::started`] when audio begins and
    /// return [`PlaybackError::Interrupted`] once `cancel` fires.
    async fn utter(
        &self,
        utterance: &Utterance,
        sink: &PlaybackSink,
        cancel: CancellationToken,
    ) -> Result<(), PlaybackError>;
}

/// Events for one utterance
pub struct PlaybackEvents {
    rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl PlaybackEvents {
    /// Next event, or `None` once the utterance has settled
    pub async fn recv(&mut self) -> Option<PlaybackEvent> {
        self.rx.recv().await
    }
}

struct ActiveUtterance {
    id: u64,
    cancel: CancellationToken,
}

/// The playback adapter: one engine, at most one utterance at a time
pub struct Speaker {
    engine: Arc<dyn SynthesisEngine>,
    prosody: Prosody,
    preferred_voices: Vec<String>,
    active: Arc<Mutex<Option<ActiveUtterance>>>,
    next_id: AtomicU64,
}

impl Speaker {
    #[must_use]
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        prosody: Prosody,
        preferred_voices: Vec<String>,
    ) -> Self {
        Self {
            engine,
            prosody,
            preferred_voices,
            active: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    /// Voice that `speak` would use right now
    #[must_use]
    pub fn selected_voice(&self) -> Option<Voice> {
        let voices = self.engine.voices();
        select_voice(&voices, self.preferred_voices.as_slice()).cloned()
    }

    /// All voices the engine offers
    #[must_use]
    pub fn voices(&self) -> Vec<Voice> {
        self.engine.voices()
    }

    /// Whether an utterance is in flight
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Speak `text`, cancelling any utterance already in flight
    ///
    /// Must be called within a tokio runtime. Failures, including an
    /// unavailable engine or empty text, arrive as [`PlaybackEvent::Failed`].
    pub fn speak(&self, text: &str) -> PlaybackEvents {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = PlaybackEvents { rx };

        if !self.engine.is_available() {
            tracing::warn!("speech synthesis unavailable");
            let _ = tx.send(PlaybackEvent::Failed(PlaybackError::Unsupported));
            return events;
        }

        let text = text.trim();
        if text.is_empty() {
            let _ = tx.send(PlaybackEvent::Failed(PlaybackError::EmptyText));
            return events;
        }

        self.stop();

        let utterance = Utterance {
            text: text.to_string(),
            voice: self.selected_voice(),
            prosody: self.prosody,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(ActiveUtterance {
            id,
            cancel: cancel.clone(),
        });

        tracing::debug!(
            id,
            voice = utterance.voice.as_ref().map_or("<none>", |v| v.name.as_str()),
            chars = utterance.text.len(),
            "speaking"
        );

        let engine = Arc::clone(&self.engine);
        let active = Arc::clone(&self.active);
        let sink = PlaybackSink::new(tx.clone());

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(PlaybackError::Interrupted),
                result = engine.utter(&utterance, &sink, cancel.clone()) => result,
            };

            {
                let mut guard = active.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.as_ref().is_some_and(|a| a.id == id) {
                    *guard = None;
                }
            }

            let event = match result {
                Ok(()) => {
                    // an engine that finished silently still played the utterance
                    if !sink.has_started() {
                        sink.started();
                    }
                    PlaybackEvent::Ended
                }
                Err(e) => {
                    tracing::debug!(id, error = %e, "utterance did not finish");
                    PlaybackEvent::Failed(e)
                }
            };
            let _ = tx.send(event);
        });

        events
    }

    /// Cancel the active utterance, if any
    pub fn stop(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(active) = active {
            tracing::debug!(id = active.id, "stopping utterance");
            active.cancel.cancel();
        }
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Synthesizes through a speech API and plays through the default output
pub struct CloudSpeechEngine {
    tts: TextToSpeech,
    playback: Option<AudioPlayback>,
    voices: Vec<Voice>,
}

impl CloudSpeechEngine {
    /// Create the engine, probing the output device once
    #[must_use]
    pub fn new(tts: TextToSpeech, voices: Vec<Voice>) -> Self {
        let playback = AudioPlayback::new()
            .map_err(|e| tracing::warn!(error = %e, "no audio output; speech disabled"))
            .ok();

        if !tts.has_credentials() {
            tracing::warn!("no speech API key configured; hosted endpoints will reject requests");
        }

        Self {
            tts,
            playback,
            voices,
        }
    }
}

#[async_trait]
impl SynthesisEngine for CloudSpeechEngine {
    fn is_available(&self) -> bool {
        self.playback.is_some() && !self.voices.is_empty()
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn utter(
        &self,
        utterance: &Utterance,
        sink: &PlaybackSink,
        cancel: CancellationToken,
    ) -> Result<(), PlaybackError> {
        let playback = self.playback.clone().ok_or(PlaybackError::Unsupported)?;
        let voice = utterance
            .voice
            .as_ref()
            .ok_or_else(|| PlaybackError::Engine("no voice available".to_string()))?;

        let Prosody {
            pitch,
            rate,
            volume,
        } = utterance.prosody;

        // pitch is raised by resampling, which also speeds the clip up
        let speed = rate / pitch;
        let mp3 = self
            .tts
            .synthesize(&utterance.text, &voice.name, speed)
            .await
            .map_err(|e| PlaybackError::Engine(e.to_string()))?;

        if cancel.is_cancelled() {
            return Err(PlaybackError::Interrupted);
        }

        let decoded = decode_mp3(&mp3).map_err(|e| PlaybackError::Engine(e.to_string()))?;
        let mut samples = shift_pitch(&decoded, pitch);
        apply_volume(&mut samples, volume);

        let sink = sink.clone();
        let completed = tokio::task::spawn_blocking(move || {
            playback.play_blocking(samples, &cancel, || sink.started())
        })
        .await
        .map_err(|e| PlaybackError::Engine(format!("playback task failed: {e}")))?
        .map_err(|e| PlaybackError::Engine(e.to_string()))?;

        if completed {
            Ok(())
        } else {
            Err(PlaybackError::Interrupted)
        }
    }
}
