//! Shared test utilities
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tutor_mascot::config::MascotConfig;
use tutor_mascot::voice::{PlaybackSink, Utterance};
use tutor_mascot::{
    CaptureError, ChatReply, CoordinatorEvent, Emotion, Error, Exchange, FailedTurnPolicy,
    Inference, PlaybackError, Prosody, Reply, Result, Speaker, SpeechRecognizer, Status,
    SynthesisEngine, TurnCoordinator, Voice,
};

/// Recognizer that returns scripted transcripts
#[derive(Default)]
pub struct FakeRecognizer {
    results: Mutex<VecDeque<std::result::Result<String, CaptureError>>>,
    calls: AtomicUsize,
    /// When set, each capture waits for a notification before settling
    pub gate: Option<Arc<Notify>>,
}

impl FakeRecognizer {
    pub fn with(results: Vec<std::result::Result<String, CaptureError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn saying(transcript: &str) -> Self {
        Self::with(vec![Ok(transcript.to_string())])
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push(&self, result: std::result::Result<String, CaptureError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn capture(&self) -> std::result::Result<String, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CaptureError::NoSpeech))
    }
}

/// A recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Query(String),
    Chat(String, Option<String>),
}

/// Backend that answers from a script and records every call
pub struct FakeInference {
    /// `None` entries fail the call
    answers: Mutex<VecDeque<Option<(String, Emotion)>>>,
    calls: Mutex<Vec<Call>>,
    pub session_id: String,
}

impl Default for FakeInference {
    fn default() -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            session_id: "session-1".to_string(),
        }
    }
}

impl FakeInference {
    pub fn answering(text: &str, emotion: Emotion) -> Self {
        let fake = Self::default();
        fake.answer(text, emotion);
        fake
    }

    pub fn failing() -> Self {
        let fake = Self::default();
        fake.fail_next();
        fake
    }

    pub fn answer(&self, text: &str, emotion: Emotion) {
        self.answers
            .lock()
            .unwrap()
            .push_back(Some((text.to_string(), emotion)));
    }

    pub fn fail_next(&self) {
        self.answers.lock().unwrap().push_back(None);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self) -> Result<(String, Emotion)> {
        match self.answers.lock().unwrap().pop_front() {
            Some(Some(answer)) => Ok(answer),
            Some(None) => Err(Error::Inference("API error: 500 Internal Server Error".into())),
            None => Ok(("It's four".to_string(), Emotion::Neutral)),
        }
    }
}

#[async_trait]
impl Inference for FakeInference {
    async fn query(&self, question: &str) -> Result<Reply> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Query(question.to_string()));
        let (text, emotion) = self.next()?;
        Ok(Reply { text, emotion })
    }

    async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<ChatReply> {
        self.calls.lock().unwrap().push(Call::Chat(
            message.to_string(),
            session_id.map(str::to_string),
        ));
        let (text, emotion) = self.next()?;
        Ok(ChatReply {
            session_id: Some(self.session_id.clone()),
            text: text.clone(),
            emotion,
            chat_history: vec![Exchange {
                question: message.to_string(),
                answer: text,
            }],
        })
    }
}

/// How the fake engine plays an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Start, then end right away
    Complete,
    /// End without ever reporting a start
    CompleteSilently,
    /// Start, then wait for `release` or cancellation
    Hold,
    FailBeforeStart(PlaybackError),
    FailAfterStart(PlaybackError),
}

/// Synthesis engine that follows a script instead of making sound
pub struct FakeEngine {
    pub available: AtomicBool,
    script: Mutex<Script>,
    utterances: Mutex<Vec<Utterance>>,
    last_cancel: Mutex<Option<CancellationToken>>,
    pub release: Notify,
    voices: Vec<Voice>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new(Script::Complete)
    }
}

impl FakeEngine {
    pub fn new(script: Script) -> Self {
        Self {
            available: AtomicBool::new(true),
            script: Mutex::new(script),
            utterances: Mutex::new(Vec::new()),
            last_cancel: Mutex::new(None),
            release: Notify::new(),
            voices: vec![
                Voice::new("Google UK English Male", "en-GB"),
                Voice::new("Samantha", "en-US"),
            ],
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.utterances.lock().unwrap().clone()
    }

    /// Whether the most recent utterance was cancelled
    pub fn was_cancelled(&self) -> bool {
        self.last_cancel
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

#[async_trait]
impl SynthesisEngine for FakeEngine {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn utter(
        &self,
        utterance: &Utterance,
        sink: &PlaybackSink,
        cancel: CancellationToken,
    ) -> std::result::Result<(), PlaybackError> {
        self.utterances.lock().unwrap().push(utterance.clone());
        *self.last_cancel.lock().unwrap() = Some(cancel.clone());
        let script = self.script.lock().unwrap().clone();

        match script {
            Script::Complete => {
                sink.started();
                tokio::task::yield_now().await;
                Ok(())
            }
            Script::CompleteSilently => Ok(()),
            Script::Hold => {
                sink.started();
                tokio::select! {
                    () = cancel.cancelled() => Err(PlaybackError::Interrupted),
                    () = self.release.notified() => Ok(()),
                }
            }
            Script::FailBeforeStart(e) => Err(e),
            Script::FailAfterStart(e) => {
                sink.started();
                tokio::task::yield_now().await;
                Err(e)
            }
        }
    }
}

/// Speaker over a fake engine with the default voice preferences
pub fn speaker(engine: &Arc<FakeEngine>) -> Speaker {
    let preferred = tutor_mascot::voice::DEFAULT_PREFERRED_VOICES
        .iter()
        .map(ToString::to_string)
        .collect();
    Speaker::new(engine.clone(), Prosody::default(), preferred)
}

/// Coordinator wired to fakes
pub fn coordinator(
    recognizer: &Arc<FakeRecognizer>,
    inference: &Arc<FakeInference>,
    engine: &Arc<FakeEngine>,
    policy: FailedTurnPolicy,
) -> Arc<TurnCoordinator> {
    let settings = MascotConfig {
        emotion_revert: Duration::from_secs(5),
        failed_turn_policy: policy,
    };
    Arc::new(TurnCoordinator::new(
        recognizer.clone(),
        inference.clone(),
        speaker(engine),
        &settings,
    ))
}

/// Collect status transitions seen so far
pub fn statuses(events: &mut broadcast::Receiver<CoordinatorEvent>) -> Vec<(Status, Status)> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoordinatorEvent::StatusChanged { from, to } = event {
            seen.push((from, to));
        }
    }
    seen
}

/// Wait until the coordinator reaches `status`
pub async fn wait_for(coordinator: &TurnCoordinator, status: Status) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.status() != status {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("coordinator never reached {status}"));
}
