//! The turn state machine
//!
//! ```text
//! idle ──listen──▶ listening ──transcript──▶ processing ──Started──▶ speaking
//!  ▲                   │                        │                      │
//!  │                   └──────failure───▶ error ◀───failure────────────┤
//!  └──────────────────────────────────────────────────── Ended/Failed ─┘
//! ```
//!
//! State sits behind a `std::sync::Mutex` that is never held across an
//! `.await`; every transition is published on a broadcast channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::{
    APOLOGY, ConversationLog, CoordinatorEvent, Emotion, EmotionDisplay, IgnoreReason, Snapshot,
    Status, Turn, TurnError, TurnOutcome,
};
use crate::config::{FailedTurnPolicy, MascotConfig};
use crate::inference::Inference;
use crate::voice::{PlaybackError, PlaybackEvent, Speaker, SpeechRecognizer, finalize_transcript};

/// Capacity of the event channel
const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct State {
    status: Status,
    message: Option<String>,
    session_id: Option<String>,
    log: ConversationLog,
}

/// Sequences capture, inference and playback for one conversation
pub struct TurnCoordinator {
    recognizer: Arc<dyn SpeechRecognizer>,
    inference: Arc<dyn Inference>,
    speaker: Speaker,
    emotion: EmotionDisplay,
    policy: FailedTurnPolicy,
    state: Mutex<State>,
    events: broadcast::Sender<CoordinatorEvent>,
    closed: CancellationToken,
}

impl TurnCoordinator {
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        inference: Arc<dyn Inference>,
        speaker: Speaker,
        settings: &MascotConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            recognizer,
            inference,
            speaker,
            emotion: EmotionDisplay::new(settings.emotion_revert),
            policy: settings.failed_turn_policy,
            state: Mutex::new(State::default()),
            events,
            closed: CancellationToken::new(),
        }
    }

    /// Capture one spoken question and answer it
    ///
    /// Ignored while a turn is already in progress or after [`close`](Self::close).
    pub async fn listen(&self) -> TurnOutcome {
        if let Err(reason) = self.begin(Status::Listening) {
            tracing::debug!(?reason, "listen ignored");
            return TurnOutcome::Ignored(reason);
        }
        self.emotion.set(Emotion::Listening);

        let captured = tokio::select! {
            biased;
            () = self.closed.cancelled() => return self.interrupted(),
            captured = self.recognizer.capture() => captured,
        };

        match captured {
            Ok(transcript) => {
                tracing::info!(%transcript, "heard question");
                self.respond(transcript).await
            }
            Err(e) => self.fail(e.into()),
        }
    }

    /// Answer a typed question, skipping capture
    pub async fn submit(&self, text: &str) -> TurnOutcome {
        if let Err(reason) = self.begin(Status::Processing) {
            tracing::debug!(?reason, "submit ignored");
            return TurnOutcome::Ignored(reason);
        }

        match finalize_transcript(text) {
            Ok(question) => self.respond(question).await,
            Err(e) => self.fail(e.into()),
        }
    }

    /// Stop playback and refuse further turns
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        tracing::info!("closing turn coordinator");
        self.closed.cancel();
        self.speaker.stop();
        self.emotion.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            status: state.status,
            emotion: self.emotion.current(),
            message: state.message.clone(),
            session_id: state.session_id.clone(),
            log: state.log.clone(),
        }
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.lock().status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn watch_emotion(&self) -> watch::Receiver<Emotion> {
        self.emotion.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: CoordinatorEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, state: &mut State, to: Status) {
        let from = state.status;
        if from != to {
            state.status = to;
            tracing::debug!(%from, %to, "status changed");
            self.publish(CoordinatorEvent::StatusChanged { from, to });
        }
    }

    fn set_message(&self, state: &mut State, message: Option<String>) {
        if state.message != message {
            state.message.clone_from(&message);
            self.publish(CoordinatorEvent::MessageChanged(message));
        }
    }

    fn append(&self, state: &mut State, turn: Turn) {
        state.log.push(turn.clone());
        self.publish(CoordinatorEvent::TurnAppended(turn));
    }

    /// Enter the first busy status of a turn
    fn begin(&self, to: Status) -> Result<(), IgnoreReason> {
        let mut state = self.lock();
        if self.closed.is_cancelled() {
            return Err(IgnoreReason::Closed);
        }
        if state.status.is_busy() {
            return Err(IgnoreReason::Busy(state.status));
        }
        self.set_message(&mut state, None);
        self.set_status(&mut state, to);
        Ok(())
    }

    async fn respond(&self, question: String) -> TurnOutcome {
        let (use_chat, session_id) = {
            let mut state = self.lock();
            self.set_status(&mut state, Status::Processing);

            let use_chat = !state.log.is_empty() || state.session_id.is_some();
            let session_id = state.session_id.clone();

            if self.policy == FailedTurnPolicy::KeepQuestion {
                self.append(&mut state, Turn::user(question.clone()));
            }
            (use_chat, session_id)
        };
        self.emotion.set(Emotion::Thinking);

        let request = async {
            if use_chat {
                self.inference
                    .chat(&question, session_id.as_deref())
                    .await
                    .map(|r| (r.text, r.emotion, r.session_id))
            } else {
                self.inference
                    .query(&question)
                    .await
                    .map(|r| (r.text, r.emotion, None))
            }
        };

        let answered = tokio::select! {
            biased;
            () = self.closed.cancelled() => return self.interrupted(),
            answered = request => answered,
        };

        let (text, emotion) = match answered {
            Ok((text, ..)) if text.trim().is_empty() => {
                return self.fail(TurnError::Network("backend returned an empty reply".into()));
            }
            Ok((text, emotion, returned_session)) => {
                let mut state = self.lock();
                if self.policy == FailedTurnPolicy::Discard {
                    self.append(&mut state, Turn::user(question));
                }
                self.append(&mut state, Turn::assistant(text.clone(), emotion.clone()));
                if let Some(id) = returned_session {
                    state.session_id = Some(id);
                }
                (text, emotion)
            }
            Err(e) => return self.fail(TurnError::Network(e.to_string())),
        };

        tracing::info!(%emotion, chars = text.len(), "answer received");
        self.emotion.set(emotion);
        self.speak(text).await
    }

    async fn speak(&self, text: String) -> TurnOutcome {
        let mut events = self.speaker.speak(&text);
        let mut started = false;

        loop {
            let event = tokio::select! {
                biased;
                () = self.closed.cancelled() => {
                    self.speaker.stop();
                    return self.interrupted();
                }
                event = events.recv() => event,
            };

            match event {
                Some(PlaybackEvent::Started) => {
                    started = true;
                    let mut state = self.lock();
                    if state.status == Status::Processing {
                        self.set_status(&mut state, Status::Speaking);
                        self.set_message(&mut state, Some(text.clone()));
                    }
                }
                Some(PlaybackEvent::Ended) => {
                    self.finish_speaking();
                    return TurnOutcome::Completed;
                }
                Some(PlaybackEvent::Failed(e)) if started => {
                    tracing::warn!(error = %e, "playback stopped early");
                    self.finish_speaking();
                    return if e == PlaybackError::Interrupted {
                        TurnOutcome::Interrupted
                    } else {
                        TurnOutcome::Failed(TurnError::Playback(e))
                    };
                }
                Some(PlaybackEvent::Failed(e)) => return self.fail(TurnError::Playback(e)),
                None => {
                    let e = PlaybackError::Engine("playback ended without a result".to_string());
                    if started {
                        self.finish_speaking();
                        return TurnOutcome::Failed(TurnError::Playback(e));
                    }
                    return self.fail(TurnError::Playback(e));
                }
            }
        }
    }

    /// Leave speaking for idle; a status already moved on is left alone
    fn finish_speaking(&self) {
        let mut state = self.lock();
        if state.status == Status::Speaking {
            self.set_status(&mut state, Status::Idle);
            self.set_message(&mut state, None);
        }
    }

    fn fail(&self, error: TurnError) -> TurnOutcome {
        tracing::warn!(error = %error, "turn failed");
        {
            let mut state = self.lock();
            self.set_status(&mut state, Status::Error);
            self.set_message(&mut state, Some(APOLOGY.to_string()));
            self.set_status(&mut state, Status::Idle);
        }
        if !self.closed.is_cancelled() {
            self.emotion.set(Emotion::Sad);
        }
        TurnOutcome::Failed(error)
    }

    fn interrupted(&self) -> TurnOutcome {
        tracing::debug!("turn interrupted by close");
        let mut state = self.lock();
        self.set_status(&mut state, Status::Idle);
        self.set_message(&mut state, None);
        TurnOutcome::Interrupted
    }
}

impl Drop for TurnCoordinator {
    fn drop(&mut self) {
        self.close();
    }
}
