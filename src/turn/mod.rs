//! Turn taking between listening, thinking and speaking
//!
//! The [`TurnCoordinator`] owns the conversation status and guarantees that
//! listening and speaking never overlap.

mod coordinator;
mod emotion;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use coordinator::TurnCoordinator;
pub use emotion::{Emotion, EmotionDisplay};

use crate::voice::{CaptureError, PlaybackError};

/// Message shown when a turn fails
pub const APOLOGY: &str = "I'm sorry, I encountered an error. Please try again.";

/// Conversation status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }

    /// Whether a turn is in progress
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Listening | Self::Processing | Self::Speaking)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who said a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Only assistant turns carry an emotion
    pub emotion: Option<Emotion>,
    pub at: DateTime<Utc>,
}

impl Turn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            emotion: None,
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            emotion: Some(emotion),
            at: Utc::now(),
        }
    }
}

/// Append-only, chronologically ordered conversation log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Point-in-time view of the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub status: Status,
    pub emotion: Emotion,
    /// Text in the mascot's speech bubble, if any
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub log: ConversationLog,
}

/// Change notifications from the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    StatusChanged { from: Status, to: Status },
    TurnAppended(Turn),
    MessageChanged(Option<String>),
}

/// Why a turn failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("speech capability unsupported: {0}")]
    CapabilityUnsupported(String),

    #[error("no speech detected")]
    NoSpeechDetected,

    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The inference call failed
    #[error("backend request failed: {0}")]
    Network(String),

    #[error("playback failed: {0}")]
    Playback(PlaybackError),
}

impl From<CaptureError> for TurnError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::NotSupported(reason) => Self::CapabilityUnsupported(reason),
            CaptureError::NoSpeech => Self::NoSpeechDetected,
            CaptureError::Recognition(reason) => Self::Recognition(reason),
        }
    }
}

/// Why a listen or submit request was not acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A turn is already in progress
    Busy(Status),
    Closed,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was spoken to the end
    Completed,
    /// Playback was cut short or the coordinator closed mid-turn
    Interrupted,
    /// The request arrived while busy or closed and was dropped
    Ignored(IgnoreReason),
    Failed(TurnError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_statuses() {
        assert!(!Status::Idle.is_busy());
        assert!(!Status::Error.is_busy());
        assert!(Status::Listening.is_busy());
        assert!(Status::Processing.is_busy());
        assert!(Status::Speaking.is_busy());
    }

    #[test]
    fn test_capture_error_mapping() {
        assert_eq!(
            TurnError::from(CaptureError::NoSpeech),
            TurnError::NoSpeechDetected
        );
        assert_eq!(
            TurnError::from(CaptureError::NotSupported("no mic".into())),
            TurnError::CapabilityUnsupported("no mic".into())
        );
    }

    #[test]
    fn test_log_serializes_as_list() {
        let mut log = ConversationLog::default();
        log.push(Turn::user("hi"));
        log.push(Turn::assistant("hello", Emotion::Happy));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["role"], "user");
        assert_eq!(json[1]["emotion"], "happy");
    }
}
