//! Tutor Mascot - voice front end for a question-answering mascot
//!
//! Captures one spoken question at a time, asks a remote backend, and speaks
//! the reply while a mascot follows the reply's emotion:
//! - Voice capture and playback (microphone, STT, TTS, speakers)
//! - Inference client for the `/query` and `/chat` endpoints
//! - Turn coordination between listening, thinking and speaking
//! - Terminal presentation of the mascot state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Presentation (ui)                   │
//! │   Status light  │  Mascot  │  Log  │  Mic button     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ snapshots / events
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Turn Coordinator                     │
//! │   idle → listening → processing → speaking → idle   │
//! └──────┬──────────────────┬──────────────────┬────────┘
//!        │                  │                  │
//! ┌──────▼──────┐   ┌───────▼───────┐   ┌──────▼──────┐
//! │  Recognizer │   │   Inference   │   │   Speaker   │
//! │  mic + STT  │   │ /query /chat  │   │ TTS + audio │
//! └─────────────┘   └───────────────┘   └─────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod inference;
pub mod turn;
pub mod ui;
pub mod voice;

pub use config::{Config, FailedTurnPolicy};
pub use error::{Error, Result};
pub use inference::{ChatReply, Exchange, Inference, InferenceClient, Reply};
pub use turn::{
    APOLOGY, ConversationLog, CoordinatorEvent, Emotion, EmotionDisplay, IgnoreReason, Role,
    Snapshot, Status, Turn, TurnCoordinator, TurnError, TurnOutcome,
};
pub use voice::{
    CaptureError, PlaybackError, PlaybackEvent, Prosody, Speaker, SpeechRecognizer,
    SynthesisEngine, Voice,
};
