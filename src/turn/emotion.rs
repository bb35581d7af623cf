//! Mascot emotion and its revert timer

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Expression label attached to a reply
///
/// Unknown labels from the backend are carried through as [`Emotion::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Thinking,
    Explaining,
    Surprised,
    Listening,
    Speaking,
    Other(String),
}

impl Emotion {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Thinking => "thinking",
            Self::Explaining => "explaining",
            Self::Surprised => "surprised",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Other(label) => label.as_str(),
        }
    }

    /// Whether this emotion falls back to neutral after a while
    #[must_use]
    pub const fn reverts(&self) -> bool {
        !matches!(self, Self::Neutral | Self::Speaking)
    }
}

impl From<&str> for Emotion {
    fn from(label: &str) -> Self {
        let label = label.trim();
        match label.to_ascii_lowercase().as_str() {
            "" | "neutral" => Self::Neutral,
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "thinking" => Self::Thinking,
            "explaining" => Self::Explaining,
            "surprised" => Self::Surprised,
            "listening" => Self::Listening,
            "speaking" => Self::Speaking,
            _ => Self::Other(label.to_string()),
        }
    }
}

impl From<String> for Emotion {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<Option<String>> for Emotion {
    fn from(label: Option<String>) -> Self {
        label.map(Self::from).unwrap_or_default()
    }
}

impl From<Emotion> for String {
    fn from(emotion: Emotion) -> Self {
        match emotion {
            Emotion::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The emotion currently on screen
///
/// Every [`set`](Self::set) cancels the pending revert and, for emotions
/// other than neutral and speaking, schedules a new one.
pub struct EmotionDisplay {
    tx: Arc<watch::Sender<Emotion>>,
    revert_after: Duration,
    generation: Arc<AtomicU64>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl EmotionDisplay {
    #[must_use]
    pub fn new(revert_after: Duration) -> Self {
        let (tx, _) = watch::channel(Emotion::Neutral);
        Self {
            tx: Arc::new(tx),
            revert_after,
            generation: Arc::new(AtomicU64::new(0)),
            timer: Mutex::new(None),
        }
    }

    /// Show `emotion`; must be called within a tokio runtime
    pub fn set(&self, emotion: Emotion) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let reverts = emotion.reverts();

        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        tracing::trace!(%emotion, "emotion changed");
        self.tx.send_replace(emotion);

        if reverts {
            let tx = Arc::clone(&self.tx);
            let current = Arc::clone(&self.generation);
            let delay = self.revert_after;
            *timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                tx.send_if_modified(|shown| {
                    // a newer set() owns the display now
                    if current.load(Ordering::Acquire) != generation {
                        return false;
                    }
                    *shown = Emotion::Neutral;
                    true
                });
            }));
        }
    }

    #[must_use]
    pub fn current(&self) -> Emotion {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Emotion> {
        self.tx.subscribe()
    }

    /// Drop any pending revert
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl Drop for EmotionDisplay {
    fn drop(&mut self) {
        self.cancel();
    }
}
