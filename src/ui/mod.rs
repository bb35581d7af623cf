//! Presentation of coordinator state
//!
//! Every component is a pure function of a [`Snapshot`]; the terminal
//! renderer only formats what these functions return.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::turn::{
    ConversationLog, CoordinatorEvent, Emotion, Role, Snapshot, Status, Turn, TurnCoordinator,
};

/// Colored status dot with a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLight {
    /// CSS-style hex color
    pub color: &'static str,
    pub label: &'static str,
}

#[must_use]
pub const fn status_light(status: Status) -> StatusLight {
    let (color, label) = match status {
        Status::Listening => ("#4caf50", "Listening"),
        Status::Processing => ("#ff9800", "Processing"),
        Status::Speaking => ("#2196f3", "Speaking"),
        Status::Error => ("#f44336", "Error"),
        Status::Idle => ("#9e9e9e", "Ready"),
    };
    StatusLight { color, label }
}

/// The control that starts a listen cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicButton {
    pub label: &'static str,
    pub disabled: bool,
    /// Pulse ring around the mic while listening
    pub pulsing: bool,
}

#[must_use]
pub const fn mic_button(status: Status) -> MicButton {
    match status {
        Status::Listening => MicButton {
            label: "Listening...",
            disabled: false,
            pulsing: true,
        },
        Status::Speaking => MicButton {
            label: "AI is speaking...",
            disabled: true,
            pulsing: false,
        },
        _ => MicButton {
            label: "Press Enter to speak",
            disabled: false,
            pulsing: false,
        },
    }
}

/// Mascot animation clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    Speaking,
    Thinking,
    Happy,
    Explaining,
}

impl Animation {
    #[must_use]
    pub const fn asset(self) -> &'static str {
        match self {
            Self::Speaking => "speaking.json",
            Self::Thinking => "thinking.json",
            Self::Happy => "happy.json",
            Self::Explaining => "explaining.json",
        }
    }
}

/// Everything the mascot card shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MascotView {
    pub animation: Animation,
    /// Emotion label, hidden for neutral and speaking
    pub badge: Option<String>,
    pub sound_waves: bool,
    pub listening_indicator: bool,
    /// Speech bubble, only while speaking
    pub bubble: Option<String>,
}

#[must_use]
pub fn mascot_view(snapshot: &Snapshot) -> MascotView {
    let animation = match snapshot.emotion {
        Emotion::Happy => Animation::Happy,
        Emotion::Thinking => Animation::Thinking,
        Emotion::Explaining => Animation::Explaining,
        _ => Animation::Speaking,
    };
    let speaking = snapshot.status == Status::Speaking;

    MascotView {
        animation,
        badge: snapshot
            .emotion
            .reverts()
            .then(|| snapshot.emotion.to_string()),
        sound_waves: speaking,
        listening_indicator: snapshot.status == Status::Listening,
        bubble: if speaking {
            snapshot.message.clone()
        } else {
            None
        },
    }
}

/// Format one turn as a timestamped line
#[must_use]
pub fn render_log_line(turn: &Turn) -> String {
    let time = turn.at.format("%H:%M:%S");
    match (turn.role, &turn.emotion) {
        (Role::User, _) => format!("[{time}] You: {}", turn.text),
        (Role::Assistant, Some(emotion)) => format!("[{time}] Mascot ({emotion}): {}", turn.text),
        (Role::Assistant, None) => format!("[{time}] Mascot: {}", turn.text),
    }
}

/// Format the conversation log, one line per turn
#[must_use]
pub fn render_log(log: &ConversationLog) -> Vec<String> {
    log.iter().map(render_log_line).collect()
}

/// One-line status bar for the terminal
#[must_use]
pub fn render_status_line(snapshot: &Snapshot) -> String {
    let light = status_light(snapshot.status);
    let button = mic_button(snapshot.status);
    let view = mascot_view(snapshot);

    let mut line = format!("{} {}", color_dot(light.color), light.label);
    if let Some(badge) = &view.badge {
        line.push_str(&format!(" [{badge}]"));
    }
    if view.sound_waves {
        line.push_str(" ))))");
    }
    line.push_str(&format!(" | {}", button.label));
    line
}

/// A filled circle in the given hex color, as an ANSI truecolor escape
fn color_dot(hex: &str) -> String {
    let rgb = hex.strip_prefix('#').filter(|h| h.len() == 6).and_then(|h| {
        Some((
            u8::from_str_radix(&h[0..2], 16).ok()?,
            u8::from_str_radix(&h[2..4], 16).ok()?,
            u8::from_str_radix(&h[4..6], 16).ok()?,
        ))
    });
    match rgb {
        Some((r, g, b)) => format!("\x1b[38;2;{r};{g};{b}m●\x1b[0m"),
        None => "●".to_string(),
    }
}

/// Print coordinator changes to stdout until the coordinator is dropped
pub fn spawn_renderer(coordinator: &Arc<TurnCoordinator>) -> JoinHandle<()> {
    spawn_renderer_with(coordinator, |line| println!("{line}"))
}

/// Render coordinator changes through `emit`, one line at a time
///
/// Status changes and emotion changes, including the timed revert to
/// neutral, both re-render the status line.
pub fn spawn_renderer_with<F>(coordinator: &Arc<TurnCoordinator>, mut emit: F) -> JoinHandle<()>
where
    F: FnMut(String) + Send + 'static,
{
    let mut events = coordinator.subscribe();
    let mut emotion = coordinator.watch_emotion();
    let coordinator = Arc::downgrade(coordinator);

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "renderer lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = emotion.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    emotion.borrow_and_update();
                    None
                }
            };
            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            let snapshot = coordinator.snapshot();

            match event {
                None | Some(CoordinatorEvent::StatusChanged { .. }) => {
                    emit(render_status_line(&snapshot));
                }
                Some(CoordinatorEvent::TurnAppended(turn)) => emit(render_log_line(&turn)),
                Some(CoordinatorEvent::MessageChanged(Some(message))) => {
                    if let Some(bubble) = mascot_view(&snapshot).bubble {
                        emit(format!("  💬 {bubble}"));
                    } else if snapshot.status != Status::Speaking {
                        emit(format!("  {message}"));
                    }
                }
                Some(CoordinatorEvent::MessageChanged(None)) => {}
            }
        }
    })
}
