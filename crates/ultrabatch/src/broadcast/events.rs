//! Session event broadcaster for toasts and view refreshes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Why a polling loop went inactive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StopReason {
    /// The job reported `completed`/`failed` or every file was accounted for.
    Terminal,
    Cancelled,
    MaxDurationExceeded,
    TooManyFailures { failures: u32 },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Terminal => write!(f, "job finished"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::MaxDurationExceeded => write!(f, "maximum polling duration exceeded"),
            StopReason::TooManyFailures { failures } => {
                write!(f, "{} consecutive status failures", failures)
            }
        }
    }
}

/// Event published by a [`crate::Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SessionEvent {
    Notification {
        level: NotificationLevel,
        title: String,
        description: String,
        timestamp: DateTime<Utc>,
    },
    /// The in-memory message list changed; `revision` is the new view revision.
    ViewUpdated { revision: u64 },
    PollingStarted { job_id: String },
    PollingStopped { job_id: String, reason: StopReason },
}

impl SessionEvent {
    pub fn notification(level: NotificationLevel, title: &str, description: &str) -> Self {
        SessionEvent::Notification {
            level,
            title: title.to_string(),
            description: description.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Fans session events out to every subscriber.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: Arc<broadcast::Sender<SessionEvent>>,
}

impl EventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: SessionEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn info(&self, title: &str, description: &str) {
        self.send(SessionEvent::notification(
            NotificationLevel::Info,
            title,
            description,
        ));
    }

    pub fn warning(&self, title: &str, description: &str) {
        self.send(SessionEvent::notification(
            NotificationLevel::Warning,
            title,
            description,
        ));
    }

    pub fn error(&self, title: &str, description: &str) {
        self.send(SessionEvent::notification(
            NotificationLevel::Error,
            title,
            description,
        ));
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
