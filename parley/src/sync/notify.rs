use std::fmt;

use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// Short-lived message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.level {
            NotificationLevel::Success => "✓",
            NotificationLevel::Error => "✗",
            NotificationLevel::Info => "•",
        };
        write!(f, "{} {}", marker, self.text)
    }
}

/// Fan-out of notifications to whoever renders them
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn success(&self, text: impl Into<String>) {
        self.emit(NotificationLevel::Success, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(NotificationLevel::Error, text.into());
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(NotificationLevel::Info, text.into());
    }

    fn emit(&self, level: NotificationLevel, text: String) {
        match level {
            NotificationLevel::Error => error!(notification = %text, "User notified of failure"),
            _ => info!(notification = %text, "User notified"),
        }
        // Nobody listening is fine
        let _ = self.tx.send(Notification { level, text });
    }
}
