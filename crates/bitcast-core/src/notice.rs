//! Transient, user-visible notices.
//!
//! Components convert the failures they detect into a [`Notice`] on the
//! shared [`NoticeBus`] instead of propagating them to the presentation
//! layer. The presentation layer renders them as toasts.

use std::fmt;

use tokio::sync::broadcast;
use tracing::debug;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Success => write!(f, "success"),
            NoticeLevel::Error => write!(f, "error"),
        }
    }
}

/// A single transient message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Broadcast channel for notices, cloned into every component.
#[derive(Debug, Clone)]
pub struct NoticeBus {
    tx: broadcast::Sender<Notice>,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice. Dropped silently when nobody is listening.
    pub fn publish(&self, notice: Notice) {
        debug!(level = %notice.level, message = %notice.message, "Notice");
        let _ = self.tx.send(notice);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(Notice::info(message));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(Notice::success(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(Notice::error(message));
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(64)
    }
}
