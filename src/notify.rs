use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: Level, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Toast-style summaries for the user. Never consulted for control flow.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, n: Notification);
}

pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.level {
            Level::Error => warn!("{}: {}", n.title, n.message),
            Level::Success | Level::Info => info!("{}: {}", n.title, n.message),
        }
    }
}

/// Keeps every notification; handy for callers that render them later.
#[derive(Default)]
pub struct CollectingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notification> {
        match self.seen.lock() {
            Ok(mut v) => std::mem::take(&mut *v),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationSink for CollectingNotifier {
    fn notify(&self, n: Notification) {
        match self.seen.lock() {
            Ok(mut v) => v.push(n),
            Err(poisoned) => poisoned.into_inner().push(n),
        }
    }
}
