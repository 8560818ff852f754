//! User-visible message log
//!
//! History is append-only. The service owns the "current" message set
//! while monitoring, so the log also tracks where the visible window
//! starts; replacing the window never drops history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ALERT_MARKER;

/// Rendering weight of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Alert,
}

impl Severity {
    /// Severity implied by message text
    pub fn classify(text: &str) -> Self {
        if text.contains(ALERT_MARKER) {
            Severity::Alert
        } else {
            Severity::Normal
        }
    }
}

/// One logged line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub text: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

impl LogMessage {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            severity: Severity::classify(&text),
            text,
            at: Utc::now(),
        }
    }

    pub fn is_alert(&self) -> bool {
        self.severity == Severity::Alert
    }
}

/// Session-long message log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog {
    entries: Vec<LogMessage>,
    visible_from: usize,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append into the visible window
    pub fn push(&mut self, text: impl Into<String>) {
        self.entries.push(LogMessage::new(text));
    }

    /// Start a fresh visible window holding exactly `texts`
    pub fn replace_visible<I, S>(&mut self, texts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visible_from = self.entries.len();
        self.entries
            .extend(texts.into_iter().map(LogMessage::new));
    }

    /// Messages the presentation layer should show
    pub fn visible(&self) -> &[LogMessage] {
        &self.entries[self.visible_from..]
    }

    /// Every message of the session
    pub fn history(&self) -> &[LogMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times `text` was logged over the session
    pub fn count_of(&self, text: &str) -> usize {
        self.entries.iter().filter(|m| m.text == text).count()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&LogMessage> {
        self.entries.last()
    }
}
