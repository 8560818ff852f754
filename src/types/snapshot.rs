//! Session snapshot handed to the presentation layer
//!
//! Published after every processed event, so a renderer never sees a
//! response half-applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    CalibrationProgress, ConnectivityState, LogMessage, MonitoringRunState, SessionState,
};

/// Everything a renderer needs, by value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// When this snapshot was published
    pub timestamp: DateTime<Utc>,
    pub session_state: SessionState,
    /// Present from the first `calibration_started` answer on
    pub calibration: Option<CalibrationProgress>,
    /// Instruction text for the current calibration step, if any
    pub instruction: Option<String>,
    pub connectivity: ConnectivityState,
    pub monitoring: MonitoringRunState,
    /// Capture device held and delivering frames
    pub camera_ready: bool,
    /// Visible message window
    pub messages: Vec<LogMessage>,
    /// Messages logged over the whole session
    pub message_total: usize,
}

impl SessionSnapshot {
    /// Snapshot of a freshly created controller
    pub fn initial() -> Self {
        Self {
            timestamp: Utc::now(),
            session_state: SessionState::Setup,
            calibration: None,
            instruction: None,
            connectivity: ConnectivityState::default(),
            monitoring: MonitoringRunState::default(),
            camera_ready: false,
            messages: Vec::new(),
            message_total: 0,
        }
    }

    /// Any visible message carries the alert marker
    pub fn has_alert(&self) -> bool {
        self.messages.iter().any(LogMessage::is_alert)
    }

    /// Visible message texts, in order
    pub fn message_texts(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.text.as_str()).collect()
    }
}
