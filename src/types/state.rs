//! Session state definitions

use serde::{Deserialize, Serialize};

/// The three phases of a proctoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Waiting for the user to calibrate (or skip when already calibrated)
    Setup,
    /// Calibration wizard running
    Calibrating,
    /// Live capture → analyze → display loop
    Monitoring,
}

impl SessionState {
    /// Terminal color name for this state
    pub fn color(&self) -> colored::Color {
        match self {
            SessionState::Setup => colored::Color::BrightBlack,
            SessionState::Calibrating => colored::Color::Yellow,
            SessionState::Monitoring => colored::Color::Green,
        }
    }

    /// Get emoji for state
    pub fn emoji(&self) -> &'static str {
        match self {
            SessionState::Setup => "⏳",
            SessionState::Calibrating => "🎯",
            SessionState::Monitoring => "👁",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Setup => "SETUP",
            SessionState::Calibrating => "CALIBRATING",
            SessionState::Monitoring => "MONITORING",
        };
        write!(f, "{}", name)
    }
}
