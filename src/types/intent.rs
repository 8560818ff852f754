//! Intents forwarded from the presentation layer

use serde::{Deserialize, Serialize};

/// A user action the session controller reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    StartCalibration,
    SubmitCalibrationFrame,
    SkipToMonitoring,
    PauseMonitoring,
    ResumeMonitoring,
}

impl Intent {
    /// Parse a terminal command ("start", "next", ...)
    pub fn from_command(cmd: &str) -> Option<Self> {
        match cmd.trim().to_ascii_lowercase().as_str() {
            "start" | "calibrate" => Some(Intent::StartCalibration),
            "next" | "n" | "capture" => Some(Intent::SubmitCalibrationFrame),
            "skip" => Some(Intent::SkipToMonitoring),
            "pause" => Some(Intent::PauseMonitoring),
            "resume" => Some(Intent::ResumeMonitoring),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(Intent::from_command("Next "), Some(Intent::SubmitCalibrationFrame));
        assert_eq!(Intent::from_command("skip"), Some(Intent::SkipToMonitoring));
        assert_eq!(Intent::from_command("dance"), None);
    }
}
