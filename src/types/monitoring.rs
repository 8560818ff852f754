//! Monitoring loop run state

use serde::{Deserialize, Serialize};

use crate::types::EncodedImage;

/// Run state owned by the monitoring loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringRunState {
    /// Tick timer armed
    pub running: bool,
    /// An analyze request is outstanding
    pub in_flight: bool,
    /// Last annotated frame returned by the service
    pub last_display_frame: Option<EncodedImage>,
    /// Last verdict returned by the service
    pub cheating_detected: bool,
}

impl MonitoringRunState {
    /// Status line shown under the live view
    pub fn status_text(&self, camera_ready: bool) -> &'static str {
        match (camera_ready, self.running) {
            (false, _) => "Initializing camera...",
            (true, true) => "Monitoring active",
            (true, false) => "Monitoring paused",
        }
    }
}
