//! Connectivity as seen by the health poller

use serde::{Deserialize, Serialize};

/// What the poller currently knows about the detection service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    /// Outcome of the most recent health check
    pub connected: bool,
    /// Server reports a finished calibration
    pub calibrated_on_server: bool,
    /// Step the server is on while uncalibrated, when it says
    pub server_calibration_step: Option<u32>,
    /// Server has begun tracking with its calibration
    pub tracking_started: bool,
}

impl ConnectivityState {
    /// Start calibration is offered only while connected
    pub fn can_start_calibration(&self) -> bool {
        self.connected
    }

    /// Skip-to-monitoring is offered only with a calibrated server
    pub fn can_skip_to_monitoring(&self) -> bool {
        self.connected && self.calibrated_on_server
    }
}
