//! Controller configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::{
    COMPLETION_DELAY_MS, DEFAULT_SERVICE_URL, HEALTH_POLL_INTERVAL_MS, MONITOR_PERIOD_MS,
    REQUEST_TIMEOUT_MS, SETTLE_DELAY_MS,
};

/// Camera facing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    User,
    Environment,
}

/// Ideal capture parameters; devices may deliver something else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing: Facing::User,
        }
    }
}

/// Timer periods and delays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub health_poll: Duration,
    pub monitor_period: Duration,
    pub completion_delay: Duration,
    pub settle_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            health_poll: Duration::from_millis(HEALTH_POLL_INTERVAL_MS),
            monitor_period: Duration::from_millis(MONITOR_PERIOD_MS),
            completion_delay: Duration::from_millis(COMPLETION_DELAY_MS),
            settle_delay: Duration::from_millis(SETTLE_DELAY_MS),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
        }
    }
}

/// Everything needed to run one controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Detection service base URL
    pub service_url: String,
    /// Directory replayed by the built-in frame source
    pub frames_dir: Option<PathBuf>,
    pub capture: CaptureConstraints,
    pub timings: Timings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            service_url: std::env::var("PROCTOR_SERVICE_URL")
                .unwrap_or_else(|_| DEFAULT_SERVICE_URL.to_string()),
            frames_dir: std::env::var("PROCTOR_FRAMES_DIR").ok().map(PathBuf::from),
            capture: CaptureConstraints::default(),
            timings: Timings::default(),
        }
    }
}

impl ControllerConfig {
    /// Reject configurations the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.service_url.starts_with("http://") || self.service_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "service url must be http(s): {}",
                self.service_url
            )));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(Error::Config("capture resolution must be non-zero".to_string()));
        }
        let t = &self.timings;
        if t.health_poll.is_zero() || t.monitor_period.is_zero() {
            return Err(Error::Config("timer periods must be non-zero".to_string()));
        }
        Ok(())
    }
}
