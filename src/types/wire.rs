//! Detection service payloads
//!
//! Every answer is a JSON object. Error answers arrive with a non-2xx
//! HTTP code but still carry `{"status": "error", "message": ...}`.

use serde::{Deserialize, Serialize};

use crate::types::EncodedImage;

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl HealthReply {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// `calibration_step` is an integer while calibrating and `"complete"` after
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalibrationStepField {
    Step(u32),
    Label(String),
}

impl CalibrationStepField {
    pub fn step(&self) -> Option<u32> {
        match self {
            CalibrationStepField::Step(n) => Some(*n),
            CalibrationStepField::Label(_) => None,
        }
    }
}

/// `GET /status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub calibrated: bool,
    #[serde(default)]
    pub calibration_step: Option<CalibrationStepField>,
    #[serde(default)]
    pub tracking_started: Option<bool>,
}

/// `POST /calibration/start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationStartReply {
    pub status: String,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl CalibrationStartReply {
    pub fn is_started(&self) -> bool {
        self.status == "calibration_started"
    }
}

/// Request body for `/calibration/step` and `/analyze`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRequest {
    pub image: EncodedImage,
}

/// `POST /calibration/step`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalibrationStepReply {
    CalibrationComplete {
        #[serde(default)]
        message: Option<String>,
    },
    CalibrationInProgress {
        current_step: u32,
        #[serde(default)]
        total_steps: Option<u32>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Status values of `POST /analyze`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzeStatus {
    Ok,
    NoFace,
    Error,
    #[serde(other)]
    Unknown,
}

/// `POST /analyze`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeReply {
    pub status: AnalyzeStatus,
    #[serde(default)]
    pub cheating_detected: bool,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub frame: Option<EncodedImage>,
    #[serde(default)]
    pub message: Option<String>,
}
