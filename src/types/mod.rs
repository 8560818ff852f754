//! Core types for Proctor-0

mod state;
mod calibration;
mod connectivity;
mod monitoring;
mod message;
mod frame;
mod intent;
mod snapshot;
mod output;
pub mod wire;

pub use state::SessionState;
pub use calibration::CalibrationProgress;
pub use connectivity::ConnectivityState;
pub use monitoring::MonitoringRunState;
pub use message::{LogMessage, MessageLog, Severity};
pub use frame::{EncodedImage, FrameDimensions};
pub use intent::Intent;
pub use snapshot::SessionSnapshot;
pub use wire::{
    AnalyzeReply, AnalyzeStatus, CalibrationStartReply, CalibrationStepReply, HealthReply,
    StatusReply,
};
