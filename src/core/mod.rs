//! Core modules for Proctor-0

pub mod service;
pub mod capture;
pub mod poller;
pub mod calibration;
pub mod monitor;
pub mod controller;
pub mod api;

pub use service::{DetectionService, HttpDetectionService};
pub use capture::{
    AcquireOutcome, CaptureDevice, CaptureGuard, CaptureManager, CaptureOwner, CaptureSource,
    FrameDirDevice, FrameDirSource,
};
pub use poller::{ConnectivityPoller, PollerEvent, StatusChange};
pub use calibration::{CalibrationSequencer, StepOutcome};
pub use monitor::{AnalysisOutcome, MonitorEvent, MonitoringLoop, TickSkip};
pub use controller::{SessionController, SessionHandle};
pub use api::{create_router, run_server};
