//! Proctor-0: session controller for remote exam monitoring
//!
//! Owns the capture device, drives the calibration wizard against the
//! detection service and then runs the capture → analyze → display loop.
//! Connectivity and server-side calibration are tracked independently.

pub mod config;
pub mod core;
pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};

// =============================================================================
// TIMINGS - defaults, all overridable through ControllerConfig
// =============================================================================

/// Health poll period (milliseconds)
pub const HEALTH_POLL_INTERVAL_MS: u64 = 5000;

/// Monitoring loop period (milliseconds)
pub const MONITOR_PERIOD_MS: u64 = 500;

/// Pause between "calibration complete" and the switch to monitoring,
/// long enough for the completion message to render
pub const COMPLETION_DELAY_MS: u64 = 1000;

/// Settle time between device readiness and monitoring auto-start
pub const SETTLE_DELAY_MS: u64 = 1000;

/// Per-request timeout against the detection service
pub const REQUEST_TIMEOUT_MS: u64 = 4000;

// =============================================================================
// DETECTION SERVICE
// =============================================================================

/// Default detection service location
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";

/// Marker the service puts into messages that need elevated severity
pub const ALERT_MARKER: &str = "ALERT";

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
