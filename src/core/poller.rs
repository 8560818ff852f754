//! Connectivity poller
//!
//! Health is checked on a fixed period for the controller's lifetime.
//! Calibration status is queried only on a disconnected → connected edge,
//! plus once unconditionally at boot. Local calibration marks bump a
//! revision; status answers requested under an older revision are dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::service::DetectionService;
use crate::error::Result;
use crate::types::{ConnectivityState, HealthReply, StatusReply};

/// Results the poller's background tasks report to the controller
#[derive(Debug)]
pub enum PollerEvent {
    /// Boot-time health check; never triggers the edge status check
    BootHealth(Result<HealthReply>),
    /// Periodic health check
    Health(Result<HealthReply>),
    /// Calibration status answer, requested under `revision`
    Status { revision: u64, result: Result<StatusReply> },
}

/// What a status answer changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// Server reports calibration finished
    pub calibrated: bool,
    /// `calibrated_on_server` flipped false → true on this answer
    pub newly_calibrated: bool,
}

/// Edge-triggered connectivity state machine
#[derive(Debug, Default)]
pub struct ConnectivityPoller {
    state: ConnectivityState,
    revision: u64,
    health_checks: u64,
    status_checks: u64,
}

impl ConnectivityPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectivityState {
        &self.state
    }

    /// Stamp for status requests issued now
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of health answers applied
    pub fn health_checks(&self) -> u64 {
        self.health_checks
    }

    /// Number of status answers applied
    pub fn status_checks(&self) -> u64 {
        self.status_checks
    }

    /// Apply a health answer. Returns `true` when `connected` went
    /// false → true, i.e. a status check is due.
    pub fn apply_health(&mut self, result: &Result<HealthReply>) -> bool {
        self.health_checks += 1;
        let connected = match result {
            Ok(reply) => reply.is_ok(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        };
        let rising = connected && !self.state.connected;
        if connected != self.state.connected {
            info!(connected, "Detection service connectivity changed");
        }
        self.state.connected = connected;
        rising
    }

    /// Apply a calibration status answer. Failures and answers requested
    /// before the last local mark leave state untouched.
    pub fn apply_status(
        &mut self,
        revision: u64,
        result: Result<StatusReply>,
    ) -> Option<StatusChange> {
        if revision != self.revision {
            debug!(revision, current = self.revision, "Discarding stale status answer");
            return None;
        }
        self.status_checks += 1;
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Failed to check detector status");
                return None;
            }
        };
        let newly_calibrated = reply.calibrated && !self.state.calibrated_on_server;
        self.state.calibrated_on_server = reply.calibrated;
        self.state.server_calibration_step = if reply.calibrated {
            None
        } else {
            reply.calibration_step.as_ref().and_then(|f| f.step())
        };
        self.state.tracking_started = reply.tracking_started.unwrap_or(false);
        debug!(
            calibrated = reply.calibrated,
            step = ?self.state.server_calibration_step,
            "Detector status"
        );
        Some(StatusChange {
            calibrated: reply.calibrated,
            newly_calibrated,
        })
    }

    /// Local calibration finished; the server now holds a calibration
    pub fn mark_calibrated(&mut self) {
        self.revision += 1;
        self.state.calibrated_on_server = true;
        self.state.server_calibration_step = None;
    }

    /// The server accepted a calibration restart and dropped its old one
    pub fn mark_uncalibrated(&mut self, step: u32) {
        self.revision += 1;
        self.state.calibrated_on_server = false;
        self.state.server_calibration_step = Some(step);
    }
}

/// Boot sequence: one health check, then one status check regardless of
/// the health outcome.
pub fn spawn_boot_check<S, E>(
    service: Arc<S>,
    revision: u64,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<E>,
) where
    S: DetectionService,
    E: From<PollerEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let health = tokio::select! {
            r = service.health() => r,
            _ = token.cancelled() => return,
        };
        if tx.send(PollerEvent::BootHealth(health).into()).is_err() {
            return;
        }
        let status = tokio::select! {
            r = service.status() => r,
            _ = token.cancelled() => return,
        };
        let _ = tx.send(PollerEvent::Status { revision, result: status }.into());
    });
}

/// Periodic health checks; the first one fires one `period` after start
pub fn spawn_health_ticker<S, E>(
    service: Arc<S>,
    period: Duration,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<E>,
) where
    S: DetectionService,
    E: From<PollerEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => break,
            }
            let health = tokio::select! {
                r = service.health() => r,
                _ = token.cancelled() => break,
            };
            if tx.send(PollerEvent::Health(health).into()).is_err() {
                break;
            }
        }
        debug!("Health ticker stopped");
    });
}

/// One-shot status query after a connectivity edge
pub fn spawn_status_check<S, E>(
    service: Arc<S>,
    revision: u64,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<E>,
) where
    S: DetectionService,
    E: From<PollerEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let status = tokio::select! {
            r = service.status() => r,
            _ = token.cancelled() => return,
        };
        let _ = tx.send(PollerEvent::Status { revision, result: status }.into());
    });
}
