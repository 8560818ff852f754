//! Monitoring loop
//!
//! One periodic timer drives frame submission. At most one analyze
//! request is outstanding; ticks that fire while one is in flight are
//! dropped, not queued. Pausing cancels the timer and the outstanding
//! request, and answers from a cancelled run never touch state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::service::DetectionService;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{AnalyzeReply, AnalyzeStatus, EncodedImage, MessageLog, MonitoringRunState};

pub const MSG_NO_FACE: &str = "No face detected";
pub const MSG_ANALYZE_FAILED: &str = "Error: Failed to analyze frame";

/// Results the loop's background tasks report to the controller
#[derive(Debug)]
pub enum MonitorEvent {
    /// Timer fired for run `epoch`
    Tick { epoch: u64 },
    /// Analyze request finished; `None` when it was cancelled
    Analysis {
        epoch: u64,
        result: Option<Result<AnalyzeReply>>,
    },
}

/// What an analysis answer did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// `ok` answer applied
    Verdict { cheating_detected: bool },
    /// `no_face` answer applied
    NoFace,
    /// Error status or transport failure; last-known-good kept
    Failed(ErrorKind),
    /// Answer for a paused/replaced run, ignored
    Discarded,
}

/// Why a tick produced no request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSkip {
    /// Tick from a cancelled run
    Stale,
    /// Previous request still outstanding
    InFlight,
}

/// Capture → analyze → display loop state
#[derive(Debug)]
pub struct MonitoringLoop {
    run: MonitoringRunState,
    epoch: u64,
    token: Option<CancellationToken>,
    parent: CancellationToken,
    dropped_ticks: u64,
}

impl MonitoringLoop {
    /// Create a stopped loop whose timers die with `parent`
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            run: MonitoringRunState::default(),
            epoch: 0,
            token: None,
            parent,
            dropped_ticks: 0,
        }
    }

    pub fn run_state(&self) -> &MonitoringRunState {
        &self.run
    }

    pub fn is_running(&self) -> bool {
        self.run.running
    }

    pub fn in_flight(&self) -> bool {
        self.run.in_flight
    }

    /// Ticks dropped because a request was outstanding
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }

    /// Arm a new run. Returns its epoch and token, or `None` if running.
    pub fn start(&mut self) -> Option<(u64, CancellationToken)> {
        if self.run.running {
            return None;
        }
        self.epoch += 1;
        let token = self.parent.child_token();
        self.token = Some(token.clone());
        self.run.running = true;
        info!(epoch = self.epoch, "Monitoring started");
        Some((self.epoch, token))
    }

    /// Cancel the timer and any outstanding request. The device stays held.
    pub fn pause(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        if self.run.running {
            info!(epoch = self.epoch, "Monitoring paused");
        }
        self.run.running = false;
    }

    /// Decide whether a tick may submit a frame
    pub fn check_tick(&mut self, epoch: u64) -> std::result::Result<(), TickSkip> {
        if !self.run.running || epoch != self.epoch {
            return Err(TickSkip::Stale);
        }
        if self.run.in_flight {
            self.dropped_ticks += 1;
            debug!(epoch, dropped = self.dropped_ticks, "Analysis in flight, dropping tick");
            return Err(TickSkip::InFlight);
        }
        Ok(())
    }

    /// Mark a request outstanding for the current run
    pub fn begin_request(&mut self) -> Option<(u64, CancellationToken)> {
        let token = self.token.clone()?;
        self.run.in_flight = true;
        Some((self.epoch, token))
    }

    /// Apply an analyze answer. `in_flight` is cleared on every path.
    pub fn apply_analysis(
        &mut self,
        epoch: u64,
        result: Option<Result<AnalyzeReply>>,
        log: &mut MessageLog,
    ) -> AnalysisOutcome {
        self.run.in_flight = false;

        let result = match result {
            Some(result) if self.run.running && epoch == self.epoch => result,
            _ => {
                debug!(epoch, current = self.epoch, "Discarding analysis for cancelled run");
                return AnalysisOutcome::Discarded;
            }
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return analysis_failed(e, log),
        };

        match reply.status {
            AnalyzeStatus::Ok => {
                self.run.cheating_detected = reply.cheating_detected;
                log.replace_visible(reply.messages);
                if let Some(frame) = reply.frame {
                    self.run.last_display_frame = Some(frame);
                }
                if reply.cheating_detected {
                    info!(epoch, "Cheating detected");
                }
                AnalysisOutcome::Verdict {
                    cheating_detected: reply.cheating_detected,
                }
            }
            AnalyzeStatus::NoFace => {
                log.replace_visible([MSG_NO_FACE]);
                if let Some(frame) = reply.frame {
                    self.run.last_display_frame = Some(frame);
                }
                AnalysisOutcome::NoFace
            }
            AnalyzeStatus::Error | AnalyzeStatus::Unknown => {
                debug!(status = ?reply.status, "Frame analysis not accepted");
                let message = reply
                    .message
                    .unwrap_or_else(|| "Failed to analyze frame".to_string());
                analysis_failed(Error::ServiceRejected(message), log)
            }
        }
    }
}

/// Surface a failed analysis; the verdict and frame stay as they were
fn analysis_failed(err: Error, log: &mut MessageLog) -> AnalysisOutcome {
    let kind = err.kind();
    warn!(kind = ?kind, error = %err, "Error analyzing frame");
    match err {
        Error::ServiceRejected(message) => log.replace_visible([format!("Error: {}", message)]),
        _ => log.replace_visible([MSG_ANALYZE_FAILED]),
    }
    AnalysisOutcome::Failed(kind)
}

/// Periodic tick source for one run; the first tick fires after `period`
pub fn spawn_ticker<E>(
    epoch: u64,
    period: Duration,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<E>,
) where
    E: From<MonitorEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = token.cancelled() => break,
            }
            if tx.send(MonitorEvent::Tick { epoch }.into()).is_err() {
                break;
            }
        }
        debug!(epoch, "Monitoring ticker stopped");
    });
}

/// Submit one frame; cancellation resolves the request as `None`
pub fn spawn_analysis<S, E>(
    service: Arc<S>,
    image: EncodedImage,
    epoch: u64,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<E>,
) where
    S: DetectionService,
    E: From<MonitorEvent> + Send + 'static,
{
    tokio::spawn(async move {
        let result = tokio::select! {
            r = service.analyze(&image) => Some(r),
            _ = token.cancelled() => None,
        };
        let _ = tx.send(MonitorEvent::Analysis { epoch, result }.into());
    });
}
