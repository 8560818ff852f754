//! Calibration sequencer
//!
//! Drives `CalibrationProgress` from service answers. Step indices are
//! taken verbatim from the service. Rejected steps stay on the same step
//! and may be retried without limit.

use tracing::{debug, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::types::{
    CalibrationProgress, CalibrationStartReply, CalibrationStepReply, MessageLog,
};

pub const MSG_STARTED: &str = "Calibration started. Follow the instructions.";
pub const MSG_START_REFUSED: &str = "Failed to start calibration";
pub const MSG_START_FAILED: &str = "Error: Failed to start calibration";
pub const MSG_COMPLETE: &str = "Calibration complete! Ready for monitoring.";
pub const MSG_STEP_FAILED: &str = "Error: Failed to process calibration step";

/// What a step answer did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Service finished calibration
    Completed,
    /// Service moved to `step`
    Advanced { step: u32, total: u32 },
    /// Explicit `error` answer, same step
    Rejected,
    /// Transport failure, same step
    Failed,
    /// Answer for an abandoned calibration run
    Discarded,
}

/// Calibration wizard state machine
#[derive(Debug, Default)]
pub struct CalibrationSequencer {
    progress: Option<CalibrationProgress>,
    /// Bumped on every accepted start so late step answers can be dropped
    generation: u64,
    start_pending: bool,
    step_pending: bool,
}

impl CalibrationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Option<&CalibrationProgress> {
        self.progress.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_complete(&self) -> bool {
        self.progress.as_ref().is_some_and(|p| p.complete)
    }

    pub fn step_pending(&self) -> bool {
        self.step_pending
    }

    /// Reserve a start request; `false` if one is already outstanding
    pub fn begin_start(&mut self) -> bool {
        if self.start_pending {
            return false;
        }
        self.start_pending = true;
        true
    }

    /// Apply the `calibration/start` answer. Returns `true` when the
    /// service started a new run; progress is then reset to its values.
    pub fn apply_start(
        &mut self,
        result: Result<CalibrationStartReply>,
        log: &mut MessageLog,
    ) -> bool {
        self.start_pending = false;
        match result {
            Ok(reply) if reply.is_started() => {
                self.generation += 1;
                self.step_pending = false;
                let progress =
                    CalibrationProgress::new(reply.current_step, reply.total_steps, reply.steps);
                info!(
                    generation = self.generation,
                    current_step = progress.current_step,
                    total_steps = progress.total_steps,
                    "Calibration started"
                );
                self.progress = Some(progress);
                log.replace_visible([MSG_STARTED]);
                true
            }
            Ok(reply) => {
                warn!(status = %reply.status, message = ?reply.message, "Calibration start refused");
                log.replace_visible([MSG_START_REFUSED]);
                false
            }
            Err(e) => {
                warn!(error = %e, "Error starting calibration");
                log.replace_visible([MSG_START_FAILED]);
                false
            }
        }
    }

    /// Reserve a step submission. Returns the run generation the answer
    /// must be matched against, or `None` when no step can be submitted.
    pub fn begin_step(&mut self) -> Option<u64> {
        let ready = self.progress.as_ref().is_some_and(|p| !p.complete);
        if !ready || self.step_pending {
            return None;
        }
        self.step_pending = true;
        Some(self.generation)
    }

    /// Give back a reservation that never reached the service
    pub fn cancel_step(&mut self) {
        self.step_pending = false;
    }

    /// Apply a `calibration/step` answer for run `generation`
    pub fn apply_step(
        &mut self,
        generation: u64,
        result: Result<CalibrationStepReply>,
        log: &mut MessageLog,
    ) -> StepOutcome {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Discarding stale calibration answer");
            return StepOutcome::Discarded;
        }
        self.step_pending = false;
        let Some(progress) = self.progress.as_mut() else {
            return StepOutcome::Discarded;
        };

        match result {
            Ok(CalibrationStepReply::CalibrationComplete { .. }) => {
                progress.mark_complete();
                info!(total_steps = progress.total_steps, "Calibration complete");
                log.push(MSG_COMPLETE);
                StepOutcome::Completed
            }
            Ok(CalibrationStepReply::CalibrationInProgress { current_step, total_steps }) => {
                progress.advance_to(current_step, total_steps);
                log.push(format!(
                    "Step {} of {} completed.",
                    progress.current_step, progress.total_steps
                ));
                StepOutcome::Advanced {
                    step: progress.current_step,
                    total: progress.total_steps,
                }
            }
            Ok(CalibrationStepReply::Error { message }) => {
                let message = message.unwrap_or_else(|| "Calibration step rejected".to_string());
                step_failed(progress.current_step, Error::ServiceRejected(message), log)
            }
            Err(e) => step_failed(progress.current_step, e, log),
        }
    }
}

/// Rejections show the service's reason; anything else the generic retry hint
fn step_failed(step: u32, err: Error, log: &mut MessageLog) -> StepOutcome {
    warn!(step, kind = ?err.kind(), error = %err, "Error during calibration step");
    match err.kind() {
        ErrorKind::ServiceRejected => {
            log.push(format!("Error: {}", err.reason()));
            StepOutcome::Rejected
        }
        _ => {
            log.push(MSG_STEP_FAILED);
            StepOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(total: u32) -> Result<CalibrationStartReply> {
        Ok(CalibrationStartReply {
            status: "calibration_started".into(),
            current_step: 0,
            total_steps: total,
            steps: (0..total).map(|i| format!("instruction {}", i)).collect(),
            message: None,
        })
    }

    fn running(total: u32) -> (CalibrationSequencer, MessageLog) {
        let mut seq = CalibrationSequencer::new();
        let mut log = MessageLog::new();
        assert!(seq.begin_start());
        assert!(seq.apply_start(started(total), &mut log));
        (seq, log)
    }

    #[test]
    fn test_start_sets_progress() {
        let (seq, log) = running(5);
        let p = seq.progress().unwrap();
        assert_eq!(p.total_steps, 5);
        assert_eq!(p.current_step, 0);
        assert!(!p.complete);
        assert_eq!(log.visible()[0].text, MSG_STARTED);
    }

    #[test]
    fn test_start_refused() {
        let mut seq = CalibrationSequencer::new();
        let mut log = MessageLog::new();
        seq.begin_start();
        let reply = Ok(CalibrationStartReply {
            status: "error".into(),
            current_step: 0,
            total_steps: 0,
            steps: Vec::new(),
            message: Some("camera busy".into()),
        });
        assert!(!seq.apply_start(reply, &mut log));
        assert!(seq.progress().is_none());
        assert_eq!(log.last().unwrap().text, MSG_START_REFUSED);
    }

    #[test]
    fn test_step_uses_server_index() {
        let (mut seq, mut log) = running(5);
        let gen = seq.begin_step().unwrap();
        let outcome = seq.apply_step(
            gen,
            Ok(CalibrationStepReply::CalibrationInProgress { current_step: 3, total_steps: Some(5) }),
            &mut log,
        );
        assert_eq!(outcome, StepOutcome::Advanced { step: 3, total: 5 });
        assert_eq!(seq.progress().unwrap().current_step, 3);
        assert_eq!(log.last().unwrap().text, "Step 3 of 5 completed.");
    }

    #[test]
    fn test_rejected_step_stays_and_is_retryable() {
        let (mut seq, mut log) = running(5);
        for _ in 0..10 {
            let gen = seq.begin_step().unwrap();
            let outcome = seq.apply_step(
                gen,
                Ok(CalibrationStepReply::Error {
                    message: Some("No face detected in calibration image".into()),
                }),
                &mut log,
            );
            assert_eq!(outcome, StepOutcome::Rejected);
        }
        assert_eq!(seq.progress().unwrap().current_step, 0);
        assert_eq!(log.count_of("Error: No face detected in calibration image"), 10);
    }

    #[test]
    fn test_transport_failure_is_non_fatal() {
        let (mut seq, mut log) = running(5);
        let gen = seq.begin_step().unwrap();
        let outcome = seq.apply_step(
            gen,
            Err(Error::ServiceUnreachable("connection reset".into())),
            &mut log,
        );
        assert_eq!(outcome, StepOutcome::Failed);
        assert_eq!(log.last().unwrap().text, MSG_STEP_FAILED);
        assert!(seq.begin_step().is_some());
    }

    #[test]
    fn test_one_step_outstanding() {
        let (mut seq, _log) = running(5);
        assert!(seq.begin_step().is_some());
        assert!(seq.begin_step().is_none());
        seq.cancel_step();
        assert!(seq.begin_step().is_some());
    }

    #[test]
    fn test_complete_blocks_further_steps() {
        let (mut seq, mut log) = running(5);
        let gen = seq.begin_step().unwrap();
        let outcome = seq.apply_step(
            gen,
            Ok(CalibrationStepReply::CalibrationComplete { message: None }),
            &mut log,
        );
        assert_eq!(outcome, StepOutcome::Completed);
        assert!(seq.is_complete());
        assert_eq!(seq.progress().unwrap().current_step, 5);
        assert!(seq.begin_step().is_none());
    }

    #[test]
    fn test_restart_discards_late_answer() {
        let (mut seq, mut log) = running(5);
        let old = seq.begin_step().unwrap();
        seq.begin_start();
        seq.apply_start(started(5), &mut log);

        let outcome = seq.apply_step(
            old,
            Ok(CalibrationStepReply::CalibrationInProgress { current_step: 1, total_steps: None }),
            &mut log,
        );
        assert_eq!(outcome, StepOutcome::Discarded);
        assert_eq!(seq.progress().unwrap().current_step, 0);
    }
}
