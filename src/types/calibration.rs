//! Calibration progress tracking
//!
//! Step indices always come from the detection service; nothing here
//! increments on its own.

use serde::{Deserialize, Serialize};

/// Progress through the calibration wizard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    /// Zero-based index of the step being captured
    pub current_step: u32,
    /// Number of steps reported by the service (> 0)
    pub total_steps: u32,
    /// Per-step instructions, may be shorter than `total_steps`
    pub instructions: Vec<String>,
    /// Set once the service reports completion
    pub complete: bool,
}

impl CalibrationProgress {
    /// Create progress from a `calibration_started` answer.
    ///
    /// A zero step count is lifted to one so the fraction stays defined.
    pub fn new(current_step: u32, total_steps: u32, instructions: Vec<String>) -> Self {
        let total_steps = total_steps.max(1);
        Self {
            current_step: current_step.min(total_steps),
            total_steps,
            instructions,
            complete: false,
        }
    }

    /// Move to the step echoed by the service
    pub fn advance_to(&mut self, step: u32, total_steps: Option<u32>) {
        if let Some(total) = total_steps {
            self.total_steps = total.max(1);
        }
        self.current_step = step.min(self.total_steps);
    }

    /// Mark the wizard finished
    pub fn mark_complete(&mut self) {
        self.current_step = self.total_steps;
        self.complete = true;
    }

    /// Instruction for the current step, if the service sent one
    pub fn current_instruction(&self) -> Option<&str> {
        if self.complete {
            return None;
        }
        self.instructions
            .get(self.current_step as usize)
            .map(String::as_str)
    }

    /// Completed fraction in 0.0..=1.0 (progress bar)
    pub fn fraction(&self) -> f64 {
        self.current_step as f64 / self.total_steps as f64
    }

    /// Human step counter ("Step 2 of 5")
    pub fn step_label(&self) -> String {
        if self.complete {
            format!("Complete ({} steps)", self.total_steps)
        } else {
            format!("Step {} of {}", self.current_step + 1, self.total_steps)
        }
    }
}
