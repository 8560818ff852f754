//! Output formatting for terminal display

use colored::Colorize;

use crate::types::{SessionSnapshot, SessionState};

impl SessionSnapshot {
    /// Status line: connection, calibration and verdict indicators
    fn status_parts(&self) -> (String, &'static str, &'static str) {
        let connected = if self.connectivity.connected {
            "Connected"
        } else {
            "Disconnected"
        };
        let calibrated = if self.connectivity.calibrated_on_server {
            "Calibrated"
        } else {
            "Not Calibrated"
        };
        let verdict = match self.session_state {
            SessionState::Monitoring if self.monitoring.cheating_detected => "CHEATING DETECTED!",
            SessionState::Monitoring => "No Cheating",
            _ => "",
        };
        (format!("{} | {}", connected, calibrated), verdict, self.detail())
    }

    /// Phase-specific detail ("Step 2 of 5", "Monitoring active")
    fn detail(&self) -> &'static str {
        match self.session_state {
            SessionState::Setup => "Setup",
            SessionState::Calibrating => "Calibration",
            SessionState::Monitoring => self.monitoring.status_text(self.camera_ready),
        }
    }

    /// Actions on offer while in setup
    pub fn setup_hints(&self) -> Vec<&'static str> {
        let mut hints = Vec::new();
        if self.connectivity.can_start_calibration() {
            hints.push("'start' to calibrate");
        }
        if self.connectivity.can_skip_to_monitoring() {
            hints.push("'skip' to monitor");
        }
        hints
    }

    /// Format for terminal display (with colors)
    pub fn to_terminal_string(&self) -> String {
        let (status, verdict, detail) = self.status_parts();
        let mut out = format!(
            "{} {} | {} | {}",
            self.session_state.emoji(),
            self.session_state.to_string().color(self.session_state.color()).bold(),
            status,
            detail
        );

        if let Some(progress) = &self.calibration {
            if self.session_state == SessionState::Calibrating {
                out.push_str(&format!(
                    " | {} {}",
                    progress.step_label(),
                    progress_bar(progress.fraction())
                ));
            }
        }
        if self.session_state == SessionState::Setup {
            let hints = self.setup_hints();
            if !hints.is_empty() {
                out.push_str(&format!("\n  ▶ {}", hints.join(" or ").cyan()));
            }
        }
        if !verdict.is_empty() {
            let verdict = if self.monitoring.cheating_detected {
                verdict.red().bold()
            } else {
                verdict.green()
            };
            out.push_str(&format!(" | {}", verdict));
        }
        if let Some(instruction) = &self.instruction {
            out.push_str(&format!("\n  ▶ {}", instruction.cyan()));
        }
        for msg in &self.messages {
            let line = if msg.is_alert() {
                msg.text.red().to_string()
            } else {
                msg.text.bright_black().to_string()
            };
            out.push_str(&format!("\n  └─ {}", line));
        }
        out
    }

    /// Format for parseable output (no colors)
    pub fn to_parseable_string(&self) -> String {
        let (status, verdict, detail) = self.status_parts();
        let step = self
            .calibration
            .as_ref()
            .map(|p| format!("{}/{}", p.current_step, p.total_steps))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "state={} | {} | step={} | detail={} | verdict={} | messages={}",
            self.session_state,
            status,
            step,
            detail,
            if verdict.is_empty() { "-" } else { verdict },
            self.message_texts().join(" / ")
        )
    }
}

/// Ten-cell bar for a 0.0..=1.0 fraction
fn progress_bar(fraction: f64) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * 10.0).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(10 - filled))
}
