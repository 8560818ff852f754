//! Session controller: top-level state machine
//!
//! State transitions:
//! - SETUP → CALIBRATING: service accepted `calibration/start`
//! - CALIBRATING → CALIBRATING: restart, progress reset
//! - CALIBRATING → MONITORING: step answer `calibration_complete`, after the confirmation delay
//! - SETUP → MONITORING: skip intent or status poll, only with a calibrated server
//!
//! The controller is one task that owns every piece of session state.
//! Timers and service calls run as child tasks and report back over a
//! channel; each report is applied in full before the next snapshot is
//! published.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::core::calibration::{CalibrationSequencer, StepOutcome};
use crate::core::capture::{
    AcquireOutcome, CaptureGuard, CaptureManager, CaptureOwner, CaptureSource,
};
use crate::core::monitor::{self, MonitorEvent, MonitoringLoop};
use crate::core::poller::{self, ConnectivityPoller, PollerEvent};
use crate::core::service::DetectionService;
use crate::error::{Error, Result};
use crate::types::{
    CalibrationStartReply, CalibrationStepReply, Intent, MessageLog, SessionSnapshot,
    SessionState,
};

pub const MSG_ALREADY_CALIBRATED: &str = "System already calibrated. Starting monitoring...";
pub const MSG_SWITCHING: &str = "Switching to monitoring mode";
pub const MSG_NOT_CALIBRATED: &str = "Please complete calibration before monitoring";
pub const MSG_CAPTURE_FAILED: &str = "Failed to capture image from camera. Please try again.";
pub const MSG_CAMERA_UNAVAILABLE: &str =
    "Failed to access camera. Please ensure your camera is connected and you have granted permission.";
pub const MSG_CALIBRATION_LOCKED: &str = "Calibration cannot be restarted while monitoring";

/// Queue depth for presentation intents
const INTENT_QUEUE: usize = 32;

/// Everything child tasks report back
enum Event<S: CaptureSource> {
    Poller(PollerEvent),
    Monitor(MonitorEvent),
    CalibrationStarted(Result<CalibrationStartReply>),
    CalibrationStep {
        generation: u64,
        result: Result<CalibrationStepReply>,
    },
    CompletionDelayElapsed {
        generation: u64,
    },
    DeviceOpened {
        ticket: u64,
        result: Result<CaptureGuard<S::Device>>,
    },
    SettleElapsed {
        ticket: u64,
    },
}

impl<S: CaptureSource> From<PollerEvent> for Event<S> {
    fn from(e: PollerEvent) -> Self {
        Event::Poller(e)
    }
}

impl<S: CaptureSource> From<MonitorEvent> for Event<S> {
    fn from(e: MonitorEvent) -> Self {
        Event::Monitor(e)
    }
}

/// Handle the presentation layer holds on a running session
#[derive(Clone)]
pub struct SessionHandle {
    intents: mpsc::Sender<Intent>,
    snapshots: watch::Receiver<SessionSnapshot>,
    token: CancellationToken,
}

impl SessionHandle {
    /// Forward a user intent
    pub async fn send(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every publish
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        let mut rx = self.snapshots.clone();
        let snap = rx.wait_for(predicate).await.map_err(|_| Error::SessionClosed)?;
        Ok(snap.clone())
    }

    /// Stop every timer and request and release the device
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}

/// Single-owner session state machine
pub struct SessionController<D: DetectionService, S: CaptureSource> {
    config: ControllerConfig,
    service: Arc<D>,
    state: SessionState,
    capture: CaptureManager<S>,
    poller: ConnectivityPoller,
    calibration: CalibrationSequencer,
    monitor: MonitoringLoop,
    log: MessageLog,
    /// Acquisition whose readiness should auto-start monitoring
    settle_ticket: Option<u64>,
    token: CancellationToken,
    events: mpsc::UnboundedSender<Event<S>>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl<D: DetectionService, S: CaptureSource> SessionController<D, S> {
    /// Start a controller task. The task ends on `shutdown()` or when
    /// every handle is dropped.
    pub fn spawn(
        config: ControllerConfig,
        service: Arc<D>,
        source: Arc<S>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let token = CancellationToken::new();
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_QUEUE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial());

        let controller = Self {
            capture: CaptureManager::new(source, config.capture),
            config,
            service,
            state: SessionState::Setup,
            poller: ConnectivityPoller::new(),
            calibration: CalibrationSequencer::new(),
            monitor: MonitoringLoop::new(token.child_token()),
            log: MessageLog::new(),
            settle_ticket: None,
            token: token.clone(),
            events: event_tx,
            snapshots: snapshot_tx,
        };

        let task = tokio::spawn(controller.run(intent_rx, event_rx));
        let handle = SessionHandle {
            intents: intent_tx,
            snapshots: snapshot_rx,
            token,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        mut events: mpsc::UnboundedReceiver<Event<S>>,
    ) {
        info!(service_url = %self.config.service_url, "Session controller started");

        poller::spawn_boot_check(
            self.service.clone(),
            self.poller.revision(),
            self.token.clone(),
            self.events.clone(),
        );
        poller::spawn_health_ticker(
            self.service.clone(),
            self.config.timings.health_poll,
            self.token.clone(),
            self.events.clone(),
        );
        self.publish();

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                intent = intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
            self.publish();
        }

        self.teardown();
    }

    fn teardown(&mut self) {
        self.monitor.pause();
        self.capture.release();
        self.settle_ticket = None;
        self.token.cancel();
        self.publish();
        info!(
            messages = self.log.len(),
            health_checks = self.poller.health_checks(),
            status_checks = self.poller.status_checks(),
            dropped_ticks = self.monitor.dropped_ticks(),
            "Session controller stopped"
        );
    }

    fn publish(&self) {
        let progress = self.calibration.progress().cloned();
        let instruction = progress
            .as_ref()
            .filter(|_| self.state == SessionState::Calibrating)
            .and_then(|p| p.current_instruction().map(str::to_string));
        self.snapshots.send_replace(SessionSnapshot {
            timestamp: chrono::Utc::now(),
            session_state: self.state,
            calibration: progress,
            instruction,
            connectivity: self.poller.state().clone(),
            monitoring: self.monitor.run_state().clone(),
            camera_ready: self.capture.is_ready(),
            messages: self.log.visible().to_vec(),
            message_total: self.log.len(),
        });
    }

    // =========================================================================
    // INTENTS
    // =========================================================================

    fn handle_intent(&mut self, intent: Intent) {
        debug!(intent = ?intent, state = %self.state, "Intent");
        match intent {
            Intent::StartCalibration => self.request_calibration_start(),
            Intent::SubmitCalibrationFrame => self.submit_calibration_frame(),
            Intent::SkipToMonitoring => self.skip_to_monitoring(),
            Intent::PauseMonitoring => self.pause_monitoring(),
            Intent::ResumeMonitoring => self.resume_monitoring(),
        }
    }

    fn request_calibration_start(&mut self) {
        if self.state == SessionState::Monitoring {
            self.log.push(MSG_CALIBRATION_LOCKED);
            return;
        }
        if !self.calibration.begin_start() {
            debug!("Calibration start already pending");
            return;
        }
        let service = self.service.clone();
        let token = self.token.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                r = service.start_calibration() => r,
                _ = token.cancelled() => return,
            };
            let _ = tx.send(Event::CalibrationStarted(result));
        });
    }

    fn submit_calibration_frame(&mut self) {
        if self.state != SessionState::Calibrating {
            debug!(state = %self.state, "Calibration frame outside calibration");
            return;
        }
        let Some(generation) = self.calibration.begin_step() else {
            debug!(
                step_pending = self.calibration.step_pending(),
                complete = self.calibration.is_complete(),
                "Calibration frame ignored"
            );
            return;
        };
        let Some(image) = self.capture.grab_frame() else {
            self.calibration.cancel_step();
            warn!("Failed to capture calibration image");
            self.log.push(MSG_CAPTURE_FAILED);
            return;
        };

        let service = self.service.clone();
        let token = self.token.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                r = service.calibration_step(&image) => r,
                _ = token.cancelled() => return,
            };
            let _ = tx.send(Event::CalibrationStep { generation, result });
        });
    }

    fn skip_to_monitoring(&mut self) {
        if self.state != SessionState::Setup {
            debug!(state = %self.state, "Skip ignored outside setup");
            return;
        }
        if self.enter_monitoring() {
            self.log.push(MSG_SWITCHING);
        } else {
            self.log.push(MSG_NOT_CALIBRATED);
        }
    }

    fn pause_monitoring(&mut self) {
        if self.state != SessionState::Monitoring {
            return;
        }
        self.settle_ticket = None;
        self.monitor.pause();
    }

    fn resume_monitoring(&mut self) {
        if self.state != SessionState::Monitoring || self.monitor.is_running() {
            return;
        }
        if self.capture.is_ready() {
            self.start_monitoring();
        } else if !self.capture.is_acquiring() {
            info!("Camera not ready, re-acquiring before resume");
            self.acquire(CaptureOwner::Monitoring);
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    fn handle_event(&mut self, event: Event<S>) {
        match event {
            Event::Poller(PollerEvent::BootHealth(result)) => {
                self.poller.apply_health(&result);
            }
            Event::Poller(PollerEvent::Health(result)) => {
                if self.poller.apply_health(&result) {
                    poller::spawn_status_check(
                        self.service.clone(),
                        self.poller.revision(),
                        self.token.clone(),
                        self.events.clone(),
                    );
                }
            }
            Event::Poller(PollerEvent::Status { revision, result }) => {
                let change = self.poller.apply_status(revision, result);
                if change.is_some_and(|c| c.newly_calibrated) {
                    info!(state = %self.state, "Detection service reports a calibration");
                }
                if change.is_some_and(|c| c.calibrated) && self.state == SessionState::Setup {
                    info!("Server already calibrated, switching to monitoring");
                    if self.enter_monitoring() {
                        self.log.push(MSG_ALREADY_CALIBRATED);
                    }
                }
            }
            Event::CalibrationStarted(result) => {
                if self.calibration.apply_start(result, &mut self.log) {
                    self.enter_calibrating();
                }
            }
            Event::CalibrationStep { generation, result } => {
                let outcome = self.calibration.apply_step(generation, result, &mut self.log);
                if outcome == StepOutcome::Completed {
                    self.poller.mark_calibrated();
                    self.schedule(
                        self.config.timings.completion_delay,
                        Event::CompletionDelayElapsed { generation },
                    );
                }
            }
            Event::CompletionDelayElapsed { generation } => {
                let current = generation == self.calibration.generation();
                // a completion answer outranks any status answer
                if current
                    && self.state == SessionState::Calibrating
                    && self.calibration.is_complete()
                {
                    self.switch_to_monitoring();
                }
            }
            Event::DeviceOpened { ticket, result } => self.device_opened(ticket, result),
            Event::SettleElapsed { ticket } => {
                if self.settle_ticket == Some(ticket) {
                    self.settle_ticket = None;
                    if self.state == SessionState::Monitoring && self.capture.is_ready() {
                        self.start_monitoring();
                    }
                }
            }
            Event::Monitor(MonitorEvent::Tick { epoch }) => self.monitor_tick(epoch),
            Event::Monitor(MonitorEvent::Analysis { epoch, result }) => {
                let outcome = self.monitor.apply_analysis(epoch, result, &mut self.log);
                debug!(epoch, outcome = ?outcome, "Analysis applied");
            }
        }
    }

    fn device_opened(&mut self, ticket: u64, result: Result<CaptureGuard<S::Device>>) {
        match self.capture.complete_acquire(ticket, result) {
            AcquireOutcome::Ready(_) => {
                if self.state == SessionState::Monitoring && !self.monitor.is_running() {
                    self.settle_ticket = Some(ticket);
                    self.schedule(
                        self.config.timings.settle_delay,
                        Event::SettleElapsed { ticket },
                    );
                }
            }
            AcquireOutcome::Failed(e) => {
                warn!(error = %e, kind = ?e.kind(), "Error accessing camera");
                self.log.push(MSG_CAMERA_UNAVAILABLE);
            }
            AcquireOutcome::Stale => {}
        }
    }

    fn monitor_tick(&mut self, epoch: u64) {
        if self.monitor.check_tick(epoch).is_err() {
            return;
        }
        let Some(image) = self.capture.grab_frame() else {
            debug!(epoch, "Camera not ready, skipping tick");
            return;
        };
        if let Some((epoch, token)) = self.monitor.begin_request() {
            monitor::spawn_analysis(self.service.clone(), image, epoch, token, self.events.clone());
        }
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    fn enter_calibrating(&mut self) {
        let from = self.state;
        self.state = SessionState::Calibrating;
        let step = self.calibration.progress().map_or(0, |p| p.current_step);
        self.poller.mark_uncalibrated(step);
        info!(from = %from, "Entering calibration");
        if self.capture.owner() != Some(CaptureOwner::Calibration) {
            self.acquire(CaptureOwner::Calibration);
        }
    }

    /// Move to monitoring if the server holds a calibration
    fn enter_monitoring(&mut self) -> bool {
        if !self.poller.state().calibrated_on_server {
            warn!(state = %self.state, "Monitoring blocked, not calibrated");
            return false;
        }
        self.switch_to_monitoring();
        true
    }

    fn switch_to_monitoring(&mut self) {
        let from = self.state;
        self.state = SessionState::Monitoring;
        info!(from = %from, "Entering monitoring");
        // calibration's handle is released before monitoring opens its own
        self.capture.release();
        self.acquire(CaptureOwner::Monitoring);
    }

    fn start_monitoring(&mut self) {
        if let Some((epoch, token)) = self.monitor.start() {
            monitor::spawn_ticker(
                epoch,
                self.config.timings.monitor_period,
                token,
                self.events.clone(),
            );
        }
    }

    fn acquire(&mut self, owner: CaptureOwner) {
        self.settle_ticket = None;
        let (ticket, task) = self.capture.begin_acquire(owner);
        let token = self.token.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                r = task => r,
                _ = token.cancelled() => return,
            };
            let _ = tx.send(Event::DeviceOpened { ticket, result });
        });
    }

    /// Deliver `event` after `delay` unless the session ends first
    fn schedule(&self, delay: Duration, event: Event<S>) {
        let token = self.token.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
                _ = token.cancelled() => {}
            }
        });
    }
}
