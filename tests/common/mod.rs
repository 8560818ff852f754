//! Scripted detection service and camera for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proctor0::config::{CaptureConstraints, ControllerConfig, Timings};
use proctor0::core::{CaptureDevice, CaptureSource, DetectionService, SessionController, SessionHandle};
use proctor0::types::wire::CalibrationStepField;
use proctor0::types::{
    AnalyzeReply, AnalyzeStatus, CalibrationStartReply, CalibrationStepReply, EncodedImage,
    FrameDimensions, HealthReply, SessionSnapshot, StatusReply,
};
use proctor0::{Error, Result};
use tokio::task::JoinHandle;

pub const INSTRUCTIONS: [&str; 5] = [
    "Look at the center of the screen",
    "Look at the top left corner",
    "Look at the top right corner",
    "Look at the bottom left corner",
    "Look at the bottom right corner",
];

/// Scripted answer for one calibration step
#[derive(Debug, Clone)]
pub enum StepScript {
    Progress(u32),
    Complete,
    Reject(&'static str),
    Fail,
}

/// Scripted answer for one analyze call
#[derive(Debug, Clone)]
pub enum AnalyzeScript {
    Verdict { cheating: bool, frame: &'static str },
    NoFace,
    Reject(&'static str),
    Fail,
}

/// In-memory detection service with call counters
#[derive(Debug)]
pub struct MockService {
    pub healthy: AtomicBool,
    pub calibrated: AtomicBool,
    pub fail_start: AtomicBool,
    server_step: AtomicU32,
    total_steps: u32,
    step_script: Mutex<VecDeque<StepScript>>,
    analyze_script: Mutex<VecDeque<AnalyzeScript>>,
    analyze_delay: Mutex<Duration>,
    status_delay: Mutex<Duration>,

    pub health_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub step_calls: AtomicUsize,
    pub analyze_calls: AtomicUsize,
    analyze_in_flight: AtomicUsize,
    pub analyze_max_in_flight: AtomicUsize,
}

impl Default for MockService {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            calibrated: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            server_step: AtomicU32::new(0),
            total_steps: INSTRUCTIONS.len() as u32,
            step_script: Mutex::new(VecDeque::new()),
            analyze_script: Mutex::new(VecDeque::new()),
            analyze_delay: Mutex::new(Duration::ZERO),
            status_delay: Mutex::new(Duration::ZERO),
            health_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            step_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
            analyze_in_flight: AtomicUsize::new(0),
            analyze_max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Service that already holds a calibration
    pub fn calibrated() -> Arc<Self> {
        let svc = Self::default();
        svc.calibrated.store(true, Ordering::SeqCst);
        Arc::new(svc)
    }

    pub fn script_steps(&self, steps: impl IntoIterator<Item = StepScript>) {
        self.step_script.lock().unwrap().extend(steps);
    }

    pub fn script_analysis(&self, replies: impl IntoIterator<Item = AnalyzeScript>) {
        self.analyze_script.lock().unwrap().extend(replies);
    }

    pub fn set_analyze_delay(&self, delay: Duration) {
        *self.analyze_delay.lock().unwrap() = delay;
    }

    /// Status answers reflect the server at request time but arrive late
    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn down() -> Error {
        Error::ServiceUnreachable("connection refused".into())
    }
}

/// Decrements the in-flight counter even when the request is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DetectionService for MockService {
    async fn health(&self) -> Result<HealthReply> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        Ok(HealthReply { status: "ok".into(), message: None })
    }

    async fn status(&self) -> Result<StatusReply> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        let calibrated = self.calibrated.load(Ordering::SeqCst);
        let step = if calibrated {
            CalibrationStepField::Label("complete".into())
        } else {
            CalibrationStepField::Step(self.server_step.load(Ordering::SeqCst))
        };
        let reply = StatusReply {
            calibrated,
            calibration_step: Some(step),
            tracking_started: Some(false),
        };
        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(reply)
    }

    async fn start_calibration(&self) -> Result<CalibrationStartReply> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::down());
        }
        self.calibrated.store(false, Ordering::SeqCst);
        self.server_step.store(0, Ordering::SeqCst);
        Ok(CalibrationStartReply {
            status: "calibration_started".into(),
            current_step: 0,
            total_steps: self.total_steps,
            steps: INSTRUCTIONS.iter().map(|s| s.to_string()).collect(),
            message: None,
        })
    }

    async fn calibration_step(&self, _image: &EncodedImage) -> Result<CalibrationStepReply> {
        self.step_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.step_script.lock().unwrap().pop_front();
        let script = scripted.unwrap_or_else(|| {
            let next = self.server_step.load(Ordering::SeqCst) + 1;
            if next >= self.total_steps {
                StepScript::Complete
            } else {
                StepScript::Progress(next)
            }
        });
        match script {
            StepScript::Progress(step) => {
                self.server_step.store(step, Ordering::SeqCst);
                Ok(CalibrationStepReply::CalibrationInProgress {
                    current_step: step,
                    total_steps: Some(self.total_steps),
                })
            }
            StepScript::Complete => {
                self.calibrated.store(true, Ordering::SeqCst);
                Ok(CalibrationStepReply::CalibrationComplete {
                    message: Some("Calibration completed successfully".into()),
                })
            }
            StepScript::Reject(message) => Ok(CalibrationStepReply::Error {
                message: Some(message.into()),
            }),
            StepScript::Fail => Err(Self::down()),
        }
    }

    async fn analyze(&self, _image: &EncodedImage) -> Result<AnalyzeReply> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.analyze_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.analyze_max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.analyze_in_flight);

        let scripted = self.analyze_script.lock().unwrap().pop_front();
        let delay = *self.analyze_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match scripted.unwrap_or(AnalyzeScript::Verdict { cheating: false, frame: "data:annotated" }) {
            AnalyzeScript::Verdict { cheating, frame } => Ok(AnalyzeReply {
                status: AnalyzeStatus::Ok,
                cheating_detected: cheating,
                messages: vec![
                    format!("Head: {}", if cheating { "ALERT" } else { "Head OK" }),
                    "Eye LR: Eye LR OK".to_string(),
                ],
                frame: Some(EncodedImage::from_data_url(frame)),
                message: None,
            }),
            AnalyzeScript::NoFace => Ok(AnalyzeReply {
                status: AnalyzeStatus::NoFace,
                cheating_detected: false,
                messages: vec!["No face detected".into()],
                frame: Some(EncodedImage::from_data_url("data:raw")),
                message: None,
            }),
            AnalyzeScript::Reject(message) => Ok(AnalyzeReply {
                status: AnalyzeStatus::Error,
                cheating_detected: false,
                messages: Vec::new(),
                frame: None,
                message: Some(message.into()),
            }),
            AnalyzeScript::Fail => Err(Self::down()),
        }
    }
}

/// Camera counters shared between the source and its devices
#[derive(Debug, Default)]
pub struct CameraCounters {
    pub opens: AtomicUsize,
    pub stops: AtomicUsize,
    pub frames: AtomicUsize,
}

/// Camera whose open can be made to fail
#[derive(Debug, Default)]
pub struct MockCamera {
    pub deny: AtomicBool,
    pub counters: Arc<CameraCounters>,
}

impl MockCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denied() -> Arc<Self> {
        let cam = Self::default();
        cam.deny.store(true, Ordering::SeqCst);
        Arc::new(cam)
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct MockDevice {
    ready: bool,
    stopped: bool,
    counters: Arc<CameraCounters>,
}

impl CaptureDevice for MockDevice {
    async fn wait_ready(&mut self) -> Result<FrameDimensions> {
        self.ready = true;
        Ok(FrameDimensions { width: 640, height: 480 })
    }

    fn is_ready(&self) -> bool {
        self.ready && !self.stopped
    }

    fn grab_frame(&mut self) -> Option<EncodedImage> {
        let n = self.counters.frames.fetch_add(1, Ordering::SeqCst);
        Some(EncodedImage::jpeg(format!("frame-{}", n).as_bytes()))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl CaptureSource for MockCamera {
    type Device = MockDevice;

    async fn open(&self, _constraints: &CaptureConstraints) -> Result<MockDevice> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::DeviceUnavailable("Permission denied".into()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MockDevice {
            ready: false,
            stopped: false,
            counters: self.counters.clone(),
        })
    }
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        service_url: "http://detector.test".to_string(),
        frames_dir: None,
        capture: CaptureConstraints::default(),
        timings: Timings::default(),
    }
}

pub fn spawn_session(
    service: &Arc<MockService>,
    camera: &Arc<MockCamera>,
) -> (SessionHandle, JoinHandle<()>) {
    SessionController::spawn(test_config(), service.clone(), camera.clone())
}

/// Wait (in virtual time) for a snapshot matching `predicate`
pub async fn wait_until(
    handle: &SessionHandle,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(Duration::from_secs(60), handle.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session closed")
}

/// Let every ready task run and virtual time advance by `ms`
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

pub fn has_message(snapshot: &SessionSnapshot, text: &str) -> bool {
    snapshot.messages.iter().any(|m| m.text == text)
}
