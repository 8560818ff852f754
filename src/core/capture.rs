//! Capture resource manager
//!
//! One device handle, one owner at a time. Handles live inside a
//! `CaptureGuard` from the moment they are opened, so every exit path
//! (release, error, cancellation, drop) stops the underlying stream.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CaptureConstraints;
use crate::error::{Error, Result};
use crate::types::{EncodedImage, FrameDimensions};

/// An opened capture stream
pub trait CaptureDevice: Send + 'static {
    /// Resolves once the stream has delivered metadata
    fn wait_ready(&mut self) -> impl Future<Output = Result<FrameDimensions>> + Send;

    /// Metadata known, frames can be grabbed
    fn is_ready(&self) -> bool;

    /// Snapshot of the most recent frame; `None` before readiness
    fn grab_frame(&mut self) -> Option<EncodedImage>;

    /// Stop all tracks; must tolerate repeated calls
    fn stop(&mut self);
}

/// Something that can open capture streams
pub trait CaptureSource: Send + Sync + 'static {
    type Device: CaptureDevice;

    fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> impl Future<Output = Result<Self::Device>> + Send;
}

/// Component currently holding the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOwner {
    Calibration,
    Monitoring,
}

/// Scoped device ownership; stops the device on release or drop
pub struct CaptureGuard<D: CaptureDevice> {
    device: D,
    owner: CaptureOwner,
    dimensions: Option<FrameDimensions>,
    released: bool,
}

impl<D: CaptureDevice> CaptureGuard<D> {
    pub fn new(device: D, owner: CaptureOwner) -> Self {
        Self {
            device,
            owner,
            dimensions: None,
            released: false,
        }
    }

    /// Wait for metadata and remember the dimensions
    pub async fn wait_ready(&mut self) -> Result<FrameDimensions> {
        let dims = self.device.wait_ready().await?;
        self.dimensions = Some(dims);
        Ok(dims)
    }

    pub fn owner(&self) -> CaptureOwner {
        self.owner
    }

    pub fn dimensions(&self) -> Option<FrameDimensions> {
        self.dimensions
    }

    pub fn is_ready(&self) -> bool {
        !self.released && self.device.is_ready()
    }

    /// Grab a frame, rejecting anything before readiness
    pub fn grab_frame(&mut self) -> Option<EncodedImage> {
        if !self.is_ready() {
            return None;
        }
        self.device.grab_frame()
    }

    /// Stop the device. Idempotent.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.device.stop();
            debug!(owner = ?self.owner, "Capture device released");
        }
    }
}

impl<D: CaptureDevice> Drop for CaptureGuard<D> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<D: CaptureDevice> std::fmt::Debug for CaptureGuard<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureGuard")
            .field("owner", &self.owner)
            .field("dimensions", &self.dimensions)
            .field("released", &self.released)
            .finish()
    }
}

/// Result of handing an opened device back to the manager
#[derive(Debug)]
pub enum AcquireOutcome {
    /// Device held and ready
    Ready(FrameDimensions),
    /// Opening failed; nothing held
    Failed(Error),
    /// The requester moved on; the device was released on arrival
    Stale,
}

enum Slot<D: CaptureDevice> {
    Idle,
    Acquiring { ticket: u64, owner: CaptureOwner },
    Held(CaptureGuard<D>),
}

/// Owns the single capture slot
pub struct CaptureManager<S: CaptureSource> {
    source: Arc<S>,
    constraints: CaptureConstraints,
    slot: Slot<S::Device>,
    next_ticket: u64,
}

impl<S: CaptureSource> CaptureManager<S> {
    pub fn new(source: Arc<S>, constraints: CaptureConstraints) -> Self {
        Self {
            source,
            constraints,
            slot: Slot::Idle,
            next_ticket: 0,
        }
    }

    /// Start an acquisition for `owner`.
    ///
    /// Anything currently held is released first. The returned future is
    /// detached from the manager and yields a guarded, ready device; feed
    /// it back through [`CaptureManager::complete_acquire`].
    pub fn begin_acquire(
        &mut self,
        owner: CaptureOwner,
    ) -> (
        u64,
        impl Future<Output = Result<CaptureGuard<S::Device>>> + Send + 'static,
    ) {
        self.release();
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.slot = Slot::Acquiring { ticket, owner };
        info!(ticket, owner = ?owner, "Acquiring capture device");

        let source = self.source.clone();
        let constraints = self.constraints;
        let task = async move {
            let device = source.open(&constraints).await?;
            let mut guard = CaptureGuard::new(device, owner);
            guard.wait_ready().await?;
            Ok(guard)
        };
        (ticket, task)
    }

    /// Install the result of an acquisition started with `ticket`
    pub fn complete_acquire(
        &mut self,
        ticket: u64,
        result: Result<CaptureGuard<S::Device>>,
    ) -> AcquireOutcome {
        let current = matches!(self.slot, Slot::Acquiring { ticket: t, .. } if t == ticket);
        if !current {
            // dropping the guard stops the device
            debug!(ticket, "Discarding stale capture acquisition");
            return AcquireOutcome::Stale;
        }
        match result {
            Ok(guard) => {
                let dims = guard.dimensions().unwrap_or(FrameDimensions {
                    width: self.constraints.width,
                    height: self.constraints.height,
                });
                info!(
                    ticket,
                    width = dims.width,
                    height = dims.height,
                    "Capture device ready"
                );
                self.slot = Slot::Held(guard);
                AcquireOutcome::Ready(dims)
            }
            Err(e) => {
                warn!(ticket, error = %e, "Capture device unavailable");
                self.slot = Slot::Idle;
                AcquireOutcome::Failed(e)
            }
        }
    }

    /// Release whatever is held and forget pending acquisitions
    pub fn release(&mut self) {
        if let Slot::Held(mut guard) = std::mem::replace(&mut self.slot, Slot::Idle) {
            guard.release();
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&self.slot, Slot::Held(guard) if guard.is_ready())
    }

    pub fn is_acquiring(&self) -> bool {
        matches!(self.slot, Slot::Acquiring { .. })
    }

    /// Current holder (or pending holder)
    pub fn owner(&self) -> Option<CaptureOwner> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Acquiring { owner, .. } => Some(*owner),
            Slot::Held(guard) => Some(guard.owner()),
        }
    }

    /// Synchronous snapshot; `None` when nothing ready is held
    pub fn grab_frame(&mut self) -> Option<EncodedImage> {
        match &mut self.slot {
            Slot::Held(guard) => guard.grab_frame(),
            _ => None,
        }
    }
}

// =============================================================================
// FRAME DIRECTORY SOURCE
// =============================================================================

/// Replays still images from a directory as a camera stream
#[derive(Debug, Clone)]
pub struct FrameDirSource {
    dir: PathBuf,
}

impl FrameDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn frame_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        _ => None,
    }
}

impl CaptureSource for FrameDirSource {
    type Device = FrameDirDevice;

    async fn open(&self, constraints: &CaptureConstraints) -> Result<FrameDirDevice> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            Error::DeviceUnavailable(format!("{}: {}", self.dir.display(), e))
        })?;

        let mut frames = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if frame_mime(&path).is_some() {
                frames.push(path);
            }
        }
        frames.sort();

        if frames.is_empty() {
            return Err(Error::DeviceUnavailable(format!(
                "no frames in {}",
                self.dir.display()
            )));
        }

        debug!(
            dir = %self.dir.display(),
            frames = frames.len(),
            ideal_width = constraints.width,
            ideal_height = constraints.height,
            facing = ?constraints.facing,
            "Opened frame directory"
        );
        Ok(FrameDirDevice {
            frames,
            loaded: Vec::new(),
            cursor: 0,
            dimensions: None,
            stopped: false,
        })
    }
}

/// Stream over the files of a [`FrameDirSource`], cycling forever.
/// Frames are loaded once by `wait_ready`; grabbing never touches disk.
#[derive(Debug)]
pub struct FrameDirDevice {
    frames: Vec<PathBuf>,
    loaded: Vec<EncodedImage>,
    cursor: usize,
    dimensions: Option<FrameDimensions>,
    stopped: bool,
}

/// Read and encode every frame; dimensions come from the first
fn load_frames(paths: &[PathBuf]) -> Result<(Vec<EncodedImage>, FrameDimensions)> {
    let first = paths
        .first()
        .ok_or_else(|| Error::DeviceUnavailable("no frames".into()))?;
    let (width, height) = image::image_dimensions(first)?;
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(mime) = frame_mime(path) else { continue };
        let bytes = std::fs::read(path).map_err(|e| {
            Error::DeviceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        loaded.push(EncodedImage::from_bytes(mime, &bytes));
    }
    Ok((loaded, FrameDimensions { width, height }))
}

impl CaptureDevice for FrameDirDevice {
    async fn wait_ready(&mut self) -> Result<FrameDimensions> {
        let paths = self.frames.clone();
        let (loaded, dims) = tokio::task::spawn_blocking(move || load_frames(&paths))
            .await
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))??;
        debug!(frames = loaded.len(), width = dims.width, height = dims.height, "Frames loaded");
        self.loaded = loaded;
        self.dimensions = Some(dims);
        Ok(dims)
    }

    fn is_ready(&self) -> bool {
        !self.stopped && self.dimensions.is_some() && !self.loaded.is_empty()
    }

    fn grab_frame(&mut self) -> Option<EncodedImage> {
        if !self.is_ready() {
            return None;
        }
        let frame = self.loaded[self.cursor % self.loaded.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Some(frame)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
