//! Camera frame sources.
//!
//! A source hands out a single-consumer [`FrameStream`] from `start` and
//! closes it on `stop`. Frames arrive in the order they were produced.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::types::{CameraFrame, SourceError};

pub type FrameStream = Receiver<CameraFrame>;

/// Frames buffered between a producer and the renderer before new frames are
/// dropped.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

pub trait FrameSource {
    /// Opens the frame subscription.
    fn start(&mut self) -> Result<FrameStream, SourceError>;

    /// Closes the subscription. Calling it while stopped does nothing.
    fn stop(&mut self);
}

#[derive(Debug, Default)]
struct FeedShared {
    sender: Mutex<Option<Sender<CameraFrame>>>,
    dropped: AtomicU64,
}

/// Source fed by the host through a [`FrameFeeder`], e.g. from a camera
/// callback on another thread.
#[derive(Debug)]
pub struct ChannelFrameSource {
    shared: Arc<FeedShared>,
    depth: usize,
}

impl ChannelFrameSource {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            shared: Arc::new(FeedShared::default()),
            depth: depth.max(1),
        }
    }

    pub fn feeder(&self) -> FrameFeeder {
        FrameFeeder {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for ChannelFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ChannelFrameSource {
    fn start(&mut self) -> Result<FrameStream, SourceError> {
        let mut slot = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        let (tx, rx) = crossbeam_channel::bounded(self.depth);
        *slot = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Producer half of a [`ChannelFrameSource`]. Cheap to clone and `Send`.
#[derive(Debug, Clone)]
pub struct FrameFeeder {
    shared: Arc<FeedShared>,
}

impl FrameFeeder {
    /// Offers a frame without blocking. Returns `false` when the source is
    /// stopped or the queue is full; the latter counts as a dropped frame.
    /// Frames without a capture time are stamped with the push time.
    pub fn push(&self, mut frame: CameraFrame) -> bool {
        frame.captured_at.get_or_insert_with(Instant::now);
        let slot = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = slot.as_ref() else {
            return false;
        };
        match sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(dropped, "frame queue full; dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Frames rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

struct StillWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Replays one image at a fixed rate from a worker thread.
pub struct StillFrameSource {
    frame: Arc<CameraFrame>,
    interval: Duration,
    worker: Option<StillWorker>,
}

impl StillFrameSource {
    pub fn new(frame: CameraFrame, fps: f32) -> Result<Self, SourceError> {
        frame
            .validate()
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SourceError::Unavailable(format!(
                "frame rate must be positive (got {fps})"
            )));
        }
        Ok(Self {
            frame: Arc::new(frame),
            interval: Duration::from_secs_f64(1.0 / f64::from(fps)),
            worker: None,
        })
    }

    /// Loads an image file and replays it as RGBA frames.
    pub fn from_path(path: &Path, fps: f32) -> Result<Self, SourceError> {
        let image = image::open(path).map_err(|err| {
            SourceError::Unavailable(format!("failed to open {}: {err}", path.display()))
        })?;
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        tracing::debug!(path = %path.display(), width, height, "loaded still frame");
        Self::new(CameraFrame::new(width, height, rgba.into_raw()), fps)
    }

    /// Replays a generated gradient with a saturated red band, so every
    /// effect, red removal included, has something to act on.
    pub fn test_pattern(width: u32, height: u32, fps: f32) -> Result<Self, SourceError> {
        Self::new(test_pattern(width, height), fps)
    }

    pub fn frame(&self) -> &CameraFrame {
        &self.frame
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.is_some()
    }
}

impl FrameSource for StillFrameSource {
    fn start(&mut self) -> Result<FrameStream, SourceError> {
        if self.worker.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(DEFAULT_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let frame = Arc::clone(&self.frame);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("still-frame-source".into())
            .spawn(move || loop {
                match frame_tx.try_send(CameraFrame::clone(&frame).captured(Instant::now())) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|err| SourceError::Unavailable(format!("failed to spawn worker: {err}")))?;

        self.worker = Some(StillWorker { stop_tx, handle });
        Ok(frame_rx)
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.stop_tx.try_send(());
        drop(worker.stop_tx);
        if worker.handle.join().is_err() {
            tracing::warn!("still frame worker panicked");
        }
    }
}

impl Drop for StillFrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Horizontal red-to-blue gradient over a vertical green ramp, with a solid
/// red band across the top eighth.
pub fn test_pattern(width: u32, height: u32) -> CameraFrame {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
    let band = height / 8;
    for y in 0..height {
        for x in 0..width {
            if y < band {
                pixels.extend_from_slice(&[220, 30, 30, 255]);
                continue;
            }
            let fx = x * 255 / width.max(1);
            let fy = y * 255 / height.max(1);
            pixels.extend_from_slice(&[(255 - fx) as u8, fy as u8, fx as u8, 255]);
        }
    }
    CameraFrame::new(width, height, pixels)
}
