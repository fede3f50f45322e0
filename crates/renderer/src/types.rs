use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::effects::Effect;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// One raw camera frame: RGBA8, row-major, top row first.
#[derive(Clone, PartialEq, Eq)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Capture time. Sources stamp unstamped frames on arrival; pacing uses
    /// it in place of the dequeue time.
    pub captured_at: Option<Instant>,
}

impl CameraFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
            captured_at: None,
        }
    }

    /// Sets the capture time.
    pub fn captured(mut self, at: Instant) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * BYTES_PER_PIXEL);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, pixels)
    }

    /// Byte length a well-formed frame of these dimensions must have.
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(BYTES_PER_PIXEL)
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let expected = Self::expected_len(self.width, self.height).ok_or(FrameError::TooLarge {
            width: self.width,
            height: self.height,
        })?;
        if self.pixels.len() != expected {
            return Err(FrameError::LengthMismatch {
                width: self.width,
                height: self.height,
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let bytes = self.pixels.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Failures raised by a [`crate::DrawingContext`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GpuError {
    #[error("shader compilation failed: {0}")]
    Compile(String),
    #[error("program link failed: {0}")]
    Link(String),
    #[error("failed to allocate {what}: {reason}")]
    Allocation { what: &'static str, reason: String },
    #[error("texture upload failed: {0}")]
    Upload(String),
    #[error("draw failed: {0}")]
    Draw(String),
}

/// Problems with a single frame. The frame is dropped, the session continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    Empty { width: u32, height: u32 },
    #[error("frame dimensions {width}x{height} overflow the address space")]
    TooLarge { width: u32, height: u32 },
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to render frame: {0}")]
    Gpu(#[source] GpuError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("frame source is already streaming")]
    AlreadyStarted,
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
}

/// Error returned by the public [`crate::MirrorRenderer`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Gpu(#[from] GpuError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("renderer has been destroyed")]
    Destroyed,
}

/// Lifecycle of a [`crate::MirrorRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererState {
    Uninitialized,
    Running,
    Paused,
    Stopped,
    Destroyed,
}

/// Read-only snapshot returned by `MirrorRenderer::status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderStatus {
    pub state: RendererState,
    pub is_rendering: bool,
    pub current_effect: Effect,
    pub has_gpu_resources: bool,
    pub measured_fps: u32,
    pub dropped_frame_count: u64,
    pub processed_frames: u64,
    pub frame_skip: u32,
    pub max_fps: f32,
}

/// Caller-supplied error channel. Invoked once per reported failure.
pub type ErrorCallback = Box<dyn FnMut(&str)>;

/// Construction-time configuration. `context` and `frame_source` are
/// optional so that a missing collaborator surfaces as a configuration
/// error from `start` rather than at construction.
pub struct RenderConfig<C, S> {
    pub context: Option<C>,
    pub frame_source: Option<S>,
    pub initial_effect: Effect,
    pub on_error: Option<ErrorCallback>,
    pub frame_skip: Option<u32>,
    pub max_fps: Option<f32>,
}

impl<C, S> RenderConfig<C, S> {
    pub fn new(context: C, frame_source: S) -> Self {
        Self {
            context: Some(context),
            frame_source: Some(frame_source),
            initial_effect: Effect::default(),
            on_error: None,
            frame_skip: None,
            max_fps: None,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.initial_effect = effect;
        self
    }

    pub fn with_error_callback(mut self, callback: impl FnMut(&str) + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.frame_skip = Some(frame_skip);
        self
    }

    pub fn with_max_fps(mut self, max_fps: f32) -> Self {
        self.max_fps = Some(max_fps);
        self
    }
}

/// Partial update applied by `MirrorRenderer::update_config`.
#[derive(Default)]
pub struct ConfigUpdate {
    pub frame_skip: Option<u32>,
    pub max_fps: Option<f32>,
    pub on_error: Option<ErrorCallback>,
}
