//! Frame admission and adaptive throttling for the camera pipeline.
//!
//! Every incoming camera frame is run through [`FrameThrottle::admit`] in
//! arrival order. Two gates apply:
//!
//! 1. an FPS ceiling: frames arriving sooner than `1 / max_fps` after the last
//!    rendered frame are dropped and counted as back-pressure;
//! 2. a frame-skip divisor: of the frames that pass the ceiling only every
//!    Nth is rendered. Decimated frames are not counted as dropped.
//!
//! The throttle never consults the wall clock itself. Callers pass `now`
//! explicitly so the behaviour is reproducible under test.

use std::time::{Duration, Instant};

/// Frame-skip divisor used when the caller does not supply one.
pub const DEFAULT_FRAME_SKIP: u32 = 2;
/// FPS ceiling used when the caller does not supply one.
pub const DEFAULT_MAX_FPS: f32 = 30.0;
/// Upper bound `adjust` may raise the frame-skip divisor to.
pub const MAX_FRAME_SKIP: u32 = 5;
/// Floor `adjust` may lower the FPS ceiling to.
pub const MIN_ADAPTIVE_FPS: f32 = 15.0;
/// Cap `adjust` may raise the FPS ceiling back to.
pub const MAX_ADAPTIVE_FPS: f32 = 30.0;

const LOW_FPS_THRESHOLD: u32 = 20;
const HIGH_FPS_THRESHOLD: u32 = 25;
const TIGHTEN_FPS_STEP: f32 = 5.0;
const RELAX_FPS_STEP: f32 = 2.0;
const FPS_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacingError {
    #[error("frame skip divisor must be at least 1")]
    ZeroFrameSkip,
    #[error("max fps must be a positive finite number (got {0})")]
    InvalidMaxFps(f32),
}

/// Tunable throttling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingSettings {
    pub frame_skip: u32,
    pub max_fps: f32,
}

impl PacingSettings {
    pub fn new(frame_skip: u32, max_fps: f32) -> Result<Self, PacingError> {
        let settings = Self {
            frame_skip,
            max_fps,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PacingError> {
        if self.frame_skip == 0 {
            return Err(PacingError::ZeroFrameSkip);
        }
        validate_fps(self.max_fps)
    }

    /// Minimum spacing between two rendered frames.
    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.max_fps))
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            frame_skip: DEFAULT_FRAME_SKIP,
            max_fps: DEFAULT_MAX_FPS,
        }
    }
}

fn validate_fps(max_fps: f32) -> Result<(), PacingError> {
    if max_fps.is_finite() && max_fps > 0.0 {
        Ok(())
    } else {
        Err(PacingError::InvalidMaxFps(max_fps))
    }
}

/// Outcome of presenting one frame to [`FrameThrottle::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Render this frame.
    Admit,
    /// Arrived inside the minimum frame interval; counted as dropped.
    Throttled,
    /// Passed the FPS ceiling but was decimated by the frame-skip divisor.
    Decimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustDirection {
    Tighten,
    Relax,
}

/// Record of a change applied by [`FrameThrottle::adjust`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub direction: AdjustDirection,
    pub measured_fps: u32,
    pub frame_skip: u32,
    pub max_fps: f32,
}

#[derive(Debug, Clone)]
struct FpsWindow {
    started: Instant,
    frames: u32,
    fps: u32,
}

impl FpsWindow {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            frames: 0,
            fps: 0,
        }
    }

    fn restart(&mut self, now: Instant) {
        self.started = now;
        self.frames = 0;
    }

    fn record(&mut self, now: Instant) -> Option<u32> {
        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < FPS_WINDOW {
            return None;
        }
        self.fps = (f64::from(self.frames) / elapsed.as_secs_f64()).round() as u32;
        self.frames = 0;
        self.started = now;
        Some(self.fps)
    }
}

/// Admission state for one rendering session.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    settings: PacingSettings,
    min_interval: Duration,
    frame_counter: u64,
    last_render: Instant,
    dropped_frames: u64,
    window: FpsWindow,
}

impl FrameThrottle {
    pub fn new(settings: PacingSettings, now: Instant) -> Self {
        Self {
            min_interval: settings.min_frame_interval(),
            settings,
            frame_counter: 0,
            last_render: now,
            dropped_frames: 0,
            window: FpsWindow::new(now),
        }
    }

    /// Starts a fresh session: counters are cleared and `now` becomes the
    /// reference point for both the FPS ceiling and the measurement window.
    /// The last measured FPS is kept.
    pub fn reset(&mut self, now: Instant) {
        self.frame_counter = 0;
        self.dropped_frames = 0;
        self.last_render = now;
        self.window.restart(now);
    }

    pub fn admit(&mut self, now: Instant) -> Admission {
        if now.saturating_duration_since(self.last_render) < self.min_interval {
            self.dropped_frames = self.dropped_frames.saturating_add(1);
            return Admission::Throttled;
        }

        self.frame_counter = self.frame_counter.wrapping_add(1);
        if self.frame_counter % u64::from(self.settings.frame_skip) != 0 {
            return Admission::Decimated;
        }

        Admission::Admit
    }

    /// Marks an admitted frame as fully rendered at `now`.
    pub fn mark_rendered(&mut self, now: Instant) {
        self.last_render = now;
    }

    /// Counts a processed frame towards the rolling FPS window. Returns the
    /// new measurement whenever a window closes.
    pub fn record_processed(&mut self, now: Instant) -> Option<u32> {
        let rolled = self.window.record(now);
        if let Some(fps) = rolled {
            tracing::debug!(
                fps,
                dropped = self.dropped_frames,
                frame_skip = self.settings.frame_skip,
                max_fps = self.settings.max_fps,
                "frame pacing stats"
            );
        }
        rolled
    }

    /// Tunes the divisor and ceiling from the last measured FPS.
    ///
    /// Below 20 FPS the divisor grows by one (cap 5) and the ceiling drops by
    /// 5 (floor 15). Above 25 FPS, while decimating, the divisor shrinks by one
    /// (floor 1) and the ceiling rises by 2 (cap 30).
    pub fn adjust(&mut self) -> Option<Adjustment> {
        let fps = self.window.fps;
        let before = self.settings;
        let direction = if fps < LOW_FPS_THRESHOLD {
            self.settings.frame_skip = (self.settings.frame_skip + 1).min(MAX_FRAME_SKIP);
            self.settings.max_fps = (self.settings.max_fps - TIGHTEN_FPS_STEP).max(MIN_ADAPTIVE_FPS);
            AdjustDirection::Tighten
        } else if fps > HIGH_FPS_THRESHOLD && self.settings.frame_skip > 1 {
            self.settings.frame_skip = (self.settings.frame_skip - 1).max(1);
            self.settings.max_fps = (self.settings.max_fps + RELAX_FPS_STEP).min(MAX_ADAPTIVE_FPS);
            AdjustDirection::Relax
        } else {
            return None;
        };
        self.min_interval = self.settings.min_frame_interval();

        if before == self.settings {
            return None;
        }
        Some(Adjustment {
            direction,
            measured_fps: fps,
            frame_skip: self.settings.frame_skip,
            max_fps: self.settings.max_fps,
        })
    }

    pub fn set_frame_skip(&mut self, frame_skip: u32) -> Result<(), PacingError> {
        if frame_skip == 0 {
            return Err(PacingError::ZeroFrameSkip);
        }
        self.settings.frame_skip = frame_skip;
        Ok(())
    }

    pub fn set_max_fps(&mut self, max_fps: f32) -> Result<(), PacingError> {
        validate_fps(max_fps)?;
        self.settings.max_fps = max_fps;
        self.min_interval = self.settings.min_frame_interval();
        Ok(())
    }

    pub fn settings(&self) -> PacingSettings {
        self.settings
    }

    pub fn min_frame_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn measured_fps(&self) -> u32 {
        self.window.fps
    }
}
