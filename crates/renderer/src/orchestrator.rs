use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use pacing::{
    Adjustment, Admission, FrameThrottle, PacingSettings, DEFAULT_FRAME_SKIP, DEFAULT_MAX_FPS,
};
use tracing::{debug, error, info, warn};

use crate::context::{DrawingContext, CLEAR_COLOR};
use crate::effects::Effect;
use crate::preprocess::{preprocess, BufferPool};
use crate::resources::{FrameUniforms, GpuResourceSet};
use crate::shaders::VERTEX_SHADER;
use crate::source::{FrameSource, FrameStream};
use crate::types::{
    CameraFrame, ConfigUpdate, ErrorCallback, FrameError, GpuError, RenderConfig, RenderError,
    RenderStatus, RendererState, SourceError,
};

/// What happened to one frame handed to [`MirrorRenderer::handle_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    /// Arrived inside the minimum frame interval.
    Throttled,
    /// Skipped by the frame-skip divisor.
    Decimated,
    /// Malformed or failed to render; reported through the error channel.
    Failed,
    /// The renderer is not running.
    Inactive,
}

/// Owns one camera-to-surface rendering session.
///
/// Frames flow source → admission → optional CPU pass → texture upload →
/// effect program → output surface. Everything runs on the caller's thread;
/// frames are pulled with [`MirrorRenderer::pump`] or pushed with
/// [`MirrorRenderer::handle_frame`].
pub struct MirrorRenderer<C: DrawingContext, S: FrameSource> {
    context: Option<C>,
    source: Option<S>,
    stream: Option<FrameStream>,
    resources: Option<GpuResourceSet<C>>,
    pool: BufferPool,
    throttle: FrameThrottle,
    effect: Effect,
    state: RendererState,
    on_error: Option<ErrorCallback>,
    started_at: Instant,
    processed_frames: u64,
}

impl<C: DrawingContext, S: FrameSource> MirrorRenderer<C, S> {
    pub fn new(config: RenderConfig<C, S>) -> Result<Self, RenderError> {
        let settings = PacingSettings::new(
            config.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            config.max_fps.unwrap_or(DEFAULT_MAX_FPS),
        )
        .map_err(|err| RenderError::Config(err.to_string()))?;
        let now = Instant::now();

        Ok(Self {
            context: config.context,
            source: config.frame_source,
            stream: None,
            resources: None,
            pool: BufferPool::new(),
            throttle: FrameThrottle::new(settings, now),
            effect: config.initial_effect,
            state: RendererState::Uninitialized,
            on_error: config.on_error,
            started_at: now,
            processed_frames: 0,
        })
    }

    /// Allocates GPU resources for the current effect and subscribes to the
    /// frame source. A running session is stopped and restarted.
    pub fn start(&mut self) -> Result<(), RenderError> {
        if self.state == RendererState::Destroyed {
            return Err(self.report(RenderError::Destroyed));
        }
        if matches!(self.state, RendererState::Running | RendererState::Paused) {
            debug!("renderer already active; restarting");
            self.stop();
        }
        if self.context.is_none() {
            return Err(self.report(RenderError::Config(
                "drawing context not available".into(),
            )));
        }
        if self.source.is_none() {
            return Err(self.report(RenderError::Config("frame source not available".into())));
        }

        if let Err(err) = self.rebuild_resources() {
            self.state = RendererState::Stopped;
            return Err(err);
        }
        if let Err(err) = self.subscribe() {
            self.release_resources();
            self.state = RendererState::Stopped;
            return Err(err);
        }

        let now = Instant::now();
        self.throttle.reset(now);
        self.started_at = now;
        self.processed_frames = 0;
        self.state = RendererState::Running;
        info!(effect = %self.effect, "renderer started");
        Ok(())
    }

    /// Unsubscribes and releases every GPU resource.
    pub fn stop(&mut self) {
        if self.state == RendererState::Destroyed {
            return;
        }
        self.unsubscribe();
        self.release_resources();
        if self.state != RendererState::Stopped {
            debug!(processed = self.processed_frames, "renderer stopped");
        }
        self.state = RendererState::Stopped;
    }

    /// Stops consuming frames but keeps GPU resources.
    pub fn pause(&mut self) {
        if self.state != RendererState::Running {
            return;
        }
        self.unsubscribe();
        self.state = RendererState::Paused;
        debug!("renderer paused");
    }

    /// Resubscribes after [`MirrorRenderer::pause`]. Falls back to a full
    /// [`MirrorRenderer::start`] when no resources are held.
    pub fn resume(&mut self) -> Result<(), RenderError> {
        match self.state {
            RendererState::Destroyed => return Err(self.report(RenderError::Destroyed)),
            RendererState::Running => return Ok(()),
            _ => {}
        }
        if self.resources.is_none() {
            return self.start();
        }
        self.subscribe()?;
        self.state = RendererState::Running;
        debug!("renderer resumed");
        Ok(())
    }

    /// Switches the active effect. Held GPU resources are rebuilt for the new
    /// effect immediately; a stopped renderer only records the choice.
    pub fn change_effect(&mut self, effect: Effect) -> Result<(), RenderError> {
        if self.state == RendererState::Destroyed {
            return Err(self.report(RenderError::Destroyed));
        }
        if effect == self.effect {
            return Ok(());
        }

        let previous = std::mem::replace(&mut self.effect, effect);
        if let Some(resources) = self.resources.as_mut() {
            resources.invalidate_upload();
        }
        debug!(from = %previous, to = %effect, "changing effect");

        if self.resources.is_some() {
            if let Err(err) = self.rebuild_resources() {
                self.unsubscribe();
                self.state = RendererState::Stopped;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Like [`MirrorRenderer::change_effect`] for a textual id. Unknown ids
    /// select the identity effect.
    pub fn change_effect_id(&mut self, id: &str) -> Result<(), RenderError> {
        let effect = Effect::from_id(id).unwrap_or_else(|| {
            warn!(id, "unknown effect id; using identity");
            Effect::Normal
        });
        self.change_effect(effect)
    }

    /// Applies a partial configuration change. Pacing values are validated
    /// together; nothing, the error callback included, is applied if either
    /// is invalid. The rejection goes to the current callback.
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<(), RenderError> {
        let mut settings = self.throttle.settings();
        if let Some(frame_skip) = update.frame_skip {
            settings.frame_skip = frame_skip;
        }
        if let Some(max_fps) = update.max_fps {
            settings.max_fps = max_fps;
        }
        if let Err(err) = settings.validate() {
            return Err(self.report(RenderError::Config(err.to_string())));
        }
        if let Err(err) = self
            .throttle
            .set_frame_skip(settings.frame_skip)
            .and(self.throttle.set_max_fps(settings.max_fps))
        {
            return Err(self.report(RenderError::Config(err.to_string())));
        }
        if let Some(callback) = update.on_error {
            self.on_error = Some(callback);
        }
        debug!(
            frame_skip = settings.frame_skip,
            max_fps = settings.max_fps,
            "pacing updated"
        );
        Ok(())
    }

    /// Retunes pacing from the last measured FPS. Never runs on its own; the
    /// caller picks the cadence.
    pub fn adjust_performance(&mut self) -> Option<Adjustment> {
        let adjustment = self.throttle.adjust();
        if let Some(adjustment) = adjustment {
            debug!(
                direction = ?adjustment.direction,
                fps = adjustment.measured_fps,
                frame_skip = adjustment.frame_skip,
                max_fps = adjustment.max_fps,
                "adjusted pacing"
            );
        }
        adjustment
    }

    /// Stops the session and drops the context, source and error callback.
    /// The renderer cannot be used afterwards.
    pub fn destroy(&mut self) {
        if self.state == RendererState::Destroyed {
            return;
        }
        self.stop();
        self.context = None;
        self.source = None;
        self.on_error = None;
        self.state = RendererState::Destroyed;
        debug!("renderer destroyed");
    }

    pub fn status(&self) -> RenderStatus {
        let settings = self.throttle.settings();
        RenderStatus {
            state: self.state,
            is_rendering: self.state == RendererState::Running,
            current_effect: self.effect,
            has_gpu_resources: self.resources.is_some(),
            measured_fps: self.throttle.measured_fps(),
            dropped_frame_count: self.throttle.dropped_frames(),
            processed_frames: self.processed_frames,
            frame_skip: settings.frame_skip,
            max_fps: settings.max_fps,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.context.as_mut()
    }

    /// Drains every queued frame in arrival order, pacing each by its capture
    /// time. Returns how many were rendered. A stream closed by the source is
    /// reported and pauses the session; [`MirrorRenderer::resume`]
    /// resubscribes with the held resources.
    pub fn pump(&mut self) -> usize {
        let mut rendered = 0;
        while self.state == RendererState::Running {
            let next = match self.stream.as_ref() {
                Some(stream) => stream.try_recv(),
                None => break,
            };
            match next {
                Ok(frame) => {
                    if self.handle_frame(&frame, arrival(&frame)) == FrameOutcome::Rendered {
                        rendered += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.drop_closed_stream();
                    break;
                }
            }
        }
        rendered
    }

    /// Waits up to `timeout` for a frame, then drains the queue like
    /// [`MirrorRenderer::pump`].
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        if self.state != RendererState::Running {
            return 0;
        }
        let first = match self.stream.as_ref() {
            Some(stream) => stream.recv_timeout(timeout),
            None => return 0,
        };
        let mut rendered = 0;
        match first {
            Ok(frame) => {
                if self.handle_frame(&frame, arrival(&frame)) == FrameOutcome::Rendered {
                    rendered += 1;
                }
            }
            Err(RecvTimeoutError::Timeout) => return 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.drop_closed_stream();
                return 0;
            }
        }
        rendered + self.pump()
    }

    /// Runs one frame through admission and, if admitted, renders it. `now`
    /// is the frame's arrival time.
    pub fn handle_frame(&mut self, frame: &CameraFrame, now: Instant) -> FrameOutcome {
        if self.state != RendererState::Running {
            return FrameOutcome::Inactive;
        }
        match self.throttle.admit(now) {
            Admission::Throttled => return FrameOutcome::Throttled,
            Admission::Decimated => return FrameOutcome::Decimated,
            Admission::Admit => {}
        }

        match self.render_frame(frame, now) {
            Ok(()) => {
                self.throttle.mark_rendered(now);
                self.processed_frames += 1;
                FrameOutcome::Rendered
            }
            Err(err) => {
                self.report(RenderError::Frame(err));
                FrameOutcome::Failed
            }
        }
    }

    fn render_frame(&mut self, frame: &CameraFrame, now: Instant) -> Result<(), FrameError> {
        frame.validate()?;
        let (Some(context), Some(resources)) = (self.context.as_mut(), self.resources.as_mut())
        else {
            return Err(FrameError::Gpu(GpuError::Draw(
                "no GPU resources bound".into(),
            )));
        };

        self.throttle.record_processed(now);

        let uniforms = FrameUniforms {
            time: now.saturating_duration_since(self.started_at).as_secs_f32(),
            surface: context.surface_size(),
            texture: (frame.width, frame.height),
        };
        let clear = self.effect.needs_clear().then_some(CLEAR_COLOR);

        let pixels = preprocess(self.effect, frame, &mut self.pool);
        let drawn = draw_frame(context, resources, frame, pixels.as_slice(), uniforms, clear);
        pixels.recycle(&mut self.pool);
        drawn.map_err(FrameError::Gpu)
    }

    fn rebuild_resources(&mut self) -> Result<(), RenderError> {
        self.release_resources();
        let allocated = match self.context.as_mut() {
            Some(context) => {
                GpuResourceSet::allocate(context, VERTEX_SHADER, &self.effect.fragment_shader())
                    .map_err(RenderError::Gpu)
            }
            None => Err(RenderError::Config("drawing context not available".into())),
        };
        match allocated {
            Ok(resources) => {
                self.resources = Some(resources);
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    fn release_resources(&mut self) {
        if let Some(resources) = self.resources.take() {
            if let Some(context) = self.context.as_mut() {
                resources.release(context);
            }
        }
        self.pool.clear();
    }

    fn subscribe(&mut self) -> Result<(), RenderError> {
        let started = match self.source.as_mut() {
            Some(source) => source.start().map_err(RenderError::Source),
            None => Err(RenderError::Config("frame source not available".into())),
        };
        match started {
            Ok(stream) => {
                self.stream = Some(stream);
                Ok(())
            }
            Err(err) => Err(self.report(err)),
        }
    }

    fn unsubscribe(&mut self) {
        if self.stream.take().is_some() {
            if let Some(source) = self.source.as_mut() {
                source.stop();
            }
        }
    }

    fn drop_closed_stream(&mut self) {
        self.stream = None;
        if let Some(source) = self.source.as_mut() {
            source.stop();
        }
        self.state = RendererState::Paused;
        self.report(RenderError::Source(SourceError::Unavailable(
            "frame stream closed by source".into(),
        )));
    }

    /// Logs `err`, hands it to the error callback and returns it.
    fn report(&mut self, err: RenderError) -> RenderError {
        let message = err.to_string();
        error!(error = %message, effect = %self.effect, "renderer error");
        if let Some(callback) = self.on_error.as_mut() {
            callback(&message);
        }
        err
    }
}

impl<C: DrawingContext, S: FrameSource> Drop for MirrorRenderer<C, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn arrival(frame: &CameraFrame) -> Instant {
    frame.captured_at.unwrap_or_else(Instant::now)
}

fn draw_frame<C: DrawingContext>(
    context: &mut C,
    resources: &mut GpuResourceSet<C>,
    frame: &CameraFrame,
    pixels: &[u8],
    uniforms: FrameUniforms,
    clear: Option<[f32; 4]>,
) -> Result<(), GpuError> {
    let upload = resources.upload(context, frame.width, frame.height, pixels)?;
    if upload == crate::context::TextureUpload::Full {
        debug!(width = frame.width, height = frame.height, "texture storage defined");
    }
    resources.apply_uniforms(context, uniforms);
    resources.draw(context, clear)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crossbeam_channel::Sender;

    use super::*;
    use crate::context::TextureUpload;
    use crate::source::{ChannelFrameSource, FrameFeeder};
    use crate::testing::{Recorder, RecordingContext};

    type TestRenderer = MirrorRenderer<RecordingContext, ChannelFrameSource>;

    const SIXTY_HZ: Duration = Duration::from_nanos(16_666_667);
    const WARMUP: Duration = Duration::from_millis(100);

    struct Harness {
        renderer: TestRenderer,
        recorder: Recorder,
        feeder: FrameFeeder,
        errors: Rc<RefCell<Vec<String>>>,
    }

    fn harness(effect: Effect, frame_skip: u32, max_fps: f32) -> Harness {
        let context = RecordingContext::new(320, 240);
        let recorder = context.recorder();
        let source = ChannelFrameSource::new();
        let feeder = source.feeder();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let config = RenderConfig::new(context, source)
            .with_effect(effect)
            .with_frame_skip(frame_skip)
            .with_max_fps(max_fps)
            .with_error_callback(move |message| sink.borrow_mut().push(message.to_string()));
        Harness {
            renderer: MirrorRenderer::new(config).unwrap(),
            recorder,
            feeder,
            errors,
        }
    }

    /// Source whose producer ends are held by the test, so the stream can be
    /// closed from the producer side.
    #[derive(Default)]
    struct HeldSource {
        senders: Rc<RefCell<Vec<Sender<CameraFrame>>>>,
        starts: Rc<Cell<usize>>,
        stops: Rc<Cell<usize>>,
    }

    impl FrameSource for HeldSource {
        fn start(&mut self) -> Result<FrameStream, SourceError> {
            let (tx, rx) = crossbeam_channel::unbounded();
            self.senders.borrow_mut().push(tx);
            self.starts.set(self.starts.get() + 1);
            Ok(rx)
        }

        fn stop(&mut self) {
            self.stops.set(self.stops.get() + 1);
        }
    }

    fn frame() -> CameraFrame {
        CameraFrame::solid(4, 2, [10, 20, 30, 255])
    }

    fn feed(renderer: &mut TestRenderer, base: Instant, count: u32, spacing: Duration) -> u32 {
        (0..count)
            .filter(|index| {
                renderer.handle_frame(&frame(), base + WARMUP + spacing * *index)
                    == FrameOutcome::Rendered
            })
            .count() as u32
    }

    #[test]
    fn lifecycle_start_then_stop() {
        let mut h = harness(Effect::Swirl, 1, 30.0);
        assert_eq!(h.renderer.state(), RendererState::Uninitialized);

        h.renderer.start().unwrap();
        let status = h.renderer.status();
        assert!(status.is_rendering);
        assert!(status.has_gpu_resources);
        assert_eq!(status.current_effect, Effect::Swirl);
        assert_eq!(h.recorder.live_handles(), 3);

        h.renderer.stop();
        let status = h.renderer.status();
        assert!(!status.is_rendering);
        assert!(!status.has_gpu_resources);
        assert_eq!(status.state, RendererState::Stopped);
        assert_eq!(h.recorder.live_handles(), 0);
        assert!(h.errors.borrow().is_empty());
    }

    #[test]
    fn restart_releases_previous_resources() {
        let mut h = harness(Effect::Wave, 1, 30.0);
        h.renderer.start().unwrap();
        h.renderer.start().unwrap();
        assert_eq!(h.recorder.programs_created(), 2);
        assert_eq!(h.recorder.live_handles(), 3);
    }

    #[test]
    fn throttles_sixty_hz_source_to_thirty_fps() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        let base = Instant::now();
        let rendered = feed(&mut h.renderer, base, 60, SIXTY_HZ);
        let status = h.renderer.status();
        assert!((29..=31).contains(&rendered), "rendered {rendered}");
        assert_eq!(status.dropped_frame_count, u64::from(60 - rendered));
        assert_eq!(status.processed_frames, u64::from(rendered));
    }

    #[test]
    fn frame_skip_renders_every_third_frame() {
        let mut h = harness(Effect::Normal, 3, 1000.0);
        h.renderer.start().unwrap();
        let base = Instant::now();
        let rendered = feed(&mut h.renderer, base, 60, SIXTY_HZ);
        assert_eq!(rendered, 20);
        assert_eq!(h.renderer.status().dropped_frame_count, 0);
    }

    #[test]
    fn low_fps_tightens_pacing() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        let base = Instant::now();
        let rendered = feed(&mut h.renderer, base, 20, Duration::from_secs(1) / 15);
        assert_eq!(rendered, 20);
        let measured = h.renderer.status().measured_fps;
        assert!((14..=16).contains(&measured), "measured {measured}");

        let adjustment = h.renderer.adjust_performance().expect("pacing tightened");
        assert_eq!(adjustment.frame_skip, 2);
        assert_eq!(adjustment.max_fps, 25.0);
        let status = h.renderer.status();
        assert_eq!(status.frame_skip, 2);
        assert_eq!(status.max_fps, 25.0);
    }

    #[test]
    fn same_effect_does_not_rebuild() {
        let mut h = harness(Effect::Neon, 1, 30.0);
        h.renderer.start().unwrap();
        h.renderer.change_effect(Effect::Neon).unwrap();
        assert_eq!(h.recorder.programs_created(), 1);
    }

    #[test]
    fn effect_change_rebuilds_only_while_resources_are_held() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.change_effect(Effect::Fisheye).unwrap();
        assert_eq!(h.recorder.programs_created(), 0);

        h.renderer.start().unwrap();
        h.renderer.change_effect_id("kaleidoscope").unwrap();
        assert_eq!(h.recorder.programs_created(), 2);
        assert_eq!(h.recorder.live_handles(), 3);
        assert_eq!(h.renderer.effect(), Effect::Kaleidoscope);
    }

    #[test]
    fn effect_change_while_paused_rebuilds_before_resume() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        h.renderer.pause();

        h.renderer.change_effect(Effect::Swirl).unwrap();
        assert_eq!(h.renderer.state(), RendererState::Paused);
        assert_eq!(h.recorder.programs_created(), 2);
        assert_eq!(h.recorder.live_handles(), 3);

        h.renderer.resume().unwrap();
        let status = h.renderer.status();
        assert!(status.is_rendering);
        assert_eq!(status.current_effect, Effect::Swirl);
        assert_eq!(h.recorder.programs_created(), 2);
        assert_eq!(h.recorder.live_handles(), 3);
    }

    #[test]
    fn unknown_effect_id_selects_identity() {
        let mut h = harness(Effect::Swirl, 1, 30.0);
        h.renderer.change_effect_id("sparkles").unwrap();
        assert_eq!(h.renderer.effect(), Effect::Normal);
    }

    #[test]
    fn effect_change_forces_full_upload() {
        let mut h = harness(Effect::Normal, 1, 1000.0);
        h.renderer.start().unwrap();
        let base = Instant::now();
        feed(&mut h.renderer, base, 2, Duration::from_millis(10));
        h.renderer.change_effect(Effect::Concave).unwrap();
        feed(&mut h.renderer, base + Duration::from_secs(1), 1, Duration::ZERO);

        let kinds: Vec<TextureUpload> = h.recorder.uploads().into_iter().map(|(kind, ..)| kind).collect();
        assert_eq!(
            kinds,
            vec![TextureUpload::Full, TextureUpload::Partial, TextureUpload::Full]
        );
    }

    #[test]
    fn clear_is_skipped_for_full_coverage_effects() {
        let mut h = harness(Effect::VMirror, 1, 1000.0);
        h.renderer.start().unwrap();
        let base = Instant::now();
        feed(&mut h.renderer, base, 1, Duration::ZERO);
        h.renderer.change_effect(Effect::Pixelate).unwrap();
        feed(&mut h.renderer, base + Duration::from_secs(1), 1, Duration::ZERO);
        assert_eq!(h.recorder.draws(), vec![None, Some(CLEAR_COLOR)]);
    }

    #[test]
    fn mirror_effect_uploads_mirrored_pixels() {
        let mut h = harness(Effect::Mirror, 1, 1000.0);
        h.renderer.start().unwrap();
        let mut pixels = vec![0u8; 8];
        pixels[..4].copy_from_slice(&[1, 2, 3, 4]);
        pixels[4..].copy_from_slice(&[5, 6, 7, 8]);
        let frame = CameraFrame::new(2, 1, pixels);
        let outcome = h
            .renderer
            .handle_frame(&frame, Instant::now() + WARMUP);
        assert_eq!(outcome, FrameOutcome::Rendered);
        assert_eq!(h.recorder.uploaded_first_pixels(), vec![Some([5, 6, 7, 8])]);
    }

    #[test]
    fn compile_failure_reports_once_and_stays_stopped() {
        let mut h = harness(Effect::Swirl, 1, 30.0);
        h.recorder.fail_compile(true);
        let err = h.renderer.start().unwrap_err();
        assert!(matches!(err, RenderError::Gpu(GpuError::Compile(_))));
        assert_eq!(h.errors.borrow().len(), 1);
        let status = h.renderer.status();
        assert_eq!(status.state, RendererState::Stopped);
        assert!(!status.has_gpu_resources);
        assert!(!status.is_rendering);
    }

    #[test]
    fn failed_rebuild_on_effect_change_stops_session() {
        let mut h = harness(Effect::Swirl, 1, 30.0);
        h.renderer.start().unwrap();
        h.recorder.fail_compile(true);
        assert!(h.renderer.change_effect(Effect::Wave).is_err());
        let status = h.renderer.status();
        assert!(!status.is_rendering);
        assert!(!status.has_gpu_resources);
        assert_eq!(h.errors.borrow().len(), 1);
        assert_eq!(h.recorder.live_handles(), 0);
    }

    #[test]
    fn missing_frame_source_is_a_config_error() {
        let context = RecordingContext::new(8, 8);
        let recorder = context.recorder();
        let errors = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&errors);
        let config: RenderConfig<RecordingContext, ChannelFrameSource> = RenderConfig {
            context: Some(context),
            frame_source: None,
            initial_effect: Effect::Normal,
            on_error: Some(Box::new(move |_| *sink.borrow_mut() += 1)),
            frame_skip: None,
            max_fps: None,
        };
        let mut renderer = MirrorRenderer::new(config).unwrap();
        assert!(matches!(renderer.start(), Err(RenderError::Config(_))));
        assert_eq!(*errors.borrow(), 1);
        assert_eq!(recorder.programs_created(), 0);
        assert!(!renderer.status().is_rendering);
    }

    #[test]
    fn missing_context_is_a_config_error() {
        let config: RenderConfig<RecordingContext, ChannelFrameSource> = RenderConfig {
            context: None,
            frame_source: Some(ChannelFrameSource::new()),
            initial_effect: Effect::Normal,
            on_error: None,
            frame_skip: None,
            max_fps: None,
        };
        let mut renderer = MirrorRenderer::new(config).unwrap();
        assert!(matches!(renderer.start(), Err(RenderError::Config(_))));
    }

    #[test]
    fn invalid_pacing_is_rejected_at_construction() {
        let config = RenderConfig::new(RecordingContext::new(8, 8), ChannelFrameSource::new())
            .with_frame_skip(0);
        assert!(matches!(
            MirrorRenderer::new(config).err(),
            Some(RenderError::Config(_))
        ));
    }

    #[test]
    fn malformed_frame_is_dropped_and_session_continues() {
        let mut h = harness(Effect::Normal, 1, 1000.0);
        h.renderer.start().unwrap();
        let base = Instant::now() + WARMUP;
        let bad = CameraFrame::new(4, 2, vec![0; 5]);
        assert_eq!(h.renderer.handle_frame(&bad, base), FrameOutcome::Failed);
        assert_eq!(h.errors.borrow().len(), 1);
        assert_eq!(
            h.renderer.handle_frame(&frame(), base + Duration::from_millis(5)),
            FrameOutcome::Rendered
        );
        assert!(h.renderer.status().is_rendering);
    }

    #[test]
    fn draw_failure_is_reported_per_frame() {
        let mut h = harness(Effect::Normal, 1, 1000.0);
        h.renderer.start().unwrap();
        let base = Instant::now() + WARMUP;
        h.recorder.fail_draw(true);
        assert_eq!(h.renderer.handle_frame(&frame(), base), FrameOutcome::Failed);
        h.recorder.fail_draw(false);
        assert_eq!(
            h.renderer.handle_frame(&frame(), base + Duration::from_millis(5)),
            FrameOutcome::Rendered
        );
        assert_eq!(h.errors.borrow().len(), 1);
        assert_eq!(h.renderer.status().processed_frames, 1);
    }

    #[test]
    fn pause_keeps_resources_and_resume_reuses_them() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        h.renderer.pause();
        let status = h.renderer.status();
        assert_eq!(status.state, RendererState::Paused);
        assert!(!status.is_rendering);
        assert!(status.has_gpu_resources);
        assert_eq!(
            h.renderer.handle_frame(&frame(), Instant::now() + WARMUP),
            FrameOutcome::Inactive
        );

        h.renderer.resume().unwrap();
        assert!(h.renderer.status().is_rendering);
        assert_eq!(h.recorder.programs_created(), 1);
    }

    #[test]
    fn resume_after_stop_restarts() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        h.renderer.stop();
        h.renderer.resume().unwrap();
        assert!(h.renderer.status().has_gpu_resources);
        assert_eq!(h.recorder.programs_created(), 2);
    }

    #[test]
    fn update_config_validates_before_applying() {
        let mut h = harness(Effect::Normal, 2, 30.0);
        let err = h.renderer.update_config(ConfigUpdate {
            frame_skip: Some(4),
            max_fps: Some(-1.0),
            on_error: None,
        });
        assert!(matches!(err, Err(RenderError::Config(_))));
        assert_eq!(h.renderer.status().frame_skip, 2);

        h.renderer
            .update_config(ConfigUpdate {
                frame_skip: Some(4),
                max_fps: Some(20.0),
                on_error: None,
            })
            .unwrap();
        let status = h.renderer.status();
        assert_eq!(status.frame_skip, 4);
        assert_eq!(status.max_fps, 20.0);
    }

    #[test]
    fn update_config_replaces_error_callback() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        let replaced = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&replaced);
        h.renderer
            .update_config(ConfigUpdate {
                on_error: Some(Box::new(move |_| *sink.borrow_mut() += 1)),
                ..ConfigUpdate::default()
            })
            .unwrap();
        h.recorder.fail_compile(true);
        assert!(h.renderer.start().is_err());
        assert_eq!(*replaced.borrow(), 1);
        assert!(h.errors.borrow().is_empty());
    }

    #[test]
    fn rejected_update_keeps_error_callback() {
        let mut h = harness(Effect::Normal, 2, 30.0);
        let replaced = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&replaced);
        let result = h.renderer.update_config(ConfigUpdate {
            frame_skip: Some(0),
            max_fps: None,
            on_error: Some(Box::new(move |_| *sink.borrow_mut() += 1)),
        });
        assert!(matches!(result, Err(RenderError::Config(_))));
        assert_eq!(h.errors.borrow().len(), 1);

        h.recorder.fail_compile(true);
        assert!(h.renderer.start().is_err());
        assert_eq!(h.errors.borrow().len(), 2);
        assert_eq!(*replaced.borrow(), 0);
    }

    #[test]
    fn destroy_is_final() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        h.renderer.destroy();
        assert_eq!(h.recorder.live_handles(), 0);
        assert_eq!(h.renderer.state(), RendererState::Destroyed);
        assert!(h.renderer.context().is_none());
        assert_eq!(h.renderer.start(), Err(RenderError::Destroyed));
        assert_eq!(h.renderer.resume(), Err(RenderError::Destroyed));
        h.renderer.stop();
        h.renderer.destroy();
        assert!(h.errors.borrow().is_empty());
    }

    #[test]
    fn dropping_renderer_releases_resources() {
        let h = harness(Effect::Normal, 1, 30.0);
        let recorder = h.recorder.clone();
        let mut renderer = h.renderer;
        renderer.start().unwrap();
        drop(renderer);
        assert_eq!(recorder.live_handles(), 0);
    }

    #[test]
    fn pump_drains_pushed_frames() {
        let context = RecordingContext::new(16, 16);
        let source = ChannelFrameSource::new();
        let feeder = source.feeder();
        let config = RenderConfig::new(context, source)
            .with_frame_skip(1)
            .with_max_fps(1000.0);
        let mut renderer = MirrorRenderer::new(config).unwrap();
        renderer.start().unwrap();
        std::thread::sleep(Duration::from_millis(5));

        for _ in 0..3 {
            assert!(feeder.push(frame()));
        }
        let rendered = renderer.pump();
        let status = renderer.status();
        assert!(rendered >= 1);
        assert_eq!(rendered as u64 + status.dropped_frame_count, 3);

        renderer.pause();
        assert!(!feeder.push(frame()));
        assert_eq!(renderer.pump(), 0);
    }

    #[test]
    fn pump_timeout_returns_zero_without_frames() {
        let mut h = harness(Effect::Normal, 1, 1000.0);
        assert_eq!(h.renderer.pump_timeout(Duration::from_millis(10)), 0);

        h.renderer.start().unwrap();
        let waited = Instant::now();
        assert_eq!(h.renderer.pump_timeout(Duration::from_millis(20)), 0);
        assert!(waited.elapsed() >= Duration::from_millis(20));
        assert!(h.renderer.status().is_rendering);
        assert!(h.errors.borrow().is_empty());
    }

    #[test]
    fn pump_timeout_renders_first_frame_then_drains_backlog() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        let base = Instant::now() + WARMUP;
        for index in 0..3u32 {
            let captured = base + Duration::from_millis(40) * index;
            assert!(h.feeder.push(frame().captured(captured)));
        }

        assert_eq!(h.renderer.pump_timeout(Duration::from_secs(1)), 3);
        assert_eq!(h.renderer.pump_timeout(Duration::from_millis(10)), 0);
        let status = h.renderer.status();
        assert_eq!(status.processed_frames, 3);
        assert_eq!(status.dropped_frame_count, 0);
    }

    #[test]
    fn backlog_is_paced_by_capture_time() {
        let mut h = harness(Effect::Normal, 1, 30.0);
        h.renderer.start().unwrap();
        let base = Instant::now() + WARMUP;
        for offset in [0, 10, 50] {
            let captured = base + Duration::from_millis(offset);
            assert!(h.feeder.push(frame().captured(captured)));
        }

        assert_eq!(h.renderer.pump(), 2);
        let status = h.renderer.status();
        assert_eq!(status.processed_frames, 2);
        assert_eq!(status.dropped_frame_count, 1);
    }

    #[test]
    fn closed_stream_is_reported_and_pauses() {
        let source = HeldSource::default();
        let senders = Rc::clone(&source.senders);
        let starts = Rc::clone(&source.starts);
        let stops = Rc::clone(&source.stops);
        let context = RecordingContext::new(16, 16);
        let recorder = context.recorder();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let config = RenderConfig::new(context, source)
            .with_frame_skip(1)
            .with_max_fps(1000.0)
            .with_error_callback(move |message| sink.borrow_mut().push(message.to_string()));
        let mut renderer = MirrorRenderer::new(config).unwrap();
        renderer.start().unwrap();

        senders.borrow_mut().clear();
        assert_eq!(renderer.pump_timeout(Duration::from_secs(1)), 0);
        let status = renderer.status();
        assert_eq!(status.state, RendererState::Paused);
        assert!(!status.is_rendering);
        assert!(status.has_gpu_resources);
        assert_eq!(stops.get(), 1);
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].contains("closed"));

        renderer.resume().unwrap();
        assert!(renderer.status().is_rendering);
        assert_eq!(starts.get(), 2);
        assert_eq!(recorder.programs_created(), 1);

        let sender = senders.borrow()[0].clone();
        sender.send(frame().captured(Instant::now() + WARMUP)).unwrap();
        assert_eq!(renderer.pump(), 1);
        assert_eq!(errors.borrow().len(), 1);
    }
}
