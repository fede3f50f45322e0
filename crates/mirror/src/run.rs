use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use mirrorconfig::MirrorConfig;
use renderer::{
    catalog, fragment_shader_for_id, Effect, MirrorRenderer, PacingSettings, RenderConfig,
    RenderStatus, StillFrameSource, WgpuContext, DEFAULT_FRAME_SKIP, DEFAULT_MAX_FPS,
};
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;

const PUMP_WAIT: Duration = Duration::from_millis(100);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn list_effects() -> Result<()> {
    for descriptor in catalog() {
        println!("{:<14} {}", descriptor.id, descriptor.display_name);
    }
    Ok(())
}

pub fn print_shader(id: &str) -> Result<()> {
    if Effect::from_id(id).is_none() {
        tracing::warn!(id, "unknown effect id; printing the identity program");
    }
    print!("{}", fragment_shader_for_id(id));
    Ok(())
}

/// Everything `run` needs, resolved from the config file and flags.
#[derive(Debug, Clone, PartialEq)]
struct RunPlan {
    effect: Effect,
    pacing: PacingSettings,
    adjust_interval: Option<Duration>,
    surface: (u32, u32),
    source_size: (u32, u32),
    source_fps: f32,
    input: Option<PathBuf>,
    frames: u64,
    timeout: Duration,
}

impl RunPlan {
    fn resolve(args: &RunArgs) -> Result<Self> {
        let config = match &args.config {
            Some(path) => MirrorConfig::from_path(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => MirrorConfig::default(),
        };

        let effect_id = args.effect.as_deref().unwrap_or(&config.renderer.effect);
        let effect = Effect::from_id(effect_id).unwrap_or_else(|| {
            tracing::warn!(id = effect_id, "unknown effect id; using identity");
            Effect::Normal
        });

        let pacing = PacingSettings::new(
            args.frame_skip
                .or(config.renderer.frame_skip)
                .unwrap_or(DEFAULT_FRAME_SKIP),
            args.max_fps
                .or(config.renderer.max_fps)
                .unwrap_or(DEFAULT_MAX_FPS),
        )
        .context("invalid pacing settings")?;

        if !args.timeout.is_finite() || args.timeout <= 0.0 {
            bail!("timeout must be a positive number of seconds");
        }

        Ok(Self {
            effect,
            pacing,
            adjust_interval: config.renderer.adjust_interval,
            surface: args
                .size
                .unwrap_or((config.surface.width, config.surface.height)),
            source_size: (config.source.width, config.source.height),
            source_fps: config.source.fps,
            input: args.input.clone().or(config.source.image),
            frames: args.frames,
            timeout: Duration::from_secs_f64(args.timeout),
        })
    }

    fn frame_source(&self) -> Result<StillFrameSource> {
        let source = match &self.input {
            Some(path) => StillFrameSource::from_path(path, self.source_fps),
            None => {
                let (width, height) = self.source_size;
                StillFrameSource::test_pattern(width, height, self.source_fps)
            }
        };
        source.context("failed to prepare frame source")
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let plan = RunPlan::resolve(&args)?;
    let source = plan.frame_source()?;
    let context = WgpuContext::new(plan.surface.0, plan.surface.1)
        .context("failed to initialise GPU drawing context")?;
    tracing::info!(
        adapter = context.adapter_name(),
        effect = %plan.effect,
        width = plan.surface.0,
        height = plan.surface.1,
        "rendering headlessly"
    );

    let reported = Rc::new(Cell::new(0u64));
    let sink = Rc::clone(&reported);
    let config = RenderConfig::new(context, source)
        .with_effect(plan.effect)
        .with_frame_skip(plan.pacing.frame_skip)
        .with_max_fps(plan.pacing.max_fps)
        .with_error_callback(move |_| sink.set(sink.get() + 1));
    let mut renderer = MirrorRenderer::new(config).context("invalid renderer configuration")?;
    renderer.start().context("failed to start renderer")?;

    drive(&mut renderer, &plan)?;

    if let Some(path) = &args.output {
        let image = renderer
            .context()
            .ok_or_else(|| anyhow!("drawing context no longer available"))?
            .read_pixels()?;
        image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "saved output surface");
    }

    let status = renderer.status();
    renderer.destroy();
    print_status(&status, reported.get(), args.json)
}

fn drive(
    renderer: &mut MirrorRenderer<WgpuContext, StillFrameSource>,
    plan: &RunPlan,
) -> Result<()> {
    let started = Instant::now();
    let deadline = started + plan.timeout;
    let mut next_adjust = plan.adjust_interval.map(|interval| started + interval);

    while renderer.status().processed_frames < plan.frames {
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                rendered = renderer.status().processed_frames,
                wanted = plan.frames,
                "timed out before rendering every frame"
            );
            break;
        }

        renderer.pump_timeout(PUMP_WAIT);

        if let (Some(interval), Some(due)) = (plan.adjust_interval, next_adjust) {
            if now >= due {
                if let Some(adjustment) = renderer.adjust_performance() {
                    tracing::info!(
                        fps = adjustment.measured_fps,
                        frame_skip = adjustment.frame_skip,
                        max_fps = adjustment.max_fps,
                        "adjusted pacing"
                    );
                }
                next_adjust = Some(now + interval);
            }
        }

        if !renderer.status().is_rendering {
            bail!("renderer stopped unexpectedly");
        }
    }
    Ok(())
}

fn print_status(status: &RenderStatus, errors: u64, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }
    println!("effect:            {}", status.current_effect.display_name());
    println!("frames rendered:   {}", status.processed_frames);
    println!("frames dropped:    {}", status.dropped_frame_count);
    println!("measured fps:      {}", status.measured_fps);
    println!(
        "pacing:            skip {} / max {} fps",
        status.frame_skip, status.max_fps
    );
    if errors > 0 {
        println!("errors reported:   {errors}");
    }
    Ok(())
}
