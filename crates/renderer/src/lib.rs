//! Renderer crate for the camera magic mirror.
//!
//! Live camera frames are pushed through a fixed pipeline and drawn onto an
//! output surface with one of a catalog of visual effects:
//!
//! ```text
//!   FrameSource ──▶ FrameThrottle ──▶ preprocess() ──▶ GpuResourceSet
//!   (frames)        (FPS ceiling,      (mirror /         │ upload, uniforms
//!                    frame skip)        red removal)     ▼
//!                                                  DrawingContext ──▶ surface
//! ```
//!
//! `MirrorRenderer` owns the session: it allocates GPU resources for the
//! current effect, subscribes to the source, and rebuilds the resources when
//! the effect changes. Effects are GLSL fragment programs sharing a common
//! prelude (see [`shaders`]); a couple of them also run a CPU pass over the
//! pixels before upload. The drawing backend is a trait so the orchestration
//! can be exercised without a GPU; [`gpu::WgpuContext`] is the wgpu-backed
//! implementation.

pub mod context;
pub mod effects;
pub mod gpu;
pub mod orchestrator;
pub mod preprocess;
pub mod resources;
pub mod shaders;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

pub use context::{DrawingContext, QuadAttributes, TextureUpload, UniformValue, CLEAR_COLOR};
pub use effects::{catalog, Effect, EffectDescriptor, UnknownEffect};
pub use gpu::WgpuContext;
pub use orchestrator::{FrameOutcome, MirrorRenderer};
pub use preprocess::{preprocess, BufferPool, FramePixels, POOL_CAPACITY};
pub use resources::{FrameUniforms, GpuResourceSet};
pub use shaders::{fragment_shader, fragment_shader_for_id, VERTEX_SHADER};
pub use source::{
    test_pattern, ChannelFrameSource, FrameFeeder, FrameSource, FrameStream, StillFrameSource,
};
pub use types::{
    CameraFrame, ConfigUpdate, ErrorCallback, FrameError, GpuError, RenderConfig, RenderError,
    RenderStatus, RendererState, SourceError,
};

pub use pacing::{AdjustDirection, Adjustment, PacingSettings, DEFAULT_FRAME_SKIP, DEFAULT_MAX_FPS};
