//! wgpu implementation of [`DrawingContext`](crate::context::DrawingContext).
//!
//! - `context` owns the headless instance/device and the offscreen output
//!   surface, and implements the drawing calls.
//! - `pipeline` compiles the GLSL pair into a render pipeline with one uniform
//!   bind group and one frame-texture bind group.
//! - `uniforms` mirrors the `MirrorParams` block and maps uniform names to
//!   slots in it.
//! - `readback` copies the surface back into an [`image::RgbaImage`].

mod context;
mod pipeline;
mod readback;
mod uniforms;

pub use context::{FrameTexture, QuadBuffer, WgpuContext};
pub use pipeline::MirrorProgram;
pub use uniforms::UniformSlot;
