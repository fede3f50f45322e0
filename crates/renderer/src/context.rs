use std::fmt;

use crate::types::GpuError;

/// Interleaved full-screen quad drawn as a 4-vertex triangle strip:
/// `x, y, u, v` per vertex. The top of clip space samples the first texture
/// row.
pub const QUAD_VERTICES: [f32; 16] = [
    -1.0, -1.0, 0.0, 1.0, //
    1.0, -1.0, 1.0, 1.0, //
    -1.0, 1.0, 0.0, 0.0, //
    1.0, 1.0, 1.0, 0.0,
];

/// Byte stride of one quad vertex.
pub const QUAD_STRIDE: u32 = 16;
/// Byte offset of the position pair within a vertex.
pub const POSITION_OFFSET: u32 = 0;
/// Byte offset of the texture-coordinate pair within a vertex.
pub const TEX_COORD_OFFSET: u32 = 8;
/// Vertices drawn per frame.
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Opaque black, used when an effect needs the surface cleared.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUpload {
    /// (Re)defines the texture storage at the frame's dimensions.
    Full,
    /// Overwrites existing storage of identical dimensions.
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
}

/// Resolved vertex input locations for the quad. `None` means the program
/// does not consume that input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadAttributes {
    pub position: Option<u32>,
    pub tex_coord: Option<u32>,
}

/// Rendering backend the orchestrator draws through.
///
/// The shape follows a GL-style context: programs are compiled from
/// vertex/fragment source, uniform and attribute locations are looked up once
/// and then reused, and every handle is released exactly once by passing it
/// back by value.
pub trait DrawingContext {
    type Program;
    type Texture;
    type Buffer;
    type UniformLocation: Copy + fmt::Debug;

    /// Output surface dimensions in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Compiles both stages and links them. Failures come back as
    /// [`GpuError::Compile`] or [`GpuError::Link`]; nothing panics.
    fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self::Program, GpuError>;

    /// Creates a clamp-to-edge, linearly filtered texture with no contents.
    fn create_texture(&mut self) -> Result<Self::Texture, GpuError>;

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<Self::Buffer, GpuError>;

    fn uniform_location(
        &self,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<u32>;

    fn upload_texture(
        &mut self,
        texture: &mut Self::Texture,
        upload: TextureUpload,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), GpuError>;

    fn set_uniform(
        &mut self,
        program: &mut Self::Program,
        location: Self::UniformLocation,
        value: UniformValue,
    );

    /// Draws the quad through `program`, sampling `texture`. With `clear`
    /// set the surface is cleared to that colour first, otherwise the
    /// previous contents are kept.
    fn draw_quad(
        &mut self,
        program: &Self::Program,
        buffer: &Self::Buffer,
        texture: &Self::Texture,
        attributes: QuadAttributes,
        clear: Option<[f32; 4]>,
    ) -> Result<(), GpuError>;

    fn delete_program(&mut self, program: Self::Program);
    fn delete_texture(&mut self, texture: Self::Texture);
    fn delete_buffer(&mut self, buffer: Self::Buffer);
}
