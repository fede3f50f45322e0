use crate::context::{
    DrawingContext, QuadAttributes, TextureUpload, UniformValue, QUAD_VERTICES,
};
use crate::types::GpuError;

/// Uniform locations resolved once per allocation.
#[derive(Debug, Clone, Copy)]
pub struct UniformLocations<L> {
    pub texture: Option<L>,
    pub time: Option<L>,
    pub resolution: Option<L>,
    pub texture_resolution: Option<L>,
    pub aspect: Option<L>,
}

/// Per-frame uniform inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    /// Seconds since the session started.
    pub time: f32,
    pub surface: (u32, u32),
    pub texture: (u32, u32),
}

/// Program, frame texture and quad buffer for one effect.
///
/// A set is built for exactly one effect and rebuilt, never patched, when the
/// effect changes. [`GpuResourceSet::release`] consumes the set, so every
/// handle is deleted exactly once.
pub struct GpuResourceSet<C: DrawingContext> {
    program: C::Program,
    texture: C::Texture,
    buffer: C::Buffer,
    uniforms: UniformLocations<C::UniformLocation>,
    attributes: QuadAttributes,
    uploaded_size: Option<(u32, u32)>,
}

impl<C: DrawingContext> GpuResourceSet<C> {
    /// Compiles the program and creates the texture and quad buffer. Anything
    /// created before a failure is deleted before the error is returned.
    pub fn allocate(
        context: &mut C,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, GpuError> {
        let program = context.create_program(vertex_source, fragment_source)?;

        let texture = match context.create_texture() {
            Ok(texture) => texture,
            Err(err) => {
                context.delete_program(program);
                return Err(err);
            }
        };

        let buffer = match context.create_vertex_buffer(&QUAD_VERTICES) {
            Ok(buffer) => buffer,
            Err(err) => {
                context.delete_texture(texture);
                context.delete_program(program);
                return Err(err);
            }
        };

        let uniforms = UniformLocations {
            texture: context.uniform_location(&program, "u_texture"),
            time: context.uniform_location(&program, "u_time"),
            resolution: context.uniform_location(&program, "u_resolution"),
            texture_resolution: context.uniform_location(&program, "u_textureResolution"),
            aspect: context.uniform_location(&program, "u_aspect"),
        };
        let attributes = QuadAttributes {
            position: context.attribute_location(&program, "a_position"),
            tex_coord: context.attribute_location(&program, "a_texCoord"),
        };
        tracing::debug!(?attributes, "allocated GPU resources");

        Ok(Self {
            program,
            texture,
            buffer,
            uniforms,
            attributes,
            uploaded_size: None,
        })
    }

    pub fn release(self, context: &mut C) {
        context.delete_buffer(self.buffer);
        context.delete_texture(self.texture);
        context.delete_program(self.program);
        tracing::debug!("released GPU resources");
    }

    pub fn uniforms(&self) -> &UniformLocations<C::UniformLocation> {
        &self.uniforms
    }

    pub fn attributes(&self) -> QuadAttributes {
        self.attributes
    }

    /// Dimensions of the last successful upload, if any.
    pub fn uploaded_size(&self) -> Option<(u32, u32)> {
        self.uploaded_size
    }

    /// Forces the next upload to redefine the texture storage.
    pub fn invalidate_upload(&mut self) {
        self.uploaded_size = None;
    }

    /// Uploads a frame: a full upload when the dimensions differ from the
    /// previous frame, a partial update otherwise.
    pub fn upload(
        &mut self,
        context: &mut C,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<TextureUpload, GpuError> {
        let upload = if self.uploaded_size == Some((width, height)) {
            TextureUpload::Partial
        } else {
            TextureUpload::Full
        };
        if let Err(err) = context.upload_texture(&mut self.texture, upload, width, height, pixels) {
            self.uploaded_size = None;
            return Err(err);
        }
        self.uploaded_size = Some((width, height));
        Ok(upload)
    }

    pub fn apply_uniforms(&mut self, context: &mut C, frame: FrameUniforms) {
        let (surface_w, surface_h) = frame.surface;
        let (texture_w, texture_h) = frame.texture;
        let uniforms = self.uniforms;
        let program = &mut self.program;

        if let Some(location) = uniforms.texture {
            context.set_uniform(program, location, UniformValue::Int(0));
        }
        if let Some(location) = uniforms.time {
            context.set_uniform(program, location, UniformValue::Float(frame.time));
        }
        if let Some(location) = uniforms.resolution {
            context.set_uniform(
                program,
                location,
                UniformValue::Vec2([surface_w as f32, surface_h as f32]),
            );
        }
        if let Some(location) = uniforms.texture_resolution {
            if texture_w > 0 && texture_h > 0 {
                context.set_uniform(
                    program,
                    location,
                    UniformValue::Vec2([texture_w as f32, texture_h as f32]),
                );
            }
        }
        if let Some(location) = uniforms.aspect {
            if surface_h > 0 {
                context.set_uniform(
                    program,
                    location,
                    UniformValue::Float(surface_w as f32 / surface_h as f32),
                );
            }
        }
    }

    pub fn draw(&self, context: &mut C, clear: Option<[f32; 4]>) -> Result<(), GpuError> {
        context.draw_quad(
            &self.program,
            &self.buffer,
            &self.texture,
            self.attributes,
            clear,
        )
    }
}
