use bytemuck::{Pod, Zeroable};

use crate::context::UniformValue;

/// CPU shadow of the `MirrorParams` block declared by the fragment prelude.
///
/// std140: two vec2s, two floats, one vec2 of padding. 32 bytes total.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct MirrorUniforms {
    pub resolution: [f32; 2],
    pub texture_resolution: [f32; 2],
    pub time: f32,
    pub aspect: f32,
    pub padding0: [f32; 2],
}

unsafe impl Zeroable for MirrorUniforms {}
unsafe impl Pod for MirrorUniforms {}

/// Uniform location handed out by the wgpu backend. Each slot is a field of
/// [`MirrorUniforms`], except the texture unit, which is fixed by the bind
/// group layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSlot {
    Texture,
    Time,
    Resolution,
    TextureResolution,
    Aspect,
}

impl UniformSlot {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "u_texture" => Some(Self::Texture),
            "u_time" => Some(Self::Time),
            "u_resolution" => Some(Self::Resolution),
            "u_textureResolution" => Some(Self::TextureResolution),
            "u_aspect" => Some(Self::Aspect),
            _ => None,
        }
    }
}

impl MirrorUniforms {
    /// Stores `value` in `slot`. Returns `false` when the value kind does not
    /// match the slot; the block is left untouched in that case.
    pub fn set(&mut self, slot: UniformSlot, value: UniformValue) -> bool {
        match (slot, value) {
            // Only texture unit 0 exists.
            (UniformSlot::Texture, UniformValue::Int(unit)) => unit == 0,
            (UniformSlot::Time, UniformValue::Float(time)) => {
                self.time = time;
                true
            }
            (UniformSlot::Aspect, UniformValue::Float(aspect)) => {
                self.aspect = aspect;
                true
            }
            (UniformSlot::Resolution, UniformValue::Vec2(resolution)) => {
                self.resolution = resolution;
                true
            }
            (UniformSlot::TextureResolution, UniformValue::Vec2(resolution)) => {
                self.texture_resolution = resolution;
                true
            }
            _ => false,
        }
    }
}
