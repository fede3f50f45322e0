//! Recording [`DrawingContext`] used by unit tests. Every call is logged and
//! handle lifetimes are tracked so tests can assert allocation counts and
//! leak freedom without a GPU.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::context::{DrawingContext, QuadAttributes, TextureUpload, UniformValue};
use crate::shaders::{vertex_inputs, UNIFORM_NAMES};
use crate::types::{GpuError, BYTES_PER_PIXEL};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateProgram,
    CreateTexture,
    CreateBuffer,
    Upload {
        kind: TextureUpload,
        width: u32,
        height: u32,
        first_pixel: Option<[u8; 4]>,
    },
    Uniform {
        name: String,
        value: UniformValue,
    },
    Draw {
        clear: Option<[f32; 4]>,
    },
    DeleteProgram,
    DeleteTexture,
    DeleteBuffer,
}

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<Call>,
    live: HashSet<u64>,
    programs_created: usize,
    next_id: u64,
    fail_compile: bool,
    fail_textures: bool,
    fail_draw: bool,
}

/// Shared view onto a [`RecordingContext`] that stays usable after the
/// context itself has been moved into a renderer.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    inner: Rc<RefCell<Recording>>,
}

impl Recorder {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.borrow().calls.clone()
    }

    pub(crate) fn programs_created(&self) -> usize {
        self.inner.borrow().programs_created
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.inner.borrow().live.len()
    }

    pub(crate) fn draws(&self) -> Vec<Option<[f32; 4]>> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Draw { clear } => Some(*clear),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn uploads(&self) -> Vec<(TextureUpload, u32, u32)> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Upload {
                    kind,
                    width,
                    height,
                    ..
                } => Some((*kind, *width, *height)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn uploaded_first_pixels(&self) -> Vec<Option<[u8; 4]>> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Upload { first_pixel, .. } => Some(*first_pixel),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn uniform_calls(&self) -> Vec<(String, UniformValue)> {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Uniform { name, value } => Some((name.clone(), *value)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn fail_compile(&self, fail: bool) {
        self.inner.borrow_mut().fail_compile = fail;
    }

    pub(crate) fn fail_textures(&self, fail: bool) {
        self.inner.borrow_mut().fail_textures = fail;
    }

    pub(crate) fn fail_draw(&self, fail: bool) {
        self.inner.borrow_mut().fail_draw = fail;
    }

    fn push(&self, call: Call) {
        self.inner.borrow_mut().calls.push(call);
    }

    fn acquire(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.live.insert(id);
        id
    }

    fn free(&self, id: u64) {
        let removed = self.inner.borrow_mut().live.remove(&id);
        assert!(removed, "handle {id} released twice");
    }
}

#[derive(Debug)]
pub(crate) struct MockProgram {
    id: u64,
    attributes: Vec<(String, u32)>,
}

#[derive(Debug)]
pub(crate) struct MockTexture {
    id: u64,
    size: Option<(u32, u32)>,
}

#[derive(Debug)]
pub(crate) struct MockBuffer {
    id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockUniform {
    index: usize,
}

#[derive(Debug)]
pub(crate) struct RecordingContext {
    recorder: Recorder,
    surface: (u32, u32),
}

impl RecordingContext {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            recorder: Recorder::default(),
            surface: (width, height),
        }
    }

    pub(crate) fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }
}

impl DrawingContext for RecordingContext {
    type Program = MockProgram;
    type Texture = MockTexture;
    type Buffer = MockBuffer;
    type UniformLocation = MockUniform;

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn create_program(
        &mut self,
        vertex_source: &str,
        _fragment_source: &str,
    ) -> Result<Self::Program, GpuError> {
        if self.recorder.inner.borrow().fail_compile {
            return Err(GpuError::Compile("injected compile failure".into()));
        }
        self.recorder.inner.borrow_mut().programs_created += 1;
        self.recorder.push(Call::CreateProgram);
        Ok(MockProgram {
            id: self.recorder.acquire(),
            attributes: vertex_inputs(vertex_source),
        })
    }

    fn create_texture(&mut self) -> Result<Self::Texture, GpuError> {
        if self.recorder.inner.borrow().fail_textures {
            return Err(GpuError::Allocation {
                what: "texture",
                reason: "injected failure".into(),
            });
        }
        self.recorder.push(Call::CreateTexture);
        Ok(MockTexture {
            id: self.recorder.acquire(),
            size: None,
        })
    }

    fn create_vertex_buffer(&mut self, _vertices: &[f32]) -> Result<Self::Buffer, GpuError> {
        self.recorder.push(Call::CreateBuffer);
        Ok(MockBuffer {
            id: self.recorder.acquire(),
        })
    }

    fn uniform_location(
        &self,
        _program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        UNIFORM_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| MockUniform { index })
    }

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<u32> {
        program
            .attributes
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, location)| *location)
    }

    fn upload_texture(
        &mut self,
        texture: &mut Self::Texture,
        upload: TextureUpload,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), GpuError> {
        if pixels.len() != width as usize * height as usize * BYTES_PER_PIXEL {
            return Err(GpuError::Upload("pixel buffer length mismatch".into()));
        }
        if upload == TextureUpload::Partial && texture.size != Some((width, height)) {
            return Err(GpuError::Upload("partial upload with mismatched size".into()));
        }
        texture.size = Some((width, height));
        let first_pixel = pixels
            .get(..BYTES_PER_PIXEL)
            .map(|px| [px[0], px[1], px[2], px[3]]);
        self.recorder.push(Call::Upload {
            kind: upload,
            width,
            height,
            first_pixel,
        });
        Ok(())
    }

    fn set_uniform(
        &mut self,
        _program: &mut Self::Program,
        location: Self::UniformLocation,
        value: UniformValue,
    ) {
        self.recorder.push(Call::Uniform {
            name: UNIFORM_NAMES[location.index].to_string(),
            value,
        });
    }

    fn draw_quad(
        &mut self,
        program: &Self::Program,
        buffer: &Self::Buffer,
        texture: &Self::Texture,
        _attributes: QuadAttributes,
        clear: Option<[f32; 4]>,
    ) -> Result<(), GpuError> {
        if self.recorder.inner.borrow().fail_draw {
            return Err(GpuError::Draw("injected draw failure".into()));
        }
        {
            let inner = self.recorder.inner.borrow();
            assert!(inner.live.contains(&program.id), "draw with released program");
            assert!(inner.live.contains(&buffer.id), "draw with released buffer");
            assert!(inner.live.contains(&texture.id), "draw with released texture");
        }
        self.recorder.push(Call::Draw { clear });
        Ok(())
    }

    fn delete_program(&mut self, program: Self::Program) {
        self.recorder.free(program.id);
        self.recorder.push(Call::DeleteProgram);
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        self.recorder.free(texture.id);
        self.recorder.push(Call::DeleteTexture);
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        self.recorder.free(buffer.id);
        self.recorder.push(Call::DeleteBuffer);
    }
}
