use anyhow::{Context as AnyhowContext, Result};
use wgpu::util::DeviceExt;

use crate::context::{
    DrawingContext, QuadAttributes, TextureUpload, UniformValue, QUAD_VERTEX_COUNT,
};
use crate::types::{GpuError, BYTES_PER_PIXEL};

use super::pipeline::{build_program, MirrorProgram, PipelineLayouts};
use super::uniforms::UniformSlot;

/// Format of both the frame texture and the output surface.
pub(crate) const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Frame texture. Storage is created lazily by the first full upload.
pub struct FrameTexture {
    storage: Option<FrameStorage>,
}

struct FrameStorage {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
}

pub struct QuadBuffer {
    buffer: wgpu::Buffer,
}

/// Headless wgpu drawing context rendering into an offscreen RGBA surface.
pub struct WgpuContext {
    _instance: wgpu::Instance,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    layouts: PipelineLayouts,
    sampler: wgpu::Sampler,
    pub(crate) target: wgpu::Texture,
    target_view: wgpu::TextureView,
    pub(crate) size: (u32, u32),
    adapter_name: String,
}

impl WgpuContext {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let max_dimension = limits.max_texture_dimension_2d;
        let width = width.max(1);
        let height = height.max(1);
        if width > max_dimension || height > max_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_dimension}, requested surface is {width}x{height}"
            );
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("magic mirror device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        device.on_uncaptured_error(Box::new(|error| {
            tracing::error!(%error, "uncaptured GPU error");
        }));

        let layouts = PipelineLayouts::new(&device);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mirror frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mirror output surface"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            _instance: instance,
            device,
            queue,
            layouts,
            sampler,
            target,
            target_view,
            size: (width, height),
            adapter_name: adapter_info.name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn define_storage(&self, width: u32, height: u32) -> Result<FrameStorage, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::Allocation {
                what: "frame texture",
                reason: format!("invalid dimensions {width}x{height}"),
            });
        }
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("mirror frame texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::Allocation {
                what: "frame texture",
                reason: error.to_string(),
            });
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mirror frame bind group"),
            layout: &self.layouts.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        Ok(FrameStorage {
            texture,
            bind_group,
            size: (width, height),
        })
    }
}

impl DrawingContext for WgpuContext {
    type Program = MirrorProgram;
    type Texture = FrameTexture;
    type Buffer = QuadBuffer;
    type UniformLocation = UniformSlot;

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_program(
        &mut self,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self::Program, GpuError> {
        build_program(
            &self.device,
            &self.layouts,
            SURFACE_FORMAT,
            vertex_source,
            fragment_source,
        )
    }

    fn create_texture(&mut self) -> Result<Self::Texture, GpuError> {
        Ok(FrameTexture { storage: None })
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<Self::Buffer, GpuError> {
        if vertices.is_empty() {
            return Err(GpuError::Allocation {
                what: "vertex buffer",
                reason: "no vertex data".into(),
            });
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mirror quad"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Ok(QuadBuffer { buffer })
    }

    fn uniform_location(
        &self,
        _program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        UniformSlot::from_name(name)
    }

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<u32> {
        program.attribute(name)
    }

    fn upload_texture(
        &mut self,
        texture: &mut Self::Texture,
        upload: TextureUpload,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<(), GpuError> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(GpuError::Upload(format!(
                "expected {expected} bytes for {width}x{height}, got {}",
                pixels.len()
            )));
        }

        let same_size = texture
            .storage
            .as_ref()
            .is_some_and(|storage| storage.size == (width, height));
        match upload {
            TextureUpload::Full if !same_size => {
                texture.storage = Some(self.define_storage(width, height)?);
            }
            TextureUpload::Full => {}
            TextureUpload::Partial if same_size => {}
            TextureUpload::Partial => {
                return Err(GpuError::Upload(format!(
                    "partial upload of {width}x{height} does not match texture storage"
                )));
            }
        }
        let Some(storage) = texture.storage.as_ref() else {
            return Err(GpuError::Upload("texture has no storage".into()));
        };

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * BYTES_PER_PIXEL as u32),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn set_uniform(
        &mut self,
        program: &mut Self::Program,
        location: Self::UniformLocation,
        value: UniformValue,
    ) {
        if !program.uniforms.set(location, value) {
            tracing::warn!(?location, ?value, "uniform value does not fit slot; ignored");
        }
    }

    fn draw_quad(
        &mut self,
        program: &Self::Program,
        buffer: &Self::Buffer,
        texture: &Self::Texture,
        attributes: QuadAttributes,
        clear: Option<[f32; 4]>,
    ) -> Result<(), GpuError> {
        if attributes.position.is_none() {
            return Err(GpuError::Draw("program has no position input".into()));
        }
        let Some(storage) = texture.storage.as_ref() else {
            return Err(GpuError::Draw("frame texture has no contents".into()));
        };

        self.queue.write_buffer(
            &program.uniform_buffer,
            0,
            bytemuck::bytes_of(&program.uniforms),
        );

        let load = match clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: f64::from(a),
            }),
            None => wgpu::LoadOp::Load,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mirror frame encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mirror frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &program.uniform_bind_group, &[]);
            pass.set_bind_group(1, &storage.bind_group, &[]);
            pass.set_vertex_buffer(0, buffer.buffer.slice(..));
            pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(GpuError::Draw(error.to_string()));
        }
        Ok(())
    }

    fn delete_program(&mut self, program: Self::Program) {
        program.uniform_buffer.destroy();
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        if let Some(storage) = texture.storage {
            storage.texture.destroy();
        }
    }

    fn delete_buffer(&mut self, buffer: Self::Buffer) {
        buffer.buffer.destroy();
    }
}
