//! # wgpu backend
//!
//! The render core talks in immediate-mode terms: use a program, set a
//! uniform by name, bind a texture, draw a quad. wgpu wants everything
//! recorded into a render pass up front. This backend bridges the two by
//! recording each draw as a snapshot and replaying the frame at
//! [`end_frame`](RenderBackend::end_frame):
//!
//! ```text
//!  use_program(p) ─┐
//!  set_uniform(..) ─┼─▶ current QuadUniforms ──draw_quad()──▶ staged[i] (256-byte slots)
//!  bind_texture(t) ─┘                                          draws[i] = (p, t, offset)
//!
//!  end_frame: write staged → uniform buffer, then one render pass:
//!             for each draw: set_pipeline, set_bind_group(0, offset), set_bind_group(1, t), draw_indexed
//! ```
//!
//! Every program shares the [`QuadUniforms`] block, so a uniform "location"
//! is just a byte offset into it. Programs are WGSL with `vs_main` and
//! `fs_main` entry points.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::vertex::{QuadUniforms, QuadVertex};
use super::{GpuContext, GpuTexture, ProgramId, RenderBackend, RenderError, UniformLocation, UniformValue};

struct TextureEntry {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct Draw {
    program: ProgramId,
    texture: Option<GpuTexture>,
    uniform_offset: u32,
}

pub struct WgpuBackend {
    gpu: GpuContext,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    /// Draw slots the uniform buffer can hold.
    uniform_capacity: u64,
    /// Bytes between draw slots, aligned to the device's offset alignment.
    uniform_stride: u64,
    programs: HashMap<ProgramId, wgpu::RenderPipeline>,
    textures: HashMap<GpuTexture, TextureEntry>,
    white: TextureEntry,
    next_program: u32,
    next_texture: u32,
    current_program: Option<ProgramId>,
    current_texture: Option<GpuTexture>,
    current_uniforms: QuadUniforms,
    staged: Vec<u8>,
    draws: Vec<Draw>,
    clear: [f64; 4],
}

impl WgpuBackend {
    const INITIAL_CAPACITY: u64 = 256;

    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> Result<Self, RenderError> {
        let gpu = GpuContext::new(window, vsync)?;
        let device = &gpu.device;

        // Bind group layout 0: per-draw uniforms, dynamic offset
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(QuadUniforms::SIZE),
                },
                count: None,
            }],
        });

        // Bind group layout 1: texture + sampler
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Repeat addressing so texture_repeat tiles whole images.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertex buffer"),
            contents: bytemuck::cast_slice(&QuadVertex::QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad index buffer"),
            contents: bytemuck::cast_slice(&QuadVertex::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride = QuadUniforms::SIZE.div_ceil(alignment) * alignment;
        let (uniform_buffer, uniform_bind_group) =
            create_uniform_buffer(device, &uniform_layout, uniform_stride * Self::INITIAL_CAPACITY);

        let white = upload_texture(&gpu, &texture_layout, &sampler, "white 1x1", 1, 1, &[255; 4]);

        Ok(Self {
            gpu,
            pipeline_layout,
            uniform_layout,
            texture_layout,
            sampler,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            uniform_bind_group,
            uniform_capacity: Self::INITIAL_CAPACITY,
            uniform_stride,
            programs: HashMap::new(),
            textures: HashMap::new(),
            white,
            next_program: 1,
            next_texture: 1,
            current_program: None,
            current_texture: None,
            current_uniforms: QuadUniforms::default(),
            staged: Vec::new(),
            draws: Vec::new(),
            clear: [0.0, 0.0, 0.0, 1.0],
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    fn build_pipeline(
        &self,
        label: &str,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
    ) -> wgpu::RenderPipeline {
        self.gpu.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: fragment,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.gpu.surface_format(),
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None, // flips mirror the quad, keep both faces
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn write_uniform(&mut self, offset: usize, bytes: &[u8]) {
        let block = bytemuck::bytes_of_mut(&mut self.current_uniforms);
        match block.get_mut(offset..offset + bytes.len()) {
            Some(slot) => slot.copy_from_slice(bytes),
            None => log::warn!("Uniform write of {} bytes at {offset} overflows the block", bytes.len()),
        }
    }

    fn ensure_uniform_capacity(&mut self, draws: u64) {
        if draws <= self.uniform_capacity {
            return;
        }
        let capacity = draws.next_power_of_two();
        let (buffer, bind_group) = create_uniform_buffer(
            &self.gpu.device,
            &self.uniform_layout,
            self.uniform_stride * capacity,
        );
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
        self.uniform_capacity = capacity;
        log::debug!("Grew uniform buffer to {capacity} draws");
    }
}

fn create_uniform_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    size: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("quad uniform buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("quad uniform bind group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(QuadUniforms::SIZE),
            }),
        }],
    });
    (buffer, bind_group)
}

fn upload_texture(
    gpu: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> TextureEntry {
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    TextureEntry {
        texture,
        bind_group,
    }
}

impl RenderBackend for WgpuBackend {
    fn create_program(
        &mut self,
        label: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, RenderError> {
        // Catch validation errors instead of letting wgpu panic.
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex = self.gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(vertex_src.into()),
        });
        let fragment = if fragment_src == vertex_src {
            None
        } else {
            Some(self.gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(fragment_src.into()),
            }))
        };
        let pipeline = self.build_pipeline(label, &vertex, fragment.as_ref().unwrap_or(&vertex));

        if let Some(err) = pollster::block_on(self.gpu.device.pop_error_scope()) {
            return Err(RenderError::Program {
                label: label.to_string(),
                reason: err.to_string(),
            });
        }

        let program = ProgramId(self.next_program);
        self.next_program += 1;
        self.programs.insert(program, pipeline);
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        if !self.programs.contains_key(&program) {
            return None;
        }
        QuadUniforms::offset_of(name).map(UniformLocation)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let offset = location.0 as usize;
        match value {
            UniformValue::Mat4(m) => self.write_uniform(offset, bytemuck::bytes_of(&m.to_cols_array())),
            UniformValue::Float(f) => self.write_uniform(offset, bytemuck::bytes_of(&f)),
            UniformValue::Vec2(v) => self.write_uniform(offset, bytemuck::bytes_of(&v.to_array())),
            UniformValue::Vec3(v) => self.write_uniform(offset, bytemuck::bytes_of(&v.to_array())),
            UniformValue::Vec4(v) => self.write_uniform(offset, bytemuck::bytes_of(&v.to_array())),
            UniformValue::Int(i) => self.write_uniform(offset, bytemuck::bytes_of(&i)),
            UniformValue::IVec2(v) => self.write_uniform(offset, bytemuck::bytes_of(&v.to_array())),
            UniformValue::IVec3(v) => self.write_uniform(offset, bytemuck::bytes_of(&v.to_array())),
            UniformValue::IVec4(v) => self.write_uniform(offset, bytemuck::bytes_of(&v.to_array())),
        }
    }

    fn create_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<GpuTexture, RenderError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(RenderError::Texture {
                label: label.to_string(),
                reason: format!("{width}x{height} needs {expected} bytes, got {}", rgba.len()),
            });
        }
        let entry = upload_texture(
            &self.gpu,
            &self.texture_layout,
            &self.sampler,
            label,
            width,
            height,
            rgba,
        );
        let texture = GpuTexture(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(texture, entry);
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: GpuTexture) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
        if self.current_texture == Some(texture) {
            self.current_texture = None;
        }
    }

    fn bind_texture(&mut self, texture: Option<GpuTexture>) {
        self.current_texture = texture;
    }

    fn draw_quad(&mut self) {
        let Some(program) = self.current_program else {
            log::warn!("draw_quad with no program bound");
            return;
        };
        let slot = self.draws.len() as u64 * self.uniform_stride;
        self.staged.resize(slot as usize, 0);
        self.staged.extend_from_slice(bytemuck::bytes_of(&self.current_uniforms));
        self.draws.push(Draw {
            program,
            texture: self.current_texture,
            uniform_offset: slot as u32,
        });
    }

    fn begin_frame(&mut self, clear: [f64; 4]) {
        self.clear = clear;
        self.draws.clear();
        self.staged.clear();
        self.current_uniforms = QuadUniforms::default();
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.ensure_uniform_capacity(self.draws.len() as u64);
        if !self.staged.is_empty() {
            self.gpu.queue.write_buffer(&self.uniform_buffer, 0, &self.staged);
        }

        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.gpu.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timeout, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessera frame encoder"),
            });

        {
            let [r, g, b, a] = self.clear;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
            pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);

            let mut active: Option<ProgramId> = None;
            for draw in &self.draws {
                let Some(pipeline) = self.programs.get(&draw.program) else {
                    continue;
                };
                if active != Some(draw.program) {
                    pass.set_pipeline(pipeline);
                    active = Some(draw.program);
                }
                let texture = draw
                    .texture
                    .and_then(|t| self.textures.get(&t))
                    .unwrap_or(&self.white);
                pass.set_bind_group(0, &self.uniform_bind_group, &[draw.uniform_offset]);
                pass.set_bind_group(1, &texture.bind_group, &[]);
                pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }
}
