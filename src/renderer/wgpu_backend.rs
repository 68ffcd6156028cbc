//! wgpu implementation of [`GraphicsBackend`]
//!
//! Resource calls go straight to the device and queue. Draw calls made between
//! `acquire_frame` and `present_frame` are recorded together with a snapshot
//! of their uniforms and replayed in a single render pass when the frame is
//! presented. Buffer writes go through the queue and only land at submit, so
//! a write to a buffer that already has draws recorded this frame first moves
//! those draws onto a scratch copy of the old contents. Each draw shows the
//! data its buffers held when it was issued.
//!
//! wgpu has no triangle fans; fan draws are triangulated into a per-frame
//! scratch index buffer.

use std::cell::{Cell, RefCell};
use std::num::NonZeroU64;
use std::sync::Arc;

use glam::Vec4;
use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::backend::{
    fan_indices, fan_to_list, BackendError, Binding, BufferHandle, BufferKind, BufferUsage,
    DrawMode, GraphicsBackend, RenderState, ShaderDesc, ShaderHandle, TextureHandle,
    UniformKind, UniformValue,
};
use super::pool::Pool;
use super::texture::GpuTexture;
use super::vertex::VertexLayout;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Smallest buffer allocation in bytes
const MIN_BUFFER_SIZE: u64 = 64;

/// Uniform slots allocated up front
const INITIAL_UNIFORM_SLOTS: u64 = 64;

/// Texture slots the shape shader samples
const SAMPLED_TEXTURE_SLOTS: u32 = 1;

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
    usage: BufferUsage,
    /// Bytes of valid data
    len: usize,
    /// CPU copy of vertex data, kept for draws recorded before an overwrite
    vertices: Vec<u8>,
    /// CPU copy of index data, needed to triangulate indexed fans
    indices: Vec<u32>,
}

struct GpuShader {
    module: usize,
    uniforms: FxHashMap<String, (UniformKind, usize)>,
    data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    module: usize,
    state: RenderState,
    layout: VertexLayout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum VertexSource {
    Buffer(BufferHandle),
    /// Byte offset into the frame's scratch vertex buffer
    Scratch { offset: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum IndexSource {
    None,
    Buffer(BufferHandle),
    Scratch { first: u32 },
}

struct RecordedDraw {
    pipeline: PipelineKey,
    vertices: VertexSource,
    indices: IndexSource,
    count: u32,
    uniform_offset: u32,
    texture: Option<TextureHandle>,
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    recorded: FrameDraws,
}

/// Draws of one frame and the CPU data uploaded with them at present
#[derive(Default)]
struct FrameDraws {
    draws: Vec<RecordedDraw>,
    uniforms: Vec<u8>,
    scratch_vertices: Vec<u8>,
    scratch_indices: Vec<u32>,
}

impl FrameDraws {
    /// Point every draw reading `buffer` as vertices at a copy of `contents`
    fn preserve_vertices(&mut self, buffer: BufferHandle, contents: &[u8]) {
        let mut copied = None;
        for draw in &mut self.draws {
            if draw.vertices != VertexSource::Buffer(buffer) {
                continue;
            }
            let offset = *copied.get_or_insert_with(|| {
                let offset = self.scratch_vertices.len() as u64;
                self.scratch_vertices.extend_from_slice(contents);
                let aligned = self
                    .scratch_vertices
                    .len()
                    .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);
                self.scratch_vertices.resize(aligned, 0);
                offset
            });
            draw.vertices = VertexSource::Scratch { offset };
        }
    }

    /// Point every draw reading `buffer` as indices at a copy of `contents`
    fn preserve_indices(&mut self, buffer: BufferHandle, contents: &[u32]) {
        let mut copied = None;
        for draw in &mut self.draws {
            if draw.indices != IndexSource::Buffer(buffer) {
                continue;
            }
            let first = *copied.get_or_insert_with(|| {
                let first = self.scratch_indices.len() as u32;
                self.scratch_indices.extend_from_slice(contents);
                first
            });
            draw.indices = IndexSource::Scratch { first };
        }
    }
}

struct UniformArena {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

/// Window-backed GPU backend
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RefCell<wgpu::SurfaceConfiguration>,
    depth_view: RefCell<wgpu::TextureView>,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_slot: u64,
    uniform_arena: RefCell<UniformArena>,
    white_texture: GpuTexture,
    modules: RefCell<Vec<wgpu::ShaderModule>>,
    module_ids: RefCell<FxHashMap<String, usize>>,
    pipelines: RefCell<FxHashMap<PipelineKey, wgpu::RenderPipeline>>,
    buffers: RefCell<Pool<GpuBuffer>>,
    shaders: RefCell<Pool<GpuShader>>,
    textures: RefCell<Pool<GpuTexture>>,
    bound: RefCell<Option<Binding>>,
    state: Cell<RenderState>,
    frame: RefCell<Option<Frame>>,
    clear_color: Cell<wgpu::Color>,
}

impl WgpuBackend {
    /// Create a backend rendering into `window`
    pub async fn new(window: Arc<Window>, vsync: bool) -> Self {
        let size = window.inner_size();
        let size = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .expect("Failed to create surface");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .expect("Failed to find GPU adapter");

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Flatshape Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.0,
            height: size.1,
            present_mode,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = Self::create_depth_view(&device, size.0, size.1);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shape Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = GpuTexture::bind_group_layout(&device);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shape Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let uniform_slot = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let uniform_arena = Self::create_uniform_arena(
            &device,
            &uniform_layout,
            uniform_slot,
            uniform_slot * INITIAL_UNIFORM_SLOTS,
        );

        let white_texture = GpuTexture::white(&device, &queue, &texture_layout)
            .expect("Failed to create white texture");

        Self {
            surface,
            device,
            queue,
            config: RefCell::new(config),
            depth_view: RefCell::new(depth_view),
            uniform_layout,
            texture_layout,
            pipeline_layout,
            uniform_slot,
            uniform_arena: RefCell::new(uniform_arena),
            white_texture,
            modules: RefCell::new(Vec::new()),
            module_ids: RefCell::new(FxHashMap::default()),
            pipelines: RefCell::new(FxHashMap::default()),
            buffers: RefCell::new(Pool::new()),
            shaders: RefCell::new(Pool::new()),
            textures: RefCell::new(Pool::new()),
            bound: RefCell::new(None),
            state: Cell::new(RenderState::default()),
            frame: RefCell::new(None),
            clear_color: Cell::new(wgpu::Color::BLACK),
        }
    }

    /// Resize the surface
    pub fn resize(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let mut config = self.config.borrow_mut();
        config.width = width;
        config.height = height;
        self.surface.configure(&self.device, &config);
        *self.depth_view.borrow_mut() = Self::create_depth_view(&self.device, width, height);
        log::debug!("Resized to {}x{}", width, height);
    }

    /// Surface size in pixels
    pub fn size(&self) -> (u32, u32) {
        let config = self.config.borrow();
        (config.width, config.height)
    }

    /// Color the frame is cleared to
    pub fn set_clear_color(&self, color: Vec4) {
        self.clear_color.set(wgpu::Color {
            r: f64::from(color.x),
            g: f64::from(color.y),
            b: f64::from(color.z),
            a: f64::from(color.w),
        });
    }

    /// Get the device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn create_depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Depth Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_uniform_arena(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        slot: u64,
        capacity: u64,
    ) -> UniformArena {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shape Uniform Arena"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shape Uniform Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(slot),
                }),
            }],
        });
        UniformArena {
            buffer,
            bind_group,
            capacity,
        }
    }

    fn allocate_buffer(&self, kind: BufferKind, usage: BufferUsage, size: usize) -> wgpu::Buffer {
        let (label, usages) = match (kind, usage) {
            (BufferKind::Vertex, BufferUsage::Static) => ("Static Vertex Buffer", wgpu::BufferUsages::VERTEX),
            (BufferKind::Vertex, BufferUsage::Dynamic) => ("Dynamic Vertex Buffer", wgpu::BufferUsages::VERTEX),
            (BufferKind::Index, BufferUsage::Static) => ("Static Index Buffer", wgpu::BufferUsages::INDEX),
            (BufferKind::Index, BufferUsage::Dynamic) => ("Dynamic Index Buffer", wgpu::BufferUsages::INDEX),
        };
        let size = (size as u64)
            .max(MIN_BUFFER_SIZE)
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usages | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Queue a write, padding the tail to the copy alignment
    fn queue_write(&self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        if data.len() % align == 0 {
            self.queue.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(align), 0);
            self.queue.write_buffer(buffer, offset, &padded);
        }
    }

    fn shader_module(&self, desc: &ShaderDesc<'_>) -> Result<usize, BackendError> {
        if let Some(&id) = self.module_ids.borrow().get(desc.source) {
            return Ok(id);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::ShaderSource::Wgsl(desc.source.into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCompilation(format!("'{}': {error}", desc.label)));
        }

        let mut modules = self.modules.borrow_mut();
        let id = modules.len();
        modules.push(module);
        self.module_ids
            .borrow_mut()
            .insert(desc.source.to_owned(), id);
        log::debug!("Compiled shader '{}'", desc.label);
        Ok(id)
    }

    fn ensure_pipeline(&self, key: &PipelineKey) {
        if self.pipelines.borrow().contains_key(key) {
            return;
        }
        let modules = self.modules.borrow();
        let Some(module) = modules.get(key.module) else {
            return;
        };
        let format = self.config.borrow().format;
        let attributes = key.layout.wgpu_attributes();

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Shape Pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: key.layout.stride() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(if key.state.blending {
                            wgpu::BlendState::ALPHA_BLENDING
                        } else {
                            wgpu::BlendState::REPLACE
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: key.state.cull_back_faces.then_some(wgpu::Face::Back),
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: key.state.depth_test,
                    depth_compare: if key.state.depth_test {
                        wgpu::CompareFunction::LessEqual
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        log::debug!("Created pipeline for {:?}", key.state);
        self.pipelines.borrow_mut().insert(key.clone(), pipeline);
    }

    fn upload_uniforms(&self, data: &[u8]) {
        let needed = data.len() as u64;
        let mut arena = self.uniform_arena.borrow_mut();
        if needed > arena.capacity {
            *arena = Self::create_uniform_arena(
                &self.device,
                &self.uniform_layout,
                self.uniform_slot,
                needed.next_power_of_two(),
            );
        }
        self.queue_write(&arena.buffer, 0, data);
    }

    /// Keep draws already recorded this frame on the current contents of
    /// `handle` before it is overwritten or released
    fn preserve_recorded(&self, handle: BufferHandle, entry: &GpuBuffer) {
        let mut frame = self.frame.borrow_mut();
        let Some(frame) = frame.as_mut() else {
            return;
        };
        match entry.kind {
            BufferKind::Vertex => frame
                .recorded
                .preserve_vertices(handle, &entry.vertices[..entry.len]),
            BufferKind::Index => frame.recorded.preserve_indices(handle, &entry.indices),
        }
    }

    fn record(&self, mode: DrawMode, count: u32, indexed: bool) -> Result<(), BackendError> {
        let mut frame = self.frame.borrow_mut();
        let frame = &mut frame.as_mut().ok_or(BackendError::NoActiveFrame)?.recorded;
        let bound = self.bound.borrow();
        let binding = bound.as_ref().ok_or(BackendError::NothingBound)?;
        let buffers = self.buffers.borrow();
        let shaders = self.shaders.borrow();

        let vertices = buffers
            .get(binding.vertex_buffer.0)
            .ok_or(BackendError::InvalidHandle("buffer"))?;
        let shader = shaders
            .get(binding.shader.0)
            .ok_or(BackendError::InvalidHandle("shader"))?;

        let index_data = if indexed {
            let handle = binding.index_buffer.ok_or(BackendError::NoIndexBuffer)?;
            let index_buffer = buffers
                .get(handle.0)
                .ok_or(BackendError::InvalidHandle("buffer"))?;
            let available = index_buffer.indices.len() as u32;
            if count > available {
                return Err(BackendError::DrawOutOfRange { count, available });
            }
            Some((handle, &index_buffer.indices[..count as usize]))
        } else {
            let available = binding.layout.vertex_count(vertices.len);
            if count > available {
                return Err(BackendError::DrawOutOfRange { count, available });
            }
            None
        };

        let (indices, count) = match (mode, index_data) {
            (DrawMode::TriangleList, None) => (IndexSource::None, count),
            (DrawMode::TriangleList, Some((handle, _))) => (IndexSource::Buffer(handle), count),
            (DrawMode::TriangleFan, source) => {
                let list = match source {
                    Some((_, fan)) => fan_to_list(fan),
                    None => fan_indices(count),
                };
                let first = frame.scratch_indices.len() as u32;
                frame.scratch_indices.extend_from_slice(&list);
                (IndexSource::Scratch { first }, list.len() as u32)
            }
        };
        if count == 0 {
            return Ok(());
        }

        let uniform_offset = frame.uniforms.len();
        frame.uniforms.extend_from_slice(&shader.data);
        frame
            .uniforms
            .resize(uniform_offset + self.uniform_slot as usize, 0);

        frame.draws.push(RecordedDraw {
            pipeline: PipelineKey {
                module: shader.module,
                state: self.state.get(),
                layout: binding.layout.clone(),
            },
            vertices: VertexSource::Buffer(binding.vertex_buffer),
            indices,
            count,
            uniform_offset: uniform_offset as u32,
            texture: binding
                .textures
                .iter()
                .find(|(slot, _)| *slot == 0)
                .map(|&(_, texture)| texture),
        });
        Ok(())
    }
}

fn uniform_size(kind: UniformKind) -> usize {
    match kind {
        UniformKind::Mat4 => 64,
        UniformKind::Vec4 => 16,
    }
}

impl GraphicsBackend for WgpuBackend {
    fn create_buffer(
        &self,
        kind: BufferKind,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<BufferHandle, BackendError> {
        let buffer = self.allocate_buffer(kind, usage, data.len());
        self.queue_write(&buffer, 0, data);
        let (vertices, indices) = match kind {
            BufferKind::Index => (Vec::new(), bytemuck::pod_collect_to_vec(data)),
            BufferKind::Vertex => (data.to_vec(), Vec::new()),
        };
        let index = self.buffers.borrow_mut().insert(GpuBuffer {
            buffer,
            kind,
            usage,
            len: data.len(),
            vertices,
            indices,
        });
        Ok(BufferHandle(index))
    }

    fn write_buffer(&self, buffer: BufferHandle, data: &[u8]) -> Result<(), BackendError> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers
            .get_mut(buffer.0)
            .ok_or(BackendError::InvalidHandle("buffer"))?;
        self.preserve_recorded(buffer, entry);
        if data.len() as u64 > entry.buffer.size() {
            entry.buffer = self.allocate_buffer(entry.kind, entry.usage, data.len().next_power_of_two());
        }
        self.queue_write(&entry.buffer, 0, data);
        entry.len = data.len();
        match entry.kind {
            BufferKind::Index => entry.indices = bytemuck::pod_collect_to_vec(data),
            BufferKind::Vertex => {
                entry.vertices.clear();
                entry.vertices.extend_from_slice(data);
            }
        }
        Ok(())
    }

    fn write_buffer_range(
        &self,
        buffer: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers
            .get_mut(buffer.0)
            .ok_or(BackendError::InvalidHandle("buffer"))?;
        let end = offset + data.len();
        if end > entry.len || offset % wgpu::COPY_BUFFER_ALIGNMENT as usize != 0 {
            return Err(BackendError::OutOfBounds {
                offset,
                len: data.len(),
                capacity: entry.len,
            });
        }
        self.preserve_recorded(buffer, entry);
        self.queue_write(&entry.buffer, offset as u64, data);
        match entry.kind {
            BufferKind::Index => {
                let first = offset / std::mem::size_of::<u32>();
                let written: Vec<u32> = bytemuck::pod_collect_to_vec(data);
                entry.indices[first..first + written.len()].copy_from_slice(&written);
            }
            BufferKind::Vertex => entry.vertices[offset..end].copy_from_slice(data),
        }
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let removed = self.buffers.borrow_mut().remove(buffer.0);
        if let Some(removed) = removed {
            self.preserve_recorded(buffer, &removed);
            removed.buffer.destroy();
        }
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<ShaderHandle, BackendError> {
        let module = self.shader_module(desc)?;

        let mut offset = 0;
        let mut uniforms = FxHashMap::default();
        for &(name, kind) in desc.uniforms {
            uniforms.insert(name.to_owned(), (kind, offset));
            offset += uniform_size(kind);
        }
        if offset as u64 > self.uniform_slot {
            return Err(BackendError::ShaderCompilation(format!(
                "'{}' declares {offset} bytes of uniforms, limit is {}",
                desc.label, self.uniform_slot
            )));
        }

        let index = self.shaders.borrow_mut().insert(GpuShader {
            module,
            uniforms,
            data: vec![0; offset],
        });
        Ok(ShaderHandle(index))
    }

    fn set_uniform(
        &self,
        shader: ShaderHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), BackendError> {
        let mut shaders = self.shaders.borrow_mut();
        let entry = shaders
            .get_mut(shader.0)
            .ok_or(BackendError::InvalidHandle("shader"))?;
        let &(kind, offset) = entry
            .uniforms
            .get(name)
            .ok_or_else(|| BackendError::UnknownUniform(name.to_owned()))?;
        if kind != value.kind() {
            return Err(BackendError::UniformTypeMismatch(name.to_owned()));
        }
        let slot = &mut entry.data[offset..offset + uniform_size(kind)];
        match value {
            UniformValue::Mat4(m) => slot.copy_from_slice(bytemuck::cast_slice(&m.to_cols_array())),
            UniformValue::Vec4(v) => slot.copy_from_slice(bytemuck::cast_slice(&v.to_array())),
        }
        Ok(())
    }

    fn destroy_shader(&self, shader: ShaderHandle) {
        self.shaders.borrow_mut().remove(shader.0);
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureHandle, BackendError> {
        let texture = GpuTexture::from_rgba(
            &self.device,
            &self.queue,
            &self.texture_layout,
            rgba,
            (width, height),
            Some("Shape Texture"),
        )?;
        let index = self.textures.borrow_mut().insert(texture);
        Ok(TextureHandle(index))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if let Some(removed) = self.textures.borrow_mut().remove(texture.0) {
            removed.texture.destroy();
        }
    }

    fn bind(&self, binding: &Binding) -> Result<(), BackendError> {
        {
            let buffers = self.buffers.borrow();
            if !buffers.contains(binding.vertex_buffer.0) {
                return Err(BackendError::InvalidHandle("buffer"));
            }
            if let Some(index_buffer) = binding.index_buffer {
                if !buffers.contains(index_buffer.0) {
                    return Err(BackendError::InvalidHandle("buffer"));
                }
            }
        }
        if !self.shaders.borrow().contains(binding.shader.0) {
            return Err(BackendError::InvalidHandle("shader"));
        }
        let max = self.max_texture_slots();
        let textures = self.textures.borrow();
        for &(slot, texture) in &binding.textures {
            if slot >= max {
                return Err(BackendError::TextureSlotOutOfRange { slot, max });
            }
            if !textures.contains(texture.0) {
                return Err(BackendError::InvalidHandle("texture"));
            }
        }
        *self.bound.borrow_mut() = Some(binding.clone());
        Ok(())
    }

    fn unbind(&self) {
        *self.bound.borrow_mut() = None;
    }

    fn draw(&self, mode: DrawMode, vertex_count: u32) -> Result<(), BackendError> {
        self.record(mode, vertex_count, false)
    }

    fn draw_indexed(&self, mode: DrawMode, index_count: u32) -> Result<(), BackendError> {
        self.record(mode, index_count, true)
    }

    fn render_state(&self) -> RenderState {
        self.state.get()
    }

    fn set_render_state(&self, state: RenderState) {
        self.state.set(state);
    }

    fn max_texture_slots(&self) -> u32 {
        SAMPLED_TEXTURE_SLOTS
    }

    fn acquire_frame(&self) -> bool {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config.borrow());
                return false;
            }
            Err(e) => {
                log::error!("Surface error: {:?}", e);
                return false;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        *self.frame.borrow_mut() = Some(Frame {
            output,
            view,
            recorded: FrameDraws::default(),
        });
        true
    }

    fn present_frame(&self) {
        let Some(frame) = self.frame.borrow_mut().take() else {
            log::warn!("present_frame called without an acquired frame");
            return;
        };

        let recorded = &frame.recorded;
        for draw in &recorded.draws {
            self.ensure_pipeline(&draw.pipeline);
        }
        self.upload_uniforms(&recorded.uniforms);
        let scratch = (!recorded.scratch_indices.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Scratch Index Buffer"),
                    contents: bytemuck::cast_slice(&recorded.scratch_indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });
        let scratch_vertices = (!recorded.scratch_vertices.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Scratch Vertex Buffer"),
                    contents: &recorded.scratch_vertices,
                    usage: wgpu::BufferUsages::VERTEX,
                })
        });

        let pipelines = self.pipelines.borrow();
        let buffers = self.buffers.borrow();
        let textures = self.textures.borrow();
        let arena = self.uniform_arena.borrow();
        let depth_view = self.depth_view.borrow();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shape Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color.get()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &recorded.draws {
                let vertices = match draw.vertices {
                    VertexSource::Buffer(handle) => {
                        buffers.get(handle.0).map(|b| b.buffer.slice(..))
                    }
                    VertexSource::Scratch { offset } => {
                        scratch_vertices.as_ref().map(|b| b.slice(offset..))
                    }
                };
                let (Some(pipeline), Some(vertices)) = (pipelines.get(&draw.pipeline), vertices)
                else {
                    continue;
                };
                let texture_group = draw
                    .texture
                    .and_then(|texture| textures.get(texture.0))
                    .map_or(&self.white_texture.bind_group, |texture| &texture.bind_group);

                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &arena.bind_group, &[draw.uniform_offset]);
                pass.set_bind_group(1, texture_group, &[]);
                pass.set_vertex_buffer(0, vertices);

                match draw.indices {
                    IndexSource::None => pass.draw(0..draw.count, 0..1),
                    IndexSource::Buffer(handle) => {
                        let Some(indices) = buffers.get(handle.0) else {
                            continue;
                        };
                        pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(0..draw.count, 0, 0..1);
                    }
                    IndexSource::Scratch { first } => {
                        let Some(indices) = &scratch else {
                            continue;
                        };
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(first..first + draw.count, 0, 0..1);
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.output.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::vertex::Vertex2D;

    fn handles(count: usize) -> Vec<BufferHandle> {
        let mut pool = Pool::new();
        (0..count).map(|_| BufferHandle(pool.insert(()))).collect()
    }

    fn draw(vertices: BufferHandle, indices: IndexSource) -> RecordedDraw {
        RecordedDraw {
            pipeline: PipelineKey {
                module: 0,
                state: RenderState::default(),
                layout: Vertex2D::layout(),
            },
            vertices: VertexSource::Buffer(vertices),
            indices,
            count: 3,
            uniform_offset: 0,
            texture: None,
        }
    }

    #[test]
    fn test_overwritten_vertices_are_kept_for_earlier_draws() {
        let buffers = handles(2);
        let mut frame = FrameDraws::default();
        frame.draws.push(draw(buffers[0], IndexSource::None));
        frame.draws.push(draw(buffers[1], IndexSource::None));
        frame.draws.push(draw(buffers[0], IndexSource::None));

        frame.preserve_vertices(buffers[0], &[1, 2, 3, 4, 5, 6]);

        // Both draws of the overwritten buffer share one aligned copy
        assert_eq!(frame.scratch_vertices, vec![1, 2, 3, 4, 5, 6, 0, 0]);
        assert_eq!(frame.draws[0].vertices, VertexSource::Scratch { offset: 0 });
        assert_eq!(frame.draws[2].vertices, VertexSource::Scratch { offset: 0 });
        assert_eq!(frame.draws[1].vertices, VertexSource::Buffer(buffers[1]));

        // A draw recorded after the write reads the buffer itself
        frame.draws.push(draw(buffers[0], IndexSource::None));
        frame.preserve_vertices(buffers[0], &[7, 7, 7, 7]);
        assert_eq!(frame.draws[3].vertices, VertexSource::Scratch { offset: 8 });
        assert_eq!(frame.draws[0].vertices, VertexSource::Scratch { offset: 0 });
        assert_eq!(&frame.scratch_vertices[8..], &[7, 7, 7, 7]);
    }

    #[test]
    fn test_overwritten_indices_are_kept_for_earlier_draws() {
        let buffers = handles(2);
        let mut frame = FrameDraws::default();
        frame.scratch_indices.extend_from_slice(&[0, 1, 2]);
        frame.draws.push(draw(buffers[0], IndexSource::Buffer(buffers[1])));
        frame.draws.push(draw(buffers[0], IndexSource::Scratch { first: 0 }));

        frame.preserve_indices(buffers[1], &[0, 2, 3]);

        assert_eq!(frame.draws[0].indices, IndexSource::Scratch { first: 3 });
        assert_eq!(frame.draws[1].indices, IndexSource::Scratch { first: 0 });
        assert_eq!(frame.scratch_indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_reported_texture_slots_match_the_shader() {
        let declared = ShaderDesc::shape().source.matches("texture_2d").count();
        assert_eq!(declared as u32, SAMPLED_TEXTURE_SLOTS);
    }

    #[test]
    fn test_untouched_buffers_add_no_scratch() {
        let buffers = handles(2);
        let mut frame = FrameDraws::default();
        frame.draws.push(draw(buffers[0], IndexSource::None));

        frame.preserve_vertices(buffers[1], &[1, 2, 3, 4]);
        frame.preserve_indices(buffers[1], &[0, 1, 2]);

        assert!(frame.scratch_vertices.is_empty());
        assert!(frame.scratch_indices.is_empty());
        assert_eq!(frame.draws[0].vertices, VertexSource::Buffer(buffers[0]));
    }
}
