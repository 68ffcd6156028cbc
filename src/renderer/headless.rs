//! Headless recording backend
//!
//! Keeps buffers, uniforms and textures in memory and records every draw
//! call instead of talking to a GPU. Used by tests and by tools that need
//! the renderer's output without a window.

use std::cell::{Cell, RefCell};

use bytemuck::Pod;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::backend::{
    BackendError, Binding, BufferHandle, BufferKind, BufferUsage, DrawMode, GraphicsBackend,
    RenderState, ShaderDesc, ShaderHandle, TextureHandle, UniformKind, UniformValue,
};
use super::pool::Pool;

/// Default number of texture slots reported by the headless backend
pub const DEFAULT_TEXTURE_SLOTS: u32 = 16;

#[derive(Debug)]
struct HeadlessBuffer {
    kind: BufferKind,
    usage: BufferUsage,
    data: Vec<u8>,
    writes: usize,
}

#[derive(Debug)]
struct HeadlessShader {
    label: String,
    declared: FxHashMap<String, UniformKind>,
    values: FxHashMap<String, UniformValue>,
}

#[derive(Debug)]
struct HeadlessTexture {
    width: u32,
    height: u32,
}

/// One recorded draw call with a snapshot of everything it read
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub mode: DrawMode,
    pub indexed: bool,
    /// Vertex count, or index count for indexed draws
    pub count: u32,
    pub vertex_data: Vec<u8>,
    /// The first `count` indices for indexed draws
    pub indices: Option<Vec<u32>>,
    pub uniforms: FxHashMap<String, UniformValue>,
    pub textures: SmallVec<[(u32, TextureHandle); 4]>,
    pub state: RenderState,
    pub shader_label: String,
}

impl DrawRecord {
    /// Decode the bound vertex buffer
    pub fn vertices<V: Pod>(&self) -> Vec<V> {
        bytemuck::pod_collect_to_vec(&self.vertex_data)
    }

    /// Uniform value at draw time
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.get(name).copied()
    }
}

/// In-memory [`GraphicsBackend`]
#[derive(Debug)]
pub struct HeadlessBackend {
    buffers: RefCell<Pool<HeadlessBuffer>>,
    shaders: RefCell<Pool<HeadlessShader>>,
    textures: RefCell<Pool<HeadlessTexture>>,
    bound: RefCell<Option<Binding>>,
    state: Cell<RenderState>,
    draws: RefCell<Vec<DrawRecord>>,
    max_texture_slots: u32,
    fail_allocations: Cell<bool>,
    frames_presented: Cell<u64>,
}

impl HeadlessBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self {
            buffers: RefCell::new(Pool::new()),
            shaders: RefCell::new(Pool::new()),
            textures: RefCell::new(Pool::new()),
            bound: RefCell::new(None),
            state: Cell::new(RenderState::default()),
            draws: RefCell::new(Vec::new()),
            max_texture_slots: DEFAULT_TEXTURE_SLOTS,
            fail_allocations: Cell::new(false),
            frames_presented: Cell::new(0),
        }
    }

    /// Report a different hardware texture slot limit
    #[must_use]
    pub fn with_max_texture_slots(mut self, slots: u32) -> Self {
        self.max_texture_slots = slots;
        self
    }

    /// Make every following allocation fail (buffers, shaders, textures)
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.set(fail);
    }

    /// Draw calls recorded since the last `acquire_frame`
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.draws.borrow().clone()
    }

    /// Raw contents of a buffer
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.buffers.borrow().get(buffer.0).map(|b| b.data.clone())
    }

    /// Contents of a buffer decoded as `T`
    pub fn buffer_contents<T: Pod>(&self, buffer: BufferHandle) -> Option<Vec<T>> {
        self.buffers
            .borrow()
            .get(buffer.0)
            .map(|b| bytemuck::pod_collect_to_vec(&b.data))
    }

    /// Number of writes (including the initial upload) a buffer has received
    pub fn buffer_write_count(&self, buffer: BufferHandle) -> Option<usize> {
        self.buffers.borrow().get(buffer.0).map(|b| b.writes)
    }

    /// Usage hint a buffer was created with
    pub fn buffer_usage(&self, buffer: BufferHandle) -> Option<BufferUsage> {
        self.buffers.borrow().get(buffer.0).map(|b| b.usage)
    }

    /// Current value of a shader uniform
    pub fn uniform(&self, shader: ShaderHandle, name: &str) -> Option<UniformValue> {
        self.shaders
            .borrow()
            .get(shader.0)
            .and_then(|s| s.values.get(name).copied())
    }

    /// Size of a live texture
    pub fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .borrow()
            .get(texture.0)
            .map(|t| (t.width, t.height))
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    /// Number of live shader programs
    pub fn live_shaders(&self) -> usize {
        self.shaders.borrow().len()
    }

    /// Number of live textures
    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    /// Frames presented so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.get()
    }

    fn check_allocation(&self, what: &str) -> Result<(), BackendError> {
        if self.fail_allocations.get() {
            Err(BackendError::AllocationFailed(format!("{what} allocation disabled")))
        } else {
            Ok(())
        }
    }

    fn record(&self, mode: DrawMode, count: u32, indexed: bool) -> Result<(), BackendError> {
        let bound = self.bound.borrow();
        let binding = bound.as_ref().ok_or(BackendError::NothingBound)?;
        let buffers = self.buffers.borrow();
        let shaders = self.shaders.borrow();

        let vertex_data = buffers
            .get(binding.vertex_buffer.0)
            .ok_or(BackendError::InvalidHandle("buffer"))?
            .data
            .clone();
        let shader = shaders
            .get(binding.shader.0)
            .ok_or(BackendError::InvalidHandle("shader"))?;

        let indices = if indexed {
            let handle = binding.index_buffer.ok_or(BackendError::NoIndexBuffer)?;
            let index_buffer = buffers
                .get(handle.0)
                .ok_or(BackendError::InvalidHandle("buffer"))?;
            let all: Vec<u32> = bytemuck::pod_collect_to_vec(&index_buffer.data);
            if count as usize > all.len() {
                return Err(BackendError::DrawOutOfRange {
                    count,
                    available: all.len() as u32,
                });
            }
            Some(all[..count as usize].to_vec())
        } else {
            let available = binding.layout.vertex_count(vertex_data.len());
            if count > available {
                return Err(BackendError::DrawOutOfRange { count, available });
            }
            None
        };

        self.draws.borrow_mut().push(DrawRecord {
            mode,
            indexed,
            count,
            vertex_data,
            indices,
            uniforms: shader.values.clone(),
            textures: binding.textures.clone(),
            state: self.state.get(),
            shader_label: shader.label.clone(),
        });
        Ok(())
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn create_buffer(
        &self,
        kind: BufferKind,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<BufferHandle, BackendError> {
        self.check_allocation("buffer")?;
        let index = self.buffers.borrow_mut().insert(HeadlessBuffer {
            kind,
            usage,
            data: data.to_vec(),
            writes: 1,
        });
        Ok(BufferHandle(index))
    }

    fn write_buffer(&self, buffer: BufferHandle, data: &[u8]) -> Result<(), BackendError> {
        let mut buffers = self.buffers.borrow_mut();
        let entry = buffers
            .get_mut(buffer.0)
            .ok_or(BackendError::InvalidHandle("buffer"))?;
        entry.data.clear();
        entry.data.extend_from_slice(data);
        entry.writes += 1;
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
        if end > entry.data.len() {
            return Err(BackendError::OutOfBounds {
                offset,
                len: data.len(),
                capacity: entry.data.len(),
            });
        }
        entry.data[offset..end].copy_from_slice(data);
        entry.writes += 1;
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some(removed) = self.buffers.borrow_mut().remove(buffer.0) {
            log::trace!("Released {:?} buffer ({} bytes)", removed.kind, removed.data.len());
        }
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<ShaderHandle, BackendError> {
        self.check_allocation("shader")?;
        if desc.source.trim().is_empty() {
            return Err(BackendError::ShaderCompilation(format!(
                "'{}' has an empty source",
                desc.label
            )));
        }
        let declared = desc
            .uniforms
            .iter()
            .map(|&(name, kind)| (name.to_owned(), kind))
            .collect();
        let index = self.shaders.borrow_mut().insert(HeadlessShader {
            label: desc.label.to_owned(),
            declared,
            values: FxHashMap::default(),
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
        match entry.declared.get(name) {
            None => Err(BackendError::UnknownUniform(name.to_owned())),
            Some(kind) if *kind != value.kind() => {
                Err(BackendError::UniformTypeMismatch(name.to_owned()))
            }
            Some(_) => {
                entry.values.insert(name.to_owned(), value);
                Ok(())
            }
        }
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
        self.check_allocation("texture")?;
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(BackendError::AllocationFailed(format!(
                "{width}x{height} texture needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        let index = self
            .textures
            .borrow_mut()
            .insert(HeadlessTexture { width, height });
        Ok(TextureHandle(index))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.textures.borrow_mut().remove(texture.0);
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
        let textures = self.textures.borrow();
        for &(slot, texture) in &binding.textures {
            if slot >= self.max_texture_slots {
                return Err(BackendError::TextureSlotOutOfRange {
                    slot,
                    max: self.max_texture_slots,
                });
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
        self.max_texture_slots
    }

    fn acquire_frame(&self) -> bool {
        self.draws.borrow_mut().clear();
        true
    }

    fn present_frame(&self) {
        self.frames_presented.set(self.frames_presented.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{COLOR_UNIFORM, VIEW_PROJECTION_UNIFORM};
    use crate::renderer::vertex::Vertex2D;
    use glam::{Mat4, Vec4};

    fn vertex_binding(backend: &HeadlessBackend, vertices: &[Vertex2D]) -> Binding {
        let vertex_buffer = backend
            .create_buffer(
                BufferKind::Vertex,
                bytemuck::cast_slice(vertices),
                BufferUsage::Dynamic,
            )
            .unwrap();
        let shader = backend.create_shader(&ShaderDesc::shape()).unwrap();
        Binding {
            vertex_buffer,
            index_buffer: None,
            layout: Vertex2D::layout(),
            shader,
            textures: SmallVec::new(),
        }
    }

    #[test]
    fn test_range_write_must_fit() {
        let backend = HeadlessBackend::new();
        let buffer = backend
            .create_buffer(BufferKind::Index, &[0u8; 8], BufferUsage::Static)
            .unwrap();

        assert!(backend.write_buffer_range(buffer, 4, &[1, 2, 3, 4]).is_ok());
        assert!(matches!(
            backend.write_buffer_range(buffer, 6, &[1, 2, 3, 4]),
            Err(BackendError::OutOfBounds { .. })
        ));
        assert_eq!(backend.buffer_data(buffer).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(backend.buffer_write_count(buffer), Some(2));
    }

    #[test]
    fn test_destroyed_buffer_handle_is_rejected() {
        let backend = HeadlessBackend::new();
        let buffer = backend
            .create_buffer(BufferKind::Vertex, &[0u8; 4], BufferUsage::Dynamic)
            .unwrap();
        backend.destroy_buffer(buffer);

        assert_eq!(
            backend.write_buffer(buffer, &[1, 2, 3, 4]),
            Err(BackendError::InvalidHandle("buffer"))
        );
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_uniform_names_must_be_declared() {
        let backend = HeadlessBackend::new();
        let shader = backend.create_shader(&ShaderDesc::shape()).unwrap();

        assert!(backend
            .set_uniform(shader, COLOR_UNIFORM, UniformValue::Vec4(Vec4::ONE))
            .is_ok());
        assert_eq!(
            backend.set_uniform(shader, "u_color", UniformValue::Vec4(Vec4::ONE)),
            Err(BackendError::UnknownUniform("u_color".into()))
        );
        assert_eq!(
            backend.set_uniform(
                shader,
                VIEW_PROJECTION_UNIFORM,
                UniformValue::Vec4(Vec4::ONE)
            ),
            Err(BackendError::UniformTypeMismatch(VIEW_PROJECTION_UNIFORM.into()))
        );
    }

    #[test]
    fn test_draw_requires_binding() {
        let backend = HeadlessBackend::new();
        assert_eq!(
            backend.draw(DrawMode::TriangleList, 3),
            Err(BackendError::NothingBound)
        );
    }

    #[test]
    fn test_draw_records_snapshot() {
        let backend = HeadlessBackend::new();
        let vertices = [Vertex2D::new([0.0, 0.0], [1.0; 4], [0.0; 2]); 3];
        let binding = vertex_binding(&backend, &vertices);
        backend
            .set_uniform(
                binding.shader,
                VIEW_PROJECTION_UNIFORM,
                UniformValue::Mat4(Mat4::IDENTITY),
            )
            .unwrap();

        backend.bind(&binding).unwrap();
        backend.draw(DrawMode::TriangleFan, 3).unwrap();
        assert!(matches!(
            backend.draw(DrawMode::TriangleFan, 4),
            Err(BackendError::DrawOutOfRange { count: 4, available: 3 })
        ));
        assert_eq!(
            backend.draw_indexed(DrawMode::TriangleList, 3),
            Err(BackendError::NoIndexBuffer)
        );

        let draws = backend.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].vertices::<Vertex2D>(), vertices.to_vec());
        assert_eq!(
            draws[0].uniform(VIEW_PROJECTION_UNIFORM),
            Some(UniformValue::Mat4(Mat4::IDENTITY))
        );
    }

    #[test]
    fn test_texture_slot_limit() {
        let backend = HeadlessBackend::new().with_max_texture_slots(2);
        let texture = backend.create_texture(1, 1, &[255; 4]).unwrap();
        let mut binding = vertex_binding(&backend, &[Vertex2D::new([0.0; 2], [1.0; 4], [0.0; 2])]);

        binding.textures.push((2, texture));
        assert_eq!(
            backend.bind(&binding),
            Err(BackendError::TextureSlotOutOfRange { slot: 2, max: 2 })
        );
    }

    #[test]
    fn test_texture_lifetime() {
        let backend = HeadlessBackend::new();
        let texture = backend.create_texture(4, 2, &[0; 32]).unwrap();
        assert_eq!(backend.texture_size(texture), Some((4, 2)));
        assert_eq!(backend.live_textures(), 1);

        backend.destroy_texture(texture);
        assert_eq!(backend.texture_size(texture), None);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_allocation_failure() {
        let backend = HeadlessBackend::new();
        backend.set_fail_allocations(true);
        assert!(matches!(
            backend.create_buffer(BufferKind::Vertex, &[], BufferUsage::Static),
            Err(BackendError::AllocationFailed(_))
        ));
        assert!(backend.create_shader(&ShaderDesc::shape()).is_err());
    }
}
