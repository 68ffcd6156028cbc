//! GPU-side object owned by a shape or by the batch renderer
//!
//! A [`RenderObject`] bundles a vertex buffer, an optional index buffer, the
//! vertex layout, a shader program and texture attachments. It is invalid
//! until [`RenderObject::create`] succeeds and again after
//! [`RenderObject::destroy`]; every operation on an invalid object is
//! rejected with a logged error.

use smallvec::SmallVec;

use super::backend::{
    BackendError, Binding, BufferHandle, BufferKind, BufferUsage, DrawMode, GraphicsBackend,
    ShaderDesc, ShaderHandle, SharedBackend, TextureHandle, UniformValue,
};
use super::vertex::VertexLayout;

/// Owner of one set of GPU buffers plus a shader program
pub struct RenderObject {
    backend: SharedBackend,
    label: &'static str,
    layout: VertexLayout,
    usage: BufferUsage,
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    shader: Option<ShaderHandle>,
    textures: SmallVec<[(u32, TextureHandle); 4]>,
    vertex_count: u32,
    index_count: u32,
}

impl RenderObject {
    /// Create an invalid object; call [`Self::create`] to allocate it
    pub fn new(
        backend: SharedBackend,
        label: &'static str,
        layout: VertexLayout,
        usage: BufferUsage,
    ) -> Self {
        Self {
            backend,
            label,
            layout,
            usage,
            vertex_buffer: None,
            index_buffer: None,
            shader: None,
            textures: SmallVec::new(),
            vertex_count: 0,
            index_count: 0,
        }
    }

    /// Allocate the vertex buffer and compile the shader program.
    ///
    /// On failure nothing stays allocated and the object remains invalid.
    pub fn create(
        &mut self,
        vertex_data: &[u8],
        shader: &ShaderDesc<'_>,
    ) -> Result<(), BackendError> {
        if self.is_valid() {
            log::error!("{}: create called on a live object", self.label);
            debug_assert!(false, "RenderObject::create called twice");
            return Ok(());
        }

        let vertex_buffer =
            match self
                .backend
                .create_buffer(BufferKind::Vertex, vertex_data, self.usage)
            {
                Ok(buffer) => buffer,
                Err(e) => return Err(self.log_error("create vertex buffer", e)),
            };
        let program = match self.backend.create_shader(shader) {
            Ok(program) => program,
            Err(e) => {
                self.backend.destroy_buffer(vertex_buffer);
                return Err(self.log_error("compile shader", e));
            }
        };

        self.vertex_buffer = Some(vertex_buffer);
        self.shader = Some(program);
        self.vertex_count = self.layout.vertex_count(vertex_data.len());
        Ok(())
    }

    /// True between a successful `create` and `destroy`
    pub fn is_valid(&self) -> bool {
        self.vertex_buffer.is_some() && self.shader.is_some()
    }

    /// Replace the vertex data. The buffer grows if needed.
    pub fn set_vertex_data(&mut self, data: &[u8]) -> Result<(), BackendError> {
        let buffer = self.vertex_buffer_handle("set_vertex_data")?;
        self.backend
            .write_buffer(buffer, data)
            .map_err(|e| self.log_error("upload vertices", e))?;
        self.vertex_count = self.layout.vertex_count(data.len());
        Ok(())
    }

    /// Overwrite part of the vertex data, starting `offset` bytes in
    pub fn set_vertex_sub_data(&mut self, offset: usize, data: &[u8]) -> Result<(), BackendError> {
        let buffer = self.vertex_buffer_handle("set_vertex_sub_data")?;
        self.backend
            .write_buffer_range(buffer, offset, data)
            .map_err(|e| self.log_error("upload vertex range", e))
    }

    /// Replace the index data, allocating the index buffer on first use
    pub fn set_index_data(&mut self, indices: &[u32]) -> Result<(), BackendError> {
        self.ensure_valid("set_index_data")?;
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let result = match self.index_buffer {
            Some(buffer) => self.backend.write_buffer(buffer, bytes),
            None => self
                .backend
                .create_buffer(BufferKind::Index, bytes, self.usage)
                .map(|buffer| {
                    self.index_buffer = Some(buffer);
                }),
        };
        result.map_err(|e| self.log_error("upload indices", e))?;
        self.index_count = indices.len() as u32;
        Ok(())
    }

    /// Overwrite part of the index data, starting at index `first`
    pub fn set_index_sub_data(&mut self, first: usize, indices: &[u32]) -> Result<(), BackendError> {
        self.ensure_valid("set_index_sub_data")?;
        let Some(buffer) = self.index_buffer else {
            return Err(self.log_error("upload index range", BackendError::NoIndexBuffer));
        };
        self.backend
            .write_buffer_range(
                buffer,
                first * std::mem::size_of::<u32>(),
                bytemuck::cast_slice(indices),
            )
            .map_err(|e| self.log_error("upload index range", e))
    }

    /// Set a uniform on this object's shader program
    pub fn set_uniform(&self, name: &str, value: UniformValue) -> Result<(), BackendError> {
        self.ensure_valid("set_uniform")?;
        let shader = self.shader.ok_or(BackendError::InvalidHandle("shader"))?;
        self.backend
            .set_uniform(shader, name, value)
            .map_err(|e| self.log_error("set uniform", e))
    }

    /// Attach a texture to a slot, replacing whatever was there.
    ///
    /// Slots at or above the hardware maximum are logged and not attached.
    pub fn attach_texture(&mut self, slot: u32, texture: TextureHandle) -> Result<(), BackendError> {
        self.ensure_valid("attach_texture")?;
        let max = self.backend.max_texture_slots();
        if slot >= max {
            return Err(self.log_error(
                "attach texture",
                BackendError::TextureSlotOutOfRange { slot, max },
            ));
        }
        self.textures.retain(|(s, _)| *s != slot);
        self.textures.push((slot, texture));
        Ok(())
    }

    /// Remove the texture in a slot
    pub fn detach_texture(&mut self, slot: u32) {
        self.textures.retain(|(s, _)| *s != slot);
    }

    /// Bind for drawing
    pub fn bind(&self) -> Result<(), BackendError> {
        self.ensure_valid("bind")?;
        let (Some(vertex_buffer), Some(shader)) = (self.vertex_buffer, self.shader) else {
            return Err(BackendError::InvalidHandle("buffer"));
        };
        let binding = Binding {
            vertex_buffer,
            index_buffer: self.index_buffer,
            layout: self.layout.clone(),
            shader,
            textures: self.textures.clone(),
        };
        self.backend
            .bind(&binding)
            .map_err(|e| self.log_error("bind", e))
    }

    /// Clear the backend binding
    pub fn unbind(&self) {
        self.backend.unbind();
    }

    /// Draw the whole object: indexed if it has indices, otherwise every vertex
    pub fn draw(&self, mode: DrawMode) -> Result<(), BackendError> {
        self.ensure_valid("draw")?;
        let result = if self.index_buffer.is_some() && self.index_count > 0 {
            self.backend.draw_indexed(mode, self.index_count)
        } else {
            self.backend.draw(mode, self.vertex_count)
        };
        result.map_err(|e| self.log_error("draw", e))
    }

    /// Release every GPU resource. The object becomes invalid.
    pub fn destroy(&mut self) {
        if !self.is_valid() {
            log::error!("{}: destroy called on an invalid object", self.label);
            return;
        }
        self.release();
    }

    /// Backend this object allocates from
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Vertex layout
    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Usage hint the buffers were created with
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Vertices in the last upload
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Indices in the last upload
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Vertex buffer handle, if allocated
    pub fn vertex_buffer(&self) -> Option<BufferHandle> {
        self.vertex_buffer
    }

    /// Index buffer handle, if allocated
    pub fn index_buffer(&self) -> Option<BufferHandle> {
        self.index_buffer
    }

    /// Shader program handle, if compiled
    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    /// Attached `(slot, texture)` pairs
    pub fn textures(&self) -> &[(u32, TextureHandle)] {
        &self.textures
    }

    fn release(&mut self) {
        if let Some(buffer) = self.vertex_buffer.take() {
            self.backend.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            self.backend.destroy_buffer(buffer);
        }
        if let Some(shader) = self.shader.take() {
            self.backend.destroy_shader(shader);
        }
        self.textures.clear();
        self.vertex_count = 0;
        self.index_count = 0;
    }

    fn ensure_valid(&self, operation: &str) -> Result<(), BackendError> {
        if self.is_valid() {
            Ok(())
        } else {
            log::error!("{}: {operation} on an invalid render object", self.label);
            Err(BackendError::InvalidHandle("render object"))
        }
    }

    fn vertex_buffer_handle(&self, operation: &str) -> Result<BufferHandle, BackendError> {
        self.ensure_valid(operation)?;
        self.vertex_buffer
            .ok_or(BackendError::InvalidHandle("buffer"))
    }

    fn log_error(&self, what: &str, error: BackendError) -> BackendError {
        log::error!("{}: failed to {what}: {error}", self.label);
        error
    }
}

impl Drop for RenderObject {
    fn drop(&mut self) {
        if self.is_valid() {
            log::warn!("{}: dropped without destroy, releasing GPU resources", self.label);
            self.release();
        }
    }
}

impl std::fmt::Debug for RenderObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderObject")
            .field("label", &self.label)
            .field("usage", &self.usage)
            .field("vertex_buffer", &self.vertex_buffer)
            .field("index_buffer", &self.index_buffer)
            .field("shader", &self.shader)
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::renderer::headless::HeadlessBackend;
    use crate::renderer::vertex::Vertex2D;

    fn quad() -> Vec<Vertex2D> {
        [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
            .iter()
            .map(|&p| Vertex2D::new(p, [1.0; 4], [0.0; 2]))
            .collect()
    }

    fn object(backend: &Rc<HeadlessBackend>) -> RenderObject {
        let shared: SharedBackend = backend.clone();
        RenderObject::new(shared, "test object", Vertex2D::layout(), BufferUsage::Dynamic)
    }

    #[test]
    fn test_invalid_until_created() {
        let backend = Rc::new(HeadlessBackend::new());
        let mut obj = object(&backend);

        assert!(!obj.is_valid());
        assert!(obj.set_vertex_data(&[]).is_err());
        assert!(obj.bind().is_err());

        obj.create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
            .unwrap();
        assert!(obj.is_valid());
        assert_eq!(obj.vertex_count(), 4);
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.live_shaders(), 1);
    }

    #[test]
    fn test_indexed_draw_after_index_upload() {
        let backend = Rc::new(HeadlessBackend::new());
        let mut obj = object(&backend);
        obj.create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
            .unwrap();
        obj.set_index_data(&[0, 1, 2, 0, 2, 3]).unwrap();
        obj.set_index_sub_data(3, &[2, 3, 0]).unwrap();

        obj.bind().unwrap();
        obj.draw(DrawMode::TriangleList).unwrap();
        obj.unbind();

        let draws = backend.draws();
        assert_eq!(draws.len(), 1);
        assert!(draws[0].indexed);
        assert_eq!(draws[0].indices.as_deref(), Some(&[0, 1, 2, 2, 3, 0][..]));
    }

    #[test]
    fn test_vertex_sub_data() {
        let backend = Rc::new(HeadlessBackend::new());
        let mut obj = object(&backend);
        obj.create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
            .unwrap();

        let moved = Vertex2D::new([9.0, 9.0], [1.0; 4], [0.0; 2]);
        let stride = obj.layout().stride();
        obj.set_vertex_sub_data(2 * stride, bytemuck::bytes_of(&moved))
            .unwrap();

        let stored: Vec<Vertex2D> = obj
            .vertex_buffer()
            .and_then(|b| backend.buffer_contents(b))
            .unwrap();
        assert_eq!(stored[2].position, [9.0, 9.0]);
        assert!(obj.set_vertex_sub_data(4 * stride, bytemuck::bytes_of(&moved)).is_err());
    }

    #[test]
    fn test_destroy_releases_everything() {
        let backend = Rc::new(HeadlessBackend::new());
        let mut obj = object(&backend);
        obj.create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
            .unwrap();
        obj.set_index_data(&[0, 1, 2]).unwrap();

        obj.destroy();

        assert!(!obj.is_valid());
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_shaders(), 0);
        assert!(obj.draw(DrawMode::TriangleList).is_err());
    }

    #[test]
    fn test_drop_releases_live_object() {
        let backend = Rc::new(HeadlessBackend::new());
        {
            let mut obj = object(&backend);
            obj.create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
                .unwrap();
        }
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_failed_create_leaves_nothing_allocated() {
        let backend = Rc::new(HeadlessBackend::new());
        let mut obj = object(&backend);
        backend.set_fail_allocations(true);

        assert!(obj
            .create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
            .is_err());
        assert!(!obj.is_valid());
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_texture_slot_over_limit_is_not_attached() {
        let backend = Rc::new(HeadlessBackend::new().with_max_texture_slots(4));
        let mut obj = object(&backend);
        obj.create(bytemuck::cast_slice(&quad()), &ShaderDesc::shape())
            .unwrap();
        let texture = backend.create_texture(2, 2, &[255; 16]).unwrap();

        assert!(obj.attach_texture(0, texture).is_ok());
        assert!(matches!(
            obj.attach_texture(4, texture),
            Err(BackendError::TextureSlotOutOfRange { slot: 4, max: 4 })
        ));
        assert_eq!(obj.textures(), &[(0, texture)]);
    }
}
