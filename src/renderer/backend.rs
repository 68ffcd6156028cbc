//! Graphics backend abstraction
//!
//! Everything above this module talks to the GPU through [`GraphicsBackend`]:
//! buffers, shader programs and textures are created through it and referred
//! to by generation-checked handles. Backends are shared as
//! [`SharedBackend`] and use interior mutability, since shapes and the batch
//! renderer upload data from their own setters.

use std::rc::Rc;

use glam::{Mat4, Vec4};
use smallvec::SmallVec;

use super::pool::PoolIndex;
use super::vertex::VertexLayout;

/// Uniform name of the view-projection matrix
pub const VIEW_PROJECTION_UNIFORM: &str = "u_viewProjectionMatrix";
/// Uniform name of the shape tint color
pub const COLOR_UNIFORM: &str = "uColor";

/// Shared, single-threaded handle to a backend
pub type SharedBackend = Rc<dyn GraphicsBackend>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) PoolIndex);

/// Handle to a compiled shader program and its uniform values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) PoolIndex);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) PoolIndex);

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    /// `u32` indices
    Index,
}

/// Expected update frequency. Only affects memory placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    Static,
    #[default]
    Dynamic,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    TriangleList,
    /// First vertex shared by every triangle
    TriangleFan,
}

/// Fixed-function state toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    /// Cull clockwise (back-facing) triangles
    pub cull_back_faces: bool,
    /// Alpha blending
    pub blending: bool,
    /// Depth testing
    pub depth_test: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            cull_back_faces: false,
            blending: true,
            depth_test: false,
        }
    }
}

/// Type of a declared shader uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Mat4,
    Vec4,
}

/// Value of a shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec4(Vec4),
}

impl UniformValue {
    /// Kind of this value
    #[must_use]
    pub const fn kind(&self) -> UniformKind {
        match self {
            Self::Mat4(_) => UniformKind::Mat4,
            Self::Vec4(_) => UniformKind::Vec4,
        }
    }
}

/// Description of a shader program to compile
#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    /// WGSL source
    pub source: &'a str,
    /// Declared uniforms. Only these names can be set.
    pub uniforms: &'a [(&'a str, UniformKind)],
}

impl ShaderDesc<'static> {
    /// The built-in shape shader (`u_viewProjectionMatrix` + `uColor`)
    #[must_use]
    pub const fn shape() -> Self {
        Self {
            label: "Shape Shader",
            source: include_str!("shape.wgsl"),
            uniforms: &[
                (VIEW_PROJECTION_UNIFORM, UniformKind::Mat4),
                (COLOR_UNIFORM, UniformKind::Vec4),
            ],
        }
    }
}

/// Everything a draw call reads from
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: Option<BufferHandle>,
    pub layout: VertexLayout,
    pub shader: ShaderHandle,
    /// `(slot, texture)` pairs
    pub textures: SmallVec<[(u32, TextureHandle); 4]>,
}

/// Errors reported by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Handle is stale or was never issued by this backend
    InvalidHandle(&'static str),
    /// Sub-range write past the end of a buffer
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    /// Uniform name not declared by the shader
    UnknownUniform(String),
    /// Uniform value does not match the declared type
    UniformTypeMismatch(String),
    /// Draw issued with nothing bound
    NothingBound,
    /// Draw issued outside `acquire_frame` / `present_frame`
    NoActiveFrame,
    /// Indexed draw issued without an index buffer
    NoIndexBuffer,
    /// Draw count exceeds the bound buffer
    DrawOutOfRange { count: u32, available: u32 },
    /// Texture slot at or above the hardware maximum
    TextureSlotOutOfRange { slot: u32, max: u32 },
    /// Buffer or texture allocation failed
    AllocationFailed(String),
    /// Shader could not be compiled or is incompatible
    ShaderCompilation(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandle(kind) => write!(f, "invalid {kind} handle"),
            Self::OutOfBounds {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "write of {len} bytes at offset {offset} exceeds buffer size {capacity}"
            ),
            Self::UnknownUniform(name) => write!(f, "unknown uniform '{name}'"),
            Self::UniformTypeMismatch(name) => write!(f, "type mismatch for uniform '{name}'"),
            Self::NothingBound => write!(f, "draw issued with nothing bound"),
            Self::NoActiveFrame => write!(f, "draw issued outside a frame"),
            Self::NoIndexBuffer => write!(f, "indexed draw without an index buffer"),
            Self::DrawOutOfRange { count, available } => {
                write!(f, "draw of {count} elements but only {available} available")
            }
            Self::TextureSlotOutOfRange { slot, max } => {
                write!(f, "texture slot {slot} exceeds hardware maximum of {max}")
            }
            Self::AllocationFailed(e) => write!(f, "allocation failed: {e}"),
            Self::ShaderCompilation(e) => write!(f, "shader compilation failed: {e}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The graphics backend collaborator.
///
/// All methods take `&self`; implementations keep their resource tables
/// behind `RefCell`. Calls are synchronous from the caller's point of view.
pub trait GraphicsBackend {
    /// Allocate a buffer initialised with `data`
    fn create_buffer(
        &self,
        kind: BufferKind,
        data: &[u8],
        usage: BufferUsage,
    ) -> Result<BufferHandle, BackendError>;

    /// Replace the whole contents of a buffer, growing it if needed
    fn write_buffer(&self, buffer: BufferHandle, data: &[u8]) -> Result<(), BackendError>;

    /// Overwrite part of a buffer. The range must lie inside the buffer.
    fn write_buffer_range(
        &self,
        buffer: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Release a buffer. Stale handles are ignored.
    fn destroy_buffer(&self, buffer: BufferHandle);

    /// Compile a shader program
    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<ShaderHandle, BackendError>;

    /// Set a declared uniform on a shader program
    fn set_uniform(
        &self,
        shader: ShaderHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), BackendError>;

    /// Release a shader program. Stale handles are ignored.
    fn destroy_shader(&self, shader: ShaderHandle);

    /// Upload an RGBA8 texture
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureHandle, BackendError>;

    /// Release a texture. Stale handles are ignored.
    fn destroy_texture(&self, texture: TextureHandle);

    /// Bind buffers, shader and textures for the following draws
    fn bind(&self, binding: &Binding) -> Result<(), BackendError>;

    /// Clear the current binding
    fn unbind(&self);

    /// Non-indexed draw of `vertex_count` vertices from the bound buffer
    fn draw(&self, mode: DrawMode, vertex_count: u32) -> Result<(), BackendError>;

    /// Indexed draw of `index_count` indices from the bound index buffer
    fn draw_indexed(&self, mode: DrawMode, index_count: u32) -> Result<(), BackendError>;

    /// Current fixed-function state
    fn render_state(&self) -> RenderState;

    /// Change fixed-function state for subsequent draws
    fn set_render_state(&self, state: RenderState);

    /// Number of texture slots the hardware supports
    fn max_texture_slots(&self) -> u32;

    /// Start a frame. Returns `false` if there is nothing to draw into.
    fn acquire_frame(&self) -> bool;

    /// Execute the frame's draws and present them
    fn present_frame(&self);
}

/// Triangulate a fan of `vertex_count` vertices into a triangle list
pub fn fan_indices(vertex_count: u32) -> Vec<u32> {
    (1..vertex_count.saturating_sub(1))
        .flat_map(|i| [0, i, i + 1])
        .collect()
}

/// Triangulate an indexed fan into a triangle list
pub fn fan_to_list(fan: &[u32]) -> Vec<u32> {
    if fan.len() < 3 {
        return Vec::new();
    }
    (1..fan.len() - 1)
        .flat_map(|i| [fan[0], fan[i], fan[i + 1]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_indices() {
        assert_eq!(fan_indices(4), vec![0, 1, 2, 0, 2, 3]);
        assert!(fan_indices(2).is_empty());
        assert!(fan_indices(0).is_empty());
    }

    #[test]
    fn test_fan_to_list() {
        assert_eq!(fan_to_list(&[5, 6, 7, 8]), vec![5, 6, 7, 5, 7, 8]);
        assert!(fan_to_list(&[1, 2]).is_empty());
    }

    #[test]
    fn test_uniform_value_kind() {
        assert_eq!(UniformValue::Mat4(Mat4::IDENTITY).kind(), UniformKind::Mat4);
        assert_eq!(UniformValue::Vec4(Vec4::ONE).kind(), UniformKind::Vec4);
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::TextureSlotOutOfRange { slot: 20, max: 16 };
        assert_eq!(err.to_string(), "texture slot 20 exceeds hardware maximum of 16");
    }
}
