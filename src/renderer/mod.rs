//! Rendering module
//!
//! 2D rendering through a [`GraphicsBackend`]: GPU objects, the camera, the
//! batch renderer and the wgpu and headless backends.

mod backend;
mod batch;
mod camera;
mod handle;
mod headless;
mod object;
mod pool;
mod renderer2d;
mod texture;
mod vertex;
mod wgpu_backend;

pub use backend::{
    fan_indices, fan_to_list, BackendError, Binding, BufferHandle, BufferKind, BufferUsage,
    DrawMode, GraphicsBackend, RenderState, ShaderDesc, ShaderHandle, SharedBackend,
    TextureHandle, UniformKind, UniformValue, COLOR_UNIFORM, VIEW_PROJECTION_UNIFORM,
};
pub use batch::Batch;
pub use camera::Camera2D;
pub use handle::{Shared, WeakShared};
pub use headless::{DrawRecord, HeadlessBackend, DEFAULT_TEXTURE_SLOTS};
pub use object::RenderObject;
pub use pool::{Pool, PoolIndex};
pub use renderer2d::{RenderStats, Renderer2D};
pub use texture::GpuTexture;
pub use vertex::{AttributeType, Vertex2D, VertexAttribute, VertexLayout};
pub use wgpu_backend::WgpuBackend;

/// Report a caller bug. Always logged; panics in debug builds.
#[track_caller]
pub(crate) fn programmer_error(args: std::fmt::Arguments<'_>) {
    log::error!("{args}");
    debug_assert!(false, "{args}");
}
