//! A 2D shape engine built in Rust
//!
//! This engine provides:
//! - Shapes (rectangles, circles, triangles, convex polygons, thick lines)
//!   with 2D transforms
//! - A pannable, zoomable 2D camera
//! - Batched drawing of many shapes in two draw calls
//! - A graphics backend abstraction with wgpu and headless implementations
//! - Input handling with winit

pub mod core;
pub mod input;
pub mod math;
pub mod renderer;
pub mod shapes;

// Re-exports for convenience
pub use glam;
pub use wgpu;
pub use winit;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{Engine, EngineConfig, EngineContext, Game, RendererConfig};
    pub use crate::input::{Input, PanZoomController};
    pub use crate::math::Transform2D;
    pub use crate::renderer::{
        Camera2D, GraphicsBackend, RenderStats, Renderer2D, Shared, SharedBackend,
    };
    pub use crate::shapes::{Placement, Shape, ShapeKind};
    pub use glam::{Mat3, Mat4, Vec2, Vec4};
    pub use winit::keyboard::KeyCode;
}
