//! Shape kinds and batch placement

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::renderer::{BufferUsage, DrawMode};

/// Which batch a shape is accumulated into. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Placement {
    /// Changes most frames
    #[default]
    Dynamic,
    /// Rarely or never changes (backgrounds, grids)
    Static,
}

impl Placement {
    /// Buffer usage hint matching this placement
    #[must_use]
    pub const fn usage(self) -> BufferUsage {
        match self {
            Self::Dynamic => BufferUsage::Dynamic,
            Self::Static => BufferUsage::Static,
        }
    }
}

/// Kind-specific parameters of a shape.
///
/// Triangles and convex polygons keep their vertices in the shape's local
/// vertex list directly; the other kinds generate it from these parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeKind {
    Rectangle { width: f32, height: f32 },
    /// Segment count can change; regenerating reallocates the vertex list
    Circle { radius: f32, segments: u32 },
    /// Segment count fixed at creation; regenerating rewrites in place
    FixedCircle { radius: f32, segments: u32 },
    Triangle,
    ConvexPolygon,
    ThickLine {
        start: Vec2,
        end: Vec2,
        thickness: f32,
    },
}

impl ShapeKind {
    /// Short name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rectangle { .. } => "rectangle",
            Self::Circle { .. } => "circle",
            Self::FixedCircle { .. } => "fixed circle",
            Self::Triangle => "triangle",
            Self::ConvexPolygon => "convex polygon",
            Self::ThickLine { .. } => "thick line",
        }
    }

    /// How the kind's vertices are assembled into triangles
    #[must_use]
    pub const fn draw_mode(&self) -> DrawMode {
        match self {
            Self::Circle { .. } | Self::FixedCircle { .. } | Self::ConvexPolygon => {
                DrawMode::TriangleFan
            }
            Self::Rectangle { .. } | Self::Triangle | Self::ThickLine { .. } => {
                DrawMode::TriangleList
            }
        }
    }
}
