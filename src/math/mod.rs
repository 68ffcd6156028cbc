//! 2D math helpers on top of glam
//!
//! Affine transforms for shapes, and the polygon predicates used to validate
//! geometry and fix triangle winding.

mod polygon;
mod transform;

pub use polygon::{cross, is_convex, signed_area, triangle_winding, Winding};
pub use transform::Transform2D;
