//! 2D shapes
//!
//! A [`Shape`] keeps its local geometry, an affine transform and a GPU-side
//! [`RenderObject`] in sync. Every mutator recomputes the world vertices and
//! uploads them before returning, so the renderer never sees stale data.
//!
//! ```ignore
//! let mut rect = Shape::rectangle(&backend, 2.0, 1.0, Placement::Dynamic);
//! rect.set_position(Vec2::new(3.0, 4.0));
//! rect.set_color(Vec4::new(1.0, 0.5, 0.0, 1.0));
//! renderer.submit(&rect);
//! // ...
//! rect.destroy();
//! ```

mod geometry;
mod kind;

use std::borrow::Cow;

use glam::{Mat3, Mat4, Quat, Vec2, Vec4};
use smallvec::SmallVec;

pub use geometry::{
    circle_vertex_count, MIN_CIRCLE_SEGMENTS, QUAD_INDICES, TRIANGLE_INDICES,
    TRIANGLE_INDICES_FLIPPED,
};
pub use kind::{Placement, ShapeKind};

use crate::math::{is_convex, triangle_winding, Transform2D, Winding};
use crate::renderer::{
    fan_indices, programmer_error, Camera2D, DrawMode, RenderObject, ShaderDesc, SharedBackend,
    TextureHandle, UniformValue, Vertex2D, COLOR_UNIFORM, VIEW_PROJECTION_UNIFORM,
};

/// Opaque white
pub const WHITE: Vec4 = Vec4::ONE;

/// A transformable, GPU-backed 2D shape
#[derive(Debug)]
pub struct Shape {
    kind: ShapeKind,
    placement: Placement,
    local: Vec<Vec2>,
    world: Vec<Vec2>,
    indices: Option<SmallVec<[u32; 6]>>,
    transform: Transform2D,
    matrix: Mat3,
    color: Vec4,
    object: RenderObject,
    destroyed: bool,
}

impl Shape {
    /// Rectangle of `width × height` with its origin at the bottom-left corner
    pub fn rectangle(
        backend: &SharedBackend,
        width: f32,
        height: f32,
        placement: Placement,
    ) -> Self {
        Self::build(
            backend,
            ShapeKind::Rectangle { width, height },
            geometry::rectangle(width, height).to_vec(),
            Some(SmallVec::from_slice(&QUAD_INDICES)),
            placement,
        )
    }

    /// Circle whose segment count can change later
    pub fn circle(
        backend: &SharedBackend,
        radius: f32,
        segments: u32,
        placement: Placement,
    ) -> Self {
        let segments = clamp_segments(segments);
        Self::build(
            backend,
            ShapeKind::Circle { radius, segments },
            geometry::circle(radius, segments),
            None,
            placement,
        )
    }

    /// Circle with `SEGMENTS` segments for its whole life
    pub fn fixed_circle<const SEGMENTS: u32>(
        backend: &SharedBackend,
        radius: f32,
        placement: Placement,
    ) -> Self {
        let segments = clamp_segments(SEGMENTS);
        Self::build(
            backend,
            ShapeKind::FixedCircle { radius, segments },
            geometry::circle(radius, segments),
            None,
            placement,
        )
    }

    /// Triangle from three local-space vertices
    pub fn triangle(backend: &SharedBackend, vertices: [Vec2; 3], placement: Placement) -> Self {
        Self::build(
            backend,
            ShapeKind::Triangle,
            vertices.to_vec(),
            Some(SmallVec::from_slice(&TRIANGLE_INDICES)),
            placement,
        )
    }

    /// Convex polygon from local-space vertices in order.
    ///
    /// Non-convex input is logged and drawn as given.
    pub fn convex_polygon(backend: &SharedBackend, vertices: &[Vec2], placement: Placement) -> Self {
        validate_polygon(vertices);
        Self::build(
            backend,
            ShapeKind::ConvexPolygon,
            vertices.to_vec(),
            None,
            placement,
        )
    }

    /// Segment from `start` to `end` widened to `thickness`
    pub fn thick_line(
        backend: &SharedBackend,
        start: Vec2,
        end: Vec2,
        thickness: f32,
        placement: Placement,
    ) -> Self {
        if start == end {
            log::warn!("Thick line with coincident endpoints at {start}");
        }
        Self::build(
            backend,
            ShapeKind::ThickLine {
                start,
                end,
                thickness,
            },
            geometry::thick_line(start, end, thickness).to_vec(),
            Some(SmallVec::from_slice(&QUAD_INDICES)),
            placement,
        )
    }

    fn build(
        backend: &SharedBackend,
        kind: ShapeKind,
        local: Vec<Vec2>,
        indices: Option<SmallVec<[u32; 6]>>,
        placement: Placement,
    ) -> Self {
        let transform = Transform2D::IDENTITY;
        let mut shape = Self {
            kind,
            placement,
            world: local.clone(),
            local,
            indices,
            matrix: transform.matrix(),
            transform,
            color: WHITE,
            object: RenderObject::new(
                backend.clone(),
                kind.name(),
                Vertex2D::layout(),
                placement.usage(),
            ),
            destroyed: false,
        };

        shape.correct_winding();
        let vertices = shape.vertex_data();
        if shape
            .object
            .create(bytemuck::cast_slice(&vertices), &ShaderDesc::shape())
            .is_err()
        {
            log::error!("Failed to allocate GPU resources for {}", kind.name());
            return shape;
        }
        if let Some(indices) = &shape.indices {
            shape.object.set_index_data(indices).ok();
        }
        shape
            .object
            .set_uniform(COLOR_UNIFORM, UniformValue::Vec4(WHITE))
            .ok();
        shape
    }

    /// Move the shape's origin to `position`
    pub fn set_position(&mut self, position: Vec2) {
        if self.check_alive("set_position") {
            self.transform.position = position;
            self.update_world();
        }
    }

    /// Set rotation in radians, counter-clockwise
    pub fn set_rotation(&mut self, rotation: f32) {
        if self.check_alive("set_rotation") {
            self.transform.rotation = rotation;
            self.update_world();
        }
    }

    /// Set per-axis scale
    pub fn set_scale(&mut self, scale: Vec2) {
        if self.check_alive("set_scale") {
            self.transform.scale = scale;
            self.update_world();
        }
    }

    /// Offset the position by `delta`
    pub fn move_by(&mut self, delta: Vec2) {
        if self.check_alive("move_by") {
            self.transform.position += delta;
            self.update_world();
        }
    }

    /// Replace position, rotation and scale at once
    pub fn set_transform(&mut self, transform: Transform2D) {
        if self.check_alive("set_transform") {
            self.transform = transform;
            self.update_world();
        }
    }

    /// Set the uniform tint color. Vertices are not touched.
    pub fn set_color(&mut self, color: Vec4) {
        if self.check_alive("set_color") {
            self.color = color;
            self.object
                .set_uniform(COLOR_UNIFORM, UniformValue::Vec4(color))
                .ok();
        }
    }

    /// Resize a rectangle
    pub fn set_size(&mut self, width: f32, height: f32) {
        if !self.check_alive("set_size") {
            return;
        }
        let ShapeKind::Rectangle { .. } = self.kind else {
            return self.wrong_kind("set_size");
        };
        self.kind = ShapeKind::Rectangle { width, height };
        self.local.copy_from_slice(&geometry::rectangle(width, height));
        self.update_world();
    }

    /// Change a circle's radius
    pub fn set_radius(&mut self, radius: f32) {
        if !self.check_alive("set_radius") {
            return;
        }
        match self.kind {
            ShapeKind::Circle { segments, .. } => {
                self.kind = ShapeKind::Circle { radius, segments };
                self.local = geometry::circle(radius, segments);
            }
            ShapeKind::FixedCircle { segments, .. } => {
                self.kind = ShapeKind::FixedCircle { radius, segments };
                geometry::fill_circle(radius, segments, &mut self.local);
            }
            _ => return self.wrong_kind("set_radius"),
        }
        self.update_world();
    }

    /// Change a dynamic circle's segment count
    pub fn set_segments(&mut self, segments: u32) {
        if !self.check_alive("set_segments") {
            return;
        }
        let ShapeKind::Circle { radius, .. } = self.kind else {
            return self.wrong_kind("set_segments");
        };
        let segments = clamp_segments(segments);
        self.kind = ShapeKind::Circle { radius, segments };
        self.local = geometry::circle(radius, segments);
        self.update_world();
    }

    /// Move one vertex of a triangle or convex polygon.
    ///
    /// Out-of-range indices are logged and ignored.
    pub fn set_vertex(&mut self, index: usize, vertex: Vec2) {
        if !self.check_alive("set_vertex") {
            return;
        }
        if !matches!(self.kind, ShapeKind::Triangle | ShapeKind::ConvexPolygon) {
            return self.wrong_kind("set_vertex");
        }
        let count = self.local.len();
        let Some(slot) = self.local.get_mut(index) else {
            log::warn!(
                "{}: vertex index {index} out of range ({count} vertices)",
                self.kind.name()
            );
            return;
        };
        *slot = vertex;
        if self.kind == ShapeKind::ConvexPolygon {
            validate_polygon(&self.local);
        }
        self.update_world();
    }

    /// Replace all vertices of a triangle (exactly 3) or convex polygon
    pub fn set_vertices(&mut self, vertices: &[Vec2]) {
        if !self.check_alive("set_vertices") {
            return;
        }
        match self.kind {
            ShapeKind::Triangle if vertices.len() != 3 => {
                log::warn!("triangle: expected 3 vertices, got {}", vertices.len());
                return;
            }
            ShapeKind::Triangle => {}
            ShapeKind::ConvexPolygon => validate_polygon(vertices),
            _ => return self.wrong_kind("set_vertices"),
        }
        self.local.clear();
        self.local.extend_from_slice(vertices);
        self.update_world();
    }

    /// Move a thick line's endpoints
    pub fn set_endpoints(&mut self, start: Vec2, end: Vec2) {
        if !self.check_alive("set_endpoints") {
            return;
        }
        let ShapeKind::ThickLine { thickness, .. } = self.kind else {
            return self.wrong_kind("set_endpoints");
        };
        if start == end {
            log::warn!("Thick line with coincident endpoints at {start}");
        }
        self.set_line(start, end, thickness);
    }

    /// Change a thick line's thickness
    pub fn set_thickness(&mut self, thickness: f32) {
        if !self.check_alive("set_thickness") {
            return;
        }
        let ShapeKind::ThickLine { start, end, .. } = self.kind else {
            return self.wrong_kind("set_thickness");
        };
        self.set_line(start, end, thickness);
    }

    fn set_line(&mut self, start: Vec2, end: Vec2, thickness: f32) {
        self.kind = ShapeKind::ThickLine {
            start,
            end,
            thickness,
        };
        self.local
            .copy_from_slice(&geometry::thick_line(start, end, thickness));
        self.update_world();
    }

    /// Sample `texture` across the shape's local bounds
    pub fn attach_texture(&mut self, texture: TextureHandle) {
        if self.check_alive("attach_texture") {
            self.object.attach_texture(0, texture).ok();
        }
    }

    /// Go back to flat color
    pub fn detach_texture(&mut self) {
        if self.check_alive("detach_texture") {
            self.object.detach_texture(0);
        }
    }

    /// Draw this shape on its own through `camera`. Shapes with fewer than
    /// three vertices draw nothing.
    pub fn render(&self, camera: &Camera2D) {
        if !self.check_alive("render") || self.world.len() < 3 {
            return;
        }
        let view_projection = UniformValue::Mat4(camera.view_projection_matrix());
        if self
            .object
            .set_uniform(VIEW_PROJECTION_UNIFORM, view_projection)
            .is_err()
            || self.object.bind().is_err()
        {
            return;
        }
        self.object.draw(self.draw_mode()).ok();
        self.object.unbind();
    }

    /// Release GPU resources. The shape can't be used afterwards.
    pub fn destroy(&mut self) {
        if self.destroyed {
            programmer_error(format_args!("{} destroyed twice", self.kind.name()));
            return;
        }
        if self.object.is_valid() {
            self.object.destroy();
        }
        self.destroyed = true;
    }

    /// Kind and its parameters
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// Batch placement chosen at creation
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Vertices before the transform
    pub fn local_vertices(&self) -> &[Vec2] {
        &self.local
    }

    /// Vertices after the transform
    pub fn world_vertices(&self) -> &[Vec2] {
        &self.world
    }

    /// Explicit index list, if the kind has one
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Indices as a triangle list. Fan kinds are triangulated around vertex 0.
    pub fn batch_indices(&self) -> Cow<'_, [u32]> {
        match &self.indices {
            Some(indices) => Cow::Borrowed(indices.as_slice()),
            None => Cow::Owned(fan_indices(self.world.len() as u32)),
        }
    }

    /// Primitive assembly mode
    pub fn draw_mode(&self) -> DrawMode {
        self.kind.draw_mode()
    }

    /// Current transform
    pub fn transform(&self) -> Transform2D {
        self.transform
    }

    /// Position of the local origin in world space
    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    /// Rotation in radians
    pub fn rotation(&self) -> f32 {
        self.transform.rotation
    }

    /// Per-axis scale
    pub fn scale(&self) -> Vec2 {
        self.transform.scale
    }

    /// Affine matrix `T · R · S`
    pub fn transform_matrix(&self) -> Mat3 {
        self.matrix
    }

    /// Model matrix lifted to 3D for shaders that want one
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.transform.scale.extend(1.0),
            Quat::from_rotation_z(self.transform.rotation),
            self.transform.position.extend(0.0),
        )
    }

    /// Tint color
    pub fn color(&self) -> Vec4 {
        self.color
    }

    /// True once `destroy` has been called
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// GPU-side object
    pub fn render_object(&self) -> &RenderObject {
        &self.object
    }

    /// Recompute the matrix and every world vertex, then upload.
    fn update_world(&mut self) {
        self.matrix = self.transform.matrix();
        self.transform.apply_all(&self.local, &mut self.world);

        if self.correct_winding() {
            if let Some(indices) = &self.indices {
                self.object.set_index_data(indices).ok();
            }
        }
        let vertices = self.vertex_data();
        self.object
            .set_vertex_data(bytemuck::cast_slice(&vertices))
            .ok();
    }

    /// Keep a triangle counter-clockwise in world space while back faces are
    /// culled. Returns true if the index order changed.
    fn correct_winding(&mut self) -> bool {
        if self.kind != ShapeKind::Triangle
            || !self.object.backend().render_state().cull_back_faces
        {
            return false;
        }
        let [a, b, c] = [self.world[0], self.world[1], self.world[2]];
        let wanted: &[u32] = match triangle_winding(a, b, c) {
            Winding::Clockwise => &TRIANGLE_INDICES_FLIPPED,
            Winding::CounterClockwise | Winding::Degenerate => &TRIANGLE_INDICES,
        };
        match &mut self.indices {
            Some(indices) if indices.as_slice() != wanted => {
                indices.copy_from_slice(wanted);
                true
            }
            _ => false,
        }
    }

    /// World vertices with white vertex color and UVs over the local bounds
    fn vertex_data(&self) -> Vec<Vertex2D> {
        let (min, max) = geometry::bounds(&self.local);
        let extent = (max - min).max(Vec2::splat(f32::EPSILON));
        self.local
            .iter()
            .zip(&self.world)
            .map(|(&local, &world)| {
                let uv = (local - min) / extent;
                Vertex2D::new(world.to_array(), WHITE.to_array(), [uv.x, 1.0 - uv.y])
            })
            .collect()
    }

    fn check_alive(&self, operation: &str) -> bool {
        if self.destroyed {
            programmer_error(format_args!(
                "{operation} called on a destroyed {}",
                self.kind.name()
            ));
            return false;
        }
        true
    }

    fn wrong_kind(&self, operation: &str) {
        log::error!("{operation} is not supported by a {}", self.kind.name());
    }
}

fn clamp_segments(segments: u32) -> u32 {
    if segments < MIN_CIRCLE_SEGMENTS {
        log::warn!("Circle needs at least {MIN_CIRCLE_SEGMENTS} segments, got {segments}");
        MIN_CIRCLE_SEGMENTS
    } else {
        segments
    }
}

fn validate_polygon(vertices: &[Vec2]) {
    if vertices.len() < 3 {
        log::error!(
            "Convex polygon needs at least 3 vertices, got {}",
            vertices.len()
        );
    } else if !is_convex(vertices) {
        log::warn!("Polygon is not convex; it will be drawn as a fan and may look wrong");
    }
}
