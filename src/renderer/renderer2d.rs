//! Batched 2D renderer
//!
//! Shapes submitted between [`Renderer2D::begin_frame`] and
//! [`Renderer2D::end_frame`] are concatenated into two batches by placement:
//! one for shapes that change every frame and one for static geometry. Each
//! non-empty batch is drawn with a single indexed call.
//!
//! Both batches are rebuilt every frame. The static batch is only uploaded
//! when its contents differ from the previous upload.

use glam::{Mat4, Vec4};

use super::backend::{
    BufferUsage, DrawMode, ShaderDesc, SharedBackend, UniformValue, COLOR_UNIFORM,
    VIEW_PROJECTION_UNIFORM,
};
use super::batch::Batch;
use super::camera::Camera2D;
use super::handle::{Shared, WeakShared};
use super::object::RenderObject;
use super::programmer_error;
use super::vertex::Vertex2D;
use crate::shapes::{Placement, Shape};

/// Counters for the last finished frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Draw calls issued
    pub draw_calls: u32,
    /// Vertices across both batches
    pub vertices: u32,
    /// Indices across both batches
    pub indices: u32,
    /// Shapes accepted by `submit`
    pub shapes: u32,
    /// The static batch was unchanged and not re-uploaded
    pub static_upload_skipped: bool,
}

struct BatchTarget {
    batch: Batch,
    object: RenderObject,
    /// What the GPU buffers currently hold
    uploaded: Option<Batch>,
}

impl BatchTarget {
    fn new(backend: &SharedBackend, label: &'static str, usage: BufferUsage) -> Self {
        let mut object = RenderObject::new(backend.clone(), label, Vertex2D::layout(), usage);
        if object.create(&[], &ShaderDesc::shape()).is_ok() {
            object
                .set_uniform(COLOR_UNIFORM, UniformValue::Vec4(Vec4::ONE))
                .ok();
        }
        Self {
            batch: Batch::new(),
            object,
            uploaded: None,
        }
    }

    /// Upload the batch. Unless `force` is set, nothing is written when the
    /// GPU already holds these exact contents. Returns whether it uploaded.
    fn upload(&mut self, force: bool) -> bool {
        if !force && self.uploaded.as_ref() == Some(&self.batch) {
            return false;
        }
        let uploaded = self
            .object
            .set_vertex_data(bytemuck::cast_slice(self.batch.vertices()))
            .and_then(|()| self.object.set_index_data(self.batch.indices()));
        self.uploaded = match uploaded {
            Ok(()) => Some(self.batch.clone()),
            Err(_) => None,
        };
        true
    }

    fn draw(&self, view_projection: Mat4) -> bool {
        let drawn = self
            .object
            .set_uniform(VIEW_PROJECTION_UNIFORM, UniformValue::Mat4(view_projection))
            .and_then(|()| self.object.bind())
            .and_then(|()| self.object.draw(DrawMode::TriangleList));
        self.object.unbind();
        drawn.is_ok()
    }
}

/// Accumulates shapes into batches and draws them through a camera
pub struct Renderer2D {
    backend: SharedBackend,
    dynamic: BatchTarget,
    statics: BatchTarget,
    camera: Option<WeakShared<Camera2D>>,
    warned_expired_camera: bool,
    frame: RenderStats,
    last_frame: RenderStats,
    destroyed: bool,
}

impl Renderer2D {
    /// Create the batch objects on `backend`
    pub fn new(backend: SharedBackend) -> Self {
        let dynamic = BatchTarget::new(&backend, "dynamic batch", BufferUsage::Dynamic);
        let statics = BatchTarget::new(&backend, "static batch", BufferUsage::Static);
        log::debug!("2D batch renderer created");
        Self {
            backend,
            dynamic,
            statics,
            camera: None,
            warned_expired_camera: false,
            frame: RenderStats::default(),
            last_frame: RenderStats::default(),
            destroyed: false,
        }
    }

    /// Draw through `camera` from now on. Only a weak reference is kept.
    pub fn set_camera(&mut self, camera: &Shared<Camera2D>) {
        self.camera = Some(camera.downgrade());
        self.warned_expired_camera = false;
    }

    /// Draw with an identity view-projection
    pub fn clear_camera(&mut self) {
        self.camera = None;
    }

    /// True if a camera is set and still alive
    pub fn has_camera(&self) -> bool {
        self.camera.as_ref().is_some_and(WeakShared::is_alive)
    }

    /// Start accumulating a new frame
    pub fn begin_frame(&mut self) {
        if !self.check_alive("begin_frame") {
            return;
        }
        self.dynamic.batch.clear();
        self.statics.batch.clear();
        self.frame = RenderStats::default();
    }

    /// Append a shape to the batch matching its placement
    pub fn submit(&mut self, shape: &Shape) {
        if !self.check_alive("submit") {
            return;
        }
        if shape.is_destroyed() {
            programmer_error(format_args!(
                "submitted a destroyed {}",
                shape.kind().name()
            ));
            return;
        }
        let indices = shape.batch_indices();
        if indices.is_empty() {
            return;
        }
        let target = match shape.placement() {
            Placement::Dynamic => &mut self.dynamic,
            Placement::Static => &mut self.statics,
        };
        if target
            .batch
            .append(shape.world_vertices(), shape.color(), &indices)
        {
            self.frame.shapes += 1;
        }
    }

    /// Upload both batches and draw them, static geometry first
    pub fn end_frame(&mut self) {
        if !self.check_alive("end_frame") {
            return;
        }
        let view_projection = self.view_projection();

        if !self.statics.batch.is_empty() {
            self.frame.static_upload_skipped = !self.statics.upload(false);
        }
        if !self.dynamic.batch.is_empty() {
            self.dynamic.upload(true);
        }

        for target in [&self.statics, &self.dynamic] {
            if target.batch.is_empty() {
                continue;
            }
            self.frame.vertices += target.batch.vertex_count() as u32;
            self.frame.indices += target.batch.index_count() as u32;
            if target.draw(view_projection) {
                self.frame.draw_calls += 1;
            }
        }

        self.last_frame = self.frame;
    }

    /// Counters of the last `end_frame`
    pub fn stats(&self) -> RenderStats {
        self.last_frame
    }

    /// Shapes accumulated for the dynamic batch this frame
    pub fn dynamic_batch(&self) -> &Batch {
        &self.dynamic.batch
    }

    /// Shapes accumulated for the static batch this frame
    pub fn static_batch(&self) -> &Batch {
        &self.statics.batch
    }

    /// Backend the batches draw through
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Release the batch objects
    pub fn destroy(&mut self) {
        if self.destroyed {
            programmer_error(format_args!("Renderer2D destroyed twice"));
            return;
        }
        for target in [&mut self.dynamic, &mut self.statics] {
            if target.object.is_valid() {
                target.object.destroy();
            }
            target.uploaded = None;
        }
        self.destroyed = true;
        log::debug!("2D batch renderer destroyed");
    }

    fn view_projection(&mut self) -> Mat4 {
        let Some(camera) = &self.camera else {
            return Mat4::IDENTITY;
        };
        match camera.upgrade() {
            Some(camera) => camera.borrow().view_projection_matrix(),
            None => {
                if !self.warned_expired_camera {
                    log::warn!("Camera was dropped, drawing with an identity view-projection");
                    self.warned_expired_camera = true;
                }
                Mat4::IDENTITY
            }
        }
    }

    fn check_alive(&self, operation: &str) -> bool {
        if self.destroyed {
            programmer_error(format_args!("{operation} called on a destroyed Renderer2D"));
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec2;

    use super::*;
    use crate::renderer::backend::GraphicsBackend;
    use crate::renderer::headless::HeadlessBackend;
    use crate::shapes::QUAD_INDICES;

    fn setup() -> (Rc<HeadlessBackend>, SharedBackend, Renderer2D) {
        let headless = Rc::new(HeadlessBackend::new());
        let shared: SharedBackend = headless.clone();
        let renderer = Renderer2D::new(shared.clone());
        (headless, shared, renderer)
    }

    #[test]
    fn test_batch_indices_stay_inside_their_batch() {
        let (headless, shared, mut renderer) = setup();
        let rect = Shape::rectangle(&shared, 2.0, 1.0, Placement::Dynamic);
        let circle = Shape::circle(&shared, 1.0, 8, Placement::Dynamic);
        let background = Shape::rectangle(&shared, 10.0, 10.0, Placement::Static);

        headless.acquire_frame();
        renderer.begin_frame();
        renderer.submit(&rect);
        renderer.submit(&circle);
        renderer.submit(&background);

        let dynamic = renderer.dynamic_batch();
        assert_eq!(dynamic.vertex_count(), 4 + 10);
        assert_eq!(dynamic.index_count(), 6 + 8 * 3);
        assert_eq!(&dynamic.indices()[..6], &QUAD_INDICES);
        assert!(dynamic.indices()[6..].iter().all(|&i| (4..14).contains(&i)));
        assert_eq!(renderer.static_batch().indices(), &QUAD_INDICES);

        renderer.end_frame();
        let draws = headless.draws();
        assert_eq!(draws.len(), 2);
        assert!(draws.iter().all(|d| d.indexed && d.mode == DrawMode::TriangleList));
        assert_eq!(draws[0].count, 6);
        assert_eq!(draws[1].count, 30);
        for draw in &draws {
            let vertex_count = draw.vertices::<Vertex2D>().len() as u32;
            assert!(draw.indices.as_ref().unwrap().iter().all(|&i| i < vertex_count));
        }
    }

    #[test]
    fn test_shape_color_is_baked_and_uniform_is_white() {
        let (headless, shared, mut renderer) = setup();
        let mut tri = Shape::triangle(&shared, [Vec2::ZERO, Vec2::X, Vec2::Y], Placement::Dynamic);
        let green = Vec4::new(0.0, 1.0, 0.0, 1.0);
        tri.set_color(green);

        renderer.begin_frame();
        renderer.submit(&tri);
        renderer.end_frame();

        let draw = &headless.draws()[0];
        assert!(draw
            .vertices::<Vertex2D>()
            .iter()
            .all(|v| v.color == green.to_array()));
        assert_eq!(draw.uniform(COLOR_UNIFORM), Some(UniformValue::Vec4(Vec4::ONE)));
    }

    #[test]
    fn test_camera_view_projection_is_used() {
        let (headless, shared, mut renderer) = setup();
        let camera = Shared::new(Camera2D::new(200.0, 100.0));
        camera.borrow_mut().set_position(Vec2::new(10.0, 5.0));
        renderer.set_camera(&camera);
        let rect = Shape::rectangle(&shared, 1.0, 1.0, Placement::Dynamic);

        renderer.begin_frame();
        renderer.submit(&rect);
        renderer.end_frame();

        let expected = camera.borrow().view_projection_matrix();
        assert_eq!(
            headless.draws()[0].uniform(VIEW_PROJECTION_UNIFORM),
            Some(UniformValue::Mat4(expected))
        );
    }

    #[test]
    fn test_expired_camera_falls_back_to_identity() {
        let (headless, shared, mut renderer) = setup();
        let rect = Shape::rectangle(&shared, 1.0, 1.0, Placement::Dynamic);
        {
            let camera = Shared::new(Camera2D::new(200.0, 100.0));
            renderer.set_camera(&camera);
            assert!(renderer.has_camera());
        }
        assert!(!renderer.has_camera());

        for _ in 0..2 {
            headless.acquire_frame();
            renderer.begin_frame();
            renderer.submit(&rect);
            renderer.end_frame();
            assert_eq!(
                headless.draws()[0].uniform(VIEW_PROJECTION_UNIFORM),
                Some(UniformValue::Mat4(Mat4::IDENTITY))
            );
        }
    }

    #[test]
    fn test_unchanged_static_batch_is_not_reuploaded() {
        let (headless, shared, mut renderer) = setup();
        let mut background = Shape::rectangle(&shared, 10.0, 10.0, Placement::Static);
        let player = Shape::circle(&shared, 1.0, 6, Placement::Dynamic);

        let frame = |renderer: &mut Renderer2D, shapes: &[&Shape]| {
            renderer.begin_frame();
            for shape in shapes {
                renderer.submit(shape);
            }
            renderer.end_frame();
        };

        frame(&mut renderer, &[&background, &player]);
        assert!(!renderer.stats().static_upload_skipped);
        let static_buffer = renderer.statics.object.vertex_buffer().unwrap();
        let dynamic_buffer = renderer.dynamic.object.vertex_buffer().unwrap();
        let static_writes = headless.buffer_write_count(static_buffer);
        let dynamic_writes = headless.buffer_write_count(dynamic_buffer);

        frame(&mut renderer, &[&background, &player]);
        assert!(renderer.stats().static_upload_skipped);
        assert_eq!(headless.buffer_write_count(static_buffer), static_writes);
        // The dynamic batch goes up every frame
        assert_eq!(
            headless.buffer_write_count(dynamic_buffer),
            dynamic_writes.map(|w| w + 1)
        );

        background.set_position(Vec2::new(1.0, 0.0));
        frame(&mut renderer, &[&background, &player]);
        assert!(!renderer.stats().static_upload_skipped);
        assert_eq!(
            headless.buffer_write_count(static_buffer),
            static_writes.map(|w| w + 1)
        );
    }

    #[test]
    fn test_stats_and_empty_frames() {
        let (headless, shared, mut renderer) = setup();
        let rect = Shape::rectangle(&shared, 1.0, 1.0, Placement::Dynamic);

        renderer.begin_frame();
        renderer.end_frame();
        assert_eq!(renderer.stats(), RenderStats::default());
        assert!(headless.draws().is_empty());

        renderer.begin_frame();
        renderer.submit(&rect);
        renderer.submit(&rect);
        renderer.end_frame();
        let stats = renderer.stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.shapes, 2);
        assert_eq!(stats.vertices, 8);
        assert_eq!(stats.indices, 12);
    }

    #[test]
    fn test_degenerate_polygon_is_not_counted() {
        let (headless, shared, mut renderer) = setup();
        let sliver = Shape::convex_polygon(&shared, &[Vec2::ZERO, Vec2::X], Placement::Dynamic);

        renderer.begin_frame();
        renderer.submit(&sliver);
        renderer.end_frame();

        assert_eq!(renderer.stats(), RenderStats::default());
        assert!(renderer.dynamic_batch().is_empty());
        assert!(headless.draws().is_empty());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "destroyed"))]
    fn test_submitting_destroyed_shape_is_a_programmer_error() {
        let (_headless, shared, mut renderer) = setup();
        let mut rect = Shape::rectangle(&shared, 1.0, 1.0, Placement::Dynamic);
        rect.destroy();
        renderer.begin_frame();
        renderer.submit(&rect);
        assert!(renderer.dynamic_batch().is_empty());
    }

    #[test]
    fn test_destroy_releases_batch_objects() {
        let (headless, _shared, mut renderer) = setup();
        assert_eq!(headless.live_shaders(), 2);
        renderer.destroy();
        assert_eq!(headless.live_shaders(), 0);
        assert_eq!(headless.live_buffers(), 0);
    }
}
