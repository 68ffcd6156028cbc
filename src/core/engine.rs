//! Core Engine struct and main game loop

use std::rc::Rc;
use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::core::{EngineConfig, Time};
use crate::input::Input;
use crate::renderer::{Camera2D, GraphicsBackend, Renderer2D, Shared, SharedBackend, WgpuBackend};

/// Frames between periodic stats logs
const STATS_LOG_INTERVAL: u64 = 300;

/// Game trait that users implement
pub trait Game: 'static {
    /// Called once when the engine starts
    fn init(&mut self, engine: &mut EngineContext);

    /// Called every frame for game logic updates
    fn update(&mut self, engine: &mut EngineContext);

    /// Called every frame between `begin_frame` and `end_frame` of the batch
    /// renderer. Submit shapes here.
    fn render(&mut self, engine: &mut EngineContext);

    /// Called every frame after the batches are drawn. Shapes rendered
    /// directly here appear on top of the batched ones.
    fn render_overlay(&mut self, _engine: &mut EngineContext) {}

    /// Called when the window is resized
    fn on_resize(&mut self, _engine: &mut EngineContext, _width: u32, _height: u32) {}

    /// Called when the game is shutting down, before the renderer is released.
    /// Destroy shapes here.
    fn shutdown(&mut self, _engine: &mut EngineContext) {}
}

/// Context passed to game callbacks
pub struct EngineContext {
    /// Time tracking
    pub time: Time,
    /// Input state
    pub input: Input,
    /// GPU backend (available after initialization)
    backend: Option<Rc<WgpuBackend>>,
    /// Batch renderer (available after initialization)
    renderer: Option<Renderer2D>,
    /// Camera the batch renderer draws through, sized to the window
    camera: Shared<Camera2D>,
    /// Window size
    window_size: PhysicalSize<u32>,
    /// Should the engine quit
    should_quit: bool,
}

impl EngineContext {
    fn new(width: u32, height: u32) -> Self {
        Self {
            time: Time::new(),
            input: Input::new(),
            backend: None,
            renderer: None,
            camera: Shared::new(Camera2D::new(width as f32, height as f32)),
            window_size: PhysicalSize::new(width, height),
            should_quit: false,
        }
    }

    /// Backend to create shapes on
    pub fn backend(&self) -> SharedBackend {
        let backend = self.backend.as_ref().expect("Backend not initialized");
        Rc::clone(backend) as SharedBackend
    }

    /// Check if the backend is available
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Get the batch renderer
    pub fn renderer(&self) -> &Renderer2D {
        self.renderer.as_ref().expect("Renderer not initialized")
    }

    /// Get the batch renderer mutably
    pub fn renderer_mut(&mut self) -> &mut Renderer2D {
        self.renderer.as_mut().expect("Renderer not initialized")
    }

    /// Main camera
    pub fn camera(&self) -> &Shared<Camera2D> {
        &self.camera
    }

    /// Get window width
    pub fn width(&self) -> u32 {
        self.window_size.width
    }

    /// Get window height
    pub fn height(&self) -> u32 {
        self.window_size.height
    }

    /// Get aspect ratio
    pub fn aspect_ratio(&self) -> f32 {
        self.window_size.width as f32 / self.window_size.height.max(1) as f32
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Check if engine should quit
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }
}

/// Main engine struct
pub struct Engine<G: Game> {
    config: EngineConfig,
    game: G,
    context: EngineContext,
    window: Option<Arc<Window>>,
    initialized: bool,
}

impl<G: Game> Engine<G> {
    /// Create a new engine with the given game
    pub fn new(config: EngineConfig, game: G) -> Self {
        let context = EngineContext::new(config.width, config.height);
        Self {
            config,
            game,
            context,
            window: None,
            initialized: false,
        }
    }

    /// Run the engine
    pub fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        env_logger::init();
        log::info!("Starting engine: {}", self.config.title);

        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if self.initialized {
            self.game.shutdown(&mut self.context);
            if let Some(renderer) = &mut self.context.renderer {
                renderer.destroy();
            }
            self.context.renderer = None;
            self.initialized = false;
        }
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        self.context.time.update();

        self.game.update(&mut self.context);

        if self.context.should_quit() {
            self.shutdown(event_loop);
            return;
        }

        let Some(backend) = self.context.backend.clone() else {
            return;
        };
        if backend.acquire_frame() {
            draw_frame(&mut self.game, &mut self.context);
            backend.present_frame();
        }

        // Clear per-frame input state
        self.context.input.update();

        let frame = self.context.time.frame_count();
        if frame % STATS_LOG_INTERVAL == 0 {
            let stats = self.context.renderer().stats();
            log::debug!(
                "Frame {frame}: {:.1} fps, {} draw calls, {} shapes, {} vertices",
                self.context.time.fps(),
                stats.draw_calls,
                stats.shapes,
                stats.vertices,
            );
        }
    }
}

/// Batched shapes first, then the overlay
fn draw_frame<G: Game>(game: &mut G, context: &mut EngineContext) {
    context.renderer_mut().begin_frame();
    game.render(context);
    context.renderer_mut().end_frame();
    game.render_overlay(context);
}

impl<G: Game> ApplicationHandler for Engine<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .expect("Failed to create window"),
        );

        let backend = Rc::new(pollster::block_on(WgpuBackend::new(
            Arc::clone(&window),
            self.config.vsync,
        )));
        backend.set_render_state(self.config.renderer.render_state());
        backend.set_clear_color(self.config.renderer.clear_color);

        let (width, height) = backend.size();
        self.context.window_size = PhysicalSize::new(width, height);
        self.context
            .camera
            .borrow_mut()
            .set_size(width as f32, height as f32);

        let mut renderer = Renderer2D::new(Rc::clone(&backend) as SharedBackend);
        renderer.set_camera(&self.context.camera);

        self.context.backend = Some(backend);
        self.context.renderer = Some(renderer);
        self.window = Some(window);

        if !self.initialized {
            self.game.init(&mut self.context);
            self.initialized = true;
            log::info!("Engine initialized successfully");
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    self.context.window_size = new_size;
                    if let Some(backend) = &self.context.backend {
                        backend.resize(new_size.width, new_size.height);
                    }
                    self.context
                        .camera
                        .borrow_mut()
                        .set_size(new_size.width as f32, new_size.height as f32);
                    self.game
                        .on_resize(&mut self.context, new_size.width, new_size.height);
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let winit::keyboard::PhysicalKey::Code(key_code) = event.physical_key {
                    self.context.input.process_keyboard(key_code, event.state);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                self.context.input.process_mouse_button(button, state);
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.context
                    .input
                    .process_mouse_motion(glam::Vec2::new(position.x as f32, position.y as f32));
            }

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    winit::event::MouseScrollDelta::LineDelta(x, y) => glam::Vec2::new(x, y),
                    // Roughly one line per 40 pixels
                    winit::event::MouseScrollDelta::PixelDelta(pos) => {
                        glam::Vec2::new(pos.x as f32, pos.y as f32) / 40.0
                    }
                };
                self.context.input.process_scroll(scroll);
            }

            WindowEvent::RedrawRequested => {
                if !self.initialized {
                    return;
                }
                self.redraw(event_loop);

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::renderer::{DrawMode, HeadlessBackend};
    use crate::shapes::{Placement, Shape};

    struct Layered {
        background: Shape,
        marker: Shape,
    }

    impl Game for Layered {
        fn init(&mut self, _engine: &mut EngineContext) {}

        fn update(&mut self, _engine: &mut EngineContext) {}

        fn render(&mut self, engine: &mut EngineContext) {
            engine.renderer_mut().submit(&self.background);
        }

        fn render_overlay(&mut self, engine: &mut EngineContext) {
            self.marker.render(&engine.camera().borrow());
        }
    }

    #[test]
    fn test_overlay_is_drawn_after_batches() {
        let headless = Rc::new(HeadlessBackend::new());
        let shared: SharedBackend = headless.clone();
        let mut context = EngineContext::new(800, 600);
        let mut renderer = Renderer2D::new(shared.clone());
        renderer.set_camera(context.camera());
        context.renderer = Some(renderer);

        let mut game = Layered {
            background: Shape::rectangle(&shared, 100.0, 100.0, Placement::Static),
            marker: Shape::circle(&shared, 4.0, 12, Placement::Dynamic),
        };
        game.marker.set_position(Vec2::new(10.0, 10.0));

        headless.acquire_frame();
        draw_frame(&mut game, &mut context);

        let draws = headless.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].mode, DrawMode::TriangleList);
        assert_eq!(draws[1].mode, DrawMode::TriangleFan);
        assert_eq!(context.renderer().stats().shapes, 1);
    }
}
