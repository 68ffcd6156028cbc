//! Example game demonstrating engine features

use std::f32::consts::TAU;

use flatshape::prelude::*;

/// Config file read at startup if present
const CONFIG_PATH: &str = "flatshape.ron";

/// Half the number of grid lines along each axis
const GRID_HALF_LINES: i32 = 10;
const GRID_SPACING: f32 = 80.0;

/// Demo with a static grid, animated shapes and a pan/zoom camera
struct DemoGame {
    controller: PanZoomController,
    grid: Vec<Shape>,
    spinner: Option<Shape>,
    pulse: Option<Shape>,
    orbiters: Vec<Shape>,
    pointer: Option<Shape>,
    hexagon: Option<Shape>,
    /// Drawn on its own instead of through the batch renderer
    marker: Option<Shape>,
}

impl DemoGame {
    fn new() -> Self {
        Self {
            controller: PanZoomController::new(),
            grid: Vec::new(),
            spinner: None,
            pulse: None,
            orbiters: Vec::new(),
            pointer: None,
            hexagon: None,
            marker: None,
        }
    }

    fn shapes_mut(&mut self) -> impl Iterator<Item = &mut Shape> {
        self.grid
            .iter_mut()
            .chain(self.orbiters.iter_mut())
            .chain(self.spinner.iter_mut())
            .chain(self.pulse.iter_mut())
            .chain(self.pointer.iter_mut())
            .chain(self.hexagon.iter_mut())
            .chain(self.marker.iter_mut())
    }
}

impl Game for DemoGame {
    fn init(&mut self, ctx: &mut EngineContext) {
        log::info!("Initializing demo game");
        let backend = ctx.backend();

        // Background grid never moves
        let extent = GRID_HALF_LINES as f32 * GRID_SPACING;
        for i in -GRID_HALF_LINES..=GRID_HALF_LINES {
            let offset = i as f32 * GRID_SPACING;
            let thickness = if i == 0 { 3.0 } else { 1.0 };
            let color = if i == 0 {
                Vec4::new(0.5, 0.5, 0.6, 1.0)
            } else {
                Vec4::new(0.25, 0.25, 0.3, 1.0)
            };
            for (start, end) in [
                (Vec2::new(-extent, offset), Vec2::new(extent, offset)),
                (Vec2::new(offset, -extent), Vec2::new(offset, extent)),
            ] {
                let mut line = Shape::thick_line(&backend, start, end, thickness, Placement::Static);
                line.set_color(color);
                self.grid.push(line);
            }
        }

        let mut spinner = Shape::rectangle(&backend, 160.0, 90.0, Placement::Dynamic);
        spinner.set_color(Vec4::new(0.9, 0.35, 0.3, 1.0));
        spinner.set_position(Vec2::new(-240.0, 120.0));
        self.spinner = Some(spinner);

        let mut pulse = Shape::circle(&backend, 60.0, 48, Placement::Dynamic);
        pulse.set_color(Vec4::new(0.3, 0.7, 0.95, 1.0));
        pulse.set_position(Vec2::new(240.0, 120.0));
        self.pulse = Some(pulse);

        for i in 0..6 {
            let mut orbiter = Shape::fixed_circle::<24>(&backend, 18.0, Placement::Dynamic);
            let hue = i as f32 / 6.0;
            orbiter.set_color(Vec4::new(0.5 + 0.5 * hue, 0.9 - 0.5 * hue, 0.4, 1.0));
            self.orbiters.push(orbiter);
        }

        let mut pointer = Shape::triangle(
            &backend,
            [Vec2::new(0.0, 40.0), Vec2::new(-25.0, -20.0), Vec2::new(25.0, -20.0)],
            Placement::Dynamic,
        );
        pointer.set_color(Vec4::new(0.95, 0.85, 0.3, 1.0));
        self.pointer = Some(pointer);

        let hexagon_vertices: Vec<Vec2> = (0..6)
            .map(|i| Vec2::from_angle(i as f32 * TAU / 6.0) * 70.0)
            .collect();
        let mut hexagon = Shape::convex_polygon(&backend, &hexagon_vertices, Placement::Dynamic);
        hexagon.set_color(Vec4::new(0.55, 0.4, 0.85, 1.0));
        hexagon.set_position(Vec2::new(0.0, -200.0));
        self.hexagon = Some(hexagon);

        let mut marker = Shape::rectangle(&backend, 12.0, 12.0, Placement::Dynamic);
        marker.set_color(Vec4::new(1.0, 1.0, 1.0, 0.8));
        self.marker = Some(marker);

        log::info!(
            "Created {} grid lines and {} animated shapes",
            self.grid.len(),
            self.orbiters.len() + 4
        );
    }

    fn update(&mut self, ctx: &mut EngineContext) {
        let dt = ctx.time.delta_secs();
        let t = ctx.time.elapsed().as_secs_f32();

        if ctx.input.is_key_pressed(KeyCode::Escape) {
            ctx.quit();
            return;
        }

        self.controller
            .update(&ctx.input, &mut ctx.camera().borrow_mut(), dt);

        if ctx.input.is_key_just_pressed(KeyCode::KeyR) {
            let mut camera = ctx.camera().borrow_mut();
            camera.set_position(Vec2::ZERO);
            camera.set_zoom(1.0);
        }

        if let Some(spinner) = &mut self.spinner {
            spinner.set_rotation(spinner.rotation() + dt);
        }

        if let Some(pulse) = &mut self.pulse {
            pulse.set_radius(60.0 + 20.0 * (t * 2.0).sin());
        }

        let count = self.orbiters.len() as f32;
        for (i, orbiter) in self.orbiters.iter_mut().enumerate() {
            let angle = t * 0.8 + i as f32 * TAU / count;
            orbiter.set_position(Vec2::new(240.0, 120.0) + Vec2::from_angle(angle) * 130.0);
        }

        let cursor = ctx.camera().borrow().screen_to_world(ctx.input.mouse_position());
        if let Some(pointer) = &mut self.pointer {
            let to_cursor = cursor - pointer.position();
            if to_cursor.length_squared() > 1.0 {
                pointer.set_rotation(to_cursor.to_angle() - TAU / 4.0);
            }
        }

        if let Some(hexagon) = &mut self.hexagon {
            hexagon.set_scale(Vec2::splat(1.0 + 0.15 * (t * 1.5).sin()));
        }

        if let Some(marker) = &mut self.marker {
            marker.set_position(cursor - Vec2::splat(6.0));
        }
    }

    fn render(&mut self, ctx: &mut EngineContext) {
        let renderer = ctx.renderer_mut();
        for shape in self
            .grid
            .iter()
            .chain(self.orbiters.iter())
            .chain(self.spinner.iter())
            .chain(self.pulse.iter())
            .chain(self.pointer.iter())
            .chain(self.hexagon.iter())
        {
            renderer.submit(shape);
        }
    }

    fn render_overlay(&mut self, ctx: &mut EngineContext) {
        if let Some(marker) = &self.marker {
            marker.render(&ctx.camera().borrow());
        }
    }

    fn shutdown(&mut self, ctx: &mut EngineContext) {
        let stats = ctx.renderer().stats();
        log::info!(
            "Shutting down after {} frames (last frame: {} draw calls, {} shapes)",
            ctx.time.frame_count(),
            stats.draw_calls,
            stats.shapes
        );
        for shape in self.shapes_mut() {
            shape.destroy();
        }
    }
}

fn main() {
    let config = match EngineConfig::from_ron_file(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            if std::path::Path::new(CONFIG_PATH).exists() {
                eprintln!("Ignoring {CONFIG_PATH}: {e}");
            }
            EngineConfig::default()
                .with_title("Flatshape Demo")
                .with_size(1280, 720)
                .with_vsync(true)
        }
    };

    let game = DemoGame::new();
    let engine = Engine::new(config, game);

    if let Err(e) = engine.run() {
        eprintln!("Engine error: {}", e);
    }
}
