//! Atmospheric scattering visualizer - main entry point.
//!
//! Ray-marches Rayleigh and Mie scattering in a compute shader and
//! composites a small HUD on top of the result.

mod controls;
mod hud;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use skyscatter_core::{AppConfig, FrameRateCounter, QuitFlag, Timer};
use skyscatter_platform::{InputState, Window};
use skyscatter_renderer::{FrameOutcome, FramePayloads, Renderer};
use skyscatter_scene::{RenderSettings, Simulation};

use crate::controls::Controls;
use crate::hud::Hud;

struct App {
    config: AppConfig,
    // Dropped before the window: the renderer owns the window's surface.
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    controls: Controls,
    simulation: Simulation,
    hud: Hud,
    timer: Timer,
    frame_rate: FrameRateCounter,
    quit: QuitFlag,
    /// First fatal error; returned from `main` once the loop exits.
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let settings = RenderSettings {
            samples_in: config.simulation.samples_in.max(1) as u32,
            samples_out: config.simulation.samples_out.max(1) as u32,
            camera_speed: config.simulation.camera_speed,
            ..RenderSettings::default()
        };

        let hud = Hud::new(config.overlay.font_size);

        Self {
            config,
            renderer: None,
            window: None,
            input: InputState::new(),
            controls: Controls::new(),
            simulation: Simulation::new(settings),
            hud,
            timer: Timer::new(),
            frame_rate: FrameRateCounter::default(),
            quit: QuitFlag::new(),
            fatal: None,
        }
    }

    /// Logs `error`, keeps it if it is the first, and asks the loop to stop.
    fn fail(&mut self, error: anyhow::Error) {
        error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        self.quit.request();
    }

    fn redraw(&mut self) {
        let elapsed = self.timer.tick();
        let dt = elapsed.as_secs_f32();

        self.controls.set_ui_has_keyboard(self.hud.wants_keyboard());
        let frame = self.controls.apply(&self.input, &mut self.simulation.settings);
        if let (Some(captured), Some(window)) = (frame.cursor_captured, self.window.as_ref()) {
            window.set_cursor_captured(captured);
        }
        if let Some((dx, dy)) = frame.look {
            self.simulation.camera.look(dx, dy);
        }
        self.simulation.step(dt, &frame.motion);
        self.input.end_frame();

        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };
        renderer.set_minimized(window.is_minimized());

        let overlay = self
            .hud
            .frame(window, elapsed, &self.controls, &mut self.simulation);
        let camera = self.simulation.camera_uniform();
        let atmosphere = self.simulation.atmosphere_uniform();
        let payloads = FramePayloads {
            camera: bytemuck::bytes_of(&camera),
            atmosphere: bytemuck::bytes_of(&atmosphere),
        };

        match renderer.render_frame(&payloads, overlay) {
            Ok(FrameOutcome::Presented { .. }) => {
                if let Some(fps) = self.frame_rate.frame() {
                    debug!("{:.1} fps", fps);
                }
            }
            Ok(FrameOutcome::Dropped) => warn!("Frame dropped, surface out of date"),
            Ok(FrameOutcome::Skipped) => {}
            Err(e) => self.fail(anyhow::Error::new(e).context("Fatal render error")),
        }
    }

    fn shutdown(&mut self) {
        info!(
            "Shutting down after {:.1}s, scattering recomputed {} time(s)",
            self.timer.elapsed().as_secs_f32(),
            self.simulation.scattering_recomputations()
        );
        // Renderer teardown waits for the device to go idle.
        self.renderer = None;
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_config = &self.config.window;
        let window = match Window::new(
            event_loop,
            window_config.width,
            window_config.height,
            &window_config.title,
        ) {
            Ok(window) => window,
            Err(e) => {
                self.fail(anyhow::Error::new(e).context("Failed to create window"));
                event_loop.exit();
                return;
            }
        };
        self.hud.attach(&window);

        match Renderer::new(&window, &self.config, self.hud.fonts()) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                window.set_cursor_captured(true);
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                self.fail(anyhow::Error::new(e).context("Failed to create renderer"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if let Some(window) = self.window.as_ref() {
            self.hud.handle_event(window, id, &event);
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.quit.request();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::Occluded(occluded) => {
                if let Some(window) = self.window.as_mut() {
                    window.set_occluded(occluded);
                }
            }
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_mouse_motion(dx, dy);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.quit.is_requested() {
            self.shutdown();
            event_loop.exit();
            return;
        }
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    skyscatter_core::init_logging();
    info!("Starting atmospheric scattering visualizer");

    let config = AppConfig::load()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
