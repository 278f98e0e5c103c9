//! Tessellated planet viewer.
//!
//! W/S/A/D move forward/back/left/right, E/Q move up/down, dragging with the
//! left mouse button turns the camera and keys 1 to 4 select the solid,
//! wireframe, flat and preview draw modes. Escape quits.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use terrain_core::FrameTimer;
use terrain_platform::{InputState, KeyCode, MouseButton, Window};
use terrain_renderer::{Renderer, RendererConfig};
use terrain_scene::InputDirections;

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;
const WINDOW_TITLE: &str = "Terrain";

/// Samples the held keys into one tick of directional and mode flags.
fn sample_directions(input: &InputState) -> InputDirections {
    InputDirections {
        front: input.is_key_pressed(KeyCode::KeyW),
        back: input.is_key_pressed(KeyCode::KeyS),
        left: input.is_key_pressed(KeyCode::KeyA),
        right: input.is_key_pressed(KeyCode::KeyD),
        up: input.is_key_pressed(KeyCode::KeyE),
        down: input.is_key_pressed(KeyCode::KeyQ),
        mode1: input.is_key_pressed(KeyCode::Digit1),
        mode2: input.is_key_pressed(KeyCode::Digit2),
        mode3: input.is_key_pressed(KeyCode::Digit3),
        mode4: input.is_key_pressed(KeyCode::Digit4),
    }
}

struct App {
    config: RendererConfig,
    renderer: Option<Renderer>,
    window: Option<Window>,
    input: InputState,
    timer: FrameTimer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            input: InputState::new(MouseButton::Left),
            timer: FrameTimer::new(),
        }
    }

    /// Applies this tick's input and draws one frame.
    fn tick(&mut self, event_loop: &ActiveEventLoop) {
        let delta_time = self.timer.tick();

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        renderer.handle_directional_input(&sample_directions(&self.input), delta_time);
        let (dx, dy) = self.input.take_drag_delta();
        if dx != 0 || dy != 0 {
            renderer.handle_mouse_input(dx, dy);
        }

        if self.window.as_ref().is_some_and(Window::is_minimized) {
            return;
        }

        if let Err(e) = renderer.draw_frame() {
            error!("Frame failed, stopping: {}", e);
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match Renderer::initialize(&window, self.config.clone()) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to initialize renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.input.clear(),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };
                if key == KeyCode::Escape && event.state.is_pressed() {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                } else if event.state.is_pressed() {
                    self.input.on_key_pressed(key);
                } else {
                    self.input.on_key_released(key);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            WindowEvent::RedrawRequested => self.tick(event_loop),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.input.on_mouse_motion(dx, dy);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.as_ref()
            && let Err(e) = renderer.wait_idle()
        {
            error!("Failed to drain GPU work on exit: {}", e);
        }
        // Renderer goes before the window its surface was created from.
        self.renderer = None;
        self.window = None;
    }
}

fn main() -> Result<()> {
    terrain_core::init_logging();
    info!("Starting terrain viewer");

    let config = RendererConfig::default();
    config.validate()?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
