//! helio - entry point.
//!
//! Drives the winit event loop, routes window and input events into the
//! render state, and requests a redraw every iteration.

mod app;
mod cube;

use anyhow::Result;
use tracing::{debug, error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use helio_core::Timer;
use helio_platform::{InputState, KeyCode, Window};

use crate::app::RenderState;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;

struct App {
    window: Option<Window>,
    state: Option<RenderState>,
    input: InputState,
    timer: Timer,
    last_logged_sec: u64,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            state: None,
            input: InputState::new(),
            timer: Timer::new(),
            last_logged_sec: 0,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, "helio") {
                Ok(window) => match RenderState::new(&window) {
                    Ok(state) => {
                        info!("Initialization complete, entering main loop");
                        self.state = Some(state);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        error!("Failed to initialize renderer: {:?}", e);
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
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
                if let Some(ref mut window) = self.window {
                    window.handle_resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let delta = self.timer.delta_secs();

                let sec = self.timer.elapsed().as_secs();
                if sec != self.last_logged_sec {
                    self.last_logged_sec = sec;
                    debug!("{:.0} fps", self.timer.smoothed_fps());
                }

                if let Some(ref mut state) = self.state {
                    state.update(&self.input, delta);
                    if let Err(e) = state.draw_frame(delta) {
                        error!("Render error: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.begin_frame();

        if let Some(ref mut window) = self.window {
            // Forward a pending resize notification to the renderer once
            if window.was_resized() {
                if let Some(ref mut state) = self.state {
                    state.handle_resize(window.width(), window.height());
                }
                window.reset_resized();
            }
            window.request_redraw();
        }
    }
}

/// Key that cycles between the standard and debug pipelines.
pub const PIPELINE_TOGGLE_KEY: KeyCode = KeyCode::Space;

fn main() -> Result<()> {
    helio_core::init_logging();
    info!("Starting helio");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
