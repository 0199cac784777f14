//! Window management via winit.
//!
//! Implements [`ApplicationHandler`] to drive the event loop: the window,
//! GPU backend and [`Context`] are created on the first `resumed`, window
//! events feed [`InputState`](crate::input::InputState), and frames are
//! paced to the clock's target FPS with `ControlFlow::WaitUntil`.

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::PhysicalKey;
use winit::window::{Fullscreen, Window, WindowId};

use super::{Context, EngineConfig, EngineError, GameInterface, tick};
use crate::math::Vec2;
use crate::prefs::GamePreferences;
use crate::render::{RenderError, Renderer, WgpuBackend};

/// Pixel scroll deltas are reported in lines of this height.
const PIXELS_PER_LINE: f32 = 20.0;

/// The application state that winit drives.
pub(crate) struct EngineApp<G: GameInterface> {
    prefs: GamePreferences,
    config: EngineConfig,
    game: G,
    ctx: Option<Context>,
    window: Option<Arc<Window>>,
    last_frame: Instant,
    minimized: bool,
    error: Option<EngineError>,
}

impl<G: GameInterface> EngineApp<G> {
    pub fn new(prefs: GamePreferences, config: EngineConfig, game: G) -> Self {
        Self {
            prefs,
            config,
            game,
            ctx: None,
            window: None,
            last_frame: Instant::now(),
            minimized: false,
            error: None,
        }
    }

    /// The fatal error that ended the loop, if any.
    pub fn into_result(self) -> Result<(), EngineError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: EngineError) {
        log::error!("{error}");
        self.error = Some(error);
        if let Some(ctx) = self.ctx.as_mut() {
            ctx.stop();
        }
        event_loop.exit();
    }

    fn create(&mut self, event_loop: &ActiveEventLoop) -> Result<(), EngineError> {
        let prefs = self.prefs;
        let mut attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(prefs.width, prefs.height));
        if prefs.has_position() {
            attrs = attrs.with_position(PhysicalPosition::new(prefs.x, prefs.y));
        }
        if prefs.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs)?);

        let backend = WgpuBackend::new(window.clone(), prefs.vsync)?;
        let mut ctx = Context::new(Renderer::new(Box::new(backend)), prefs, &self.config)?;
        let size = window.inner_size();
        ctx.window_size = (size.width, size.height);
        #[cfg(feature = "audio")]
        {
            ctx.audio = Some(crate::audio::Audio::new()?);
        }

        self.game.start(&mut ctx);
        self.ctx = Some(ctx);
        self.window = Some(window);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn frame(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };
        let now = Instant::now();
        let delta = now - self.last_frame;
        self.last_frame = now;
        ctx.time.update();
        if self.minimized {
            return;
        }
        match tick(ctx, &mut self.game, delta) {
            Ok(()) => {}
            Err(e @ EngineError::Render(RenderError::Surface(wgpu::SurfaceError::OutOfMemory))) => {
                self.fail(event_loop, e);
            }
            Err(e) => log::warn!("Frame failed: {e}"),
        }
    }

    fn save_prefs(&mut self) {
        let (Some(window), Some(ctx)) = (&self.window, self.ctx.as_mut()) else {
            return;
        };
        let size = window.inner_size();
        ctx.prefs.width = size.width;
        ctx.prefs.height = size.height;
        ctx.prefs.fullscreen = window.fullscreen().is_some();
        if let Ok(position) = window.outer_position() {
            ctx.prefs.x = position.x;
            ctx.prefs.y = position.y;
        }
        if let Some(hz) = window
            .current_monitor()
            .and_then(|m| m.refresh_rate_millihertz())
        {
            ctx.prefs.refresh_rate = hz / 1000;
        }
        if let Err(e) = ctx.prefs.save(&self.config.prefs_path) {
            log::warn!("Failed to save preferences: {e}");
        }
    }
}

impl<G: GameInterface> ApplicationHandler for EngineApp<G> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create(event_loop) {
            self.fail(event_loop, e);
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if matches!(event, WindowEvent::RedrawRequested) {
            self.frame(event_loop);
            return;
        }
        let Some(ctx) = self.ctx.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Window close requested, exiting.");
                ctx.stop();
            }

            WindowEvent::Resized(size) => {
                self.minimized = size.width == 0 || size.height == 0;
                if !self.minimized {
                    ctx.renderer.resize(size.width, size.height);
                    ctx.window_size = (size.width, size.height);
                }
            }

            WindowEvent::Focused(false) => ctx.input.release_all(),

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key_code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => ctx.input.keys.press(key_code),
                        ElementState::Released => ctx.input.keys.release(key_code),
                    }
                }
            }

            WindowEvent::MouseInput { button, state, .. } => match state {
                ElementState::Pressed => ctx.input.mouse.press(button),
                ElementState::Released => ctx.input.mouse.release(button),
            },

            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(x, y),
                    MouseScrollDelta::PixelDelta(p) => {
                        Vec2::new(p.x as f32, p.y as f32) / PIXELS_PER_LINE
                    }
                };
                ctx.input.add_scroll(lines);
            }

            WindowEvent::CursorMoved { position, .. } => {
                ctx.cursor.x = position.x as f32;
                ctx.cursor.y = position.y as f32;
            }

            _ => {}
        }

        if !ctx.is_running() {
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };
        if !ctx.is_running() {
            event_loop.exit();
            return;
        }
        let next = self.last_frame + ctx.clock.frame_interval();
        if Instant::now() >= next {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
            event_loop.set_control_flow(ControlFlow::Wait);
        } else {
            event_loop.set_control_flow(ControlFlow::WaitUntil(next));
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if self.config.auto_save_prefs {
            self.save_prefs();
        }
        if let Some(ctx) = self.ctx.as_mut() {
            self.game.end(ctx);
            ctx.shutdown();
        }
        self.window = None;
        log::info!("Engine shut down");
    }
}
