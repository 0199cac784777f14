//! Engine entry point, game callbacks and the per-frame loop.
//!
//! A game implements [`GameInterface`] and hands it to [`Engine::run`],
//! which opens a window from the [`GamePreferences`] and drives the loop:
//!
//! ```text
//!   start ─▶ ┌─ poll events ─▶ input ─▶ n × (update + scene.update) ─┐
//!            │                                                       │
//!            └──── present ◀── game.render ◀── scene.render ◀────────┘
//!                                       ... until ctx.stop() or close
//!   end ─▶ scene.destroy(true) ─▶ release assets
//! ```
//!
//! `n` comes from the [`FrameClock`]'s fixed-step accumulator.
//! [`Engine::run_headless`] runs the same loop against a
//! [`HeadlessBackend`](crate::render::HeadlessBackend) without a window.

mod window;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::asset::{AssetError, Assets};
use crate::input::{CursorPosition, InputState};
use crate::math::Vec2;
use crate::prefs::GamePreferences;
use crate::render::{Camera, CommandLog, RenderError, Renderer};
use crate::scene::Scene;
use crate::time::{FrameClock, Time};

#[cfg(feature = "audio")]
use crate::audio::{Audio, AudioError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[cfg(feature = "audio")]
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Engine settings that are not user preferences.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub title: String,
    pub target_fps: u32,
    pub target_ups: u32,
    pub clear_color: [f64; 4],
    /// World units visible on screen.
    pub camera_size: Vec2,
    /// Loaded with [`Assets::load_dir`] before `start`.
    pub asset_dir: Option<PathBuf>,
    /// Write the window geometry back to `prefs_path` on exit.
    pub auto_save_prefs: bool,
    pub prefs_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "tessera".to_string(),
            target_fps: 60,
            target_ups: 60,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            camera_size: Camera::DEFAULT_SIZE,
            asset_dir: None,
            auto_save_prefs: false,
            prefs_path: PathBuf::from(GamePreferences::DEFAULT_PATH),
        }
    }
}

/// Everything a game touches, passed to every [`GameInterface`] callback.
pub struct Context {
    pub scene: Scene,
    pub assets: Assets,
    pub renderer: Renderer,
    pub input: InputState,
    /// Cursor in window pixels.
    pub cursor: CursorPosition,
    pub time: Time,
    pub clock: FrameClock,
    pub prefs: GamePreferences,
    /// Opened by [`Engine::run`]; `None` in headless contexts.
    #[cfg(feature = "audio")]
    pub audio: Option<Audio>,
    running: bool,
    window_size: (u32, u32),
}

impl Context {
    /// Build a context around `renderer` and compile the default shader.
    pub fn new(
        mut renderer: Renderer,
        prefs: GamePreferences,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut assets = Assets::new();
        assets.ensure_default_shader(&mut renderer)?;
        if let Some(dir) = &config.asset_dir {
            assets.load_dir(&mut renderer, dir)?;
        }
        renderer.set_clear_color(config.clear_color);
        let window_size = (prefs.width, prefs.height);
        Ok(Self {
            scene: Scene::new(Camera::new(config.camera_size)),
            assets,
            renderer,
            input: InputState::new(),
            cursor: CursorPosition::default(),
            time: Time::new(),
            clock: FrameClock::new(config.target_fps, config.target_ups),
            prefs,
            #[cfg(feature = "audio")]
            audio: None,
            running: true,
            window_size,
        })
    }

    /// A context over a [`HeadlessBackend`](crate::render::HeadlessBackend).
    pub fn headless(config: &EngineConfig) -> Result<(Self, CommandLog), EngineError> {
        let (renderer, log) = Renderer::headless();
        let ctx = Self::new(renderer, GamePreferences::default(), config)?;
        Ok((ctx, log))
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Leave the loop after the current frame.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Inner window size in physical pixels.
    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    /// The cursor in world coordinates.
    pub fn cursor_world(&self) -> Vec2 {
        let (w, h) = self.window_size;
        self.scene.camera().screen_to_world(
            Vec2::new(self.cursor.x, self.cursor.y),
            Vec2::new(w as f32, h as f32),
        )
    }

    /// Duration of one fixed update.
    pub fn update_step(&self) -> Duration {
        self.clock.update_step()
    }

    fn shutdown(&mut self) {
        self.scene.destroy(true, &mut self.renderer, &mut self.assets);
        self.assets.destroy(&mut self.renderer);
    }
}

/// Game callbacks. Every method has an empty default.
pub trait GameInterface {
    /// Once, after the context exists and before the first frame.
    fn start(&mut self, _ctx: &mut Context) {}

    /// Once per frame, after window events have been applied.
    fn input(&mut self, _ctx: &mut Context, _delta: Duration) {}

    /// Once per fixed step, before the scene integrates velocities.
    fn update(&mut self, _ctx: &mut Context, _step: Duration) {}

    /// Once per frame, after the scene has drawn.
    fn render(&mut self, _ctx: &mut Context, _delta: Duration) {}

    /// Once, before the scene and assets are released.
    fn end(&mut self, _ctx: &mut Context) {}
}

/// One iteration of the loop: input, fixed updates, render.
pub fn tick(ctx: &mut Context, game: &mut impl GameInterface, delta: Duration) -> Result<(), EngineError> {
    game.input(ctx, delta);

    let steps = ctx.clock.advance(delta);
    let step = ctx.clock.update_step();
    for _ in 0..steps {
        game.update(ctx, step);
        ctx.scene.update(step);
    }

    ctx.renderer.begin_frame();
    ctx.scene.render(delta, &mut ctx.renderer, &mut ctx.assets);
    game.render(ctx, delta);
    let result = ctx.renderer.end_frame();
    ctx.input.end_frame();
    result?;
    Ok(())
}

pub struct Engine {
    prefs: GamePreferences,
    config: EngineConfig,
}

impl Engine {
    pub fn new(prefs: GamePreferences, config: EngineConfig) -> Self {
        Self { prefs, config }
    }

    pub fn prefs(&self) -> &GamePreferences {
        &self.prefs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Open the window and run `game` until it stops or the window closes.
    pub fn run(self, game: impl GameInterface) -> Result<(), EngineError> {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init()
            .ok();

        let event_loop = winit::event_loop::EventLoop::new()?;
        let mut app = window::EngineApp::new(self.prefs, self.config, game);
        event_loop.run_app(&mut app)?;
        app.into_result()
    }

    /// Run `frames` frames of `delta` each without a window. Returns early
    /// if the game stops the context.
    pub fn run_headless(
        ctx: &mut Context,
        game: &mut impl GameInterface,
        frames: u32,
        delta: Duration,
    ) -> Result<(), EngineError> {
        game.start(ctx);
        for _ in 0..frames {
            if !ctx.is_running() {
                break;
            }
            ctx.time.advance(delta);
            tick(ctx, game, delta)?;
        }
        game.end(ctx);
        ctx.shutdown();
        Ok(())
    }
}
