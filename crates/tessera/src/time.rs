//! Frame timing and the fixed-step clock.
//!
//! [`Time`] is refreshed by the engine at the start of each frame. Games
//! read it for frame delta and total elapsed time.
//!
//! [`FrameClock`] decides how many fixed updates a frame owes:
//!
//! ```text
//!   frame delta ──▶ accumulator ──▶ n × update_step ──▶ leftover carried
//!                                      (n ≤ MAX_STEPS)
//! ```
//!
//! It also counts frames and updates over one-second windows to report FPS
//! and UPS.

use std::time::{Duration, Instant};

const SECOND: Duration = Duration::from_secs(1);

/// Frame timing resource. Owned by the engine context and updated each frame.
#[derive(Clone, Copy)]
pub struct Time {
    /// When the app started.
    startup: Instant,
    /// When the current frame started.
    frame_start: Instant,
    /// Duration of the previous frame.
    delta: Duration,
    /// Total time since app startup.
    elapsed: Duration,
    frame_count: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            startup: now,
            frame_start: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Call at the start of each frame to update timing.
    pub(crate) fn update(&mut self) {
        let now = Instant::now();
        self.delta = now - self.frame_start;
        self.frame_start = now;
        self.elapsed = now - self.startup;
        self.frame_count += 1;
    }

    /// Advance by a fixed amount instead of reading the wall clock.
    pub(crate) fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.elapsed += delta;
        self.frame_count += 1;
    }

    /// Duration of the previous frame.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Delta time in seconds (f32), the most common way to use it.
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Total elapsed time since app start.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Number of frames rendered so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-step accumulator with FPS/UPS counters.
#[derive(Debug, Clone)]
pub struct FrameClock {
    target_fps: u32,
    target_ups: u32,
    accumulator: Duration,
    window: Duration,
    frames: u32,
    updates: u32,
    fps: u32,
    ups: u32,
}

impl FrameClock {
    /// Upper bound on fixed updates per frame. Time beyond it is dropped.
    pub const MAX_STEPS: u32 = 8;

    pub fn new(target_fps: u32, target_ups: u32) -> Self {
        Self {
            target_fps: target_fps.max(1),
            target_ups: target_ups.max(1),
            accumulator: Duration::ZERO,
            window: Duration::ZERO,
            frames: 0,
            updates: 0,
            fps: 0,
            ups: 0,
        }
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn target_ups(&self) -> u32 {
        self.target_ups
    }

    pub fn set_target_fps(&mut self, fps: u32) {
        self.target_fps = fps.max(1);
    }

    pub fn set_target_ups(&mut self, ups: u32) {
        self.target_ups = ups.max(1);
    }

    /// Length of one fixed update.
    pub fn update_step(&self) -> Duration {
        SECOND / self.target_ups
    }

    /// Time budget of one rendered frame.
    pub fn frame_interval(&self) -> Duration {
        SECOND / self.target_fps
    }

    /// Feed one frame's delta; returns how many fixed updates to run.
    pub fn advance(&mut self, delta: Duration) -> u32 {
        let step = self.update_step();
        self.accumulator += delta;

        let mut steps = 0;
        while self.accumulator >= step && steps < Self::MAX_STEPS {
            self.accumulator -= step;
            steps += 1;
        }
        if steps == Self::MAX_STEPS && self.accumulator >= step {
            log::debug!(
                "frame clock fell behind, dropping {:?} of update time",
                self.accumulator
            );
            self.accumulator = Duration::ZERO;
        }

        self.updates += steps;
        self.frames += 1;
        self.window += delta;
        if self.window >= SECOND {
            self.fps = self.frames;
            self.ups = self.updates;
            self.frames = 0;
            self.updates = 0;
            self.window = Duration::ZERO;
        }
        steps
    }

    /// Frames counted in the last full second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Fixed updates counted in the last full second.
    pub fn ups(&self) -> u32 {
        self.ups
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(60, 60)
    }
}
