//! Frame-stepping playback over a texture sheet.
//!
//! An [`Animation`] is an ordered list of sheet indices and a frame length.
//! It does not own textures; [`Animation::texture_frame`] resolves the
//! current index through the [`SheetStore`].
//!
//! ```text
//!            play()              pause()
//!  stopped ─────────▶ playing ◀─────────▶ paused
//!     ▲                  │
//!     └──────────────────┘
//!      stop(), or last frame reached while not looping
//! ```
//!
//! Timing carries overshoot: a 250ms update over 100ms frames advances two
//! frames and leaves 50ms of credit against the third.

use std::time::Duration;

use crate::asset::{SheetHandle, SheetStore, TextureHandle};

#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    name: String,
    sheet: Option<SheetHandle>,
    frames: Vec<usize>,
    /// Milliseconds each frame stays on screen.
    frame_length: f32,
    current_frame: usize,
    frame_timer: f32,
    playing: bool,
    paused: bool,
    looping: bool,
    reverse: bool,
    advanced: bool,
}

impl Animation {
    pub const DEFAULT_FRAME_LENGTH: f32 = 100.0;

    pub fn new(name: impl Into<String>, frames: Vec<usize>, frame_length: f32) -> Self {
        Self {
            name: name.into(),
            sheet: None,
            frames,
            frame_length,
            current_frame: 0,
            frame_timer: 0.0,
            playing: false,
            paused: false,
            looping: true,
            reverse: false,
            advanced: false,
        }
    }

    /// Bind the frames to a sheet.
    pub fn with_sheet(mut self, sheet: SheetHandle) -> Self {
        self.sheet = Some(sheet);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sheet(&self) -> Option<SheetHandle> {
        self.sheet
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn frame_length(&self) -> f32 {
        self.frame_length
    }

    pub fn set_frame_length(&mut self, ms: f32) {
        self.frame_length = ms;
    }

    pub fn set_fps(&mut self, fps: u32) {
        if fps == 0 {
            log::warn!("Ignoring zero fps for animation '{}'", self.name);
            return;
        }
        self.frame_length = 1000.0 / fps as f32;
    }

    /// Position within the frame list, not the sheet index.
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Sheet index of the frame on screen.
    pub fn current_index(&self) -> Option<usize> {
        self.frames.get(self.current_frame).copied()
    }

    pub fn set_current_frame(&mut self, frame: usize) {
        self.current_frame = frame.min(self.frames.len().saturating_sub(1));
    }

    pub fn frame_timer(&self) -> f32 {
        self.frame_timer
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_stopped(&self) -> bool {
        !self.playing && !self.paused
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    pub fn set_loop(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
    }

    /// Flip playback direction.
    pub fn reverse(&mut self) {
        self.reverse = !self.reverse;
    }

    /// Start (or restart) playback. A finished one-shot rewinds first.
    pub fn play(&mut self) {
        if !self.looping && self.current_frame == self.last_frame() {
            self.current_frame = self.first_frame();
        }
        self.playing = true;
        self.paused = false;
        self.frame_timer = self.frame_length;
    }

    /// Toggle pause.
    pub fn pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn stop(&mut self) {
        self.playing = false;
        self.paused = false;
    }

    /// Returns `true` once after each frame change.
    pub fn take_advanced(&mut self) -> bool {
        std::mem::take(&mut self.advanced)
    }

    pub fn update(&mut self, delta: Duration) {
        if !self.playing || self.paused || self.frames.is_empty() {
            return;
        }
        if self.frame_length <= 0.0 {
            return;
        }
        self.frame_timer -= delta.as_secs_f32() * 1000.0;
        while self.playing && self.frame_timer <= 0.0 {
            self.frame_timer += self.frame_length;
            self.step();
        }
    }

    fn step(&mut self) {
        if self.current_frame == self.last_frame() {
            if self.looping {
                self.current_frame = self.first_frame();
                self.advanced = true;
            } else {
                self.stop();
            }
            return;
        }
        if self.reverse {
            self.current_frame -= 1;
        } else {
            self.current_frame += 1;
        }
        self.advanced = true;
        if !self.looping && self.current_frame == self.last_frame() {
            self.stop();
        }
    }

    fn first_frame(&self) -> usize {
        if self.reverse { self.frames.len().saturating_sub(1) } else { 0 }
    }

    fn last_frame(&self) -> usize {
        if self.reverse { 0 } else { self.frames.len().saturating_sub(1) }
    }

    /// The sub-texture for the current frame.
    pub fn texture_frame(&self, sheets: &SheetStore) -> Option<TextureHandle> {
        let sheet = sheets.get(self.sheet?)?;
        sheet.get(self.current_index()?)
    }

    /// Frames as a comma separated list, e.g. `"0,1,2"`.
    pub fn frames_csv(&self) -> String {
        self.frames
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a frame list. Empty entries (such as a trailing comma) are skipped.
    pub fn parse_frames(csv: &str) -> Result<Vec<usize>, std::num::ParseIntError> {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}
