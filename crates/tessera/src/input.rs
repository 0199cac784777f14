//! Keyboard and mouse input state.
//!
//! Window events land here between frames. One frame of [`crate::engine::tick`]
//! then sees them in this order:
//!
//! ```text
//!   events ──▶ game.input ──▶ n × game.update ──▶ render ──▶ end_frame
//!              └──────── same just_pressed / just_released ───┘  (edges cleared)
//! ```
//!
//! Every fixed update of a frame observes the same edges, so a press is
//! never lost when a frame owes several updates, nor seen twice when it
//! owes none.

use std::collections::HashSet;
use std::hash::Hash;

pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

use crate::math::Vec2;

/// Held set plus this frame's edges for one kind of input.
///
/// An edge is only raised on a state change: a press of a held key (OS key
/// repeat) and a release of an unheld one are both dropped.
pub struct Input<T: Eq + Hash + Copy> {
    pressed: HashSet<T>,
    just_pressed: HashSet<T>,
    just_released: HashSet<T>,
}

impl<T: Eq + Hash + Copy> Input<T> {
    pub fn new() -> Self {
        Self {
            pressed: HashSet::new(),
            just_pressed: HashSet::new(),
            just_released: HashSet::new(),
        }
    }

    pub fn pressed(&self, input: T) -> bool {
        self.pressed.contains(&input)
    }

    /// Went down since the last `end_frame`.
    pub fn just_pressed(&self, input: T) -> bool {
        self.just_pressed.contains(&input)
    }

    /// Went up since the last `end_frame`.
    pub fn just_released(&self, input: T) -> bool {
        self.just_released.contains(&input)
    }

    pub fn press(&mut self, input: T) {
        if self.pressed.insert(input) {
            self.just_pressed.insert(input);
        }
    }

    pub fn release(&mut self, input: T) {
        if self.pressed.remove(&input) {
            self.just_released.insert(input);
        }
    }

    /// Drop the edges; held inputs stay held.
    pub fn clear_just(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }

    /// Release everything held, raising a release edge for each. Used on
    /// focus loss, when the matching key-up events never arrive.
    pub fn reset(&mut self) {
        self.just_released.extend(self.pressed.drain());
        self.just_pressed.clear();
    }
}

impl<T: Eq + Hash + Copy> Default for Input<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mouse cursor position in window coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorPosition {
    pub x: f32,
    pub y: f32,
}

/// Keyboard, mouse buttons and scroll wheel, as seen by the game.
#[derive(Default)]
pub struct InputState {
    pub keys: Input<KeyCode>,
    pub mouse: Input<MouseButton>,
    scroll: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key is currently held down.
    pub fn pressed(&self, key: KeyCode) -> bool {
        self.keys.pressed(key)
    }

    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.keys.just_pressed(key)
    }

    pub fn just_released(&self, key: KeyCode) -> bool {
        self.keys.just_released(key)
    }

    pub fn mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse.pressed(button)
    }

    pub fn mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.mouse.just_pressed(button)
    }

    pub fn mouse_just_released(&self, button: MouseButton) -> bool {
        self.mouse.just_released(button)
    }

    /// Scroll accumulated since the last frame, in lines.
    pub fn scroll(&self) -> Vec2 {
        self.scroll
    }

    pub(crate) fn add_scroll(&mut self, delta: Vec2) {
        self.scroll += delta;
    }

    pub(crate) fn end_frame(&mut self) {
        self.keys.clear_just();
        self.mouse.clear_just();
        self.scroll = Vec2::ZERO;
    }

    pub(crate) fn release_all(&mut self) {
        self.keys.reset();
        self.mouse.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_key_is_just_pressed_once() {
        let mut input = Input::new();
        input.press(KeyCode::Space);
        assert!(input.just_pressed(KeyCode::Space));
        input.clear_just();
        input.press(KeyCode::Space);
        assert!(input.pressed(KeyCode::Space));
        assert!(!input.just_pressed(KeyCode::Space));
    }

    #[test]
    fn release_of_unpressed_key_is_ignored() {
        let mut input = Input::new();
        input.release(KeyCode::KeyA);
        assert!(!input.just_released(KeyCode::KeyA));
    }

    #[test]
    fn release_all_on_focus_loss() {
        let mut state = InputState::new();
        state.keys.press(KeyCode::KeyW);
        state.mouse.press(MouseButton::Left);
        state.release_all();
        assert!(!state.pressed(KeyCode::KeyW));
        assert!(state.just_released(KeyCode::KeyW));
        assert!(state.mouse_just_released(MouseButton::Left));
    }

    #[test]
    fn scroll_resets_each_frame() {
        let mut state = InputState::new();
        state.add_scroll(Vec2::new(0.0, 1.0));
        state.add_scroll(Vec2::new(0.0, 2.0));
        assert_eq!(state.scroll(), Vec2::new(0.0, 3.0));
        state.end_frame();
        assert_eq!(state.scroll(), Vec2::ZERO);
    }
}
