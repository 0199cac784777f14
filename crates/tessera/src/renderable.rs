//! What an entity looks like: a texture or a set of animations, the shader
//! that draws it, and per-draw flags.
//!
//! A `Renderable` owns its animations by value. Cloning one (e.g. stamping
//! out a prefab) gives the clone its own playback state. Playback state
//! lives on the current [`Animation`]; the renderable only forwards to it.

use std::time::Duration;

use crate::asset::{Animation, Assets, ShaderHandle, SheetStore, TextureHandle};
use crate::math::Vec2;

#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    texture: Option<TextureHandle>,
    animations: Vec<Animation>,
    use_animations: bool,
    current: usize,
    autoplay: bool,
    shader: Option<ShaderHandle>,
    texture_repeat: Vec2,
    flip_x: bool,
    flip_y: bool,
}

impl Renderable {
    fn empty() -> Self {
        Self {
            texture: None,
            animations: Vec::new(),
            use_animations: false,
            current: 0,
            autoplay: false,
            shader: None,
            texture_repeat: Vec2::ONE,
            flip_x: false,
            flip_y: false,
        }
    }

    /// A static image (or a single sheet cell).
    pub fn from_texture(texture: TextureHandle) -> Self {
        Self {
            texture: Some(texture),
            ..Self::empty()
        }
    }

    pub fn from_animations(animations: Vec<Animation>) -> Self {
        Self {
            use_animations: true,
            animations,
            ..Self::empty()
        }
    }

    /// Animated, with `texture` as the fallback when animations are switched
    /// off.
    pub fn with_texture_and_animations(texture: TextureHandle, animations: Vec<Animation>) -> Self {
        Self {
            texture: Some(texture),
            use_animations: true,
            animations,
            ..Self::empty()
        }
    }

    /// Draw with `shader` instead of the default one.
    pub fn with_shader(mut self, shader: ShaderHandle) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn shader(&self) -> Option<ShaderHandle> {
        self.shader
    }

    /// Change the shader. A renderable already in a scene must be
    /// re-indexed with `Scene::reindex` afterwards.
    pub fn set_shader(&mut self, shader: Option<ShaderHandle>) {
        self.shader = shader;
    }

    pub fn static_texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: Option<TextureHandle>) {
        self.texture = texture;
    }

    /// The texture on screen: the current animation frame when animating,
    /// otherwise the static texture.
    pub fn texture(&self, sheets: &SheetStore) -> Option<TextureHandle> {
        if self.use_animations {
            if let Some(frame) = self
                .current_animation()
                .and_then(|a| a.texture_frame(sheets))
            {
                return Some(frame);
            }
        }
        self.texture
    }

    /// The texture the scene batches and binds for this renderable. Sheet
    /// cells resolve to the sheet's base image.
    pub fn escape_texture(&self, assets: &Assets) -> Option<TextureHandle> {
        self.texture(&assets.sheets).map(|t| assets.escape(t))
    }

    pub fn is_using_animations(&self) -> bool {
        self.use_animations
    }

    pub fn set_use_animations(&mut self, use_animations: bool) {
        self.use_animations = use_animations;
    }

    pub fn has_animations(&self) -> bool {
        !self.animations.is_empty()
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn is_autoplay(&self) -> bool {
        self.autoplay
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Switch to the animation at `index`, clamped to the list.
    pub fn set_animation(&mut self, index: usize) {
        self.current = index.min(self.animations.len().saturating_sub(1));
        if self.autoplay {
            self.play_animation();
        }
    }

    /// Switch to the animation called `name` (case-insensitive), stopping
    /// the current one. Returns `false` if there is no such animation.
    pub fn set_animation_by_name(&mut self, name: &str) -> bool {
        let Some(index) = self.index_of(name) else {
            return false;
        };
        if let Some(previous) = self.animations.get_mut(self.current) {
            previous.stop();
        }
        self.current = index;
        if self.autoplay {
            self.play_animation();
        }
        true
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.animations
            .iter()
            .position(|a| a.name().eq_ignore_ascii_case(name))
    }

    pub fn animation(&self, name: &str) -> Option<&Animation> {
        self.index_of(name).map(|i| &self.animations[i])
    }

    pub fn animation_mut(&mut self, name: &str) -> Option<&mut Animation> {
        self.index_of(name).map(|i| &mut self.animations[i])
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn current_animation(&self) -> Option<&Animation> {
        self.animations.get(self.current)
    }

    pub fn current_animation_mut(&mut self) -> Option<&mut Animation> {
        self.animations.get_mut(self.current)
    }

    pub fn play_animation(&mut self) {
        if let Some(animation) = self.animations.get_mut(self.current) {
            animation.play();
        }
    }

    pub fn pause_animation(&mut self) {
        if let Some(animation) = self.animations.get_mut(self.current) {
            animation.set_paused(true);
        }
    }

    pub fn stop_animation(&mut self) {
        if let Some(animation) = self.animations.get_mut(self.current) {
            animation.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current_animation().is_some_and(Animation::is_playing)
    }

    pub fn is_paused(&self) -> bool {
        self.current_animation().is_some_and(Animation::is_paused)
    }

    /// True with no animations, or once the current one stopped (including
    /// a one-shot that reached its last frame).
    pub fn is_stopped(&self) -> bool {
        self.current_animation().is_none_or(Animation::is_stopped)
    }

    /// Advance the current animation. Only runs while it is playing.
    pub fn update(&mut self, delta: Duration) {
        if !self.use_animations {
            return;
        }
        if let Some(animation) = self.animations.get_mut(self.current) {
            animation.update(delta);
        }
    }

    pub fn texture_repeat(&self) -> Vec2 {
        self.texture_repeat
    }

    pub fn set_texture_repeat(&mut self, repeat: Vec2) {
        self.texture_repeat = repeat;
    }

    pub fn is_flip_x(&self) -> bool {
        self.flip_x
    }

    pub fn set_flip_x(&mut self, flip: bool) {
        self.flip_x = flip;
    }

    pub fn is_flip_y(&self) -> bool {
        self.flip_y
    }

    pub fn set_flip_y(&mut self, flip: bool) {
        self.flip_y = flip;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Renderer;

    fn sheet_assets() -> (Assets, TextureHandle, crate::asset::SheetHandle) {
        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let tex = assets
            .textures
            .insert_rgba(&mut renderer, "hero", 32, 16, &[0; 32 * 16 * 4])
            .unwrap();
        let sheet = assets.create_sheet(tex, 16, 16).unwrap();
        (assets, tex, sheet)
    }

    #[test]
    fn animated_texture_follows_current_frame() {
        let (assets, base, sheet) = sheet_assets();
        let walk = Animation::new("walk", vec![0, 1], 100.0).with_sheet(sheet);
        let mut renderable = Renderable::from_animations(vec![walk]);
        renderable.play_animation();

        let first = renderable.texture(&assets.sheets).unwrap();
        assert_eq!(assets.sheets.get(sheet).unwrap().get(0), Some(first));
        renderable.update(Duration::from_millis(150));
        let second = renderable.texture(&assets.sheets).unwrap();
        assert_ne!(first, second);
        assert_eq!(renderable.escape_texture(&assets), Some(base));
    }

    #[test]
    fn static_texture_when_animations_off() {
        let (assets, base, sheet) = sheet_assets();
        let walk = Animation::new("walk", vec![1], 100.0).with_sheet(sheet);
        let mut renderable = Renderable::with_texture_and_animations(base, vec![walk]);
        assert_ne!(renderable.texture(&assets.sheets), Some(base));
        renderable.set_use_animations(false);
        assert_eq!(renderable.texture(&assets.sheets), Some(base));
    }

    #[test]
    fn set_animation_by_name_ignores_case_and_stops_previous() {
        let mut renderable = Renderable::from_animations(vec![
            Animation::new("Idle", vec![0], 100.0),
            Animation::new("Run", vec![1, 2], 100.0),
        ])
        .with_autoplay(true);
        renderable.play_animation();
        assert!(renderable.set_animation_by_name("run"));
        assert_eq!(renderable.current_index(), 1);
        assert!(renderable.animation("IDLE").unwrap().is_stopped());
        assert!(renderable.current_animation().unwrap().is_playing());
        assert!(!renderable.set_animation_by_name("jump"));
        assert_eq!(renderable.current_index(), 1);
    }

    #[test]
    fn autoplay_by_name_advances_without_explicit_play() {
        let mut renderable = Renderable::from_animations(vec![
            Animation::new("idle", vec![0], 100.0),
            Animation::new("run", vec![0, 1, 2], 100.0),
        ])
        .with_autoplay(true);
        assert!(renderable.set_animation_by_name("run"));
        assert!(renderable.is_playing());

        renderable.update(Duration::from_millis(150));
        assert_eq!(renderable.current_animation().unwrap().current_frame(), 1);
    }

    #[test]
    fn finished_one_shot_reports_stopped() {
        let mut once = Animation::new("hit", vec![0, 1], 100.0);
        once.set_loop(false);
        let mut renderable = Renderable::from_animations(vec![once]);
        renderable.play_animation();
        assert!(renderable.is_playing());

        renderable.update(Duration::from_millis(500));
        assert!(renderable.is_stopped());
        assert!(!renderable.is_playing());
        assert_eq!(renderable.current_animation().unwrap().current_frame(), 1);
    }

    #[test]
    fn set_animation_clamps_index() {
        let mut renderable = Renderable::from_animations(vec![
            Animation::new("a", vec![0], 100.0),
            Animation::new("b", vec![0], 100.0),
        ]);
        renderable.set_animation(9);
        assert_eq!(renderable.current_index(), 1);
    }

    #[test]
    fn paused_renderable_holds_frame() {
        let mut renderable =
            Renderable::from_animations(vec![Animation::new("a", vec![0, 1, 2], 100.0)]);
        renderable.play_animation();
        renderable.pause_animation();
        assert!(renderable.is_paused());
        renderable.update(Duration::from_millis(500));
        assert_eq!(renderable.current_animation().unwrap().current_frame(), 0);

        renderable.stop_animation();
        assert!(renderable.is_stopped());
    }

    #[test]
    fn clones_play_independently() {
        let prefab =
            Renderable::from_animations(vec![Animation::new("spin", vec![0, 1, 2], 100.0)]);
        let mut a = prefab.clone();
        let b = prefab.clone();
        a.play_animation();
        a.update(Duration::from_millis(150));
        assert_eq!(a.current_animation().unwrap().current_frame(), 1);
        assert_eq!(b.current_animation().unwrap().current_frame(), 0);
    }

    #[test]
    fn defaults() {
        let renderable = Renderable::from_texture(TextureHandle(0));
        assert_eq!(renderable.texture_repeat(), Vec2::ONE);
        assert!(!renderable.is_flip_x() && !renderable.is_flip_y());
        assert_eq!(renderable.shader(), None);
        assert!(renderable.is_stopped());
    }
}
