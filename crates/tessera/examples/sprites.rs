//! Sprites: a tiled floor, an animated hero and click-to-place walls.
//!
//! Arrow keys move the hero, left click drops a wall snapped to the tile
//! grid, F5 saves the level and Escape quits. Textures are generated in
//! memory so the example needs no asset files.

use std::path::PathBuf;
use std::time::Duration;

use tessera::prelude::*;

const TILE: f32 = 16.0;
const HERO_SPEED: f32 = 48.0;

/// `w`×`h` pixels of one color.
fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
    rgba.iter().copied().cycle().take((w * h * 4) as usize).collect()
}

/// Two 16×16 frames side by side: a light square, then a dark one.
fn hero_strip() -> Vec<u8> {
    let mut pixels = Vec::with_capacity(32 * 16 * 4);
    for _y in 0..16 {
        for x in 0..32 {
            let px = if x < 16 { [240, 200, 80, 255] } else { [180, 120, 40, 255] };
            pixels.extend_from_slice(&px);
        }
    }
    pixels
}

#[derive(Default)]
struct Sprites {
    hero: Option<EntityId>,
    wall: Option<TextureHandle>,
    editor: Option<EditorSpace>,
}

impl Sprites {
    fn level_path() -> PathBuf {
        std::env::temp_dir().join("tessera-sprites").join("level.json")
    }

    fn setup(&mut self, ctx: &mut Context) -> Result<(), AssetError> {
        let Context { renderer, assets, scene, .. } = ctx;
        let grass = assets
            .textures
            .insert_rgba(renderer, "grass", 16, 16, &solid(16, 16, [60, 140, 60, 255]))?;
        let wall = assets
            .textures
            .insert_rgba(renderer, "wall", 16, 16, &solid(16, 16, [110, 110, 120, 255]))?;
        let strip = assets
            .textures
            .insert_rgba(renderer, "hero", 32, 16, &hero_strip())?;
        let sheet = assets.create_sheet(strip, 16, 16)?;
        assets.sheets.set_name(sheet, "hero");
        let walk = Animation::new("walk", vec![0, 1], 150.0).with_sheet(sheet);

        scene.set_snap_mode(SnapMode::LevelObjects);
        let size = scene.camera().size();
        let (cols, rows) = ((size.x / TILE) as u32, (size.y / TILE) as u32);
        for y in 0..rows {
            for x in 0..cols {
                let transform = Transform::at(x as f32 * TILE, y as f32 * TILE).with_size(TILE, TILE);
                scene.add(Entity::level_object(transform, Renderable::from_texture(grass)), assets);
            }
        }

        let mut hero = Renderable::from_animations(vec![walk]).with_autoplay(true);
        hero.set_animation(0);
        let transform = Transform::at(size.x / 2.0, size.y / 2.0).with_size(TILE, TILE);
        self.hero = Some(scene.add(Entity::game_object(transform, hero), assets));
        self.wall = Some(wall);
        self.editor = Some(EditorSpace::new(cols, rows));
        Ok(())
    }
}

impl GameInterface for Sprites {
    fn start(&mut self, ctx: &mut Context) {
        if let Err(e) = self.setup(ctx) {
            log::error!("Setup failed: {e}");
            ctx.stop();
        }
    }

    fn input(&mut self, ctx: &mut Context, _delta: Duration) {
        if ctx.input.just_pressed(KeyCode::Escape) {
            ctx.stop();
            return;
        }

        let mut dir = Vec2::ZERO;
        if ctx.input.pressed(KeyCode::ArrowLeft) {
            dir.x -= 1.0;
        }
        if ctx.input.pressed(KeyCode::ArrowRight) {
            dir.x += 1.0;
        }
        if ctx.input.pressed(KeyCode::ArrowUp) {
            dir.y += 1.0;
        }
        if ctx.input.pressed(KeyCode::ArrowDown) {
            dir.y -= 1.0;
        }
        let hero = match self.hero {
            Some(id) => ctx.scene.get_mut(id),
            None => None,
        };
        if let Some(hero) = hero {
            hero.transform
                .set_velocity(dir.normalize_or_zero() * HERO_SPEED);
            if let Some(renderable) = hero.renderable.as_mut() {
                if dir.x != 0.0 {
                    renderable.set_flip_x(dir.x < 0.0);
                }
                match (dir == Vec2::ZERO, renderable.is_playing()) {
                    (true, true) => renderable.pause_animation(),
                    (false, false) => renderable.play_animation(),
                    _ => {}
                }
            }
        }

        if ctx.input.mouse_just_pressed(MouseButton::Left) {
            if let Some(wall) = self.wall {
                let at = ctx.cursor_world();
                let transform = Transform::at(at.x, at.y).with_size(TILE, TILE);
                ctx.scene.add(
                    Entity::level_object(transform, Renderable::from_texture(wall)),
                    &ctx.assets,
                );
            }
        }

        if ctx.input.just_pressed(KeyCode::F5) {
            if let Some(editor) = self.editor {
                let path = Self::level_path();
                match editor.save(&path, &ctx.scene, &ctx.assets) {
                    Ok(()) => log::info!("Saved level to {}", path.display()),
                    Err(e) => log::warn!("Failed to save level: {e}"),
                }
            }
        }
    }

    fn update(&mut self, ctx: &mut Context, _step: Duration) {
        if ctx.time.frame_count() % 120 == 0 {
            log::debug!("{} fps, {} ups", ctx.clock.fps(), ctx.clock.ups());
        }
    }

    fn end(&mut self, ctx: &mut Context) {
        log::info!("Leaving with {} entities", ctx.scene.len());
    }
}

fn main() {
    let prefs = GamePreferences::load_or_default(GamePreferences::DEFAULT_PATH);
    let config = EngineConfig {
        title: "tessera: sprites".to_string(),
        auto_save_prefs: true,
        ..EngineConfig::default()
    };
    if let Err(e) = Engine::new(prefs, config).run(Sprites::default()) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
