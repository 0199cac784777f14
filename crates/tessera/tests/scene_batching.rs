//! Drawing order checks over the recording backend.

use std::collections::HashMap;
use std::time::Duration;

use tessera::asset::{Animation, Assets, ShaderHandle, TextureHandle};
use tessera::math::Transform;
use tessera::render::{Command, CommandLog, GpuTexture, ProgramId, QUAD_SHADER, Renderer};
use tessera::renderable::Renderable;
use tessera::scene::{BucketSizes, Entity, EntityId, EntityKind, Scene};

struct World {
    renderer: Renderer,
    log: CommandLog,
    assets: Assets,
    scene: Scene,
    tinted: ShaderHandle,
    grass: TextureHandle,
    rock: TextureHandle,
    tiles: TextureHandle,
}

fn world() -> World {
    let (mut renderer, log) = Renderer::headless();
    let mut assets = Assets::new();
    assets.ensure_default_shader(&mut renderer).unwrap();
    let tinted = assets
        .shaders
        .create_from_source(&mut renderer, "tinted", QUAD_SHADER, QUAD_SHADER)
        .unwrap();
    let grass = assets
        .textures
        .insert_rgba(&mut renderer, "grass", 1, 1, &[0, 255, 0, 255])
        .unwrap();
    let rock = assets
        .textures
        .insert_rgba(&mut renderer, "rock", 1, 1, &[90, 90, 90, 255])
        .unwrap();
    let tiles = assets
        .textures
        .insert_rgba(&mut renderer, "tiles", 32, 16, &[255; 32 * 16 * 4])
        .unwrap();
    World {
        renderer,
        log,
        assets,
        scene: Scene::default(),
        tinted,
        grass,
        rock,
        tiles,
    }
}

fn populate(w: &mut World) -> Vec<EntityId> {
    let sheet = w.assets.create_sheet(w.tiles, 16, 16).unwrap();
    let cells: Vec<_> = (0..2)
        .map(|i| w.assets.sheets.get(sheet).unwrap().get(i).unwrap())
        .collect();
    let walk = Animation::new("walk", vec![0, 1], 50.0).with_sheet(sheet);

    let mut entities = Vec::new();
    for i in 0..6 {
        let texture = [w.grass, w.rock][i % 2];
        entities.push(Entity::level_object(
            Transform::at(i as f32 * 16.0, 0.0),
            Renderable::from_texture(texture),
        ));
    }
    for &cell in &cells {
        entities.push(Entity::level_object(Transform::at(0.0, 16.0), Renderable::from_texture(cell)));
    }
    for i in 0..4 {
        let renderable = Renderable::from_texture([w.grass, cells[1]][i % 2]).with_shader(w.tinted);
        entities.push(Entity::game_object(Transform::at(8.0, 8.0), renderable));
    }
    entities.push(Entity::game_object(
        Transform::at(32.0, 32.0),
        Renderable::from_animations(vec![walk]).with_autoplay(true),
    ));
    entities.push(Entity::new(EntityKind::GameObject, Transform::new(), None));
    w.scene.add_all(entities, &w.assets)
}

/// (program, texture) pair that entity `id` must be drawn with.
fn expected_binding(w: &World, id: EntityId) -> Option<(ProgramId, Option<GpuTexture>)> {
    let renderable = w.scene.get(id)?.renderable.as_ref()?;
    let shader = w.assets.resolve_shader(renderable.shader())?;
    let program = w.assets.shaders.get(shader)?.program()?;
    let texture = renderable
        .escape_texture(&w.assets)
        .and_then(|t| w.assets.textures.get(t))
        .and_then(|t| t.gpu());
    Some((program, texture))
}

/// Replay the log and return the binding active at each draw, in order.
fn draws(commands: &[Command]) -> Vec<(ProgramId, Option<GpuTexture>)> {
    let mut program = None;
    let mut texture = None;
    let mut out = Vec::new();
    for command in commands {
        match command {
            Command::UseProgram(p) => program = *p,
            Command::BindTexture(t) => texture = *t,
            Command::DrawQuad => {
                out.push((program.expect("draw without a bound program"), texture));
            }
            _ => {}
        }
    }
    out
}

fn render_frame(w: &mut World) {
    w.renderer.begin_frame();
    w.scene
        .render(Duration::from_millis(16), &mut w.renderer, &mut w.assets);
    w.renderer.end_frame().unwrap();
}

#[test]
fn every_draw_uses_its_entitys_shader_and_escaped_texture() {
    let mut w = world();
    let ids = populate(&mut w);
    w.log.clear();
    render_frame(&mut w);

    let mut expected: HashMap<(ProgramId, Option<GpuTexture>), usize> = HashMap::new();
    for &id in &ids {
        if let Some(binding) = expected_binding(&w, id) {
            *expected.entry(binding).or_default() += 1;
        }
    }
    let mut seen: HashMap<(ProgramId, Option<GpuTexture>), usize> = HashMap::new();
    for binding in draws(&w.log.commands()) {
        *seen.entry(binding).or_default() += 1;
    }
    assert_eq!(seen, expected);
}

#[test]
fn draws_are_contiguous_per_shader_and_texture_within_a_pass() {
    let mut w = world();
    populate(&mut w);
    w.log.clear();
    render_frame(&mut w);

    // 8 level objects first, then 5 game objects.
    let all = draws(&w.log.commands());
    assert_eq!(all.len(), 13);
    for pass in [&all[..8], &all[8..]] {
        let mut finished = Vec::new();
        let mut current = None;
        for &binding in pass {
            if current != Some(binding) {
                if let Some(prev) = current {
                    finished.push(prev);
                }
                assert!(!finished.contains(&binding), "{binding:?} drawn in two runs");
                current = Some(binding);
            }
        }
    }
}

#[test]
fn bind_counts_follow_bucket_layout() {
    let mut w = world();
    populate(&mut w);
    w.renderer.begin_frame();
    w.scene
        .render(Duration::from_millis(16), &mut w.renderer, &mut w.assets);
    let stats = w.renderer.stats();
    w.renderer.end_frame().unwrap();

    // level/default: grass, rock, tiles
    // game/default: tiles (animated)
    // game/tinted: grass, tiles
    assert_eq!(stats.shader_binds, 3);
    assert_eq!(stats.texture_binds, 6);
    assert_eq!(stats.draw_calls, 13);
}

#[test]
fn removing_everything_leaves_no_buckets() {
    let mut w = world();
    let ids = populate(&mut w);
    for id in ids {
        assert!(w.scene.remove(id).is_some());
    }
    assert!(w.scene.is_empty());
    assert_eq!(w.scene.bucket_sizes(), BucketSizes::default());

    w.log.clear();
    render_frame(&mut w);
    assert_eq!(w.log.count(|c| *c == Command::DrawQuad), 0);
    assert_eq!(w.log.count(|c| matches!(c, Command::UseProgram(Some(_)))), 0);
}

#[test]
fn animated_entity_cycles_sheet_cells_without_rebinding() {
    let mut w = world();
    let sheet = w.assets.create_sheet(w.tiles, 16, 16).unwrap();
    let walk = Animation::new("walk", vec![0, 1], 10.0).with_sheet(sheet);
    let id = w.scene.add(
        Entity::game_object(
            Transform::new(),
            Renderable::from_animations(vec![walk]).with_autoplay(true),
        ),
        &w.assets,
    );
    let r = w.scene.get_mut(id).unwrap().renderable.as_mut().unwrap();
    r.set_animation(0);
    assert!(r.is_playing());

    let tiles_gpu = w.assets.textures.get(w.tiles).unwrap().gpu();
    let mut frames = Vec::new();
    for _ in 0..4 {
        w.log.clear();
        render_frame(&mut w);
        let binds: Vec<_> = draws(&w.log.commands()).into_iter().map(|(_, t)| t).collect();
        assert_eq!(binds, vec![tiles_gpu]);
        let renderable = w.scene.get(id).unwrap().renderable.as_ref().unwrap();
        frames.push(renderable.current_animation().unwrap().current_frame());
    }
    assert!(frames.contains(&0) && frames.contains(&1));
}
