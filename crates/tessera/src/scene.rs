//! # Scene: entity storage and batched drawing
//!
//! The scene owns every entity and keeps render indexes over them so a
//! frame binds each shader and each texture as few times as possible.
//!
//! ```text
//!  Scene
//!  ├── entities: SlotMap<EntityId, Entity>
//!  ├── level: Buckets ─┬─ by_shader:  shader  → [EntityId]
//!  │                   └─ by_texture: texture → [EntityId]
//!  ├── game:  Buckets  (same shape, drawn after level objects)
//!  └── unrendered: [EntityId]   entities without a Renderable
//! ```
//!
//! Texture keys are *escaped*: a sheet cell is indexed under the sheet's
//! base image, so every frame of one sheet lands in the same bucket.
//!
//! ## Drawing
//!
//! ```text
//!  for kind in [LevelObject, GameObject]
//!    for (shader, ids) in by_shader          bind shader, upload camera
//!      group ids by escaped texture          (first-seen order)
//!      for (texture, group)                  bind texture, sheet sizes
//!        for entity in group                 model, flips, repeat, cell
//!          draw_quad
//!        unbind texture
//!    unbind shader
//! ```
//!
//! The keys an entity was indexed under are remembered, so `remove` clears
//! exactly the buckets `add` filled even if the renderable changed since.
//! Call [`Scene::reindex`] after changing an entity's shader or texture.

use std::collections::BTreeMap;
use std::time::Duration;

use slotmap::{SecondaryMap, SlotMap};

use crate::asset::{Assets, ShaderHandle, TextureHandle};
use crate::math::{Transform, Vec2};
use crate::render::{Camera, Renderer, uniforms};
use crate::renderable::Renderable;

slotmap::new_key_type! {
    /// Handle to an entity in a [`Scene`].
    pub struct EntityId;
}

/// Which pass an entity is drawn in. Level objects go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    GameObject,
    LevelObject,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub kind: EntityKind,
    pub transform: Transform,
    pub renderable: Option<Renderable>,
}

impl Entity {
    pub fn new(kind: EntityKind, transform: Transform, renderable: Option<Renderable>) -> Self {
        Self {
            kind,
            transform,
            renderable,
        }
    }

    pub fn game_object(transform: Transform, renderable: Renderable) -> Self {
        Self::new(EntityKind::GameObject, transform, Some(renderable))
    }

    pub fn level_object(transform: Transform, renderable: Renderable) -> Self {
        Self::new(EntityKind::LevelObject, transform, Some(renderable))
    }

    pub fn is_renderable(&self) -> bool {
        self.renderable.is_some()
    }
}

/// Which entities get snapped to the tile grid when added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapMode {
    #[default]
    None,
    LevelObjects,
    All,
}

impl SnapMode {
    fn applies_to(self, kind: EntityKind) -> bool {
        match self {
            SnapMode::None => false,
            SnapMode::LevelObjects => kind == EntityKind::LevelObject,
            SnapMode::All => true,
        }
    }
}

/// Bucket lengths in key order, for diagnostics and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSizes {
    pub game_by_texture: Vec<usize>,
    pub game_by_shader: Vec<usize>,
    pub level_by_texture: Vec<usize>,
    pub level_by_shader: Vec<usize>,
    pub unrendered: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IndexKeys {
    texture: Option<TextureHandle>,
    shader: Option<ShaderHandle>,
}

// ── Buckets ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Buckets {
    by_texture: BTreeMap<Option<TextureHandle>, Vec<EntityId>>,
    by_shader: BTreeMap<Option<ShaderHandle>, Vec<EntityId>>,
}

impl Buckets {
    fn insert(&mut self, id: EntityId, keys: IndexKeys) {
        let bucket = self.by_texture.entry(keys.texture).or_default();
        if !bucket.contains(&id) {
            bucket.push(id);
        }
        let bucket = self.by_shader.entry(keys.shader).or_default();
        if !bucket.contains(&id) {
            bucket.push(id);
        }
    }

    fn remove(&mut self, id: EntityId, keys: IndexKeys) {
        remove_from(&mut self.by_texture, keys.texture, id);
        remove_from(&mut self.by_shader, keys.shader, id);
    }

    fn clear(&mut self) {
        self.by_texture.clear();
        self.by_shader.clear();
    }
}

fn remove_from<K: Ord>(map: &mut BTreeMap<K, Vec<EntityId>>, key: K, id: EntityId) {
    let Some(bucket) = map.get_mut(&key) else {
        return;
    };
    bucket.retain(|&e| e != id);
    if bucket.is_empty() {
        map.remove(&key);
    }
}

fn sizes<K>(map: &BTreeMap<K, Vec<EntityId>>) -> Vec<usize> {
    map.values().map(Vec::len).collect()
}

// ── Scene ────────────────────────────────────────────────────────────────

pub struct Scene {
    entities: SlotMap<EntityId, Entity>,
    index_keys: SecondaryMap<EntityId, IndexKeys>,
    game: Buckets,
    level: Buckets,
    unrendered: Vec<EntityId>,
    camera: Camera,
    snap: SnapMode,
    tile_size: f32,
}

impl Scene {
    pub const DEFAULT_TILE_SIZE: f32 = 16.0;

    pub fn new(camera: Camera) -> Self {
        Self {
            entities: SlotMap::with_key(),
            index_keys: SecondaryMap::new(),
            game: Buckets::default(),
            level: Buckets::default(),
            unrendered: Vec::new(),
            camera,
            snap: SnapMode::None,
            tile_size: Self::DEFAULT_TILE_SIZE,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn snap_mode(&self) -> SnapMode {
        self.snap
    }

    /// Snapping applies to entities added after the change.
    pub fn set_snap_mode(&mut self, snap: SnapMode) {
        self.snap = snap;
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    pub fn set_tile_size(&mut self, tile_size: f32) {
        if tile_size <= 0.0 {
            log::warn!("Ignoring non-positive tile size {tile_size}");
            return;
        }
        self.tile_size = tile_size;
    }

    fn buckets_mut(&mut self, kind: EntityKind) -> &mut Buckets {
        match kind {
            EntityKind::GameObject => &mut self.game,
            EntityKind::LevelObject => &mut self.level,
        }
    }

    fn buckets(&self, kind: EntityKind) -> &Buckets {
        match kind {
            EntityKind::GameObject => &self.game,
            EntityKind::LevelObject => &self.level,
        }
    }

    fn keys_for(renderable: &Renderable, assets: &Assets) -> IndexKeys {
        IndexKeys {
            texture: renderable.escape_texture(assets),
            shader: assets.resolve_shader(renderable.shader()),
        }
    }

    /// Take ownership of `entity` and index it for drawing.
    pub fn add(&mut self, mut entity: Entity, assets: &Assets) -> EntityId {
        if self.snap.applies_to(entity.kind) {
            let tile = self.tile_size;
            let (x, y) = (entity.transform.x(), entity.transform.y());
            entity
                .transform
                .set_position_2d(Vec2::new(x - x % tile, y - y % tile));
        }
        let kind = entity.kind;
        let keys = entity.renderable.as_ref().map(|r| Self::keys_for(r, assets));
        let id = self.entities.insert(entity);
        match keys {
            Some(keys) => {
                self.buckets_mut(kind).insert(id, keys);
                self.index_keys.insert(id, keys);
            }
            None => self.unrendered.push(id),
        }
        id
    }

    pub fn add_all(
        &mut self,
        entities: impl IntoIterator<Item = Entity>,
        assets: &Assets,
    ) -> Vec<EntityId> {
        entities.into_iter().map(|e| self.add(e, assets)).collect()
    }

    /// Remove an entity and hand it back. Unknown ids are a no-op.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.unindex(id, entity.kind);
        Some(entity)
    }

    fn unindex(&mut self, id: EntityId, kind: EntityKind) {
        match self.index_keys.remove(id) {
            Some(keys) => self.buckets_mut(kind).remove(id, keys),
            None => self.unrendered.retain(|&e| e != id),
        }
    }

    /// Re-file an entity after its renderable's shader or texture changed,
    /// or after a renderable was attached or detached.
    pub fn reindex(&mut self, id: EntityId, assets: &Assets) {
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        let kind = entity.kind;
        let keys = entity.renderable.as_ref().map(|r| Self::keys_for(r, assets));
        self.unindex(id, kind);
        match keys {
            Some(keys) => {
                self.buckets_mut(kind).insert(id, keys);
                self.index_keys.insert(id, keys);
            }
            None => self.unrendered.push(id),
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities.iter()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut Entity)> {
        self.entities.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Ids filed under `shader` for `kind`.
    pub fn shader_bucket(&self, kind: EntityKind, shader: Option<ShaderHandle>) -> &[EntityId] {
        self.buckets(kind)
            .by_shader
            .get(&shader)
            .map_or(&[], Vec::as_slice)
    }

    /// Ids filed under the escaped `texture` for `kind`.
    pub fn texture_bucket(&self, kind: EntityKind, texture: Option<TextureHandle>) -> &[EntityId] {
        self.buckets(kind)
            .by_texture
            .get(&texture)
            .map_or(&[], Vec::as_slice)
    }

    pub fn bucket_sizes(&self) -> BucketSizes {
        BucketSizes {
            game_by_texture: sizes(&self.game.by_texture),
            game_by_shader: sizes(&self.game.by_shader),
            level_by_texture: sizes(&self.level.by_texture),
            level_by_shader: sizes(&self.level.by_shader),
            unrendered: self.unrendered.len(),
        }
    }

    /// Integrate entity velocities.
    pub fn update(&mut self, delta: Duration) {
        for entity in self.entities.values_mut() {
            entity.transform.update_position(delta);
        }
    }

    /// Rebuild stale matrices, advance animations, then draw level objects
    /// followed by game objects.
    pub fn render(&mut self, delta: Duration, renderer: &mut Renderer, assets: &mut Assets) {
        for entity in self.entities.values_mut() {
            if entity.transform.is_dirty() {
                entity.transform.update_matrix();
            }
            if let Some(renderable) = entity.renderable.as_mut() {
                renderable.update(delta);
            }
        }
        self.draw_pass(EntityKind::LevelObject, renderer, assets);
        self.draw_pass(EntityKind::GameObject, renderer, assets);
    }

    fn draw_pass(&self, kind: EntityKind, renderer: &mut Renderer, assets: &mut Assets) {
        let buckets = self.buckets(kind);
        for (&shader_key, ids) in &buckets.by_shader {
            let Some(shader) = shader_key.and_then(|h| assets.shaders.get_mut(h)) else {
                log::warn!("Skipping {} {kind:?}s with no shader", ids.len());
                continue;
            };
            if shader.is_destroyed() {
                log::warn!("Skipping {kind:?}s drawn with destroyed shader '{}'", shader.name());
                continue;
            }
            renderer.bind_shader(shader);
            shader.set_mat4(renderer, uniforms::PROJECTION_MAT, self.camera.projection());
            shader.set_mat4(renderer, uniforms::VIEW_MAT, self.camera.view());

            // escaped texture → [(entity, its own texture)]
            let mut groups: Vec<(Option<TextureHandle>, Vec<(EntityId, Option<TextureHandle>)>)> =
                Vec::new();
            for &id in ids {
                let Some(renderable) = self.entities.get(id).and_then(|e| e.renderable.as_ref())
                else {
                    continue;
                };
                let own = renderable.texture(&assets.sheets);
                let key = own.map(|t| assets.textures.escape(t));
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, members)) => members.push((id, own)),
                    None => groups.push((key, vec![(id, own)])),
                }
            }

            for (key, members) in groups {
                let texture = key.and_then(|t| assets.textures.get(t));
                match texture.and_then(|t| t.gpu()) {
                    Some(gpu) => {
                        renderer.bind_texture(gpu);
                    }
                    None => renderer.unbind_texture(),
                }
                if let Some(sheet) = texture
                    .and_then(|t| t.sheet())
                    .and_then(|s| assets.sheets.get(s))
                {
                    shader.set_vec2(renderer, uniforms::TEXTURE_SIZE, sheet.size());
                    shader.set_vec2(renderer, uniforms::SUB_SIZE, sheet.sub_size());
                }

                for (id, own) in members {
                    let Some(entity) = self.entities.get(id) else {
                        continue;
                    };
                    let Some(renderable) = entity.renderable.as_ref() else {
                        continue;
                    };
                    match own.and_then(|t| assets.textures.get(t)).and_then(|t| t.offset()) {
                        Some(offset) => {
                            shader.set_bool(renderer, uniforms::SUB_TEXTURE, true);
                            shader.set_vec2(renderer, uniforms::TEXTURE_OFFSET, offset);
                        }
                        None => shader.set_bool(renderer, uniforms::SUB_TEXTURE, false),
                    }
                    shader.set_mat4(renderer, uniforms::MODEL_MAT, entity.transform.matrix());
                    shader.set_bool(renderer, uniforms::FLIP_X, renderable.is_flip_x());
                    shader.set_bool(renderer, uniforms::FLIP_Y, renderable.is_flip_y());
                    shader.set_vec2(renderer, uniforms::TEXTURE_REPEAT, renderable.texture_repeat());
                    renderer.draw_quad();
                }
                renderer.unbind_texture();
            }
            renderer.unbind_shader();
        }
    }

    /// Drop every entity and index. With `destroy_shaders`, also release
    /// every registered shader program and purge it from the store.
    pub fn destroy(&mut self, destroy_shaders: bool, renderer: &mut Renderer, assets: &mut Assets) {
        self.game.clear();
        self.level.clear();
        self.unrendered.clear();
        self.index_keys.clear();
        self.entities.clear();
        if destroy_shaders {
            assets.shaders.destroy_all(renderer);
            assets.shaders.purge_destroyed();
        }
        log::debug!("Scene destroyed (shaders released: {destroy_shaders})");
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(Camera::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Command;

    fn setup() -> (Renderer, crate::render::CommandLog, Assets) {
        let (mut renderer, log) = Renderer::headless();
        let mut assets = Assets::new();
        assets.ensure_default_shader(&mut renderer).unwrap();
        (renderer, log, assets)
    }

    fn solid(renderer: &mut Renderer, assets: &mut Assets, name: &str) -> TextureHandle {
        assets
            .textures
            .insert_rgba(renderer, name, 2, 2, &[255; 16])
            .unwrap()
    }

    #[test]
    fn snapping_floors_to_tile_grid() {
        let (mut renderer, _log, mut assets) = setup();
        let tex = solid(&mut renderer, &mut assets, "wall");
        let mut scene = Scene::default();
        scene.set_snap_mode(SnapMode::LevelObjects);

        let wall = scene.add(
            Entity::level_object(Transform::at(18.0, 33.0), Renderable::from_texture(tex)),
            &assets,
        );
        let hero = scene.add(
            Entity::game_object(Transform::at(18.0, 33.0), Renderable::from_texture(tex)),
            &assets,
        );
        let wall = &scene.get(wall).unwrap().transform;
        assert_eq!((wall.x(), wall.y()), (16.0, 32.0));
        let hero = &scene.get(hero).unwrap().transform;
        assert_eq!((hero.x(), hero.y()), (18.0, 33.0));
    }

    #[test]
    fn add_then_remove_restores_bucket_sizes() {
        let (mut renderer, _log, mut assets) = setup();
        let tex = solid(&mut renderer, &mut assets, "a");
        let mut scene = Scene::default();
        scene.add(Entity::game_object(Transform::new(), Renderable::from_texture(tex)), &assets);
        let before = scene.bucket_sizes();

        let other = solid(&mut renderer, &mut assets, "b");
        let id = scene.add(
            Entity::game_object(Transform::new(), Renderable::from_texture(other)),
            &assets,
        );
        assert_ne!(scene.bucket_sizes(), before);
        assert!(scene.remove(id).is_some());
        assert_eq!(scene.bucket_sizes(), before);
        assert!(scene.remove(id).is_none());
    }

    #[test]
    fn entities_without_renderable_are_unrendered() {
        let (_renderer, _log, assets) = setup();
        let mut scene = Scene::default();
        let id = scene.add(Entity::new(EntityKind::GameObject, Transform::new(), None), &assets);
        assert_eq!(scene.bucket_sizes().unrendered, 1);
        assert!(scene.bucket_sizes().game_by_shader.is_empty());
        scene.remove(id);
        assert_eq!(scene.bucket_sizes(), BucketSizes::default());
    }

    #[test]
    fn sheet_cells_share_one_texture_bucket() {
        let (mut renderer, _log, mut assets) = setup();
        let base = assets
            .textures
            .insert_rgba(&mut renderer, "tiles", 32, 32, &[0; 32 * 32 * 4])
            .unwrap();
        let sheet = assets.create_sheet(base, 16, 16).unwrap();
        let cells: Vec<_> = (0..4)
            .map(|i| assets.sheets.get(sheet).unwrap().get(i).unwrap())
            .collect();

        let mut scene = Scene::default();
        for cell in cells {
            scene.add(
                Entity::level_object(Transform::new(), Renderable::from_texture(cell)),
                &assets,
            );
        }
        assert_eq!(scene.texture_bucket(EntityKind::LevelObject, Some(base)).len(), 4);
        assert_eq!(scene.bucket_sizes().level_by_texture, vec![4]);
    }

    #[test]
    fn render_binds_once_per_shader_and_texture() {
        let (mut renderer, log, mut assets) = setup();
        let a = solid(&mut renderer, &mut assets, "a");
        let b = solid(&mut renderer, &mut assets, "b");
        let src = crate::render::QUAD_SHADER;
        let tinted = assets
            .shaders
            .create_from_source(&mut renderer, "tinted", src, src)
            .unwrap();

        let mut scene = Scene::default();
        for i in 0..10 {
            let tex = if i % 2 == 0 { a } else { b };
            scene.add(
                Entity::game_object(Transform::at(i as f32, 0.0), Renderable::from_texture(tex)),
                &assets,
            );
        }
        for _ in 0..5 {
            scene.add(
                Entity::game_object(Transform::new(), Renderable::from_texture(a).with_shader(tinted)),
                &assets,
            );
        }

        log.clear();
        renderer.begin_frame();
        scene.render(Duration::from_millis(16), &mut renderer, &mut assets);
        let stats = renderer.stats();
        renderer.end_frame().unwrap();

        // default: {a, b}, tinted: {a}
        assert_eq!(stats.shader_binds, 2);
        assert_eq!(stats.texture_binds, 3);
        assert_eq!(stats.draw_calls, 15);
        assert_eq!(log.count(|c| matches!(c, Command::UseProgram(Some(_)))), 2);
        assert_eq!(log.count(|c| *c == Command::DrawQuad), 15);
    }

    #[test]
    fn uniform_lookups_are_cached_across_frames() {
        let (mut renderer, log, mut assets) = setup();
        let tex = solid(&mut renderer, &mut assets, "a");
        let mut scene = Scene::default();
        scene.add(Entity::game_object(Transform::new(), Renderable::from_texture(tex)), &assets);

        for _ in 0..3 {
            renderer.begin_frame();
            scene.render(Duration::ZERO, &mut renderer, &mut assets);
            renderer.end_frame().unwrap();
        }
        let lookups = log.count(|c| {
            matches!(c, Command::UniformLookup { name, .. } if name == uniforms::MODEL_MAT)
        });
        assert_eq!(lookups, 1);
    }

    #[test]
    fn reindex_moves_entity_to_new_shader_bucket() {
        let (mut renderer, _log, mut assets) = setup();
        let tex = solid(&mut renderer, &mut assets, "a");
        let src = crate::render::QUAD_SHADER;
        let other = assets
            .shaders
            .create_from_source(&mut renderer, "other", src, src)
            .unwrap();
        let mut scene = Scene::default();
        let id = scene.add(Entity::game_object(Transform::new(), Renderable::from_texture(tex)), &assets);

        if let Some(r) = scene.get_mut(id).and_then(|e| e.renderable.as_mut()) {
            r.set_shader(Some(other));
        }
        scene.reindex(id, &assets);
        assert_eq!(scene.shader_bucket(EntityKind::GameObject, Some(other)), &[id]);
        assert!(
            scene
                .shader_bucket(EntityKind::GameObject, assets.default_shader())
                .is_empty()
        );
    }

    #[test]
    fn destroy_keeps_or_releases_shaders() {
        let (mut renderer, _log, mut assets) = setup();
        let tex = solid(&mut renderer, &mut assets, "a");
        let mut scene = Scene::default();
        scene.add(Entity::game_object(Transform::new(), Renderable::from_texture(tex)), &assets);

        scene.destroy(false, &mut renderer, &mut assets);
        assert!(scene.is_empty());
        assert_eq!(scene.bucket_sizes(), BucketSizes::default());
        assert_eq!(assets.shaders.len(), 1);

        scene.destroy(true, &mut renderer, &mut assets);
        assert!(assets.shaders.lookup(Assets::DEFAULT_SHADER).is_none());
    }

    #[test]
    fn velocity_moves_entities() {
        let (_renderer, _log, assets) = setup();
        let mut scene = Scene::default();
        let mut transform = Transform::new();
        transform.set_velocity(Vec2::new(10.0, 0.0));
        let id = scene.add(Entity::new(EntityKind::GameObject, transform, None), &assets);
        scene.update(Duration::from_millis(500));
        assert!((scene.get(id).unwrap().transform.x() - 5.0).abs() < 1e-4);
    }
}
