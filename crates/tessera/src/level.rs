//! # Level files
//!
//! A level is a JSON document listing the assets its objects use and the
//! objects themselves. Objects point at assets by index into those lists,
//! so a level never depends on how handles were numbered when it was saved.
//!
//! ```json
//! {
//!   "width": 640, "height": 360, "size": 16.0,
//!   "textures": [{ "path": "res/wall.png", "name": "wall" }],
//!   "sheets":   ["res/hero.json"],
//!   "shaders":  [{ "name": "glow", "vertex": "res/glow.wgsl", "fragment": "res/glow.wgsl" }],
//!   "levelObjects": [{
//!     "position": [16.0, 32.0, 0.0], "size": [16.0, 16.0], "rotation": 0.0,
//!     "renderable": { "texture": { "texture": 0 }, "textureRepeat": [1.0, 1.0] }
//!   }],
//!   "gameObjects": [{
//!     "position": [48.0, 32.0, 1.0], "size": [16.0, 16.0], "rotation": 0.0,
//!     "renderable": {
//!       "texture": { "sheet": 0, "index": 2 },
//!       "animations": [{ "sheet": 0, "name": "walk" }],
//!       "shader": 0, "flipX": true
//!     }
//!   }]
//! }
//! ```
//!
//! A sheet entry is either the path of a descriptor file or an inline
//! descriptor (for sheets built in code). Shaders without source files,
//! such as the built-in default, are stored by name and must already be
//! registered when the level loads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::asset::{
    AssetError, Assets, ShaderHandle, SheetDescriptor, SheetHandle, TextureHandle, TextureKind,
    path_key,
};
use crate::math::{Transform, Vec2, Vec3};
use crate::render::Renderer;
use crate::renderable::Renderable;
use crate::scene::{Entity, EntityId, EntityKind, Scene};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelFile {
    pub width: u32,
    pub height: u32,
    /// Tile size in world units.
    pub size: f32,
    #[serde(default)]
    pub textures: Vec<TextureEntry>,
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
    #[serde(default)]
    pub shaders: Vec<ShaderEntry>,
    #[serde(default)]
    pub level_objects: Vec<ObjectRecord>,
    #[serde(default)]
    pub game_objects: Vec<ObjectRecord>,
}

impl LevelFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| AssetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| AssetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| AssetError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, json).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    /// Image path. Absent for textures created in code, which are found by
    /// name instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetEntry {
    Path(String),
    Inline(SheetDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

/// A texture reference: a whole image, or one cell of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextureRef {
    Cell { sheet: usize, index: usize },
    Image { texture: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationRef {
    pub sheet: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderableRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<TextureRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<AnimationRef>,
    /// Index into `shaders`; absent means the default shader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shader: Option<usize>,
    #[serde(default = "one")]
    pub texture_repeat: Vec2,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default)]
    pub autoplay: bool,
}

fn one() -> Vec2 {
    Vec2::ONE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub position: Vec3,
    pub size: Vec2,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderable: Option<RenderableRecord>,
}

/// Collects the assets referenced while saving, handing out list indexes.
#[derive(Default)]
struct AssetTable {
    /// Directory of the level file; paths under it are written relative.
    base_dir: Option<PathBuf>,
    textures: Vec<TextureEntry>,
    texture_ids: HashMap<TextureHandle, usize>,
    sheets: Vec<SheetEntry>,
    sheet_ids: HashMap<SheetHandle, usize>,
    shaders: Vec<ShaderEntry>,
    shader_ids: HashMap<ShaderHandle, usize>,
}

impl AssetTable {
    fn for_dir(base_dir: Option<&Path>) -> Self {
        Self {
            base_dir: base_dir.map(Path::to_path_buf),
            ..Self::default()
        }
    }

    fn file_key(&self, path: &Path) -> String {
        self.base_dir
            .as_deref()
            .and_then(|dir| path.strip_prefix(dir).ok())
            .map_or_else(|| path_key(path), path_key)
    }

    fn texture(&mut self, assets: &Assets, handle: TextureHandle) -> Result<usize, AssetError> {
        if let Some(&id) = self.texture_ids.get(&handle) {
            return Ok(id);
        }
        let texture = assets
            .textures
            .get(handle)
            .ok_or_else(|| AssetError::UnknownTexture(format!("{handle:?}")))?;
        let entry = TextureEntry {
            path: texture.path().map(|p| self.file_key(p)),
            name: texture.name().map(str::to_string),
        };
        if entry.path.is_none() && entry.name.is_none() {
            return Err(AssetError::UnknownTexture(format!(
                "{handle:?} has neither a path nor a name"
            )));
        }
        let id = self.textures.len();
        self.textures.push(entry);
        self.texture_ids.insert(handle, id);
        Ok(id)
    }

    fn sheet(&mut self, assets: &Assets, handle: SheetHandle) -> Result<usize, AssetError> {
        if let Some(&id) = self.sheet_ids.get(&handle) {
            return Ok(id);
        }
        let sheet = assets
            .sheets
            .get(handle)
            .ok_or_else(|| AssetError::UnknownSheet(format!("{handle:?}")))?;
        let entry = match sheet.descriptor_path() {
            Some(path) => SheetEntry::Path(self.file_key(path)),
            None => {
                let mut descriptor = sheet.descriptor();
                descriptor.path = self.file_key(Path::new(&descriptor.path));
                SheetEntry::Inline(descriptor)
            }
        };
        let id = self.sheets.len();
        self.sheets.push(entry);
        self.sheet_ids.insert(handle, id);
        Ok(id)
    }

    fn shader(&mut self, assets: &Assets, handle: ShaderHandle) -> Result<usize, AssetError> {
        if let Some(&id) = self.shader_ids.get(&handle) {
            return Ok(id);
        }
        let shader = assets
            .shaders
            .get(handle)
            .ok_or_else(|| AssetError::UnknownShader(format!("{handle:?}")))?;
        let entry = ShaderEntry {
            name: shader.name().to_string(),
            vertex: shader.vertex_path().map(|p| self.file_key(p)),
            fragment: shader.fragment_path().map(|p| self.file_key(p)),
        };
        let id = self.shaders.len();
        self.shaders.push(entry);
        self.shader_ids.insert(handle, id);
        Ok(id)
    }

    fn texture_ref(&mut self, assets: &Assets, handle: TextureHandle) -> Result<TextureRef, AssetError> {
        let kind = assets
            .textures
            .get(handle)
            .map(|t| t.kind())
            .ok_or_else(|| AssetError::UnknownTexture(format!("{handle:?}")))?;
        Ok(match kind {
            TextureKind::SubTexture { sheet, index, .. } => TextureRef::Cell {
                sheet: self.sheet(assets, sheet)?,
                index,
            },
            TextureKind::Image | TextureKind::Sheet(_) => TextureRef::Image {
                texture: self.texture(assets, handle)?,
            },
        })
    }

    fn renderable(&mut self, assets: &Assets, r: &Renderable) -> Result<RenderableRecord, AssetError> {
        let texture = r
            .static_texture()
            .map(|t| self.texture_ref(assets, t))
            .transpose()?;
        let mut animations = Vec::with_capacity(r.animations().len());
        for animation in r.animations() {
            let Some(sheet) = animation.sheet() else {
                log::warn!("Not saving animation '{}' without a sheet", animation.name());
                continue;
            };
            animations.push(AnimationRef {
                sheet: self.sheet(assets, sheet)?,
                name: animation.name().to_string(),
            });
        }
        let shader = match r.shader() {
            Some(h) if Some(h) != assets.default_shader() => Some(self.shader(assets, h)?),
            _ => None,
        };
        Ok(RenderableRecord {
            texture,
            animations,
            shader,
            texture_repeat: r.texture_repeat(),
            flip_x: r.is_flip_x(),
            flip_y: r.is_flip_y(),
            autoplay: r.is_autoplay(),
        })
    }
}

/// Handles of the assets a level file lists, in list order.
struct Loaded {
    textures: Vec<TextureHandle>,
    sheets: Vec<SheetHandle>,
    shaders: Vec<ShaderHandle>,
}

impl Loaded {
    fn texture(&self, assets: &Assets, texture: TextureRef) -> Result<TextureHandle, AssetError> {
        match texture {
            TextureRef::Image { texture } => self
                .textures
                .get(texture)
                .copied()
                .ok_or_else(|| AssetError::UnknownTexture(format!("level texture #{texture}"))),
            TextureRef::Cell { sheet, index } => {
                let handle = self.sheet(sheet)?;
                let sheet = assets
                    .sheets
                    .get(handle)
                    .ok_or_else(|| AssetError::UnknownSheet(format!("{handle:?}")))?;
                sheet.get(index).ok_or(AssetError::SubTextureOutOfRange {
                    index,
                    count: sheet.count(),
                })
            }
        }
    }

    fn sheet(&self, sheet: usize) -> Result<SheetHandle, AssetError> {
        self.sheets
            .get(sheet)
            .copied()
            .ok_or_else(|| AssetError::UnknownSheet(format!("level sheet #{sheet}")))
    }

    fn renderable(&self, assets: &Assets, record: &RenderableRecord) -> Result<Renderable, AssetError> {
        let mut animations = Vec::with_capacity(record.animations.len());
        for anim in &record.animations {
            let handle = self.sheet(anim.sheet)?;
            match assets.sheets.get(handle).and_then(|s| s.animation(&anim.name)) {
                Some(template) => animations.push(template.clone()),
                None => log::warn!("Sheet #{} has no animation '{}'", anim.sheet, anim.name),
            }
        }
        let texture = record
            .texture
            .map(|t| self.texture(assets, t))
            .transpose()?;
        let mut renderable = match (texture, animations.is_empty()) {
            (Some(texture), true) => Renderable::from_texture(texture),
            (Some(texture), false) => Renderable::with_texture_and_animations(texture, animations),
            (None, _) => Renderable::from_animations(animations),
        };
        if let Some(shader) = record.shader {
            let handle = self
                .shaders
                .get(shader)
                .copied()
                .ok_or_else(|| AssetError::UnknownShader(format!("level shader #{shader}")))?;
            renderable = renderable.with_shader(handle);
        }
        renderable.set_texture_repeat(record.texture_repeat);
        renderable.set_flip_x(record.flip_x);
        renderable.set_flip_y(record.flip_y);
        renderable.set_autoplay(record.autoplay);
        if record.autoplay && renderable.has_animations() {
            renderable.play_animation();
        }
        Ok(renderable)
    }
}

/// The editable area a level is built in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditorSpace {
    width: u32,
    height: u32,
    tile_size: f32,
}

impl EditorSpace {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_size: Scene::DEFAULT_TILE_SIZE,
        }
    }

    pub fn with_tile_size(mut self, tile_size: f32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Whole tiles across.
    pub fn tile_width(&self) -> u32 {
        (self.width as f32 / self.tile_size) as u32
    }

    /// Whole tiles down.
    pub fn tile_height(&self) -> u32 {
        (self.height as f32 / self.tile_size) as u32
    }

    /// Place a copy of `prefab` at each of `positions`, floored to the tile
    /// grid. Each copy gets its own renderable and animation state.
    pub fn stamp(
        &self,
        scene: &mut Scene,
        assets: &Assets,
        prefab: &Entity,
        positions: &[Vec2],
    ) -> Vec<EntityId> {
        let tile = self.tile_size;
        positions
            .iter()
            .map(|p| {
                let at = Vec2::new(p.x - p.x % tile, p.y - p.y % tile);
                let copy = Entity {
                    transform: Transform::instance_of(&prefab.transform, at),
                    ..prefab.clone()
                };
                scene.add(copy, assets)
            })
            .collect()
    }

    /// Cover a rectangle of tiles with copies of `prefab`. `origin` and
    /// `size` are in tiles; cells are numbered row by row from the origin
    /// and those listed in `except` are left empty.
    pub fn fill(
        &self,
        scene: &mut Scene,
        assets: &Assets,
        prefab: &Entity,
        origin: (u32, u32),
        size: (u32, u32),
        except: &[usize],
    ) -> Vec<EntityId> {
        let (columns, rows) = size;
        let positions: Vec<Vec2> = (0..columns as usize * rows as usize)
            .filter(|cell| !except.contains(cell))
            .map(|cell| {
                let x = origin.0 + cell as u32 % columns;
                let y = origin.1 + cell as u32 / columns;
                Vec2::new(x as f32, y as f32) * self.tile_size
            })
            .collect();
        self.stamp(scene, assets, prefab, &positions)
    }

    /// Describe `scene` as a level file. Asset paths are written as they
    /// were loaded.
    pub fn capture(&self, scene: &Scene, assets: &Assets) -> Result<LevelFile, AssetError> {
        self.capture_in(None, scene, assets)
    }

    /// Like [`capture`](Self::capture), but asset paths under `level_dir`
    /// are written relative to it.
    pub fn capture_in(
        &self,
        level_dir: Option<&Path>,
        scene: &Scene,
        assets: &Assets,
    ) -> Result<LevelFile, AssetError> {
        let mut table = AssetTable::for_dir(level_dir);
        let mut level_objects = Vec::new();
        let mut game_objects = Vec::new();
        for (_, entity) in scene.entities() {
            let renderable = entity
                .renderable
                .as_ref()
                .map(|r| table.renderable(assets, r))
                .transpose()?;
            let t = &entity.transform;
            let record = ObjectRecord {
                position: t.position(),
                size: t.size(),
                rotation: t.angle(),
                renderable,
            };
            match entity.kind {
                EntityKind::LevelObject => level_objects.push(record),
                EntityKind::GameObject => game_objects.push(record),
            }
        }
        Ok(LevelFile {
            width: self.width,
            height: self.height,
            size: self.tile_size,
            textures: table.textures,
            sheets: table.sheets,
            shaders: table.shaders,
            level_objects,
            game_objects,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>, scene: &Scene, assets: &Assets) -> Result<(), AssetError> {
        let path = path.as_ref();
        self.capture_in(path.parent(), scene, assets)?.save(path)?;
        log::info!("Saved level: {}", path.display());
        Ok(())
    }

    /// Load the level at `path` into `scene`. Relative asset paths are
    /// tried against the level's directory first.
    pub fn load(
        path: impl AsRef<Path>,
        scene: &mut Scene,
        renderer: &mut Renderer,
        assets: &mut Assets,
    ) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let level = LevelFile::load(path)?;
        let space = Self::apply(&level, path.parent(), scene, renderer, assets)?;
        log::info!(
            "Loaded level {}: {} level objects, {} game objects",
            path.display(),
            level.level_objects.len(),
            level.game_objects.len()
        );
        Ok(space)
    }

    /// Register the level's assets and add its objects to `scene`.
    pub fn apply(
        level: &LevelFile,
        base_dir: Option<&Path>,
        scene: &mut Scene,
        renderer: &mut Renderer,
        assets: &mut Assets,
    ) -> Result<Self, AssetError> {
        let mut loaded = Loaded {
            textures: Vec::with_capacity(level.textures.len()),
            sheets: Vec::with_capacity(level.sheets.len()),
            shaders: Vec::with_capacity(level.shaders.len()),
        };
        for entry in &level.textures {
            let handle = match (&entry.path, &entry.name) {
                (Some(path), _) => assets.resolve_texture(renderer, path, base_dir)?,
                (None, Some(name)) => assets
                    .textures
                    .lookup(name)
                    .ok_or_else(|| AssetError::UnknownTexture(name.clone()))?,
                (None, None) => return Err(AssetError::UnknownTexture("unnamed".into())),
            };
            if let Some(name) = &entry.name {
                assets.textures.rename(handle, name);
            }
            loaded.textures.push(handle);
        }
        for entry in &level.sheets {
            let handle = match entry {
                SheetEntry::Path(path) => {
                    let relative = base_dir.map(|dir| dir.join(path)).filter(|p| p.exists());
                    match relative {
                        Some(full) => assets.load_sheet(renderer, full)?,
                        None => assets.load_sheet(renderer, path)?,
                    }
                }
                SheetEntry::Inline(descriptor) => {
                    assets.sheet_from_descriptor(renderer, descriptor, base_dir, None)?
                }
            };
            loaded.sheets.push(handle);
        }
        for entry in &level.shaders {
            let handle = match (&entry.vertex, &entry.fragment) {
                (Some(vs), Some(fs)) => {
                    let resolve = |p: &String| {
                        base_dir
                            .map(|dir| dir.join(p))
                            .filter(|full| full.exists())
                            .unwrap_or_else(|| p.into())
                    };
                    assets
                        .shaders
                        .load(renderer, &entry.name, resolve(vs), resolve(fs))?
                }
                _ => assets
                    .shaders
                    .lookup(&entry.name)
                    .ok_or_else(|| AssetError::UnknownShader(entry.name.clone()))?,
            };
            loaded.shaders.push(handle);
        }

        scene.set_tile_size(level.size);
        let objects = level
            .level_objects
            .iter()
            .map(|r| (EntityKind::LevelObject, r))
            .chain(level.game_objects.iter().map(|r| (EntityKind::GameObject, r)));
        for (kind, record) in objects {
            let renderable = record
                .renderable
                .as_ref()
                .map(|r| loaded.renderable(assets, r))
                .transpose()?;
            let transform = Transform::from_position(record.position)
                .with_size(record.size.x, record.size.y)
                .with_angle(record.rotation);
            scene.add(Entity::new(kind, transform, renderable), assets);
        }

        Ok(Self {
            width: level.width,
            height: level.height,
            tile_size: level.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Animation;

    #[test]
    fn texture_refs_parse_by_shape() {
        let cell: TextureRef = serde_json::from_str(r#"{ "sheet": 1, "index": 4 }"#).unwrap();
        assert_eq!(cell, TextureRef::Cell { sheet: 1, index: 4 });
        let image: TextureRef = serde_json::from_str(r#"{ "texture": 0 }"#).unwrap();
        assert_eq!(image, TextureRef::Image { texture: 0 });
    }

    #[test]
    fn missing_fields_take_defaults() {
        let record: ObjectRecord = serde_json::from_str(
            r#"{ "position": [1.0, 2.0, 0.0], "size": [16.0, 16.0], "renderable": {} }"#,
        )
        .unwrap();
        let renderable = record.renderable.unwrap();
        assert_eq!(renderable.texture_repeat, Vec2::ONE);
        assert!(!renderable.flip_x);
        assert_eq!(record.rotation, 0.0);
    }

    #[test]
    fn scene_survives_a_save_and_load() {
        let dir = std::env::temp_dir().join(format!("tessera-level-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let png = dir.join("hero.png");
        image::RgbaImage::new(32, 16).save(&png).unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        assets.ensure_default_shader(&mut renderer).unwrap();
        let tex = assets.load_texture(&mut renderer, &png).unwrap();
        let sheet = assets.create_sheet(tex, 16, 16).unwrap();
        assets.sheets.set_name(sheet, "hero");
        let walk = Animation::new("walk", vec![0, 1], 80.0).with_sheet(sheet);
        if let Some(s) = assets.sheets.get_mut(sheet) {
            s.add_animation(walk.clone());
        }
        let cell = assets.sheets.get(sheet).unwrap().get(1).unwrap();

        let mut scene = Scene::default();
        let mut hero = Renderable::with_texture_and_animations(cell, vec![walk]);
        hero.set_flip_x(true);
        scene.add(
            Entity::game_object(Transform::at(40.0, 8.0).with_size(16.0, 16.0), hero),
            &assets,
        );
        scene.add(
            Entity::level_object(Transform::at(0.0, 0.0), Renderable::from_texture(tex)),
            &assets,
        );

        let space = EditorSpace::new(320, 180);
        let file = dir.join("level.json");
        space.save(&file, &scene, &assets).unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut fresh = Assets::new();
        fresh.ensure_default_shader(&mut renderer).unwrap();
        let mut reloaded = Scene::default();
        let loaded = EditorSpace::load(&file, &mut reloaded, &mut renderer, &mut fresh).unwrap();

        assert_eq!(loaded.tile_width(), 20);
        assert_eq!(reloaded.len(), 2);
        let (_, hero) = reloaded
            .entities()
            .find(|(_, e)| e.kind == EntityKind::GameObject)
            .unwrap();
        assert_eq!(hero.transform.x(), 40.0);
        let r = hero.renderable.as_ref().unwrap();
        assert!(r.is_flip_x());
        assert_eq!(r.animation("walk").unwrap().frame_length(), 80.0);
        let sheet = fresh.sheets.lookup("hero").unwrap();
        assert_eq!(r.static_texture(), fresh.sheets.get(sheet).unwrap().get(1));
        std::fs::remove_dir_all(&dir).ok();
    }

    fn wall_prefab(renderer: &mut Renderer, assets: &mut Assets) -> Entity {
        let wall = assets
            .textures
            .insert_rgba(renderer, "wall", 1, 1, &[120, 120, 120, 255])
            .unwrap();
        Entity::level_object(
            Transform::at(0.0, 0.0).with_size(16.0, 16.0),
            Renderable::from_texture(wall),
        )
    }

    #[test]
    fn stamp_places_copies_on_the_tile_grid() {
        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let prefab = wall_prefab(&mut renderer, &mut assets);
        let mut scene = Scene::default();

        let space = EditorSpace::new(320, 180);
        let ids = space.stamp(
            &mut scene,
            &assets,
            &prefab,
            &[Vec2::new(3.0, 5.0), Vec2::new(35.0, 17.0), Vec2::new(64.0, 0.0)],
        );
        assert_eq!(ids.len(), 3);
        let placed: Vec<(f32, f32)> = ids
            .iter()
            .map(|&id| {
                let t = &scene.get(id).unwrap().transform;
                (t.x(), t.y())
            })
            .collect();
        assert_eq!(placed, vec![(0.0, 0.0), (32.0, 16.0), (64.0, 0.0)]);
        assert!(ids.iter().all(|&id| scene.get(id).unwrap().transform.size() == Vec2::splat(16.0)));
    }

    #[test]
    fn stamped_copies_animate_independently() {
        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let mut prefab = wall_prefab(&mut renderer, &mut assets);
        prefab.renderable = Some(Renderable::from_animations(vec![Animation::new(
            "flicker",
            vec![0, 1, 2],
            100.0,
        )]));
        let mut scene = Scene::default();
        let ids = EditorSpace::new(64, 64).stamp(
            &mut scene,
            &assets,
            &prefab,
            &[Vec2::ZERO, Vec2::new(16.0, 0.0)],
        );

        let first = scene.get_mut(ids[0]).unwrap().renderable.as_mut().unwrap();
        first.play_animation();
        first.update(std::time::Duration::from_millis(150));
        let frame_of = |id: EntityId| {
            let renderable = scene.get(id).unwrap().renderable.as_ref().unwrap();
            renderable.current_animation().unwrap().current_frame()
        };
        assert_eq!(frame_of(ids[0]), 1);
        assert_eq!(frame_of(ids[1]), 0);
    }

    #[test]
    fn fill_covers_the_rect_minus_exceptions() {
        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let prefab = wall_prefab(&mut renderer, &mut assets);
        let mut scene = Scene::default();

        let space = EditorSpace::new(320, 180).with_tile_size(8.0);
        let ids = space.fill(&mut scene, &assets, &prefab, (2, 1), (3, 2), &[1, 5]);
        assert_eq!(ids.len(), 4);
        let mut placed: Vec<(f32, f32)> = ids
            .iter()
            .map(|&id| {
                let t = &scene.get(id).unwrap().transform;
                (t.x(), t.y())
            })
            .collect();
        placed.sort_by(|a, b| a.partial_cmp(b).unwrap());
        // cells 0, 2, 3, 4 of a 3x2 block starting at tile (2, 1)
        assert_eq!(placed, vec![(16.0, 8.0), (16.0, 16.0), (24.0, 16.0), (32.0, 8.0)]);
    }

    #[test]
    fn saved_paths_are_relative_to_the_level() {
        let root = std::env::temp_dir().join(format!("tessera-level-move-{}", std::process::id()));
        let dir = root.join("before");
        std::fs::create_dir_all(&dir).unwrap();
        let png = dir.join("tiles.png");
        image::RgbaImage::new(32, 16).save(&png).unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        assets.ensure_default_shader(&mut renderer).unwrap();
        let tex = assets.load_texture(&mut renderer, &png).unwrap();
        let sheet = assets.create_sheet(tex, 16, 16).unwrap();
        let cell = assets.sheets.get(sheet).unwrap().get(1).unwrap();
        let mut scene = Scene::default();
        scene.add(
            Entity::level_object(Transform::at(0.0, 0.0), Renderable::from_texture(tex)),
            &assets,
        );
        scene.add(
            Entity::level_object(Transform::at(16.0, 0.0), Renderable::from_texture(cell)),
            &assets,
        );
        EditorSpace::new(64, 64)
            .save(dir.join("level.json"), &scene, &assets)
            .unwrap();

        let file = LevelFile::load(dir.join("level.json")).unwrap();
        assert_eq!(file.textures[0].path.as_deref(), Some("tiles.png"));
        match &file.sheets[0] {
            SheetEntry::Inline(descriptor) => assert_eq!(descriptor.path, "tiles.png"),
            other => panic!("expected an inline sheet, got {other:?}"),
        }

        let moved = root.join("after");
        std::fs::rename(&dir, &moved).unwrap();
        let (mut renderer, _log) = Renderer::headless();
        let mut fresh = Assets::new();
        fresh.ensure_default_shader(&mut renderer).unwrap();
        let mut reloaded = Scene::default();
        EditorSpace::load(moved.join("level.json"), &mut reloaded, &mut renderer, &mut fresh).unwrap();
        assert_eq!(reloaded.len(), 2);
        std::fs::remove_dir_all(&root).ok();
    }
}
