//! # Texture sheets
//!
//! A sheet splits one image into a uniform grid. Cells are numbered in
//! row-major order from the top-left:
//!
//! ```text
//!  W = 64, sub = 16x16  →  per_width = 4
//!  ┌────┬────┬────┬────┐
//!  │ 0  │ 1  │ 2  │ 3  │   offset(i) = (16 * (i % 4), 16 * (i / 4))
//!  ├────┼────┼────┼────┤
//!  │ 4  │ 5  │ 6  │ 7  │
//!  └────┴────┴────┴────┘
//! ```
//!
//! Grid dimensions use integer division, so a partial row or column at the
//! edge of the image is ignored. Each cell becomes a sub-texture entry in
//! the [`TextureStore`].
//!
//! Sheets are persisted as a small JSON descriptor (see [`SheetDescriptor`])
//! naming the source image, the cell size, cell names and animations.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::asset::texture::path_key;
use crate::asset::{Animation, AssetError, TextureHandle, TextureStore};
use crate::math::Vec2;

/// Handle to a sheet in the [`SheetStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SheetHandle(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct TextureSheet {
    name: Option<String>,
    texture: TextureHandle,
    texture_path: Option<String>,
    descriptor_path: Option<PathBuf>,
    width: u32,
    height: u32,
    sub_width: u32,
    sub_height: u32,
    per_width: u32,
    per_height: u32,
    subs: Vec<TextureHandle>,
    /// Cell index → name.
    mappings: BTreeMap<usize, String>,
    animations: BTreeMap<String, Animation>,
}

impl TextureSheet {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The base texture the cells are cut from.
    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn descriptor_path(&self) -> Option<&Path> {
        self.descriptor_path.as_deref()
    }

    /// Source image width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn sub_width(&self) -> u32 {
        self.sub_width
    }

    pub fn sub_height(&self) -> u32 {
        self.sub_height
    }

    pub fn sub_size(&self) -> Vec2 {
        Vec2::new(self.sub_width as f32, self.sub_height as f32)
    }

    /// Cells per row.
    pub fn per_width(&self) -> u32 {
        self.per_width
    }

    /// Cells per column.
    pub fn per_height(&self) -> u32 {
        self.per_height
    }

    pub fn count(&self) -> usize {
        self.subs.len()
    }

    pub fn get(&self, index: usize) -> Option<TextureHandle> {
        self.subs.get(index).copied()
    }

    /// Cell at grid column `x`, row `y`.
    pub fn get_xy(&self, x: u32, y: u32) -> Option<TextureHandle> {
        if x >= self.per_width || y >= self.per_height {
            return None;
        }
        self.get((x + y * self.per_width) as usize)
    }

    /// Cell containing pixel `(px, py)` of the source image.
    pub fn get_at_pixel(&self, px: u32, py: u32) -> Option<TextureHandle> {
        self.get_xy(px / self.sub_width, py / self.sub_height)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.mappings
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(i, _)| *i)
    }

    pub fn sub_name(&self, index: usize) -> Option<&str> {
        self.mappings.get(&index).map(String::as_str)
    }

    /// Cell names by index.
    pub fn mappings(&self) -> &BTreeMap<usize, String> {
        &self.mappings
    }

    /// Name cell `index`, replacing any other cell's claim on `name`. The
    /// sub-texture is renamed in `textures` as well.
    pub fn set_sub_name(
        &mut self,
        textures: &mut TextureStore,
        index: usize,
        name: &str,
    ) -> Result<(), AssetError> {
        let Some(handle) = self.get(index) else {
            return Err(AssetError::SubTextureOutOfRange {
                index,
                count: self.count(),
            });
        };
        if self.sub_name(index) == Some(name) {
            return Ok(());
        }
        self.mappings.retain(|_, n| n.as_str() != name);
        self.mappings.insert(index, name.to_string());
        textures.rename(handle, name);
        Ok(())
    }

    pub fn animations(&self) -> impl Iterator<Item = &Animation> {
        self.animations.values()
    }

    pub fn animation(&self, name: &str) -> Option<&Animation> {
        self.animations.get(name)
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.animations.contains_key(name)
    }

    pub fn add_animation(&mut self, animation: Animation) {
        self.animations.insert(animation.name().to_string(), animation);
    }

    pub fn set_animations(&mut self, animations: impl IntoIterator<Item = Animation>) {
        self.animations.clear();
        for animation in animations {
            self.add_animation(animation);
        }
    }

    /// The persisted form of this sheet. Mappings are sorted by id and
    /// animations by name.
    pub fn descriptor(&self) -> SheetDescriptor {
        SheetDescriptor {
            name: self.name.clone(),
            kind: Some(SheetDescriptor::KIND.to_string()),
            path: self.texture_path.clone().unwrap_or_default(),
            width: self.sub_width,
            height: self.sub_height,
            mappings: self
                .mappings
                .iter()
                .map(|(&id, name)| Mapping {
                    id,
                    name: name.clone(),
                })
                .collect(),
            animations: self
                .animations
                .values()
                .map(|a| AnimationRecord {
                    name: a.name().to_string(),
                    frames: a.frames_csv(),
                    frame_length: a.frame_length(),
                    texture_sheet: self.name.clone(),
                })
                .collect(),
        }
    }

    /// Write the descriptor as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        self.descriptor().save(path)
    }
}

/// `{"id": 3, "name": "hero_jump"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub id: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationRecord {
    pub name: String,
    /// Comma separated frame indices.
    pub frames: String,
    #[serde(rename = "frameLength", default = "default_frame_length")]
    pub frame_length: f32,
    #[serde(rename = "textureSheet", default, skip_serializing_if = "Option::is_none")]
    pub texture_sheet: Option<String>,
}

fn default_frame_length() -> f32 {
    Animation::DEFAULT_FRAME_LENGTH
}

/// On-disk sheet description.
///
/// ```json
/// {
///   "name": "hero",
///   "type": "spritesheet",
///   "path": "res/hero.png",
///   "width": 16,
///   "height": 16,
///   "mappings": [{ "id": 0, "name": "hero_idle" }],
///   "animations": [{ "name": "walk", "frames": "1,2,3", "frameLength": 120.0 }]
/// }
/// ```
///
/// `width` and `height` are the cell size, not the image size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub path: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub animations: Vec<AnimationRecord>,
}

impl SheetDescriptor {
    pub const KIND: &'static str = "spritesheet";

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| AssetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AssetError> {
        let path = path.as_ref();
        let json = self.to_json().map_err(|source| AssetError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Handle-indexed sheet storage keyed by name, descriptor path and source
/// texture path.
#[derive(Debug, Default)]
pub struct SheetStore {
    entries: Vec<TextureSheet>,
    keys: HashMap<String, SheetHandle>,
}

impl SheetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut `texture` into `sub_width` x `sub_height` cells.
    ///
    /// A texture can back one sheet only; asking again returns the existing
    /// sheet with a warning.
    pub fn create(
        &mut self,
        textures: &mut TextureStore,
        texture: TextureHandle,
        sub_width: u32,
        sub_height: u32,
    ) -> Result<SheetHandle, AssetError> {
        let base = textures
            .get(texture)
            .ok_or_else(|| AssetError::UnknownTexture(format!("{texture:?}")))?;
        if let Some(existing) = base.sheet() {
            log::warn!("Texture {texture:?} is already a sheet or a sheet cell");
            return Ok(existing);
        }
        let (width, height) = (base.width(), base.height());
        if sub_width == 0 || sub_height == 0 {
            return Err(AssetError::InvalidSheet(format!(
                "cell size {sub_width}x{sub_height} must be non-zero"
            )));
        }
        if sub_width > width || sub_height > height {
            return Err(AssetError::InvalidSheet(format!(
                "cell size {sub_width}x{sub_height} exceeds image {width}x{height}"
            )));
        }
        let texture_path = base
            .path()
            .map(path_key)
            .or_else(|| base.name().map(str::to_string));

        let handle = SheetHandle(self.entries.len());
        let per_width = width / sub_width;
        let per_height = height / sub_height;
        let count = (per_width * per_height) as usize;
        let mut subs = Vec::with_capacity(count);
        for index in 0..count {
            let i = index as u32;
            let offset = Vec2::new(
                (sub_width * (i % per_width)) as f32,
                (sub_height * (i / per_width)) as f32,
            );
            subs.push(textures.insert_sub(handle, texture, index, offset, sub_width, sub_height));
        }
        textures.mark_sheet(texture, handle);

        if let Some(path) = &texture_path {
            self.keys.insert(path.clone(), handle);
        }
        self.entries.push(TextureSheet {
            name: None,
            texture,
            texture_path,
            descriptor_path: None,
            width,
            height,
            sub_width,
            sub_height,
            per_width,
            per_height,
            subs,
            mappings: BTreeMap::new(),
            animations: BTreeMap::new(),
        });
        log::debug!("Created sheet {handle:?}: {per_width}x{per_height} cells of {sub_width}x{sub_height}");
        Ok(handle)
    }

    /// Build a sheet from a parsed descriptor. `texture` is the already
    /// loaded source image named by `descriptor.path`.
    ///
    /// Animation frame lists are checked before anything is registered, so
    /// a bad descriptor leaves the stores untouched.
    pub fn create_from_descriptor(
        &mut self,
        textures: &mut TextureStore,
        texture: TextureHandle,
        descriptor: &SheetDescriptor,
        descriptor_path: Option<&Path>,
    ) -> Result<SheetHandle, AssetError> {
        let base = textures
            .get(texture)
            .ok_or_else(|| AssetError::UnknownTexture(format!("{texture:?}")))?;
        let count = match (descriptor.width, descriptor.height) {
            (0, _) | (_, 0) => 0,
            (w, h) => ((base.width() / w) * (base.height() / h)) as usize,
        };
        let mut animations = Vec::with_capacity(descriptor.animations.len());
        for record in &descriptor.animations {
            let frames = Animation::parse_frames(&record.frames).map_err(|e| {
                AssetError::InvalidSheet(format!("animation '{}' frames: {e}", record.name))
            })?;
            if let Some(&bad) = frames.iter().find(|&&f| f >= count) {
                return Err(AssetError::SubTextureOutOfRange { index: bad, count });
            }
            animations.push((record, frames));
        }

        let handle = self.create(textures, texture, descriptor.width, descriptor.height)?;
        if let Some(name) = &descriptor.name {
            self.set_name(handle, name);
        }
        if let Some(path) = descriptor_path {
            let key = path_key(path);
            self.keys.insert(key, handle);
            if let Some(sheet) = self.entries.get_mut(handle.0) {
                sheet.descriptor_path = Some(path.to_path_buf());
            }
        }

        let Some(sheet) = self.entries.get_mut(handle.0) else {
            return Ok(handle);
        };
        for mapping in &descriptor.mappings {
            if let Err(e) = sheet.set_sub_name(textures, mapping.id, &mapping.name) {
                log::warn!("Skipping mapping '{}': {e}", mapping.name);
            }
        }
        for (record, frames) in animations {
            sheet.add_animation(
                Animation::new(record.name.clone(), frames, record.frame_length).with_sheet(handle),
            );
        }
        Ok(handle)
    }

    pub fn get(&self, handle: SheetHandle) -> Option<&TextureSheet> {
        self.entries.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: SheetHandle) -> Option<&mut TextureSheet> {
        self.entries.get_mut(handle.0)
    }

    /// Find a sheet by name, descriptor path or source texture path.
    pub fn lookup(&self, key: &str) -> Option<SheetHandle> {
        self.keys.get(key).copied()
    }

    pub fn set_name(&mut self, handle: SheetHandle, name: &str) {
        let Some(sheet) = self.entries.get_mut(handle.0) else {
            return;
        };
        if let Some(old) = sheet.name.replace(name.to_string()) {
            if old != name && self.keys.get(&old) == Some(&handle) {
                self.keys.remove(&old);
            }
        }
        self.keys.insert(name.to_string(), handle);
    }

    /// Look up an animation template across all sheets.
    pub fn find_animation(&self, name: &str) -> Option<&Animation> {
        self.entries.iter().find_map(|s| s.animation(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SheetHandle, &TextureSheet)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, s)| (SheetHandle(i), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Renderer;

    fn setup(w: u32, h: u32) -> (Renderer, TextureStore, SheetStore, TextureHandle) {
        let (mut renderer, _log) = Renderer::headless();
        let mut textures = TextureStore::new();
        let data = vec![0u8; (w * h * 4) as usize];
        let tex = textures.insert_rgba(&mut renderer, "atlas", w, h, &data).unwrap();
        (renderer, textures, SheetStore::new(), tex)
    }

    #[test]
    fn grid_uses_integer_division() {
        let (_r, mut textures, mut sheets, tex) = setup(70, 35);
        let handle = sheets.create(&mut textures, tex, 16, 16).unwrap();
        let sheet = sheets.get(handle).unwrap();
        assert_eq!(sheet.per_width(), 4);
        assert_eq!(sheet.per_height(), 2);
        assert_eq!(sheet.count(), 8);
    }

    #[test]
    fn cells_carry_row_major_offsets() {
        let (_r, mut textures, mut sheets, tex) = setup(64, 32);
        let handle = sheets.create(&mut textures, tex, 16, 16).unwrap();
        let sheet = sheets.get(handle).unwrap();

        let cell = textures.get(sheet.get(5).unwrap()).unwrap();
        assert_eq!(cell.offset(), Some(Vec2::new(16.0, 16.0)));
        assert!(cell.is_sub_texture());
        assert!(!cell.is_sheet());
        assert!(textures.get(tex).unwrap().is_sheet());

        assert_eq!(sheet.get_xy(1, 1), sheet.get(5));
        assert_eq!(sheet.get_at_pixel(40, 20), sheet.get(6));
        assert_eq!(sheet.get_xy(4, 0), None);
        assert_eq!(textures.escape(sheet.get(5).unwrap()), tex);
    }

    #[test]
    fn bad_cell_sizes_are_rejected() {
        let (_r, mut textures, mut sheets, tex) = setup(32, 32);
        assert!(matches!(
            sheets.create(&mut textures, tex, 0, 16),
            Err(AssetError::InvalidSheet(_))
        ));
        assert!(matches!(
            sheets.create(&mut textures, tex, 64, 16),
            Err(AssetError::InvalidSheet(_))
        ));
        assert!(sheets.is_empty());
    }

    #[test]
    fn creating_twice_returns_existing_sheet() {
        let (_r, mut textures, mut sheets, tex) = setup(32, 32);
        let first = sheets.create(&mut textures, tex, 16, 16).unwrap();
        let second = sheets.create(&mut textures, tex, 8, 8).unwrap();
        assert_eq!(first, second);
        assert_eq!(sheets.len(), 1);
    }

    #[test]
    fn sub_names_follow_renames() {
        let (_r, mut textures, mut sheets, tex) = setup(32, 16);
        let handle = sheets.create(&mut textures, tex, 16, 16).unwrap();
        let sheet = sheets.get_mut(handle).unwrap();
        sheet.set_sub_name(&mut textures, 0, "left").unwrap();
        sheet.set_sub_name(&mut textures, 1, "left").unwrap();

        assert_eq!(sheet.index_of("left"), Some(1));
        assert_eq!(sheet.sub_name(0), None);
        assert_eq!(textures.lookup("left"), sheet.get(1));
        assert!(matches!(
            sheet.set_sub_name(&mut textures, 9, "nope"),
            Err(AssetError::SubTextureOutOfRange { index: 9, count: 2 })
        ));
    }

    #[test]
    fn descriptor_round_trip_preserves_names_and_animations() {
        let (_r, mut textures, mut sheets, tex) = setup(64, 16);
        let json = r#"{
            "name": "hero",
            "path": "atlas",
            "width": 16,
            "height": 16,
            "mappings": [{"id": 2, "name": "hero_jump"}, {"id": 0, "name": "hero_idle"}],
            "animations": [
                {"name": "walk", "frames": "0,1,2,", "frameLength": 120},
                {"name": "blink", "frames": "3", "frameLength": 80}
            ]
        }"#;
        let descriptor = SheetDescriptor::from_json(json).unwrap();
        let handle = sheets
            .create_from_descriptor(&mut textures, tex, &descriptor, None)
            .unwrap();
        let sheet = sheets.get(handle).unwrap();
        assert_eq!(sheets.lookup("hero"), Some(handle));
        assert_eq!(sheet.index_of("hero_jump"), Some(2));
        assert_eq!(sheet.animation("walk").unwrap().frames(), &[0, 1, 2]);

        let saved = sheet.descriptor();
        assert_eq!(saved.mappings[0].name, "hero_idle");
        assert_eq!(saved.animations[0].name, "blink");
        assert_eq!(saved.animations[1].frames, "0,1,2");

        let reparsed = SheetDescriptor::from_json(&saved.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, saved);
        assert_eq!(reparsed.kind.as_deref(), Some("spritesheet"));
    }

    #[test]
    fn animation_frames_must_exist() {
        let (_r, mut textures, mut sheets, tex) = setup(32, 16);
        let descriptor = SheetDescriptor {
            name: None,
            kind: None,
            path: "atlas".into(),
            width: 16,
            height: 16,
            mappings: vec![],
            animations: vec![AnimationRecord {
                name: "far".into(),
                frames: "0,7".into(),
                frame_length: 100.0,
                texture_sheet: None,
            }],
        };
        let err = sheets
            .create_from_descriptor(&mut textures, tex, &descriptor, None)
            .unwrap_err();
        assert!(matches!(err, AssetError::SubTextureOutOfRange { index: 7, .. }));
        assert!(sheets.is_empty());
        assert!(!textures.get(tex).unwrap().is_sheet());
    }

    #[test]
    fn unparsable_frames_register_nothing() {
        let (_r, mut textures, mut sheets, tex) = setup(32, 16);
        let textures_before = textures.len();
        let descriptor = SheetDescriptor {
            name: Some("hero".into()),
            kind: None,
            path: "atlas".into(),
            width: 16,
            height: 16,
            mappings: vec![],
            animations: vec![AnimationRecord {
                name: "walk".into(),
                frames: "0,x".into(),
                frame_length: 100.0,
                texture_sheet: None,
            }],
        };
        let err = sheets
            .create_from_descriptor(&mut textures, tex, &descriptor, None)
            .unwrap_err();
        assert!(matches!(err, AssetError::InvalidSheet(_)));
        assert_eq!(sheets.lookup("hero"), None);
        assert!(sheets.is_empty());
        assert_eq!(textures.len(), textures_before);
    }
}
