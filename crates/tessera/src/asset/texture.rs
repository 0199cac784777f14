//! # Textures and the texture store
//!
//! Entities never hold GPU textures directly. [`TextureStore::load`] returns
//! a [`TextureHandle`], a `Copy` index into the store, which owns the GPU
//! side through the [`Renderer`].
//!
//! ```text
//! TextureStore
//! ┌──────────────────────────────────────────────────────────┐
//! │ entries: Vec<Texture>                                    │
//! │   [0] "res/hero.png"    Sheet(SheetHandle(0))            │
//! │   [1]  hero #0          SubTexture { base: 0, (0, 0) }   │
//! │   [2]  hero #1          SubTexture { base: 0, (16, 0) }  │
//! │   [3] "res/wall.png"    Image                            │
//! │                                                          │
//! │ keys: HashMap<String, TextureHandle>                     │
//! │   "res/hero.png" → 0    "hero_idle" → 1    "wall" → 3    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Sub-textures are entries too, so a renderable can point at one frame of
//! a sheet with the same handle type it uses for a plain image. They carry
//! no GPU image of their own; [`TextureStore::escape`] maps them back to the
//! sheet's base texture, which is what the scene binds.
//!
//! A texture is registered under its path and at most one name. Renaming
//! drops the previous name key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::asset::{AssetError, SheetHandle};
use crate::math::Vec2;
use crate::render::{GpuTexture, Renderer};

/// Handle to a texture in the [`TextureStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) usize);

/// What a texture entry is. Being a sheet and being a sub-texture are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureKind {
    Image,
    /// The base image of a sheet.
    Sheet(SheetHandle),
    /// One grid cell of a sheet.
    SubTexture {
        sheet: SheetHandle,
        base: TextureHandle,
        index: usize,
        /// Top-left corner of the cell in pixels.
        offset: Vec2,
    },
}

#[derive(Debug, Clone)]
pub struct Texture {
    path: Option<PathBuf>,
    name: Option<String>,
    width: u32,
    height: u32,
    kind: TextureKind,
    gpu: Option<GpuTexture>,
}

impl Texture {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn is_sheet(&self) -> bool {
        matches!(self.kind, TextureKind::Sheet(_))
    }

    pub fn is_sub_texture(&self) -> bool {
        matches!(self.kind, TextureKind::SubTexture { .. })
    }

    /// The sheet this texture is the base of, or a cell of.
    pub fn sheet(&self) -> Option<SheetHandle> {
        match self.kind {
            TextureKind::Image => None,
            TextureKind::Sheet(sheet) | TextureKind::SubTexture { sheet, .. } => Some(sheet),
        }
    }

    /// Pixel offset of a sub-texture within its sheet.
    pub fn offset(&self) -> Option<Vec2> {
        match self.kind {
            TextureKind::SubTexture { offset, .. } => Some(offset),
            _ => None,
        }
    }

    /// The GPU image. `None` for sub-textures and destroyed textures.
    pub fn gpu(&self) -> Option<GpuTexture> {
        self.gpu
    }
}

/// Handle-indexed texture storage keyed by path and name.
#[derive(Debug, Default)]
pub struct TextureStore {
    entries: Vec<Texture>,
    keys: HashMap<String, TextureHandle>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and upload an image. Loading the same path twice returns the
    /// first handle.
    pub fn load(
        &mut self,
        renderer: &mut Renderer,
        path: impl AsRef<Path>,
    ) -> Result<TextureHandle, AssetError> {
        let path = path.as_ref();
        let key = path_key(path);
        if let Some(&handle) = self.keys.get(&key) {
            if self.entries[handle.0].gpu.is_some() {
                return Ok(handle);
            }
        }

        let img = image::open(path)
            .map_err(|source| AssetError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let gpu = renderer.create_texture(&key, width, height, &img)?;

        let handle = self.push(Texture {
            path: Some(path.to_path_buf()),
            name: None,
            width,
            height,
            kind: TextureKind::Image,
            gpu: Some(gpu),
        });
        self.keys.insert(key, handle);
        log::info!("Loaded texture: {} ({width}x{height})", path.display());
        Ok(handle)
    }

    /// Upload raw RGBA8 pixels under `name`.
    pub fn insert_rgba(
        &mut self,
        renderer: &mut Renderer,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureHandle, AssetError> {
        let gpu = renderer.create_texture(name, width, height, rgba)?;
        let handle = self.push(Texture {
            path: None,
            name: None,
            width,
            height,
            kind: TextureKind::Image,
            gpu: Some(gpu),
        });
        self.rename(handle, name);
        Ok(handle)
    }

    pub(crate) fn insert_sub(
        &mut self,
        sheet: SheetHandle,
        base: TextureHandle,
        index: usize,
        offset: Vec2,
        width: u32,
        height: u32,
    ) -> TextureHandle {
        self.push(Texture {
            path: None,
            name: None,
            width,
            height,
            kind: TextureKind::SubTexture {
                sheet,
                base,
                index,
                offset,
            },
            gpu: None,
        })
    }

    pub(crate) fn mark_sheet(&mut self, handle: TextureHandle, sheet: SheetHandle) {
        if let Some(texture) = self.entries.get_mut(handle.0) {
            texture.kind = TextureKind::Sheet(sheet);
        }
    }

    fn push(&mut self, texture: Texture) -> TextureHandle {
        let handle = TextureHandle(self.entries.len());
        self.entries.push(texture);
        handle
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        self.entries.get(handle.0)
    }

    /// Find a texture by path or name.
    pub fn lookup(&self, key: &str) -> Option<TextureHandle> {
        self.keys.get(key).copied()
    }

    /// Give a texture a name, replacing any previous name.
    pub fn rename(&mut self, handle: TextureHandle, name: &str) {
        let Some(texture) = self.entries.get_mut(handle.0) else {
            return;
        };
        if texture.name.as_deref() == Some(name) {
            return;
        }
        if let Some(old) = texture.name.replace(name.to_string()) {
            if self.keys.get(&old) == Some(&handle) {
                self.keys.remove(&old);
            }
        }
        if let Some(previous) = self.keys.insert(name.to_string(), handle) {
            if previous != handle {
                log::warn!("Texture name '{name}' moved from {previous:?} to {handle:?}");
                if let Some(other) = self.entries.get_mut(previous.0) {
                    other.name = None;
                }
            }
        }
    }

    /// Every key that resolves to `handle`, sorted.
    pub fn aliases(&self, handle: TextureHandle) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .keys
            .iter()
            .filter(|(_, h)| **h == handle)
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// The texture the scene binds for `handle`: the sheet base for a
    /// sub-texture, otherwise `handle` itself.
    pub fn escape(&self, handle: TextureHandle) -> TextureHandle {
        match self.get(handle).map(|t| t.kind) {
            Some(TextureKind::SubTexture { base, .. }) => base,
            _ => handle,
        }
    }

    /// Release the GPU image and unregister the texture's keys. Handles stay
    /// valid but resolve to a texture without a GPU image. Sub-textures are
    /// left alone.
    pub fn destroy(&mut self, renderer: &mut Renderer, handle: TextureHandle) {
        let Some(texture) = self.entries.get_mut(handle.0) else {
            return;
        };
        if texture.is_sub_texture() {
            return;
        }
        if let Some(gpu) = texture.gpu.take() {
            renderer.destroy_texture(gpu);
        }
        texture.name = None;
        self.keys.retain(|_, h| *h != handle);
    }

    /// Destroy every texture that owns a GPU image.
    pub fn destroy_all(&mut self, renderer: &mut Renderer) {
        for index in 0..self.entries.len() {
            self.destroy(renderer, TextureHandle(index));
        }
    }

    /// Load every PNG in `dir`, named by file stem.
    pub fn load_dir(
        &mut self,
        renderer: &mut Renderer,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<TextureHandle>, AssetError> {
        let dir = dir.as_ref();
        let mut loaded = Vec::new();
        for path in sorted_entries(dir)? {
            if !has_extension(&path, "png") {
                continue;
            }
            match self.load(renderer, &path) {
                Ok(handle) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        self.rename(handle, stem);
                    }
                    loaded.push(handle);
                }
                Err(e) => log::warn!("Skipping texture {}: {e}", path.display()),
            }
        }
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TextureHandle, &Texture)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, t)| (TextureHandle(i), t))
    }
}

/// The key a path is registered under.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Files in `dir`, sorted for a stable load order.
pub(crate) fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, AssetError> {
    let read = std::fs::read_dir(dir).map_err(|source| AssetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = read
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}
