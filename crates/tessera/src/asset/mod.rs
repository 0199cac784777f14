//! # Asset registry
//!
//! [`Assets`] owns every texture, sheet and shader the game has loaded.
//! It lives in the engine context and is passed by reference to whatever
//! needs a lookup; there are no global tables.
//!
//! ```text
//! Assets
//! ├── textures: TextureStore   images, sheet bases, sheet cells
//! ├── sheets:   SheetStore     grids + named cells + animation templates
//! ├── shaders:  ShaderStore    programs + uniform caches
//! └── default_shader           used by renderables without a shader
//! ```
//!
//! Loading failures are [`AssetError`]s. Bulk loaders (`load_dir`) log and
//! skip broken files so one bad asset doesn't stop the game.

mod animation;
mod shader;
mod sheet;
mod texture;

pub use animation::Animation;
pub use shader::{Shader, ShaderHandle, ShaderStore};
pub use sheet::{AnimationRecord, Mapping, SheetDescriptor, SheetHandle, SheetStore, TextureSheet};
pub use texture::{Texture, TextureHandle, TextureKind, TextureStore};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::render::{RenderError, Renderer};
pub(crate) use texture::path_key;
use texture::{has_extension, sorted_entries};

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unknown texture: {0}")]
    UnknownTexture(String),

    #[error("unknown sheet: {0}")]
    UnknownSheet(String),

    #[error("unknown shader: {0}")]
    UnknownShader(String),

    #[error("sub-texture {index} out of range (sheet has {count})")]
    SubTextureOutOfRange { index: usize, count: usize },

    #[error("invalid sheet: {0}")]
    InvalidSheet(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// What [`Assets::load_dir`] picked up.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub textures: usize,
    pub sheets: usize,
    pub shaders: usize,
}

#[derive(Debug, Default)]
pub struct Assets {
    pub textures: TextureStore,
    pub sheets: SheetStore,
    pub shaders: ShaderStore,
    default_shader: Option<ShaderHandle>,
}

impl Assets {
    pub const DEFAULT_SHADER: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the built-in quad shader on first call.
    pub fn ensure_default_shader(&mut self, renderer: &mut Renderer) -> Result<ShaderHandle, AssetError> {
        if let Some(handle) = self.default_shader {
            if self.shaders.get(handle).is_some_and(|s| !s.is_destroyed()) {
                return Ok(handle);
            }
        }
        let src = crate::render::QUAD_SHADER;
        let handle = self
            .shaders
            .create_from_source(renderer, Self::DEFAULT_SHADER, src, src)?;
        self.default_shader = Some(handle);
        Ok(handle)
    }

    pub fn default_shader(&self) -> Option<ShaderHandle> {
        self.default_shader
    }

    pub fn set_default_shader(&mut self, handle: ShaderHandle) {
        self.default_shader = Some(handle);
    }

    /// The shader a renderable draws with.
    pub fn resolve_shader(&self, shader: Option<ShaderHandle>) -> Option<ShaderHandle> {
        shader.or(self.default_shader)
    }

    /// The texture the scene binds for `texture`.
    pub fn escape(&self, texture: TextureHandle) -> TextureHandle {
        self.textures.escape(texture)
    }

    pub fn load_texture(
        &mut self,
        renderer: &mut Renderer,
        path: impl AsRef<Path>,
    ) -> Result<TextureHandle, AssetError> {
        self.textures.load(renderer, path)
    }

    pub fn create_sheet(
        &mut self,
        texture: TextureHandle,
        sub_width: u32,
        sub_height: u32,
    ) -> Result<SheetHandle, AssetError> {
        self.sheets.create(&mut self.textures, texture, sub_width, sub_height)
    }

    /// Load a sheet descriptor and the image it names. The image path is
    /// tried as a registered key, then relative to the descriptor, then as
    /// given.
    pub fn load_sheet(
        &mut self,
        renderer: &mut Renderer,
        path: impl AsRef<Path>,
    ) -> Result<SheetHandle, AssetError> {
        let path = path.as_ref();
        if let Some(handle) = self.sheets.lookup(&path_key(path)) {
            return Ok(handle);
        }
        let descriptor = SheetDescriptor::load(path)?;
        let handle = self.sheet_from_descriptor(renderer, &descriptor, path.parent(), Some(path))?;
        log::info!("Loaded sheet: {}", path.display());
        Ok(handle)
    }

    /// Build a sheet from an in-memory descriptor, resolving its image with
    /// [`resolve_texture`](Self::resolve_texture).
    pub fn sheet_from_descriptor(
        &mut self,
        renderer: &mut Renderer,
        descriptor: &SheetDescriptor,
        base_dir: Option<&Path>,
        descriptor_path: Option<&Path>,
    ) -> Result<SheetHandle, AssetError> {
        let texture = self.resolve_texture(renderer, &descriptor.path, base_dir)?;
        self.sheets
            .create_from_descriptor(&mut self.textures, texture, descriptor, descriptor_path)
    }

    /// A registered texture under `key`, or the image at `key` loaded from
    /// `base_dir` (when it exists there) or as given.
    pub fn resolve_texture(
        &mut self,
        renderer: &mut Renderer,
        key: &str,
        base_dir: Option<&Path>,
    ) -> Result<TextureHandle, AssetError> {
        if let Some(texture) = self.textures.lookup(key) {
            return Ok(texture);
        }
        let relative = base_dir.map(|dir| dir.join(key)).filter(|p| p.exists());
        let source = relative.unwrap_or_else(|| PathBuf::from(key));
        self.textures.load(renderer, source)
    }

    /// Load every texture, shader and sheet descriptor in `dir`.
    ///
    /// Sheets whose image is already registered are built first; the rest
    /// are retried afterwards and load their image from disk.
    pub fn load_dir(
        &mut self,
        renderer: &mut Renderer,
        dir: impl AsRef<Path>,
    ) -> Result<LoadSummary, AssetError> {
        let dir = dir.as_ref();
        let mut summary = LoadSummary {
            textures: self.textures.load_dir(renderer, dir)?.len(),
            shaders: self.shaders.load_dir(renderer, dir)?.len(),
            sheets: 0,
        };

        let mut deferred = Vec::new();
        for path in sorted_entries(dir)? {
            if !has_extension(&path, "json") {
                continue;
            }
            let descriptor = match SheetDescriptor::load(&path) {
                Ok(d) => d,
                Err(e) => {
                    log::warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            if self.textures.lookup(&descriptor.path).is_none() {
                deferred.push(path);
                continue;
            }
            match self.load_sheet(renderer, &path) {
                Ok(_) => summary.sheets += 1,
                Err(e) => log::warn!("Skipping sheet {}: {e}", path.display()),
            }
        }
        for path in deferred {
            match self.load_sheet(renderer, &path) {
                Ok(_) => summary.sheets += 1,
                Err(e) => log::warn!("Skipping sheet {}: {e}", path.display()),
            }
        }
        log::info!(
            "Loaded {} textures, {} sheets, {} shaders from {}",
            summary.textures,
            summary.sheets,
            summary.shaders,
            dir.display()
        );
        Ok(summary)
    }

    /// Release every GPU image and program.
    pub fn destroy(&mut self, renderer: &mut Renderer) {
        self.shaders.destroy_all(renderer);
        self.shaders.purge_destroyed();
        self.textures.destroy_all(renderer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tessera-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn default_shader_is_created_once() {
        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let a = assets.ensure_default_shader(&mut renderer).unwrap();
        let b = assets.ensure_default_shader(&mut renderer).unwrap();
        assert_eq!(a, b);
        assert_eq!(assets.resolve_shader(None), Some(a));
        assert_eq!(assets.shaders.lookup("default"), Some(a));
    }

    #[test]
    fn sheet_saved_to_disk_reloads_with_same_names() {
        let dir = temp_dir("sheet");
        let png = dir.join("tiles.png");
        image::RgbaImage::new(32, 32).save(&png).unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let tex = assets.load_texture(&mut renderer, &png).unwrap();
        let sheet = assets.create_sheet(tex, 16, 16).unwrap();
        assets.sheets.set_name(sheet, "tiles");
        {
            let s = assets.sheets.get_mut(sheet).unwrap();
            s.set_sub_name(&mut assets.textures, 3, "corner").unwrap();
            s.add_animation(Animation::new("spin", vec![0, 1, 3, 2], 75.0).with_sheet(sheet));
        }
        let json = dir.join("tiles.json");
        assets.sheets.get(sheet).unwrap().save(&json).unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut fresh = Assets::new();
        let reloaded = fresh.load_sheet(&mut renderer, &json).unwrap();
        let s = fresh.sheets.get(reloaded).unwrap();
        assert_eq!(s.index_of("corner"), Some(3));
        let spin = s.animation("spin").unwrap();
        assert_eq!(spin.frames(), &[0, 1, 3, 2]);
        assert_eq!(spin.frame_length(), 75.0);
        assert_eq!(fresh.sheets.lookup("tiles"), Some(reloaded));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_dir_defers_sheets_until_images_resolve() {
        let dir = temp_dir("dir");
        image::RgbaImage::new(16, 8).save(dir.join("strip.png")).unwrap();
        let descriptor = SheetDescriptor {
            name: Some("strip".into()),
            kind: None,
            path: "strip.png".into(),
            width: 8,
            height: 8,
            mappings: vec![Mapping { id: 1, name: "right".into() }],
            animations: vec![],
        };
        descriptor.save(dir.join("strip.json")).unwrap();
        std::fs::write(dir.join("broken.json"), "{ not json").unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut assets = Assets::new();
        let summary = assets.load_dir(&mut renderer, &dir).unwrap();
        assert_eq!(summary.textures, 1);
        assert_eq!(summary.sheets, 1);
        let sheet = assets.sheets.lookup("strip").unwrap();
        assert_eq!(assets.sheets.get(sheet).unwrap().count(), 2);
        assert!(assets.textures.lookup("right").is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
