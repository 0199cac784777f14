//! Shader programs and their uniform location cache.
//!
//! Uniforms are set by name. The first lookup of a name asks the backend
//! for its location and caches the answer, including a miss, so later sets
//! of the same name never reach the backend's lookup path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::asset::AssetError;
use crate::asset::texture::{has_extension, path_key, sorted_entries};
use crate::math::{IVec2, IVec3, IVec4, Mat4, Vec2, Vec3, Vec4};
use crate::render::{ProgramId, Renderer, UniformLocation, UniformValue};

/// Handle to a shader in the [`ShaderStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub(crate) usize);

#[derive(Debug)]
pub struct Shader {
    name: String,
    vertex_path: Option<PathBuf>,
    fragment_path: Option<PathBuf>,
    program: Option<ProgramId>,
    uniforms: HashMap<String, Option<UniformLocation>>,
}

impl Shader {
    fn new(name: &str, program: ProgramId) -> Self {
        Self {
            name: name.to_string(),
            vertex_path: None,
            fragment_path: None,
            program: Some(program),
            uniforms: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_path(&self) -> Option<&Path> {
        self.vertex_path.as_deref()
    }

    pub fn fragment_path(&self) -> Option<&Path> {
        self.fragment_path.as_deref()
    }

    /// The backend program, or `None` once destroyed.
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn is_destroyed(&self) -> bool {
        self.program.is_none()
    }

    /// Resolve `name`, consulting the cache first.
    pub fn location(&mut self, renderer: &mut Renderer, name: &str) -> Option<UniformLocation> {
        let program = self.program?;
        if let Some(cached) = self.uniforms.get(name) {
            return *cached;
        }
        let location = renderer.uniform_location(program, name);
        if location.is_none() {
            log::debug!("Shader '{}' has no uniform '{name}'", self.name);
        }
        self.uniforms.insert(name.to_string(), location);
        location
    }

    fn set(&mut self, renderer: &mut Renderer, name: &str, value: UniformValue) {
        if let Some(location) = self.location(renderer, name) {
            renderer.set_uniform(location, value);
        }
    }

    pub fn set_mat4(&mut self, renderer: &mut Renderer, name: &str, value: Mat4) {
        self.set(renderer, name, UniformValue::Mat4(value));
    }

    pub fn set_vec2(&mut self, renderer: &mut Renderer, name: &str, value: Vec2) {
        self.set(renderer, name, UniformValue::Vec2(value));
    }

    pub fn set_vec3(&mut self, renderer: &mut Renderer, name: &str, value: Vec3) {
        self.set(renderer, name, UniformValue::Vec3(value));
    }

    pub fn set_bool(&mut self, renderer: &mut Renderer, name: &str, value: bool) {
        self.set(renderer, name, UniformValue::Int(value as i32));
    }

    /// Upload one to four ints as `int`/`ivec2`/`ivec3`/`ivec4`. Extra
    /// components are dropped.
    pub fn set_ints(&mut self, renderer: &mut Renderer, name: &str, values: &[i32]) {
        let value = match *values {
            [] => {
                log::warn!("Empty int uniform '{name}' on shader '{}'", self.name);
                return;
            }
            [x] => UniformValue::Int(x),
            [x, y] => UniformValue::IVec2(IVec2::new(x, y)),
            [x, y, z] => UniformValue::IVec3(IVec3::new(x, y, z)),
            [x, y, z, w, ..] => UniformValue::IVec4(IVec4::new(x, y, z, w)),
        };
        self.set(renderer, name, value);
    }

    /// Upload one to four floats as `float`/`vec2`/`vec3`/`vec4`. Extra
    /// components are dropped.
    pub fn set_floats(&mut self, renderer: &mut Renderer, name: &str, values: &[f32]) {
        let value = match *values {
            [] => {
                log::warn!("Empty float uniform '{name}' on shader '{}'", self.name);
                return;
            }
            [x] => UniformValue::Float(x),
            [x, y] => UniformValue::Vec2(Vec2::new(x, y)),
            [x, y, z] => UniformValue::Vec3(Vec3::new(x, y, z)),
            [x, y, z, w, ..] => UniformValue::Vec4(Vec4::new(x, y, z, w)),
        };
        self.set(renderer, name, value);
    }

    /// Release the program. Safe to call more than once.
    pub fn destroy(&mut self, renderer: &mut Renderer) {
        if let Some(program) = self.program.take() {
            renderer.destroy_program(program);
            self.uniforms.clear();
            log::debug!("Destroyed shader '{}'", self.name);
        }
    }
}

/// Shaders keyed by name and by source paths.
#[derive(Debug, Default)]
pub struct ShaderStore {
    entries: Vec<Shader>,
    keys: HashMap<String, ShaderHandle>,
}

impl ShaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a program from in-memory sources and register it under `name`.
    pub fn create_from_source(
        &mut self,
        renderer: &mut Renderer,
        name: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ShaderHandle, AssetError> {
        let program = renderer.create_program(name, vertex_src, fragment_src)?;
        let handle = ShaderHandle(self.entries.len());
        self.entries.push(Shader::new(name, program));
        self.register(name, handle);
        log::info!("Created shader '{name}'");
        Ok(handle)
    }

    /// Read, compile and register a vertex/fragment pair. Loading the same
    /// pair twice returns the first handle.
    pub fn load(
        &mut self,
        renderer: &mut Renderer,
        name: &str,
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<ShaderHandle, AssetError> {
        let (vertex, fragment) = (vertex.as_ref(), fragment.as_ref());
        let (vs_key, fs_key) = (path_key(vertex), path_key(fragment));
        if let (Some(a), Some(b)) = (self.lookup(&vs_key), self.lookup(&fs_key)) {
            if a == b {
                return Ok(a);
            }
        }

        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| AssetError::Io {
                path: path.to_path_buf(),
                source,
            })
        };
        let vertex_src = read(vertex)?;
        let fragment_src = read(fragment)?;
        let handle = self.create_from_source(renderer, name, &vertex_src, &fragment_src)?;

        let shader = &mut self.entries[handle.0];
        shader.vertex_path = Some(vertex.to_path_buf());
        shader.fragment_path = Some(fragment.to_path_buf());
        self.register(&vs_key, handle);
        self.register(&fs_key, handle);
        Ok(handle)
    }

    /// Load every shader in `dir`. `<stem>.vs`/`.vert` pairs with
    /// `<stem>.fs`/`.frag`; a lone `<stem>.wgsl` holds both stages. Shaders
    /// that fail to compile are logged and skipped.
    pub fn load_dir(
        &mut self,
        renderer: &mut Renderer,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<ShaderHandle>, AssetError> {
        let paths = sorted_entries(dir.as_ref())?;
        let mut loaded = Vec::new();
        for path in &paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let fragment = if has_extension(path, "wgsl") {
                Some(path.clone())
            } else if has_extension(path, "vs") || has_extension(path, "vert") {
                paths
                    .iter()
                    .find(|p| {
                        p.file_stem().and_then(|s| s.to_str()) == Some(stem)
                            && (has_extension(p, "fs") || has_extension(p, "frag"))
                    })
                    .cloned()
            } else {
                continue;
            };
            let Some(fragment) = fragment else {
                log::warn!("No fragment stage for {}", path.display());
                continue;
            };
            match self.load(renderer, stem, path, &fragment) {
                Ok(handle) => loaded.push(handle),
                Err(e) => log::warn!("Skipping shader '{stem}': {e}"),
            }
        }
        Ok(loaded)
    }

    fn register(&mut self, key: &str, handle: ShaderHandle) {
        if let Some(previous) = self.keys.insert(key.to_string(), handle) {
            if previous != handle {
                log::warn!("Shader key '{key}' moved from {previous:?} to {handle:?}");
            }
        }
    }

    pub fn get(&self, handle: ShaderHandle) -> Option<&Shader> {
        self.entries.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: ShaderHandle) -> Option<&mut Shader> {
        self.entries.get_mut(handle.0)
    }

    /// Find a shader by name or by one of its source paths.
    pub fn lookup(&self, key: &str) -> Option<ShaderHandle> {
        self.keys.get(key).copied()
    }

    pub fn rename(&mut self, handle: ShaderHandle, name: &str) {
        let Some(shader) = self.entries.get_mut(handle.0) else {
            return;
        };
        let old = std::mem::replace(&mut shader.name, name.to_string());
        if self.keys.get(&old) == Some(&handle) {
            self.keys.remove(&old);
        }
        self.register(name, handle);
    }

    /// Every key that resolves to `handle`, sorted.
    pub fn aliases(&self, handle: ShaderHandle) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .keys
            .iter()
            .filter(|(_, h)| **h == handle)
            .map(|(k, _)| k.as_str())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Destroy every live program once, however many keys point at it.
    pub fn destroy_all(&mut self, renderer: &mut Renderer) {
        for shader in &mut self.entries {
            shader.destroy(renderer);
        }
    }

    /// Unregister the keys of destroyed shaders. Handles stay valid.
    pub fn purge_destroyed(&mut self) {
        let entries = &self.entries;
        self.keys.retain(|_, h| !entries[h.0].is_destroyed());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ShaderHandle, &Shader)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, s)| (ShaderHandle(i), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Command, HeadlessBackend};

    #[test]
    fn locations_are_looked_up_once() {
        let (mut renderer, log) = Renderer::headless();
        let mut shaders = ShaderStore::new();
        let handle = shaders.create_from_source(&mut renderer, "plain", "vs", "fs").unwrap();
        let shader = shaders.get_mut(handle).unwrap();

        for _ in 0..3 {
            shader.set_vec2(&mut renderer, "subSize", Vec2::ONE);
        }
        let lookups = log.count(|c| matches!(c, Command::UniformLookup { .. }));
        let sets = log.count(|c| matches!(c, Command::SetUniform { .. }));
        assert_eq!(lookups, 1);
        assert_eq!(sets, 3);
    }

    #[test]
    fn misses_are_cached_and_harmless() {
        let backend = HeadlessBackend::new().declare_uniforms(&["modelMatrix"]);
        let log = backend.log();
        let mut renderer = Renderer::new(Box::new(backend));
        let mut shaders = ShaderStore::new();
        let handle = shaders.create_from_source(&mut renderer, "p", "vs", "fs").unwrap();
        let shader = shaders.get_mut(handle).unwrap();

        shader.set_floats(&mut renderer, "missing", &[1.0]);
        shader.set_floats(&mut renderer, "missing", &[2.0]);
        assert_eq!(log.count(|c| matches!(c, Command::UniformLookup { .. })), 1);
        assert_eq!(log.count(|c| matches!(c, Command::SetUniform { .. })), 0);
    }

    #[test]
    fn slice_setters_pick_component_count() {
        let (mut renderer, log) = Renderer::headless();
        let mut shaders = ShaderStore::new();
        let handle = shaders.create_from_source(&mut renderer, "p", "vs", "fs").unwrap();
        let shader = shaders.get_mut(handle).unwrap();

        shader.set_ints(&mut renderer, "a", &[1, 2, 3]);
        shader.set_floats(&mut renderer, "b", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        shader.set_ints(&mut renderer, "c", &[]);

        let values: Vec<UniformValue> = log
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::SetUniform { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(
            values,
            vec![
                UniformValue::IVec3(IVec3::new(1, 2, 3)),
                UniformValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)),
            ]
        );
    }

    #[test]
    fn destroy_is_idempotent() {
        let (mut renderer, log) = Renderer::headless();
        let mut shaders = ShaderStore::new();
        let handle = shaders.create_from_source(&mut renderer, "p", "vs", "fs").unwrap();
        shaders.get_mut(handle).unwrap().destroy(&mut renderer);
        shaders.destroy_all(&mut renderer);
        assert_eq!(log.count(|c| matches!(c, Command::DestroyProgram(_))), 1);

        shaders.purge_destroyed();
        assert_eq!(shaders.lookup("p"), None);
    }

    #[test]
    fn rename_moves_the_name_key() {
        let (mut renderer, _log) = Renderer::headless();
        let mut shaders = ShaderStore::new();
        let handle = shaders.create_from_source(&mut renderer, "old", "vs", "fs").unwrap();
        shaders.rename(handle, "new");
        assert_eq!(shaders.lookup("old"), None);
        assert_eq!(shaders.aliases(handle), vec!["new"]);
    }

    #[test]
    fn load_dir_pairs_stages_by_stem() {
        let dir = std::env::temp_dir().join(format!("tessera-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("glow.vs"), "vertex").unwrap();
        std::fs::write(dir.join("glow.fs"), "fragment").unwrap();
        std::fs::write(dir.join("orphan.vert"), "vertex").unwrap();
        std::fs::write(dir.join("flat.wgsl"), "both").unwrap();

        let (mut renderer, _log) = Renderer::headless();
        let mut shaders = ShaderStore::new();
        let loaded = shaders.load_dir(&mut renderer, &dir).unwrap();
        assert_eq!(loaded.len(), 2);

        let glow = shaders.lookup("glow").unwrap();
        let vs_key = path_key(&dir.join("glow.vs"));
        assert_eq!(shaders.lookup(&vs_key), Some(glow));
        assert!(shaders.lookup("flat").is_some());
        assert!(shaders.lookup("orphan").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
