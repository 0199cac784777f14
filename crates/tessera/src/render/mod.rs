//! Render core: the backend seam and the state-tracking [`Renderer`].
//!
//! ```text
//!   Scene::render ──▶ Renderer ──▶ dyn RenderBackend
//!                     (bound shader,    ├── WgpuBackend   (window surface)
//!                      bound texture,   └── HeadlessBackend (command log)
//!                      frame stats)
//! ```
//!
//! The backend speaks an immediate-mode vocabulary: programs with uniforms
//! looked up by name, one bound texture, one quad per draw. The renderer
//! owns the "currently bound" state so redundant binds never reach the
//! backend.

mod camera;
mod gpu;
mod headless;
mod vertex;
mod wgpu_backend;

pub use camera::Camera;
pub use gpu::GpuContext;
pub use headless::{Command, CommandLog, HeadlessBackend};
pub use vertex::{QuadUniforms, QuadVertex};
pub use wgpu_backend::WgpuBackend;

use thiserror::Error;

use crate::asset::Shader;
use crate::math::{IVec2, IVec3, IVec4, Mat4, Vec2, Vec3, Vec4};

/// WGSL source of the built-in quad shader.
pub const QUAD_SHADER: &str = include_str!("quad.wgsl");

/// Uniform names shared by the built-in quad shader and the scene renderer.
pub mod uniforms {
    pub const PROJECTION_MAT: &str = "projectionMatrix";
    pub const VIEW_MAT: &str = "viewMatrix";
    pub const MODEL_MAT: &str = "modelMatrix";
    pub const TEXTURE_SIZE: &str = "textureSize";
    pub const SUB_SIZE: &str = "subSize";
    pub const TEXTURE_OFFSET: &str = "textureOffset";
    pub const TEXTURE_REPEAT: &str = "textureRepeat";
    pub const SUB_TEXTURE: &str = "subTexture";
    pub const FLIP_X: &str = "flipX";
    pub const FLIP_Y: &str = "flipY";
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to create program '{label}': {reason}")]
    Program { label: String, reason: String },

    #[error("failed to upload texture '{label}': {reason}")]
    Texture { label: String, reason: String },

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("GPU initialization failed: {0}")]
    Init(String),
}

/// Backend-side shader program id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub(crate) u32);

/// Backend-side texture id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuTexture(pub(crate) u32);

/// A resolved uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

/// A value uploaded to a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Int(i32),
    IVec2(IVec2),
    IVec3(IVec3),
    IVec4(IVec4),
}

/// The graphics API seam.
///
/// Implementations are driven from a single thread, once per frame:
/// `begin_frame`, any number of binds/uniforms/draws, then `end_frame`.
pub trait RenderBackend {
    fn create_program(
        &mut self,
        label: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, RenderError>;

    fn destroy_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: Option<ProgramId>);

    /// `None` for names the program does not declare.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Upload tightly packed RGBA8 pixels.
    fn create_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<GpuTexture, RenderError>;

    fn destroy_texture(&mut self, texture: GpuTexture);

    fn bind_texture(&mut self, texture: Option<GpuTexture>);

    /// Draw the shared unit quad with the current program, texture and uniforms.
    fn draw_quad(&mut self);

    fn begin_frame(&mut self, clear: [f64; 4]);

    fn end_frame(&mut self) -> Result<(), RenderError>;

    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Bind and draw counters for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub shader_binds: u32,
    pub texture_binds: u32,
    pub draw_calls: u32,
}

/// Owns the backend and the currently bound program and texture.
pub struct Renderer {
    backend: Box<dyn RenderBackend>,
    bound_program: Option<ProgramId>,
    bound_texture: Option<GpuTexture>,
    stats: FrameStats,
    clear_color: [f64; 4],
}

impl Renderer {
    pub fn new(backend: Box<dyn RenderBackend>) -> Self {
        Self {
            backend,
            bound_program: None,
            bound_texture: None,
            stats: FrameStats::default(),
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }

    /// A renderer over [`HeadlessBackend`], plus a handle to its command log.
    pub fn headless() -> (Self, CommandLog) {
        let backend = HeadlessBackend::new();
        let log = backend.log();
        (Self::new(Box::new(backend)), log)
    }

    pub fn clear_color(&self) -> [f64; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f64; 4]) {
        self.clear_color = color;
    }

    /// Counters for the frame in progress (or the last one, after `end_frame`).
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn begin_frame(&mut self) {
        self.stats = FrameStats::default();
        self.bound_program = None;
        self.bound_texture = None;
        self.backend.begin_frame(self.clear_color);
    }

    pub fn end_frame(&mut self) -> Result<(), RenderError> {
        self.unbind_texture();
        self.unbind_shader();
        self.backend.end_frame()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    pub fn create_program(
        &mut self,
        label: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, RenderError> {
        self.backend.create_program(label, vertex_src, fragment_src)
    }

    pub fn destroy_program(&mut self, program: ProgramId) {
        if self.bound_program == Some(program) {
            self.unbind_shader();
        }
        self.backend.destroy_program(program);
    }

    pub fn create_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<GpuTexture, RenderError> {
        self.backend.create_texture(label, width, height, rgba)
    }

    pub fn destroy_texture(&mut self, texture: GpuTexture) {
        if self.bound_texture == Some(texture) {
            self.unbind_texture();
        }
        self.backend.destroy_texture(texture);
    }

    /// Make `shader` the active program. Returns `false` if it was already
    /// bound or has been destroyed.
    pub fn bind_shader(&mut self, shader: &Shader) -> bool {
        let Some(program) = shader.program() else {
            log::warn!("Tried to bind destroyed shader '{}'", shader.name());
            return false;
        };
        if self.bound_program == Some(program) {
            return false;
        }
        self.backend.use_program(Some(program));
        self.bound_program = Some(program);
        self.stats.shader_binds += 1;
        true
    }

    pub fn unbind_shader(&mut self) {
        if self.bound_program.take().is_some() {
            self.backend.use_program(None);
        }
    }

    pub fn bound_program(&self) -> Option<ProgramId> {
        self.bound_program
    }

    /// Bind `texture`. Returns `false` if it was already bound.
    pub fn bind_texture(&mut self, texture: GpuTexture) -> bool {
        if self.bound_texture == Some(texture) {
            return false;
        }
        self.backend.bind_texture(Some(texture));
        self.bound_texture = Some(texture);
        self.stats.texture_binds += 1;
        true
    }

    pub fn unbind_texture(&mut self) {
        if self.bound_texture.take().is_some() {
            self.backend.bind_texture(None);
        }
    }

    pub fn bound_texture(&self) -> Option<GpuTexture> {
        self.bound_texture
    }

    pub fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.backend.uniform_location(program, name)
    }

    pub fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.backend.set_uniform(location, value);
    }

    pub fn draw_quad(&mut self) {
        self.backend.draw_quad();
        self.stats.draw_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_rebind_is_skipped() {
        let (mut renderer, log) = Renderer::headless();
        let tex = renderer.create_texture("t", 1, 1, &[255; 4]).unwrap();
        renderer.begin_frame();
        assert!(renderer.bind_texture(tex));
        assert!(!renderer.bind_texture(tex));
        renderer.draw_quad();
        renderer.end_frame().unwrap();

        assert_eq!(renderer.stats().texture_binds, 1);
        assert_eq!(renderer.stats().draw_calls, 1);
        let binds = log.count(|c| matches!(c, Command::BindTexture(Some(_))));
        assert_eq!(binds, 1);
    }

    #[test]
    fn destroying_bound_texture_unbinds_it() {
        let (mut renderer, _log) = Renderer::headless();
        let tex = renderer.create_texture("t", 1, 1, &[0; 4]).unwrap();
        renderer.bind_texture(tex);
        renderer.destroy_texture(tex);
        assert_eq!(renderer.bound_texture(), None);
    }

    #[test]
    fn begin_frame_resets_stats() {
        let (mut renderer, _log) = Renderer::headless();
        renderer.begin_frame();
        renderer.draw_quad();
        renderer.end_frame().unwrap();
        renderer.begin_frame();
        assert_eq!(renderer.stats(), FrameStats::default());
    }
}
