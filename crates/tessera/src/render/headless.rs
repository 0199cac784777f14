//! A backend that records commands instead of drawing.
//!
//! Used for tests and off-screen runs. Every call lands in a shared
//! [`CommandLog`] that the caller can inspect after the backend has been
//! boxed into a [`Renderer`](super::Renderer).

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{GpuTexture, ProgramId, RenderBackend, RenderError, UniformLocation, UniformValue};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateProgram { program: ProgramId, label: String },
    DestroyProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    UniformLookup { program: ProgramId, name: String },
    SetUniform { location: UniformLocation, value: UniformValue },
    CreateTexture { texture: GpuTexture, label: String, width: u32, height: u32 },
    DestroyTexture(GpuTexture),
    BindTexture(Option<GpuTexture>),
    DrawQuad,
    BeginFrame,
    EndFrame,
    Resize { width: u32, height: u32 },
}

/// Shared handle to the recorded commands.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Rc<RefCell<Vec<Command>>>);

impl CommandLog {
    fn push(&self, command: Command) {
        self.0.borrow_mut().push(command);
    }

    /// A copy of everything recorded so far.
    pub fn commands(&self) -> Vec<Command> {
        self.0.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

struct Program {
    uniforms: HashMap<String, UniformLocation>,
}

/// Records commands into a [`CommandLog`].
///
/// Uniform locations are handed out sequentially per program. With
/// [`declare_uniforms`](Self::declare_uniforms) the backend only resolves
/// the listed names, like a linked program that dropped unused uniforms.
pub struct HeadlessBackend {
    log: CommandLog,
    programs: HashMap<ProgramId, Program>,
    textures: HashSet<GpuTexture>,
    declared: Option<HashSet<String>>,
    next_program: u32,
    next_texture: u32,
    next_location: u32,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            log: CommandLog::default(),
            programs: HashMap::new(),
            textures: HashSet::new(),
            declared: None,
            next_program: 1,
            next_texture: 1,
            next_location: 0,
        }
    }

    /// Restrict uniform lookups to `names`.
    pub fn declare_uniforms(mut self, names: &[&str]) -> Self {
        self.declared = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_program(
        &mut self,
        label: &str,
        vertex_src: &str,
        fragment_src: &str,
    ) -> Result<ProgramId, RenderError> {
        if vertex_src.trim().is_empty() || fragment_src.trim().is_empty() {
            return Err(RenderError::Program {
                label: label.to_string(),
                reason: "empty shader source".to_string(),
            });
        }
        let program = ProgramId(self.next_program);
        self.next_program += 1;
        self.programs.insert(
            program,
            Program {
                uniforms: HashMap::new(),
            },
        );
        self.log.push(Command::CreateProgram {
            program,
            label: label.to_string(),
        });
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.log.push(Command::DestroyProgram(program));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.log.push(Command::UseProgram(program));
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.log.push(Command::UniformLookup {
            program,
            name: name.to_string(),
        });
        if let Some(declared) = &self.declared {
            if !declared.contains(name) {
                return None;
            }
        }
        let entry = self.programs.get_mut(&program)?;
        if let Some(location) = entry.uniforms.get(name) {
            return Some(*location);
        }
        let location = UniformLocation(self.next_location);
        self.next_location += 1;
        entry.uniforms.insert(name.to_string(), location);
        Some(location)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.log.push(Command::SetUniform { location, value });
    }

    fn create_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<GpuTexture, RenderError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(RenderError::Texture {
                label: label.to_string(),
                reason: format!("expected {expected} bytes, got {}", rgba.len()),
            });
        }
        let texture = GpuTexture(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(texture);
        self.log.push(Command::CreateTexture {
            texture,
            label: label.to_string(),
            width,
            height,
        });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: GpuTexture) {
        self.textures.remove(&texture);
        self.log.push(Command::DestroyTexture(texture));
    }

    fn bind_texture(&mut self, texture: Option<GpuTexture>) {
        self.log.push(Command::BindTexture(texture));
    }

    fn draw_quad(&mut self) {
        self.log.push(Command::DrawQuad);
    }

    fn begin_frame(&mut self, _clear: [f64; 4]) {
        self.log.push(Command::BeginFrame);
    }

    fn end_frame(&mut self) -> Result<(), RenderError> {
        self.log.push(Command::EndFrame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.log.push(Command::Resize { width, height });
    }
}
