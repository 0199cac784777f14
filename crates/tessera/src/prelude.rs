//! Common re-exports: `use tessera::prelude::*`.

pub use crate::asset::{
    Animation, AssetError, Assets, Shader, ShaderHandle, SheetHandle, TextureHandle, TextureSheet,
};
pub use crate::engine::{Context, Engine, EngineConfig, EngineError, GameInterface};
pub use crate::input::{CursorPosition, Input, InputState, KeyCode, MouseButton};
pub use crate::level::EditorSpace;
pub use crate::math::{Mat4, Transform, Vec2, Vec3};
pub use crate::prefs::GamePreferences;
pub use crate::render::{Camera, Renderer};
pub use crate::renderable::Renderable;
pub use crate::scene::{Entity, EntityId, EntityKind, Scene, SnapMode};
pub use crate::time::{FrameClock, Time};

#[cfg(feature = "audio")]
pub use crate::audio::{Audio, Sound, Source};
