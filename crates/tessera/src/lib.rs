//! # Tessera: 2D sprite engine
//!
//! A small sprite engine built on winit and wgpu. Entities live in a
//! [`Scene`](scene::Scene) that keeps them indexed by shader, then by
//! texture, so a frame binds each program and each image as few times as
//! possible. Sheets, animations and shaders are owned by an
//! [`Assets`](asset::Assets) registry; levels round-trip through JSON with
//! [`EditorSpace`](level::EditorSpace).
//!
//! Start with `use tessera::prelude::*`, implement
//! [`GameInterface`](engine::GameInterface) and hand it to
//! [`Engine::run`](engine::Engine::run).

pub mod asset;
pub mod engine;
pub mod input;
pub mod level;
pub mod math;
pub mod prefs;
pub mod prelude;
pub mod render;
pub mod renderable;
pub mod scene;
pub mod time;

#[cfg(feature = "audio")]
pub mod audio;
