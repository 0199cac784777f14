//! # Quad vertex and uniform layouts
//!
//! Every entity is drawn with the same unit quad, centered on the origin and
//! scaled into place by its model matrix. The mesh is uploaded once.
//!
//! ```text
//! QuadVertex (20 bytes per vertex)
//! ┌────────────────┬──────────────┐
//! │ position       │ uv           │
//! │ [f32; 3]       │ [f32; 2]     │
//! │ offset 0       │ offset 12    │
//! │ location(0)    │ location(1)  │
//! └────────────────┴──────────────┘
//!
//!  1 (-.5, .5) ─── 2 (.5, .5)        indices: 0 1 2, 2 3 0
//!    │           ╱ │
//!    │        ╱    │
//!  0 (-.5,-.5) ─── 3 (.5,-.5)
//! ```
//!
//! [`QuadUniforms`] mirrors the `Uniforms` struct in `quad.wgsl` byte for
//! byte. Uniform names resolve to offsets into this block, which is how the
//! wgpu backend emulates per-name uniform slots.

use bytemuck::{Pod, Zeroable};

use super::uniforms;
use crate::math::Mat4;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    pub const QUAD: [QuadVertex; 4] = [
        QuadVertex { position: [-0.5, -0.5, 0.0], uv: [0.0, 1.0] },
        QuadVertex { position: [-0.5, 0.5, 0.0], uv: [0.0, 0.0] },
        QuadVertex { position: [0.5, 0.5, 0.0], uv: [1.0, 0.0] },
        QuadVertex { position: [0.5, -0.5, 0.0], uv: [1.0, 1.0] },
    ];

    pub const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];
}

/// Per-draw uniform block (240 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct QuadUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub texture_size: [f32; 2],
    pub sub_size: [f32; 2],
    pub texture_offset: [f32; 2],
    pub texture_repeat: [f32; 2],
    pub sub_texture: i32,
    pub flip_x: i32,
    pub flip_y: i32,
    pub _pad: i32,
}

impl QuadUniforms {
    pub const SIZE: u64 = std::mem::size_of::<QuadUniforms>() as u64;

    /// Byte offset of a named field.
    pub fn offset_of(name: &str) -> Option<u32> {
        let offset = match name {
            uniforms::PROJECTION_MAT => 0,
            uniforms::VIEW_MAT => 64,
            uniforms::MODEL_MAT => 128,
            uniforms::TEXTURE_SIZE => 192,
            uniforms::SUB_SIZE => 200,
            uniforms::TEXTURE_OFFSET => 208,
            uniforms::TEXTURE_REPEAT => 216,
            uniforms::SUB_TEXTURE => 224,
            uniforms::FLIP_X => 228,
            uniforms::FLIP_Y => 232,
            _ => return None,
        };
        Some(offset)
    }
}

impl Default for QuadUniforms {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            projection: identity,
            view: identity,
            model: identity,
            texture_size: [1.0, 1.0],
            sub_size: [1.0, 1.0],
            texture_offset: [0.0, 0.0],
            texture_repeat: [1.0, 1.0],
            sub_texture: 0,
            flip_x: 0,
            flip_y: 0,
            _pad: 0,
        }
    }
}
