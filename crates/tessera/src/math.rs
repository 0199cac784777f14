//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so games don't need to
//! depend on it directly. [`Transform`] is the 2D placement every scene
//! entity carries: a center-anchored quad with a depth, a size, a rotation
//! about Z and a velocity.

use std::time::Duration;

pub use glam::{IVec2, IVec3, IVec4, Mat4, Quat, Vec2, Vec3, Vec4};

/// Position, size and rotation of a quad, plus a cached model matrix.
///
/// Every mutator that changes state marks the transform dirty. The scene
/// rebuilds dirty matrices once per frame before drawing, so [`matrix`]
/// is only meaningful after [`update_matrix`] has run.
///
/// [`matrix`]: Transform::matrix
/// [`update_matrix`]: Transform::update_matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    position: Vec3,
    size: Vec2,
    angle: f32,
    /// World units per second.
    velocity: Vec2,
    matrix: Mat4,
    dirty: bool,
    // Snapshot taken at the last matrix rebuild.
    last_position: Vec3,
    last_size: Vec2,
    last_angle: f32,
}

impl Transform {
    /// A unit quad at the origin.
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            size: Vec2::ONE,
            angle: 0.0,
            velocity: Vec2::ZERO,
            matrix: Mat4::IDENTITY,
            dirty: true,
            last_position: Vec3::ZERO,
            last_size: Vec2::ONE,
            last_angle: 0.0,
        }
    }

    /// A unit quad at the given 2D position (z = 0).
    pub fn at(x: f32, y: f32) -> Self {
        Self::from_position(Vec3::new(x, y, 0.0))
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::new()
        }
    }

    /// Return a copy with the given size.
    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.set_size(Vec2::new(width, height));
        self
    }

    /// Return a copy rotated by `angle` radians.
    pub fn with_angle(mut self, angle: f32) -> Self {
        self.set_angle(angle);
        self
    }

    /// Clone a prefab transform and place it at `position`.
    ///
    /// Size, rotation and velocity are inherited; depth is kept.
    pub fn instance_of(prefab: &Transform, position: Vec2) -> Self {
        let mut t = *prefab;
        t.set_position_2d(position);
        t
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn x(&self) -> f32 {
        self.position.x
    }

    pub fn y(&self) -> f32 {
        self.position.y
    }

    pub fn z(&self) -> f32 {
        self.position.z
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    /// Rotation about Z in radians.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn set_position(&mut self, position: Vec3) {
        if self.position != position {
            self.position = position;
            self.dirty = true;
        }
    }

    /// Move in the XY plane, keeping depth.
    pub fn set_position_2d(&mut self, position: Vec2) {
        self.set_position(position.extend(self.position.z));
    }

    pub fn set_x(&mut self, x: f32) {
        self.set_position(Vec3::new(x, self.position.y, self.position.z));
    }

    pub fn set_y(&mut self, y: f32) {
        self.set_position(Vec3::new(self.position.x, y, self.position.z));
    }

    pub fn set_z(&mut self, z: f32) {
        self.set_position(Vec3::new(self.position.x, self.position.y, z));
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.set_position(self.position + Vec3::new(dx, dy, 0.0));
    }

    pub fn set_size(&mut self, size: Vec2) {
        if self.size != size {
            self.size = size;
            self.dirty = true;
        }
    }

    pub fn set_width(&mut self, width: f32) {
        self.set_size(Vec2::new(width, self.size.y));
    }

    pub fn set_height(&mut self, height: f32) {
        self.set_size(Vec2::new(self.size.x, height));
    }

    pub fn set_angle(&mut self, angle: f32) {
        if self.angle != angle {
            self.angle = angle;
            self.dirty = true;
        }
    }

    pub fn set_velocity(&mut self, velocity: Vec2) {
        if self.velocity != velocity {
            self.velocity = velocity;
            self.dirty = true;
        }
    }

    pub fn set_velocity_x(&mut self, vx: f32) {
        self.set_velocity(Vec2::new(vx, self.velocity.y));
    }

    pub fn set_velocity_y(&mut self, vy: f32) {
        self.set_velocity(Vec2::new(self.velocity.x, vy));
    }

    /// Integrate velocity over `delta`.
    pub fn update_position(&mut self, delta: Duration) {
        if self.velocity != Vec2::ZERO {
            let step = self.velocity * delta.as_secs_f32();
            self.translate(step.x, step.y);
        }
    }

    pub fn left(&self) -> f32 {
        self.position.x - self.size.x / 2.0
    }

    pub fn right(&self) -> f32 {
        self.position.x + self.size.x / 2.0
    }

    pub fn top(&self) -> f32 {
        self.position.y + self.size.y / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.position.y - self.size.y / 2.0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rebuild the model matrix and clear the dirty flag.
    ///
    /// The matrix is `translate(x, y, -z) * rotate_z(angle) * scale(w, h, 1)`,
    /// so a larger z sits further from the camera.
    pub fn update_matrix(&mut self) {
        let translation = Vec3::new(self.position.x, self.position.y, -self.position.z);
        self.matrix = Mat4::from_translation(translation)
            * Mat4::from_rotation_z(self.angle)
            * Mat4::from_scale(self.size.extend(1.0));
        self.last_position = self.position;
        self.last_size = self.size;
        self.last_angle = self.angle;
        self.dirty = false;
    }

    /// The cached model matrix.
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Distance moved since the last matrix rebuild.
    pub fn position_change(&self) -> f32 {
        self.position.distance(self.last_position)
    }

    pub fn size_change(&self) -> f32 {
        self.size.distance(self.last_size)
    }

    pub fn angle_change(&self) -> f32 {
        (self.angle - self.last_angle).abs()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}
