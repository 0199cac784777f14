use crate::math::{Mat4, Vec2, Vec3};

/// Orthographic 2D camera. The viewport covers `size` world units with its
/// bottom-left corner at `position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    position: Vec3,
    size: Vec2,
    view: Mat4,
    projection: Mat4,
}

impl Camera {
    pub const DEFAULT_SIZE: Vec2 = Vec2::new(160.0, 90.0);

    /// Half-depth of the visible slab.
    const DEPTH: f32 = 1000.0;

    pub fn new(size: Vec2) -> Self {
        Self::with_position(size, Vec3::ZERO)
    }

    pub fn with_position(size: Vec2, position: Vec3) -> Self {
        let mut camera = Self {
            position,
            size,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        };
        camera.update_view();
        camera.update_projection();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view();
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.set_position(self.position + delta.extend(0.0));
    }

    pub fn set_size(&mut self, size: Vec2) {
        self.size = size;
        self.update_projection();
    }

    /// Map a window-space cursor (origin top-left) to world coordinates.
    pub fn screen_to_world(&self, cursor: Vec2, window: Vec2) -> Vec2 {
        if window.x <= 0.0 || window.y <= 0.0 {
            return self.position.truncate();
        }
        let normalized = Vec2::new(cursor.x / window.x, 1.0 - cursor.y / window.y);
        self.position.truncate() + normalized * self.size
    }

    fn update_view(&mut self) {
        self.view = Mat4::from_translation(Vec3::new(
            -self.position.x,
            -self.position.y,
            self.position.z,
        ));
    }

    fn update_projection(&mut self) {
        self.projection =
            Mat4::orthographic_rh(0.0, self.size.x, 0.0, self.size.y, -Self::DEPTH, Self::DEPTH);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_corners_map_to_clip_space() {
        let camera = Camera::default();
        let clip = |p: Vec3| camera.projection() * camera.view() * p.extend(1.0);
        let min = clip(Vec3::ZERO);
        let max = clip(Vec3::new(160.0, 90.0, 0.0));
        assert!((min.x + 1.0).abs() < 1e-5 && (min.y + 1.0).abs() < 1e-5);
        assert!((max.x - 1.0).abs() < 1e-5 && (max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn moving_the_camera_shifts_the_view() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(10.0, 5.0, 0.0));
        let p = camera.view().transform_point3(Vec3::new(10.0, 5.0, 0.0));
        assert_eq!(p, Vec3::ZERO);
    }

    #[test]
    fn cursor_to_world() {
        let camera = Camera::with_position(Vec2::new(160.0, 90.0), Vec3::new(100.0, 0.0, 0.0));
        let world = camera.screen_to_world(Vec2::new(360.0, 0.0), Vec2::new(720.0, 480.0));
        assert_eq!(world, Vec2::new(180.0, 90.0));
    }
}
