//! 2D placement of a sprite in pixel space.

use glam::{Mat4, Quat, Vec2, Vec3};

/// Position, rotation (radians, about +Z) and scale of a drawable.
///
/// Pixel space has its origin at the top-left of the viewport and +Y pointing
/// down. Sprites are drawn on the unit quad centred on the origin, so
/// `position` is the sprite's centre and `scale` its size in pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: 0.0,
        scale: Vec2::ONE,
    };

    pub const fn from_position(position: Vec2) -> Self {
        Self {
            position,
            rotation: 0.0,
            scale: Vec2::ONE,
        }
    }

    pub const fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub const fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    /// Local → pixel matrix: scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale.extend(1.0),
            Quat::from_rotation_z(self.rotation),
            Vec3::new(self.position.x, self.position.y, 0.0),
        )
    }
}

/// Pixel → clip projection for a `screen` sized viewport.
pub fn screen_projection(screen: Vec2) -> Mat4 {
    Mat4::orthographic_rh(0.0, screen.x, screen.y, 0.0, -1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn approx(a: Vec4, b: Vec4) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn identity_matrix_is_identity() {
        assert_eq!(Transform::IDENTITY.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn scale_applies_before_translation() {
        let t = Transform::from_position(Vec2::new(10.0, 20.0)).with_scale(Vec2::new(4.0, 2.0));
        let p = t.matrix() * Vec4::new(0.5, 0.5, 0.0, 1.0);
        assert!(approx(p, Vec4::new(12.0, 21.0, 0.0, 1.0)));
    }

    #[test]
    fn projection_maps_top_left_and_bottom_right_corners() {
        let proj = screen_projection(Vec2::new(800.0, 600.0));
        let tl = proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let br = proj * Vec4::new(800.0, 600.0, 0.0, 1.0);
        assert!(approx(tl, Vec4::new(-1.0, 1.0, tl.z, 1.0)));
        assert!(approx(br, Vec4::new(1.0, -1.0, br.z, 1.0)));
    }
}
