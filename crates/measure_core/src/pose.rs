use glam::{Mat4, Quat, Vec3};

/// A rigid transform from a local frame into world space, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, rotation: Quat::IDENTITY }
    }

    /// Column-major model matrix for this pose.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// The pose mapping world space back into this pose's local frame.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: rotation * -self.translation,
            rotation,
        }
    }

    /// `self * other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Pose) -> Self {
        Self {
            translation: self.transform_point(other.translation),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// Maps a point from local into world space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    /// Rotates a local axis (0 = X, 1 = Y, 2 = Z) into world space, scaled by `scale`.
    pub fn transformed_axis(&self, axis: usize, scale: f32) -> Vec3 {
        let local = match axis {
            0 => Vec3::X,
            1 => Vec3::Y,
            _ => Vec3::Z,
        };
        self.rotation * (local * scale)
    }

    /// Camera view matrix for a camera located at this pose.
    pub fn view_matrix(&self) -> Mat4 {
        self.inverse().to_matrix()
    }
}
