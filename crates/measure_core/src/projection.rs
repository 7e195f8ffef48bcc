use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Screen position reported for points that cannot be projected.
pub const OFFSCREEN: Vec2 = Vec2::new(-1.0, -1.0);

/// Screen size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Projects a world-space point to pixel coordinates (origin top-left, Y down).
///
/// Returns [`OFFSCREEN`] when the point is behind the camera (clip w <= 0)
/// or the viewport is empty.
pub fn project_to_screen(world: Vec3, view: &Mat4, projection: &Mat4, viewport: Viewport) -> Vec2 {
    if viewport.is_empty() {
        return OFFSCREEN;
    }

    let clip = *projection * (*view * world.extend(1.0));
    if clip.w <= 0.0 {
        return OFFSCREEN;
    }

    let ndc_x = clip.x / clip.w;
    let ndc_y = clip.y / clip.w;
    Vec2::new(
        (ndc_x + 1.0) / 2.0 * viewport.width as f32,
        (1.0 - ndc_y) / 2.0 * viewport.height as f32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_projection_maps_ndc_formula() {
        let vp = Viewport::new(1000, 1000);
        let p = project_to_screen(Vec3::new(0.5, 0.0, 0.0), &Mat4::IDENTITY, &Mat4::IDENTITY, vp);
        assert_eq!(p, Vec2::new(750.0, 500.0));

        let corner = project_to_screen(Vec3::new(-1.0, 1.0, 0.0), &Mat4::IDENTITY, &Mat4::IDENTITY, vp);
        assert_eq!(corner, Vec2::new(0.0, 0.0));
    }

    #[test]
    fn test_points_inside_frustum_land_on_screen() {
        let vp = Viewport::new(1080, 1920);
        let proj = Mat4::perspective_rh_gl(60f32.to_radians(), vp.aspect(), 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 1.5, 2.0), Vec3::ZERO, Vec3::Y);

        for &(x, y, z) in &[(0.0, 0.0, 0.0), (0.3, 0.1, -0.5), (-0.4, 0.4, 0.2)] {
            let world = Vec3::new(x, y, z);
            let clip = proj * view * world.extend(1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(clip.w > 0.0 && ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);

            let s = project_to_screen(world, &view, &proj, vp);
            assert!((0.0..=1080.0).contains(&s.x), "x = {}", s.x);
            assert!((0.0..=1920.0).contains(&s.y), "y = {}", s.y);
        }
    }

    #[test]
    fn test_behind_camera_is_offscreen() {
        let vp = Viewport::new(800, 600);
        let proj = Mat4::perspective_rh_gl(1.0, vp.aspect(), 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), Vec3::Y);

        for z in [0.5f32, 1.0, 10.0, 1000.0] {
            assert_eq!(project_to_screen(Vec3::new(0.2, -0.1, z), &view, &proj, vp), OFFSCREEN);
        }
    }

    #[test]
    fn test_zero_w_and_empty_viewport_are_offscreen() {
        let mut flat = Mat4::IDENTITY;
        flat.w_axis.w = 0.0;
        let vp = Viewport::new(100, 100);
        assert_eq!(project_to_screen(Vec3::ZERO, &Mat4::IDENTITY, &flat, vp), OFFSCREEN);
        assert_eq!(
            project_to_screen(Vec3::ZERO, &Mat4::IDENTITY, &Mat4::IDENTITY, Viewport::new(0, 100)),
            OFFSCREEN
        );
    }
}
