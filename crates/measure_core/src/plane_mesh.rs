//! Host-side geometry for the plane grid overlay.
//!
//! A tracked plane arrives as a boundary polygon in its own local (x, z)
//! frame. We fan-triangulate it around vertex 0 and attach a radial
//! fade alpha per vertex, producing `(x, z, alpha)` triples that the plane
//! shader lifts back onto the plane.

use crate::pose::Pose;
use glam::{Quat, Vec2, Vec3};

/// Radius in meters over which the grid fades out from the plane origin.
pub const FADE_RADIUS_M: f32 = 0.25;

/// Grid tiling and contrast constants consumed by the plane shader.
pub const GRID_CONTROL: [f32; 4] = [0.2, 0.4, 2.0, 1.5];

/// Floats emitted per plane vertex: x, z, alpha.
pub const COORDS_PER_VERTEX: usize = 3;

/// `1` at the origin falling linearly to `0` at `fade_radius` and beyond.
#[inline]
pub fn fade_alpha(x: f32, z: f32, fade_radius: f32) -> f32 {
    let distance = Vec2::new(x, z).length();
    1.0 - (distance / fade_radius).min(1.0)
}

/// Reusable scratch buffers for plane triangulation. Capacity only grows,
/// so steady-state frames do not allocate.
#[derive(Debug, Default)]
pub struct PlaneMeshBuilder {
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

impl PlaneMeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triangulates `polygon`. Returns `false` and leaves the buffers empty
    /// for degenerate polygons (fewer than 3 points).
    pub fn build(&mut self, polygon: &[Vec2], fade_radius: f32) -> bool {
        self.vertices.clear();
        self.indices.clear();

        let n = polygon.len();
        if n < 3 {
            return false;
        }

        self.vertices.reserve(n * COORDS_PER_VERTEX);
        for p in polygon {
            self.vertices
                .extend_from_slice(&[p.x, p.y, fade_alpha(p.x, p.y, fade_radius)]);
        }

        self.indices.reserve((n - 2) * 3);
        for i in 1..(n as u32 - 1) {
            self.indices.extend_from_slice(&[0, i, i + 1]);
        }
        true
    }

    /// Interleaved (x, z, alpha) vertices from the last build.
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Fan triangle indices from the last build.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// World-space up normal of a plane: its local Y axis.
pub fn plane_normal(center: &Pose) -> Vec3 {
    center.transformed_axis(1, 1.0)
}

/// 2x2 column-major rotation for grid UVs, from the pose's rotation angle.
pub fn uv_rotation(rotation: Quat) -> [f32; 4] {
    let angle = 2.0 * rotation.x.atan2(rotation.w);
    let (sin, cos) = angle.sin_cos();
    [cos, sin, -sin, cos]
}

/// Signed distance from `camera` to the plane through `plane` along its normal.
/// Negative when the camera is below the plane.
pub fn signed_distance_to_plane(plane: &Pose, camera: &Pose) -> f32 {
    let normal = plane_normal(plane);
    (camera.translation - plane.translation).dot(normal)
}

/// Even-odd point-in-polygon test in the plane's local (x, z) frame.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y) {
            let cross_x = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_polygon(n: usize, radius: f32) -> Vec<Vec2> {
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32 * std::f32::consts::TAU;
                Vec2::new(radius * t.cos(), radius * t.sin())
            })
            .collect()
    }

    fn shoelace(points: &[Vec2]) -> f32 {
        let mut sum = 0.0;
        for i in 0..points.len() {
            let (a, b) = (points[i], points[(i + 1) % points.len()]);
            sum += a.x * b.y - b.x * a.y;
        }
        sum.abs() / 2.0
    }

    #[test]
    fn test_fan_covers_convex_polygon() {
        let mut builder = PlaneMeshBuilder::new();
        for n in [3usize, 4, 7, 32] {
            let polygon = regular_polygon(n, 1.3);
            assert!(builder.build(&polygon, FADE_RADIUS_M));
            assert_eq!(builder.triangle_count(), n - 2);
            assert_eq!(builder.vertices().len(), n * COORDS_PER_VERTEX);

            let mut area = 0.0;
            for tri in builder.indices().chunks(3) {
                assert_eq!(tri[0], 0);
                let pts: Vec<Vec2> = tri.iter().map(|&i| polygon[i as usize]).collect();
                area += shoelace(&pts);
            }
            let expected = shoelace(&polygon);
            assert!((area - expected).abs() < 1e-4 * expected.max(1.0), "n = {n}");
        }
    }

    #[test]
    fn test_degenerate_polygons_rejected() {
        let mut builder = PlaneMeshBuilder::new();
        assert!(builder.build(&regular_polygon(5, 1.0), FADE_RADIUS_M));
        assert!(!builder.build(&[Vec2::ZERO, Vec2::X], FADE_RADIUS_M));
        assert!(builder.vertices().is_empty());
        assert!(builder.indices().is_empty());
    }

    #[test]
    fn test_fade_alpha_boundary_and_monotonic() {
        assert_eq!(fade_alpha(0.0, 0.0, FADE_RADIUS_M), 1.0);
        assert_eq!(fade_alpha(FADE_RADIUS_M, 0.0, FADE_RADIUS_M), 0.0);
        assert_eq!(fade_alpha(3.0, -4.0, FADE_RADIUS_M), 0.0);

        let mut last = f32::INFINITY;
        for step in 0..=40 {
            let d = step as f32 * 0.01;
            let a = fade_alpha(d * 0.6, d * 0.8, FADE_RADIUS_M);
            assert!(a <= last);
            assert!((0.0..=1.0).contains(&a));
            last = a;
        }
    }

    #[test]
    fn test_vertices_carry_local_xz_and_alpha() {
        let mut builder = PlaneMeshBuilder::new();
        let square = [
            Vec2::new(-0.1, -0.1),
            Vec2::new(0.1, -0.1),
            Vec2::new(0.1, 0.1),
            Vec2::new(-0.1, 0.1),
        ];
        builder.build(&square, FADE_RADIUS_M);
        let v = builder.vertices();
        assert_eq!(&v[3..5], &[0.1, -0.1]);
        assert!((v[5] - fade_alpha(0.1, -0.1, FADE_RADIUS_M)).abs() < 1e-6);
        assert_eq!(builder.indices(), &[0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_uv_rotation_identity_and_quarter_turn() {
        assert_eq!(uv_rotation(Quat::IDENTITY), [1.0, 0.0, -0.0, 1.0]);

        let q = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        let m = uv_rotation(q);
        assert!(m[0].abs() < 1e-6 && (m[1] - 1.0).abs() < 1e-6);
        assert!((m[2] + 1.0).abs() < 1e-6 && m[3].abs() < 1e-6);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = regular_polygon(4, 1.0);
        assert!(point_in_polygon(Vec2::ZERO, &square));
        assert!(point_in_polygon(Vec2::new(0.3, 0.3), &square));
        assert!(!point_in_polygon(Vec2::new(0.8, 0.8), &square));
        assert!(!point_in_polygon(Vec2::ZERO, &square[..2]));
    }

    #[test]
    fn test_signed_distance() {
        let floor = Pose::from_translation(Vec3::new(0.0, -1.0, 0.0));
        let above = Pose::from_translation(Vec3::new(2.0, 0.5, 1.0));
        let below = Pose::from_translation(Vec3::new(0.0, -3.0, 0.0));
        assert!((signed_distance_to_plane(&floor, &above) - 1.5).abs() < 1e-6);
        assert!((signed_distance_to_plane(&floor, &below) + 2.0).abs() < 1e-6);
    }
}
