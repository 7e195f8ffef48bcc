//! A deterministic synthetic AR world.
//!
//! One or more planes, a pinhole camera positioned with `look_at` and a
//! ray-cast hit test through the inverse view-projection. It implements the
//! full [`crate::ar`] boundary so the measurement loop can run headless in
//! tests and in the `measure_sim` driver.

use crate::{
    ar::{Anchor, ArError, ArSession, Camera, Frame, HitResult, Plane, Trackable, TrackingState},
    display::DisplayRotation,
    plane_mesh::plane_normal,
    pose::Pose,
    projection::{project_to_screen, Viewport},
};
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// An anchor whose detach flag is shared between clones.
#[derive(Debug, Clone)]
pub struct SimAnchor {
    pose: Pose,
    detached: Arc<AtomicBool>,
}

impl SimAnchor {
    pub fn new(pose: Pose) -> Self {
        Self {
            pose,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

impl Anchor for SimAnchor {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn tracking_state(&self) -> TrackingState {
        if self.is_detached() {
            TrackingState::Stopped
        } else {
            TrackingState::Tracking
        }
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct SimPlane {
    pub polygon: Vec<Vec2>,
    pub center: Pose,
    pub tracking: TrackingState,
    pub subsumed: bool,
}

impl SimPlane {
    /// Axis-aligned rectangle of `half_x` by `half_z` around `center`.
    pub fn rectangle(center: Pose, half_x: f32, half_z: f32) -> Self {
        Self {
            polygon: vec![
                Vec2::new(-half_x, -half_z),
                Vec2::new(half_x, -half_z),
                Vec2::new(half_x, half_z),
                Vec2::new(-half_x, half_z),
            ],
            center,
            tracking: TrackingState::Tracking,
            subsumed: false,
        }
    }
}

impl Plane for SimPlane {
    fn polygon(&self) -> &[Vec2] {
        &self.polygon
    }

    fn center_pose(&self) -> Pose {
        self.center
    }

    fn tracking_state(&self) -> TrackingState {
        self.tracking
    }

    fn is_subsumed(&self) -> bool {
        self.subsumed
    }
}

#[derive(Debug, Clone)]
pub struct SimCamera {
    pose: Pose,
    tracking: TrackingState,
    fov_y: f32,
    aspect: f32,
}

impl Camera for SimCamera {
    fn pose(&self) -> Pose {
        self.pose
    }

    fn display_oriented_pose(&self) -> Pose {
        self.pose
    }

    fn tracking_state(&self) -> TrackingState {
        self.tracking
    }

    fn view_matrix(&self) -> Mat4 {
        self.pose.view_matrix()
    }

    fn projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y, self.aspect, near, far)
    }
}

/// A snapshot of the world at the moment it was taken.
#[derive(Debug, Clone)]
pub struct SimFrame {
    camera: SimCamera,
    planes: Arc<Vec<SimPlane>>,
    viewport: Viewport,
    rotation: DisplayRotation,
    geometry_changed: bool,
}

impl SimFrame {
    /// Near/far used only for unprojecting taps; hits do not depend on them.
    const RAY_NEAR: f32 = 0.1;
    const RAY_FAR: f32 = 10.0;

    fn tap_ray(&self, x: f32, y: f32) -> Option<(Vec3, Vec3)> {
        if self.viewport.is_empty() {
            return None;
        }
        let ndc_x = 2.0 * x / self.viewport.width as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * y / self.viewport.height as f32;

        let view_proj = self.camera.projection_matrix(Self::RAY_NEAR, Self::RAY_FAR)
            * self.camera.view_matrix();
        let inv = view_proj.inverse();
        let near = inv * Vec4::new(ndc_x, ndc_y, -1.0, 1.0);
        let far = inv * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;
        Some((near, (far - near).normalize()))
    }
}

impl Frame for SimFrame {
    type Camera = SimCamera;
    type Plane = SimPlane;
    type Anchor = SimAnchor;

    fn camera(&self) -> &SimCamera {
        &self.camera
    }

    fn planes(&self) -> &[SimPlane] {
        &self.planes
    }

    fn hit_test(&self, x: f32, y: f32) -> Vec<HitResult<'_, SimPlane>> {
        let Some((origin, dir)) = self.tap_ray(x, y) else {
            return Vec::new();
        };

        let mut hits: Vec<(f32, HitResult<'_, SimPlane>)> = self
            .planes
            .iter()
            .filter(|p| p.tracking.is_tracking())
            .filter_map(|plane| {
                let normal = plane_normal(&plane.center);
                let denom = dir.dot(normal);
                if denom.abs() < 1e-6 {
                    return None;
                }
                let t = (plane.center.translation - origin).dot(normal) / denom;
                (t > 0.0).then(|| {
                    let pose = Pose::new(origin + dir * t, plane.center.rotation);
                    (t, HitResult { trackable: Trackable::Plane(plane), pose })
                })
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, hit)| hit).collect()
    }

    fn create_anchor(&self, pose: &Pose) -> Result<SimAnchor, ArError> {
        if !self.camera.tracking.is_tracking() {
            return Err(ArError::NotTracking);
        }
        Ok(SimAnchor::new(*pose))
    }

    fn has_display_geometry_changed(&self) -> bool {
        self.geometry_changed
    }

    fn transform_ndc_to_texture(&self, ndc: &[f32; 8]) -> [f32; 8] {
        let mut out = [0.0; 8];
        for i in 0..4 {
            let (u, v) = ((ndc[2 * i] + 1.0) / 2.0, (1.0 - ndc[2 * i + 1]) / 2.0);
            let (u, v) = match self.rotation {
                DisplayRotation::Rotation0 => (u, v),
                DisplayRotation::Rotation90 => (v, 1.0 - u),
                DisplayRotation::Rotation180 => (1.0 - u, 1.0 - v),
                DisplayRotation::Rotation270 => (1.0 - v, u),
            };
            out[2 * i] = u;
            out[2 * i + 1] = v;
        }
        out
    }
}

/// The scene: planes plus a camera that can be moved and lose tracking.
#[derive(Debug, Clone)]
pub struct SimWorld {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov_y: f32,
    pub viewport: Viewport,
    pub tracking: TrackingState,
    pub planes: Vec<SimPlane>,
}

impl Default for SimWorld {
    /// A 2 m square floor at y = 0, viewed from 1 m up and slightly behind.
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 1.0, 0.5),
            target: Vec3::new(0.0, 0.0, -0.5),
            fov_y: 60f32.to_radians(),
            viewport: Viewport::new(1000, 1000),
            tracking: TrackingState::Tracking,
            planes: vec![SimPlane::rectangle(Pose::IDENTITY, 1.0, 1.0)],
        }
    }
}

impl SimWorld {
    /// Sets the camera tracking state reported by new frames.
    pub fn set_tracking(&mut self, tracking: TrackingState) {
        self.tracking = tracking;
    }

    /// Rotates the eye about the vertical axis through the target.
    pub fn orbit_camera(&mut self, radians: f32) {
        let offset = self.eye - self.target;
        self.eye = self.target + Quat::from_rotation_y(radians) * offset;
    }

    pub fn camera_pose(&self) -> Pose {
        let view = Mat4::look_at_rh(self.eye, self.target, Vec3::Y);
        let (_, rotation, translation) = view.inverse().to_scale_rotation_translation();
        Pose::new(translation, rotation.normalize())
    }

    pub fn camera(&self) -> SimCamera {
        SimCamera {
            pose: self.camera_pose(),
            tracking: self.tracking,
            fov_y: self.fov_y,
            aspect: self.viewport.aspect(),
        }
    }

    /// Captures the current camera and planes as a frame.
    pub fn frame(&self) -> SimFrame {
        self.frame_with(DisplayRotation::Rotation0, false)
    }

    fn frame_with(&self, rotation: DisplayRotation, geometry_changed: bool) -> SimFrame {
        SimFrame {
            camera: self.camera(),
            planes: Arc::new(self.planes.clone()),
            viewport: self.viewport,
            rotation,
            geometry_changed,
        }
    }

    /// Pixel position of a world point as seen by the current camera.
    pub fn screen_point(&self, world: Vec3) -> Vec2 {
        let camera = self.camera();
        project_to_screen(
            world,
            &camera.view_matrix(),
            &camera.projection_matrix(0.1, 100.0),
            self.viewport,
        )
    }
}

/// [`ArSession`] over a [`SimWorld`].
#[derive(Debug)]
pub struct SimSession {
    world: SimWorld,
    camera_texture: Option<u32>,
    rotation: DisplayRotation,
    geometry_dirty: bool,
    paused: bool,
    updates: u64,
}

impl SimSession {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world,
            camera_texture: None,
            rotation: DisplayRotation::Rotation0,
            geometry_dirty: true,
            paused: false,
            updates: 0,
        }
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut SimWorld {
        &mut self.world
    }

    pub fn camera_texture(&self) -> Option<u32> {
        self.camera_texture
    }

    pub fn display_geometry(&self) -> (DisplayRotation, u32, u32) {
        (self.rotation, self.world.viewport.width, self.world.viewport.height)
    }

    /// Number of frames produced so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl ArSession for SimSession {
    type Frame = SimFrame;

    fn set_camera_texture_name(&mut self, name: u32) {
        self.camera_texture = Some(name);
    }

    fn set_display_geometry(&mut self, rotation: DisplayRotation, width: u32, height: u32) {
        self.rotation = rotation;
        self.world.viewport = Viewport::new(width, height);
        self.geometry_dirty = true;
    }

    fn update(&mut self) -> Result<SimFrame, ArError> {
        if self.paused {
            return Err(ArError::SessionPaused);
        }
        let frame = self.world.frame_with(self.rotation, self.geometry_dirty);
        self.geometry_dirty = false;
        self.updates += 1;
        Ok(frame)
    }

    fn resume(&mut self) -> Result<(), ArError> {
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_test_round_trips_screen_point() {
        let world = SimWorld::default();
        let frame = world.frame();
        let target = Vec3::new(0.3, 0.0, -0.4);
        let tap = world.screen_point(target);

        let hits = frame.hit_test(tap.x, tap.y);
        assert_eq!(hits.len(), 1);
        assert!(matches!(hits[0].trackable, Trackable::Plane(_)));
        assert!((hits[0].pose.translation - target).length() < 1e-3);
    }

    #[test]
    fn test_hits_sorted_nearest_first() {
        let mut world = SimWorld::default();
        let table = SimPlane::rectangle(Pose::from_translation(Vec3::new(0.0, 0.5, -0.5)), 0.3, 0.3);
        world.planes.push(table);

        let tap = world.screen_point(Vec3::new(0.0, 0.5, -0.5));
        let frame = world.frame();
        let hits = frame.hit_test(tap.x, tap.y);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].pose.translation.y - 0.5).abs() < 1e-4);
        assert!(hits[1].pose.translation.y.abs() < 1e-4);
    }

    #[test]
    fn test_ndc_quad_maps_to_unit_texture() {
        let frame = SimWorld::default().frame();
        let quad = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
        assert_eq!(
            frame.transform_ndc_to_texture(&quad),
            [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_session_reports_geometry_change_once() {
        let mut session = SimSession::new(SimWorld::default());
        assert!(session.update().unwrap().has_display_geometry_changed());
        assert!(!session.update().unwrap().has_display_geometry_changed());
        session.set_display_geometry(DisplayRotation::Rotation90, 800, 600);
        assert!(session.update().unwrap().has_display_geometry_changed());

        session.pause();
        assert!(matches!(session.update(), Err(ArError::SessionPaused)));
        assert_eq!(session.updates(), 3);
    }
}
