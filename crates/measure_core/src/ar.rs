//! Boundary traits for the external AR tracking subsystem.
//!
//! The measurement core never estimates poses itself. Everything it knows
//! about the world arrives through these traits: a [`Frame`] per poll, its
//! [`Camera`], the tracked [`Plane`]s, hit-test results and the [`Anchor`]s
//! created from them. A host binds them to its tracking runtime; the
//! [`crate::sim`] module provides a deterministic implementation.

use crate::{display::DisplayRotation, plane_mesh::point_in_polygon, pose::Pose};
use glam::{Mat4, Vec2};
use thiserror::Error;

/// Tracking state reported for cameras, planes and anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

impl TrackingState {
    #[inline]
    pub fn is_tracking(self) -> bool {
        self == TrackingState::Tracking
    }
}

/// Failures surfaced by the AR runtime.
#[derive(Debug, Error)]
pub enum ArError {
    #[error("camera is not tracking")]
    NotTracking,
    #[error("AR session is paused")]
    SessionPaused,
    #[error("camera is not available")]
    CameraNotAvailable,
    #[error("camera permission was not granted")]
    PermissionDenied,
    #[error("AR runtime is not installed")]
    RuntimeUnavailable,
    #[error("failed to create anchor: {0}")]
    AnchorCreation(String),
    #[error("AR session failure: {0}")]
    Session(String),
}

/// A fixed point in world space maintained by the tracking subsystem.
///
/// Anchors are shared between the render thread and readers of the anchor
/// group, so implementations are cheap handles.
pub trait Anchor: Clone + Send + Sync {
    fn pose(&self) -> Pose;
    fn tracking_state(&self) -> TrackingState;
    /// Stops tracking this anchor. Calling it more than once is harmless.
    fn detach(&self);
}

/// A detected planar surface.
pub trait Plane {
    /// Boundary polygon as (x, z) pairs in the plane's local frame.
    fn polygon(&self) -> &[Vec2];
    fn center_pose(&self) -> Pose;
    fn tracking_state(&self) -> TrackingState;
    /// True once the plane has been merged into a larger one.
    fn is_subsumed(&self) -> bool;

    /// Whether `pose` lies inside the boundary polygon once projected onto
    /// the plane.
    fn is_pose_in_polygon(&self, pose: &Pose) -> bool {
        let local = self.center_pose().inverse().transform_point(pose.translation);
        point_in_polygon(Vec2::new(local.x, local.z), self.polygon())
    }
}

/// The device camera as seen in one frame.
pub trait Camera {
    fn pose(&self) -> Pose;
    /// Pose adjusted for the current display rotation; used for plane rendering.
    fn display_oriented_pose(&self) -> Pose;
    fn tracking_state(&self) -> TrackingState;
    fn view_matrix(&self) -> Mat4;
    fn projection_matrix(&self, near: f32, far: f32) -> Mat4;
}

/// What a hit test struck. Only planes matter to measurement.
#[derive(Debug)]
pub enum Trackable<'a, P> {
    Plane(&'a P),
    Other,
}

/// One intersection of a screen ray with a trackable, nearest first.
#[derive(Debug)]
pub struct HitResult<'a, P> {
    pub trackable: Trackable<'a, P>,
    pub pose: Pose,
}

/// Depth in millimeters, row-major.
#[derive(Debug, Clone)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u16>,
}

/// One camera frame. Frames are cloneable handles so the last tracked one
/// can be retained while the view is frozen.
pub trait Frame: Clone {
    type Camera: Camera;
    type Plane: Plane;
    type Anchor: Anchor;

    fn camera(&self) -> &Self::Camera;
    fn planes(&self) -> &[Self::Plane];
    /// Hits ordered nearest first.
    fn hit_test(&self, x: f32, y: f32) -> Vec<HitResult<'_, Self::Plane>>;
    fn create_anchor(&self, pose: &Pose) -> Result<Self::Anchor, ArError>;
    fn has_display_geometry_changed(&self) -> bool;
    /// Maps four NDC (x, y) pairs to normalized camera-texture coordinates.
    fn transform_ndc_to_texture(&self, ndc: &[f32; 8]) -> [f32; 8];

    fn depth_image(&self) -> Option<DepthImage> {
        None
    }
}

/// Host adapter around the tracking runtime, driven from the render thread.
pub trait ArSession {
    type Frame: Frame;

    fn set_camera_texture_name(&mut self, name: u32);
    fn set_display_geometry(&mut self, rotation: DisplayRotation, width: u32, height: u32);
    fn update(&mut self) -> Result<Self::Frame, ArError>;

    fn resume(&mut self) -> Result<(), ArError> {
        Ok(())
    }

    fn pause(&mut self) {}
}
