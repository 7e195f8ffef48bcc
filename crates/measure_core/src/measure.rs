//! The live/frozen measurement state machine.
//!
//! `MeasureState` owns the anchor group and decides which camera matrices
//! apply to screen-space output. In `Live` mode that is whatever the most
//! recent frame reported. `freeze` snapshots the last tracked frame and its
//! matrices; the snapshot is never touched again until `clear` or
//! `unfreeze`, even though live matrices keep being observed underneath.

use crate::{
    anchors::{AnchorGroup, GroupPolicy},
    ar::{Camera, Frame, Plane, Trackable, TrackingState},
    events::{Measurement, Notice},
    projection::{project_to_screen, Viewport, OFFSCREEN},
};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use thiserror::Error;

/// Camera matrices used to project anchors to the screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMatrices {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ViewMatrices {
    pub const IDENTITY: Self = Self {
        view: Mat4::IDENTITY,
        projection: Mat4::IDENTITY,
    };

    /// View and projection of `camera` for the given clip planes.
    pub fn from_camera<C: Camera>(camera: &C, near: f32, far: f32) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(near, far),
        }
    }
}

/// User actions that were rejected. State is unchanged in every case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeasureError {
    #[error("view is frozen")]
    Frozen,
    #[error("camera is not tracking")]
    NotTracking,
    #[error("last tracked frame is not stable enough to freeze")]
    UnstableScene,
    #[error("no tracked surface at tap location")]
    NoSurfaceHit,
    #[error("anchor creation failed: {0}")]
    AnchorCreation(String),
}

impl MeasureError {
    /// The notice shown to the user, if any.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            MeasureError::Frozen => None,
            MeasureError::NotTracking => Some(Notice::SceneNotStable),
            MeasureError::UnstableScene => Some(Notice::FreezeRejected),
            MeasureError::NoSurfaceHit => Some(Notice::NoSurfaceHit),
            MeasureError::AnchorCreation(msg) => Some(Notice::SessionError(msg.clone())),
        }
    }
}

/// Result of a successful freeze request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeOutcome {
    Frozen,
    AlreadyFrozen,
}

/// Result of placing an anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct TapOutcome {
    /// Anchors held after placement.
    pub count: usize,
    /// Anchors detached because the previous group was full.
    pub evicted: usize,
    /// Present when this placement completed a measured pair.
    pub measurements: Option<Vec<Measurement>>,
}

enum Mode<F> {
    Live,
    Frozen { frame: F, matrices: ViewMatrices },
}

/// Anchors plus the live/frozen mode that decides which matrices apply.
pub struct MeasureState<F: Frame> {
    anchors: Arc<AnchorGroup<F::Anchor>>,
    mode: Mode<F>,
    last_tracked: Option<F>,
    last_state: Option<TrackingState>,
    live: Option<ViewMatrices>,
    viewport: Viewport,
    near: f32,
    far: f32,
}

impl<F: Frame> MeasureState<F> {
    /// A live, empty state projecting with the given clip planes.
    pub fn new(policy: GroupPolicy, near: f32, far: f32) -> Self {
        Self {
            anchors: Arc::new(AnchorGroup::new(policy)),
            mode: Mode::Live,
            last_tracked: None,
            last_state: None,
            live: None,
            viewport: Viewport::default(),
            near,
            far,
        }
    }

    /// Shared handle to the anchor group for concurrent readers.
    pub fn anchors(&self) -> &Arc<AnchorGroup<F::Anchor>> {
        &self.anchors
    }

    /// Viewport used to project measurement midpoints.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Whether a frozen snapshot currently applies.
    pub fn is_frozen(&self) -> bool {
        matches!(self.mode, Mode::Frozen { .. })
    }

    /// Records the tracking state and live matrices of `frame` and, when its
    /// camera is tracking, keeps it as the last tracked frame.
    pub fn observe_frame(&mut self, frame: &F) -> TrackingState {
        let camera = frame.camera();
        let state = camera.tracking_state();
        self.last_state = Some(state);
        if state.is_tracking() {
            self.live = Some(ViewMatrices::from_camera(camera, self.near, self.far));
            self.last_tracked = Some(frame.clone());
        }
        state
    }

    /// Matrices of the most recent tracked frame, ignoring any freeze.
    pub fn live_matrices(&self) -> Option<ViewMatrices> {
        self.live
    }

    /// Matrices that apply to screen-space output right now.
    pub fn current_matrices(&self) -> Option<ViewMatrices> {
        match &self.mode {
            Mode::Frozen { matrices, .. } => Some(*matrices),
            Mode::Live => self.live,
        }
    }

    /// Tracking state of the most recently observed frame.
    pub fn last_tracking_state(&self) -> Option<TrackingState> {
        self.last_state
    }

    /// The snapshot frame while frozen.
    pub fn frozen_frame(&self) -> Option<&F> {
        match &self.mode {
            Mode::Frozen { frame, .. } => Some(frame),
            Mode::Live => None,
        }
    }

    /// The most recent frame whose camera was tracking.
    pub fn last_tracked_frame(&self) -> Option<&F> {
        self.last_tracked.as_ref()
    }

    /// Live -> Frozen, snapshotting the last tracked frame's matrices.
    ///
    /// Rejected unless the most recently observed frame was tracking.
    pub fn freeze(&mut self) -> Result<FreezeOutcome, MeasureError> {
        if self.is_frozen() {
            return Ok(FreezeOutcome::AlreadyFrozen);
        }
        if !self.last_state.is_some_and(TrackingState::is_tracking) {
            return Err(MeasureError::UnstableScene);
        }

        let frame = match &self.last_tracked {
            Some(frame) => frame.clone(),
            None => return Err(MeasureError::UnstableScene),
        };

        let matrices = ViewMatrices::from_camera(frame.camera(), self.near, self.far);
        log::info!("View frozen with {} anchor(s)", self.anchors.len());
        self.mode = Mode::Frozen { frame, matrices };
        Ok(FreezeOutcome::Frozen)
    }

    /// Frozen -> Live. Returns whether the view was frozen.
    pub fn unfreeze(&mut self) -> bool {
        let was_frozen = self.is_frozen();
        self.mode = Mode::Live;
        was_frozen
    }

    /// Places an anchor where the tap hits a tracked plane.
    pub fn handle_tap(&mut self, frame: &F, x: f32, y: f32) -> Result<TapOutcome, MeasureError> {
        if self.is_frozen() {
            return Err(MeasureError::Frozen);
        }
        if !frame.camera().tracking_state().is_tracking() {
            return Err(MeasureError::NotTracking);
        }

        let hit = frame
            .hit_test(x, y)
            .into_iter()
            .find(|hit| match hit.trackable {
                Trackable::Plane(plane) => plane.is_pose_in_polygon(&hit.pose) && !plane.is_subsumed(),
                Trackable::Other => false,
            })
            .ok_or(MeasureError::NoSurfaceHit)?;

        let anchor = frame
            .create_anchor(&hit.pose)
            .map_err(|e| MeasureError::AnchorCreation(e.to_string()))?;

        let pushed = self.anchors.push(anchor);
        if pushed.evicted > 0 {
            log::debug!("Anchor group full; detached {} anchor(s)", pushed.evicted);
        }

        let measurements = self
            .anchors
            .policy()
            .measures_at(pushed.count)
            .then(|| self.measurements());

        Ok(TapOutcome {
            count: pushed.count,
            evicted: pushed.evicted,
            measurements,
        })
    }

    /// Labelled distances for every complete pair, projected with the
    /// matrices that currently apply.
    pub fn measurements(&self) -> Vec<Measurement> {
        let positions = self.anchors.positions();
        match self.current_matrices() {
            Some(m) => measure_pairs(&positions, &m, self.viewport),
            None => measure_pairs_unprojected(&positions),
        }
    }

    /// Detaches every anchor, drops any frozen snapshot and returns to Live.
    pub fn clear(&mut self) -> usize {
        let removed = self.anchors.clear();
        self.mode = Mode::Live;
        removed
    }
}

/// Distances for pairs (0,1), (2,3), ... labelled "Distance 1", "Distance 2", ...
pub fn measure_pairs(positions: &[Vec3], matrices: &ViewMatrices, viewport: Viewport) -> Vec<Measurement> {
    positions
        .chunks_exact(2)
        .enumerate()
        .map(|(k, pair)| {
            let (a, b) = (pair[0], pair[1]);
            let mid = project_to_screen((a + b) / 2.0, &matrices.view, &matrices.projection, viewport);
            Measurement {
                label: format!("Distance {}", k + 1),
                distance_m: a.distance(b),
                midpoint_screen_x: mid.x,
                midpoint_screen_y: mid.y,
            }
        })
        .collect()
}

fn measure_pairs_unprojected(positions: &[Vec3]) -> Vec<Measurement> {
    positions
        .chunks_exact(2)
        .enumerate()
        .map(|(k, pair)| Measurement {
            label: format!("Distance {}", k + 1),
            distance_m: pair[0].distance(pair[1]),
            midpoint_screen_x: OFFSCREEN.x,
            midpoint_screen_y: OFFSCREEN.y,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ar::Anchor,
        sim::{SimFrame, SimWorld},
    };
    use glam::Vec2;

    fn state() -> MeasureState<SimFrame> {
        let mut s = MeasureState::new(GroupPolicy::FOUR_POINT, 0.1, 100.0);
        s.set_viewport(Viewport::new(1000, 1000));
        s
    }

    fn tap_floor(s: &mut MeasureState<SimFrame>, world: &SimWorld, x: f32, z: f32) -> TapOutcome {
        let frame = world.frame();
        s.observe_frame(&frame);
        let screen = world.screen_point(Vec3::new(x, 0.0, z));
        s.handle_tap(&frame, screen.x, screen.y).unwrap()
    }

    #[test]
    fn test_two_point_scenario() {
        let positions = [Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)];
        let out = measure_pairs(&positions, &ViewMatrices::IDENTITY, Viewport::new(1000, 1000));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "Distance 1");
        assert_eq!(out[0].distance_m, 1.0);
        assert_eq!((out[0].midpoint_screen_x, out[0].midpoint_screen_y), (750.0, 500.0));
    }

    #[test]
    fn test_second_pair_only_with_four() {
        let positions: Vec<Vec3> = (0..3).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        assert_eq!(measure_pairs(&positions, &ViewMatrices::IDENTITY, Viewport::new(10, 10)).len(), 1);

        let mut four = positions.clone();
        four.push(Vec3::new(2.0, 0.0, 3.0));
        let out = measure_pairs(&four, &ViewMatrices::IDENTITY, Viewport::new(10, 10));
        assert_eq!(out[1].label, "Distance 2");
        assert!((out[1].distance_m - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_events_fire_at_two_and_four() {
        let world = SimWorld::default();
        let mut s = state();
        let xs = [-0.4, -0.2, 0.1, 0.3];
        let fired: Vec<bool> = xs
            .iter()
            .map(|&x| tap_floor(&mut s, &world, x, -0.5).measurements.is_some())
            .collect();
        assert_eq!(fired, vec![false, true, false, true]);

        let out = tap_floor(&mut s, &world, 0.0, -0.6);
        assert_eq!(out.count, 1);
        assert_eq!(out.evicted, 4);
        assert!(out.measurements.is_none());
    }

    #[test]
    fn test_measured_distance_matches_placement() {
        let world = SimWorld::default();
        let mut s = state();
        tap_floor(&mut s, &world, -0.25, -0.5);
        let out = tap_floor(&mut s, &world, 0.25, -0.5);
        let m = &out.measurements.unwrap()[0];
        assert!((m.distance_m - 0.5).abs() < 1e-3, "distance {}", m.distance_m);
        assert!(m.midpoint_screen_x > 0.0 && m.midpoint_screen_y > 0.0);
    }

    #[test]
    fn test_tap_rejections_leave_state_unchanged() {
        let mut world = SimWorld::default();
        let mut s = state();

        let sky = Vec2::new(500.0, 5.0);
        let frame = world.frame();
        s.observe_frame(&frame);
        assert_eq!(s.handle_tap(&frame, sky.x, sky.y), Err(MeasureError::NoSurfaceHit));

        world.set_tracking(TrackingState::Paused);
        let frame = world.frame();
        s.observe_frame(&frame);
        assert_eq!(s.handle_tap(&frame, 500.0, 900.0), Err(MeasureError::NotTracking));
        assert!(s.anchors().is_empty());
    }

    #[test]
    fn test_freeze_requires_tracking() {
        let mut world = SimWorld::default();
        world.set_tracking(TrackingState::Paused);
        let mut s = state();
        s.observe_frame(&world.frame());
        assert_eq!(s.freeze(), Err(MeasureError::UnstableScene));
        assert!(!s.is_frozen());
        assert!(s.frozen_frame().is_none());
    }

    #[test]
    fn test_freeze_rejected_after_tracking_lost() {
        let mut world = SimWorld::default();
        let mut s = state();
        s.observe_frame(&world.frame());
        assert!(s.last_tracked_frame().is_some());

        world.set_tracking(TrackingState::Paused);
        s.observe_frame(&world.frame());
        assert_eq!(s.last_tracking_state(), Some(TrackingState::Paused));
        assert_eq!(s.freeze(), Err(MeasureError::UnstableScene));
        assert!(!s.is_frozen());

        world.set_tracking(TrackingState::Tracking);
        s.observe_frame(&world.frame());
        assert_eq!(s.freeze(), Ok(FreezeOutcome::Frozen));
    }

    #[test]
    fn test_freeze_is_idempotent_and_immutable() {
        let mut world = SimWorld::default();
        let mut s = state();
        s.observe_frame(&world.frame());
        let before = s.current_matrices().unwrap();

        assert_eq!(s.freeze(), Ok(FreezeOutcome::Frozen));
        world.orbit_camera(0.5);
        s.observe_frame(&world.frame());
        assert_eq!(s.freeze(), Ok(FreezeOutcome::AlreadyFrozen));

        assert_eq!(s.current_matrices(), Some(before));
        assert_ne!(s.live_matrices(), Some(before));

        let frame = world.frame();
        assert_eq!(s.handle_tap(&frame, 500.0, 900.0), Err(MeasureError::Frozen));
    }

    #[test]
    fn test_clear_resets_everything() {
        let world = SimWorld::default();
        let mut s = state();
        for x in [-0.3, -0.1, 0.1, 0.3] {
            tap_floor(&mut s, &world, x, -0.5);
        }
        let held = s.anchors().snapshot();
        s.freeze().unwrap();

        assert_eq!(s.clear(), 4);
        assert!(s.anchors().is_empty());
        assert!(!s.is_frozen());
        assert!(s.frozen_frame().is_none());
        assert!(held.iter().all(|a| a.tracking_state() == TrackingState::Stopped));
    }
}
