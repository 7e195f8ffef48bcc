//! The per-frame measurement loop, independent of any GPU backend.
//!
//! All AR session access and every state mutation happen on the thread that
//! owns the [`MeasureController`], which is the render thread. Other threads
//! talk to it through a cloneable [`MeasureHandle`]: commands and taps are
//! queued on crossbeam channels and drained at fixed points of the frame,
//! and results come back as [`SessionEvent`]s.
//!
//! A frame is driven in two halves so a renderer can draw in between:
//!
//! ```text
//! let step = controller.begin_frame(now);   // commands, session poll
//! /* draw background, planes, points from `step` */
//! controller.end_frame(&step);              // one pending tap
//! ```

use crate::{
    anchors::AnchorGroup,
    ar::{Anchor, ArError, ArSession, Frame, TrackingState},
    config::MeasureConfig,
    display::{DisplayGeometry, DisplayRotation},
    events::{Notice, NoticeTimer, SessionEvent},
    measure::{FreezeOutcome, MeasureState, ViewMatrices},
    projection::Viewport,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use glam::Vec3;
use std::{
    sync::{Arc, Weak},
    time::Instant,
};
use thiserror::Error;

/// A screen tap in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub x: f32,
    pub y: f32,
}

/// Requests queued from other threads and applied at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ClearPoints,
    FreezeView,
    Unfreeze,
    Shutdown,
}

impl Command {
    /// Resolves a host method-channel name.
    pub fn from_method(method: &str) -> Result<Self, CommandError> {
        match method {
            "clearPoints" => Ok(Command::ClearPoints),
            "freezeView" | "freezeArView" => Ok(Command::FreezeView),
            "unfreezeView" => Ok(Command::Unfreeze),
            other => Err(CommandError::NotImplemented(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("method `{0}` is not implemented")]
    NotImplemented(String),
    #[error("measurement loop is no longer running")]
    Disconnected,
}

/// Cross-thread entry point into a running [`MeasureController`].
pub struct MeasureHandle<A> {
    commands: Sender<Command>,
    taps: Sender<Tap>,
    // Second consumer end, used only to evict the oldest tap when full.
    tap_evict: Receiver<Tap>,
    // Dangles once the controller is dropped.
    running: Weak<()>,
    anchors: Arc<AnchorGroup<A>>,
}

impl<A> Clone for MeasureHandle<A> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            taps: self.taps.clone(),
            tap_evict: self.tap_evict.clone(),
            running: Weak::clone(&self.running),
            anchors: Arc::clone(&self.anchors),
        }
    }
}

impl<A: Anchor> MeasureHandle<A> {
    /// Dispatches a host method by name.
    pub fn invoke(&self, method: &str) -> Result<(), CommandError> {
        self.send(Command::from_method(method)?)
    }

    /// Detaches every anchor and returns the view to live.
    pub fn clear_points(&self) -> Result<(), CommandError> {
        self.send(Command::ClearPoints)
    }

    /// Freezes the view on the last tracked frame.
    pub fn freeze_view(&self) -> Result<(), CommandError> {
        self.send(Command::FreezeView)
    }

    /// Returns a frozen view to live without touching the anchors.
    pub fn unfreeze(&self) -> Result<(), CommandError> {
        self.send(Command::Unfreeze)
    }

    /// Stops the loop; the next frame reports [`FrameStep::Shutdown`].
    pub fn shutdown(&self) -> Result<(), CommandError> {
        self.send(Command::Shutdown)
    }

    /// Queues a tap. When the queue is full the oldest pending tap is dropped.
    pub fn tap(&self, x: f32, y: f32) -> Result<(), CommandError> {
        if self.running.strong_count() == 0 {
            return Err(CommandError::Disconnected);
        }
        let mut tap = Tap { x, y };
        for _ in 0..2 {
            match self.taps.try_send(tap) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.tap_evict.try_recv().is_ok() {
                        log::debug!("Dropped oldest tap (render thread busy)");
                    }
                    tap = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return Err(CommandError::Disconnected),
            }
        }
        log::debug!("Dropped tap at ({x}, {y}) (render thread busy)");
        Ok(())
    }

    /// Number of anchors currently placed.
    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    /// World positions of the placed anchors.
    pub fn anchor_positions(&self) -> Vec<Vec3> {
        self.anchors.positions()
    }

    fn send(&self, command: Command) -> Result<(), CommandError> {
        self.commands
            .send(command)
            .map_err(|_| CommandError::Disconnected)
    }
}

/// What the renderer should draw this frame.
#[derive(Debug)]
pub enum FrameStep<F> {
    Live {
        frame: F,
        tracking: TrackingState,
        /// Present once any frame has tracked.
        matrices: Option<ViewMatrices>,
    },
    Frozen {
        frame: F,
        matrices: ViewMatrices,
    },
    /// No frame this time around; draw nothing new.
    Idle,
    /// Release GPU resources and stop.
    Shutdown,
}

impl<F> FrameStep<F> {
    /// The frame to draw, if this step has one.
    pub fn frame(&self) -> Option<&F> {
        match self {
            FrameStep::Live { frame, .. } | FrameStep::Frozen { frame, .. } => Some(frame),
            FrameStep::Idle | FrameStep::Shutdown => None,
        }
    }
}

/// Owns the AR session and measurement state on the render thread.
pub struct MeasureController<S: ArSession> {
    session: S,
    state: MeasureState<S::Frame>,
    display: DisplayGeometry,
    notices: NoticeTimer,
    commands: Receiver<Command>,
    taps: Receiver<Tap>,
    events: Sender<SessionEvent>,
    handle: MeasureHandle<<S::Frame as Frame>::Anchor>,
    config: MeasureConfig,
    camera_texture: Option<u32>,
    tracking: bool,
    shutdown: bool,
    _running: Arc<()>,
}

impl<S: ArSession> MeasureController<S> {
    /// Builds a controller around `session`, returning it with a handle for
    /// other threads and the receiving end of the event stream.
    pub fn new(
        session: S,
        config: MeasureConfig,
    ) -> (Self, MeasureHandle<<S::Frame as Frame>::Anchor>, Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = unbounded();
        let (tap_tx, tap_rx) = bounded(config.tap_queue_capacity.max(1));
        let (event_tx, event_rx) = unbounded();

        let state = MeasureState::new(config.group, config.near, config.far);
        let running = Arc::new(());
        let handle = MeasureHandle {
            commands: cmd_tx,
            taps: tap_tx,
            tap_evict: tap_rx.clone(),
            running: Arc::downgrade(&running),
            anchors: Arc::clone(state.anchors()),
        };

        let controller = Self {
            session,
            state,
            display: DisplayGeometry::default(),
            notices: NoticeTimer::default(),
            commands: cmd_rx,
            taps: tap_rx,
            events: event_tx,
            handle: handle.clone(),
            config,
            camera_texture: None,
            tracking: false,
            shutdown: false,
            _running: running,
        };
        (controller, handle, event_rx)
    }

    /// A new cross-thread handle.
    pub fn handle(&self) -> MeasureHandle<<S::Frame as Frame>::Anchor> {
        self.handle.clone()
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    /// Current live/frozen measurement state.
    pub fn state(&self) -> &MeasureState<S::Frame> {
        &self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn display(&self) -> &DisplayGeometry {
        &self.display
    }

    /// Resumes the AR session and schedules the "searching" notice.
    pub fn resume(&mut self, now: Instant) -> Result<(), ArError> {
        if let Err(e) = self.session.resume() {
            log::error!("Failed to resume AR session: {e}");
            self.emit(SessionEvent::Notice(session_notice(&e)));
            return Err(e);
        }
        self.notices
            .arm(Notice::SearchingForSurfaces, now + self.config.search_notice_delay());
        Ok(())
    }

    /// Pauses the session and cancels any pending notice.
    pub fn pause(&mut self) {
        self.notices.cancel();
        self.session.pause();
    }

    /// Tracks the surface size for the session and for projection.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        self.display.on_surface_changed(width, height);
        self.state.set_viewport(Viewport::new(width, height));
    }

    /// Records a display rotation; pushed to the session on the next frame.
    pub fn on_display_rotation(&mut self, rotation: DisplayRotation) {
        self.display.on_rotation_changed(rotation);
    }

    /// GL name of the texture the session should stream camera images into.
    pub fn set_camera_texture(&mut self, name: u32) {
        self.camera_texture = Some(name);
    }

    /// Drains commands, fires due notices and polls the session.
    pub fn begin_frame(&mut self, now: Instant) -> FrameStep<S::Frame> {
        self.drain_commands(now);
        if self.shutdown {
            return FrameStep::Shutdown;
        }

        if let Some(notice) = self.notices.poll(now) {
            self.emit(SessionEvent::Notice(notice));
        }

        if let Some(frame) = self.state.frozen_frame() {
            if let Some(matrices) = self.state.current_matrices() {
                return FrameStep::Frozen {
                    frame: frame.clone(),
                    matrices,
                };
            }
        }

        if let Some(name) = self.camera_texture {
            self.session.set_camera_texture_name(name);
        }
        self.display.update_session(&mut self.session);

        let frame = match self.session.update() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Skipping frame: {e}");
                return FrameStep::Idle;
            }
        };

        let tracking = self.state.observe_frame(&frame);
        self.on_tracking(tracking.is_tracking(), now);

        FrameStep::Live {
            frame,
            tracking,
            matrices: self.state.live_matrices(),
        }
    }

    /// Handles at most one pending tap against this frame.
    pub fn end_frame(&mut self, step: &FrameStep<S::Frame>) {
        let Some(frame) = step.frame() else {
            return;
        };
        let tap = match self.taps.try_recv() {
            Ok(tap) => tap,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
        };

        match self.state.handle_tap(frame, tap.x, tap.y) {
            Ok(outcome) => {
                log::info!("Placed point {} at ({}, {})", outcome.count, tap.x, tap.y);
                self.emit(SessionEvent::Notice(Notice::PointPlaced(outcome.count)));
                if let Some(measurements) = outcome.measurements {
                    self.emit(SessionEvent::MeasurementSet(measurements));
                }
            }
            Err(e) => {
                log::debug!("Tap at ({}, {}) rejected: {e}", tap.x, tap.y);
                if let Some(notice) = e.notice() {
                    self.emit(SessionEvent::Notice(notice));
                }
            }
        }
    }

    fn on_tracking(&mut self, tracking: bool, now: Instant) {
        if tracking && !self.tracking {
            self.notices.cancel();
            self.emit(SessionEvent::Notice(Notice::SurfaceDetected));
        } else if !tracking && self.tracking {
            self.notices
                .arm(Notice::TrackingLost, now + self.config.tracking_lost_notice_delay());
        }
        self.tracking = tracking;
    }

    fn drain_commands(&mut self, now: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command, now);
        }
    }

    fn apply(&mut self, command: Command, now: Instant) {
        match command {
            Command::ClearPoints => {
                let removed = self.state.clear();
                log::info!("Cleared {removed} point(s)");
                self.emit(SessionEvent::Notice(Notice::MeasurementsCleared));
                // The next tracked frame reports the surface again and cancels the search notice.
                self.tracking = false;
                self.notices
                    .arm(Notice::SearchingForSurfaces, now + self.config.search_notice_delay());
                self.emit(SessionEvent::PointsCleared);
            }
            Command::FreezeView => match self.state.freeze() {
                Ok(FreezeOutcome::Frozen) => self.emit(SessionEvent::Notice(Notice::ViewFrozen)),
                Ok(FreezeOutcome::AlreadyFrozen) => log::debug!("Freeze ignored; view already frozen"),
                Err(e) => {
                    log::warn!("Freeze rejected: {e}");
                    if let Some(notice) = e.notice() {
                        self.emit(SessionEvent::Notice(notice));
                    }
                }
            },
            Command::Unfreeze => {
                if self.state.unfreeze() {
                    log::info!("View unfrozen");
                }
            }
            Command::Shutdown => {
                log::info!("Shutting down measurement loop");
                self.shutdown = true;
                self.notices.cancel();
                self.state.clear();
                self.session.pause();
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Dropped session event (no listener)");
        }
    }
}

/// User-facing notice for a session lifecycle failure.
pub fn session_notice(error: &ArError) -> Notice {
    match error {
        ArError::PermissionDenied => Notice::CameraPermissionRequired,
        ArError::RuntimeUnavailable => Notice::ArRuntimeMissing,
        ArError::Session(_) | ArError::CameraNotAvailable => Notice::SessionFailed,
        other => Notice::SessionError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        anchors::GroupPolicy,
        sim::{SimSession, SimWorld},
    };
    use std::time::Duration;

    type Controller = MeasureController<SimSession>;

    fn setup(config: MeasureConfig) -> (Controller, MeasureHandle<crate::sim::SimAnchor>, Receiver<SessionEvent>, SimWorld) {
        let world = SimWorld::default();
        let (mut c, h, rx) = MeasureController::new(SimSession::new(world.clone()), config);
        c.on_surface_changed(1000, 1000);
        (c, h, rx, world)
    }

    fn run_frame(c: &mut Controller, now: Instant) -> FrameStep<crate::sim::SimFrame> {
        let step = c.begin_frame(now);
        c.end_frame(&step);
        step
    }

    fn drain(rx: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
        rx.try_iter().collect()
    }

    fn tap_floor(h: &MeasureHandle<crate::sim::SimAnchor>, world: &SimWorld, x: f32) {
        let p = world.screen_point(Vec3::new(x, 0.0, -0.5));
        h.tap(p.x, p.y).unwrap();
    }

    #[test]
    fn test_method_dispatch() {
        assert_eq!(Command::from_method("clearPoints"), Ok(Command::ClearPoints));
        assert_eq!(Command::from_method("freezeArView"), Ok(Command::FreezeView));
        assert_eq!(
            Command::from_method("launchRocket"),
            Err(CommandError::NotImplemented("launchRocket".into()))
        );
    }

    #[test]
    fn test_taps_become_measurements() {
        let (mut c, h, rx, world) = setup(MeasureConfig::default());
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        assert_eq!(drain(&rx), vec![SessionEvent::Notice(Notice::SurfaceDetected)]);

        tap_floor(&h, &world, -0.2);
        run_frame(&mut c, t0);
        tap_floor(&h, &world, 0.2);
        run_frame(&mut c, t0);

        let events = drain(&rx);
        assert_eq!(events[0], SessionEvent::Notice(Notice::PointPlaced(1)));
        assert_eq!(events[1], SessionEvent::Notice(Notice::PointPlaced(2)));
        match &events[2] {
            SessionEvent::MeasurementSet(m) => {
                assert_eq!(m.len(), 1);
                assert!((m[0].distance_m - 0.4).abs() < 1e-3);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(h.anchor_count(), 2);
    }

    #[test]
    fn test_one_tap_per_frame() {
        let (mut c, h, rx, world) = setup(MeasureConfig::default());
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        drain(&rx);

        for x in [-0.3, -0.1, 0.1] {
            tap_floor(&h, &world, x);
        }
        run_frame(&mut c, t0);
        assert_eq!(h.anchor_count(), 1);
        run_frame(&mut c, t0);
        run_frame(&mut c, t0);
        assert_eq!(h.anchor_count(), 3);
    }

    #[test]
    fn test_tap_queue_keeps_newest() {
        let config = MeasureConfig {
            tap_queue_capacity: 2,
            ..MeasureConfig::default()
        };
        let (mut c, h, _rx, _world) = setup(config);
        h.tap(1.0, 1.0).unwrap();
        h.tap(2.0, 2.0).unwrap();
        h.tap(3.0, 3.0).unwrap();

        let queued: Vec<Tap> = c.taps.try_iter().collect();
        assert_eq!(queued, vec![Tap { x: 2.0, y: 2.0 }, Tap { x: 3.0, y: 3.0 }]);
        assert!(matches!(c.begin_frame(Instant::now()), FrameStep::Live { .. }));
    }

    #[test]
    fn test_freeze_then_clear_scenario() {
        let (mut c, h, rx, world) = setup(MeasureConfig::default());
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        for x in [-0.3, -0.1, 0.1, 0.3] {
            tap_floor(&h, &world, x);
            run_frame(&mut c, t0);
        }
        assert_eq!(h.anchor_count(), 4);

        h.freeze_view().unwrap();
        let step = run_frame(&mut c, t0);
        assert!(matches!(step, FrameStep::Frozen { .. }));
        assert!(c.state().is_frozen());
        drain(&rx);

        // Taps while frozen are dropped without placing anything.
        tap_floor(&h, &world, 0.0);
        run_frame(&mut c, t0);
        assert_eq!(h.anchor_count(), 4);

        h.clear_points().unwrap();
        let step = run_frame(&mut c, t0);
        assert!(matches!(step, FrameStep::Live { .. }));
        assert_eq!(h.anchor_count(), 0);
        assert!(!c.state().is_frozen());
        assert!(c.state().frozen_frame().is_none());
        assert_eq!(
            drain(&rx),
            vec![
                SessionEvent::Notice(Notice::MeasurementsCleared),
                SessionEvent::PointsCleared,
                SessionEvent::Notice(Notice::SurfaceDetected),
            ]
        );

        run_frame(&mut c, t0 + Duration::from_millis(1000));
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_clear_while_not_tracking_searches_again() {
        let (mut c, h, rx, _world) = setup(MeasureConfig::default());
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        c.session_mut().world_mut().set_tracking(TrackingState::Paused);
        run_frame(&mut c, t0);
        drain(&rx);

        h.clear_points().unwrap();
        run_frame(&mut c, t0);
        run_frame(&mut c, t0 + Duration::from_millis(1000));
        let events = drain(&rx);
        assert_eq!(events.last(), Some(&SessionEvent::Notice(Notice::SearchingForSurfaces)));
        assert!(!events.contains(&SessionEvent::Notice(Notice::SurfaceDetected)));
    }

    #[test]
    fn test_freeze_rejected_after_tracking_lost() {
        let (mut c, h, rx, _world) = setup(MeasureConfig::default());
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        c.session_mut().world_mut().set_tracking(TrackingState::Paused);
        run_frame(&mut c, t0);
        drain(&rx);

        h.freeze_view().unwrap();
        let step = run_frame(&mut c, t0);
        assert!(matches!(step, FrameStep::Live { .. }));
        assert!(!c.state().is_frozen());
        assert_eq!(drain(&rx), vec![SessionEvent::Notice(Notice::FreezeRejected)]);
    }

    #[test]
    fn test_freeze_rejected_without_tracking() {
        let (mut c, h, rx, _world) = setup(MeasureConfig::default());
        c.session_mut().world_mut().set_tracking(TrackingState::Paused);
        let t0 = Instant::now();
        run_frame(&mut c, t0);

        h.freeze_view().unwrap();
        let step = run_frame(&mut c, t0);
        assert!(matches!(step, FrameStep::Live { tracking: TrackingState::Paused, .. }));
        assert_eq!(drain(&rx), vec![SessionEvent::Notice(Notice::FreezeRejected)]);
    }

    #[test]
    fn test_tracking_lost_notice_is_delayed() {
        let (mut c, _h, rx, _world) = setup(MeasureConfig::default());
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        drain(&rx);

        c.session_mut().world_mut().set_tracking(TrackingState::Paused);
        run_frame(&mut c, t0);
        run_frame(&mut c, t0 + Duration::from_millis(499));
        assert!(drain(&rx).is_empty());
        run_frame(&mut c, t0 + Duration::from_millis(500));
        assert_eq!(drain(&rx), vec![SessionEvent::Notice(Notice::TrackingLost)]);
    }

    #[test]
    fn test_two_point_policy_restarts_after_pair() {
        let config = MeasureConfig {
            group: GroupPolicy::TWO_POINT,
            ..MeasureConfig::default()
        };
        let (mut c, h, _rx, world) = setup(config);
        let t0 = Instant::now();
        run_frame(&mut c, t0);
        for x in [-0.2, 0.2, 0.0] {
            tap_floor(&h, &world, x);
            run_frame(&mut c, t0);
        }
        assert_eq!(h.anchor_count(), 1);
    }

    #[test]
    fn test_shutdown_and_disconnect() {
        let (mut c, h, _rx, _world) = setup(MeasureConfig::default());
        h.shutdown().unwrap();
        assert!(matches!(c.begin_frame(Instant::now()), FrameStep::Shutdown));
        drop(c);
        assert_eq!(h.clear_points(), Err(CommandError::Disconnected));
        assert_eq!(h.tap(1.0, 1.0), Err(CommandError::Disconnected));
        assert_eq!(h.invoke("nope"), Err(CommandError::NotImplemented("nope".into())));
    }
}
