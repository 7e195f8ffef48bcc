//! Script steps and the runner that plays them against a [`SimSession`].

use crossbeam_channel::Receiver;
use glam::Vec3;
use measure_core::{
    sim::{SimAnchor, SimSession, SimWorld},
    CommandError, FrameStep, MeasureConfig, MeasureController, MeasureHandle, SessionEvent, TrackingState,
};
use std::{
    str::FromStr,
    time::{Duration, Instant},
};

/// Simulated time between frames.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// One scripted step, parsed from `name` or `name:args`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Tap at a screen position in pixels.
    Tap { x: f32, y: f32 },
    /// Tap wherever the floor point (x, 0, z) appears on screen.
    WorldTap { x: f32, z: f32 },
    Freeze,
    Unfreeze,
    Clear,
    LoseTracking,
    RegainTracking,
    /// Orbit the camera about its target, in degrees.
    Orbit(f32),
    /// One frame with no input.
    Frame,
    /// Let time pass, then run one frame.
    Wait(Duration),
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let action = match (name, arg) {
            ("tap", Some(arg)) => {
                let (x, y) = pair(arg)?;
                Action::Tap { x, y }
            }
            ("world", Some(arg)) => {
                let (x, z) = pair(arg)?;
                Action::WorldTap { x, z }
            }
            ("orbit", Some(arg)) => Action::Orbit(number(arg)?),
            ("wait", Some(arg)) => {
                let ms = arg.trim().parse::<u64>().map_err(|e| format!("bad duration `{arg}`: {e}"))?;
                Action::Wait(Duration::from_millis(ms))
            }
            ("freeze", None) => Action::Freeze,
            ("unfreeze", None) => Action::Unfreeze,
            ("clear", None) => Action::Clear,
            ("lose-tracking", None) => Action::LoseTracking,
            ("regain-tracking", None) => Action::RegainTracking,
            ("frame", None) => Action::Frame,
            _ => return Err(format!("unknown step `{s}`")),
        };
        Ok(action)
    }
}

fn number(s: &str) -> Result<f32, String> {
    s.trim().parse().map_err(|e| format!("bad number `{s}`: {e}"))
}

fn pair(s: &str) -> Result<(f32, f32), String> {
    let (a, b) = s.split_once(',').ok_or_else(|| format!("expected `A,B`, got `{s}`"))?;
    Ok((number(a)?, number(b)?))
}

/// Drives a controller frame by frame on simulated time.
pub struct Runner {
    controller: MeasureController<SimSession>,
    handle: MeasureHandle<SimAnchor>,
    events: Receiver<SessionEvent>,
    now: Instant,
}

impl Runner {
    pub fn new(world: SimWorld, config: MeasureConfig, width: u32, height: u32) -> anyhow::Result<Self> {
        let (mut controller, handle, events) = MeasureController::new(SimSession::new(world), config);
        let now = Instant::now();
        controller.on_surface_changed(width, height);
        controller.resume(now)?;
        Ok(Self {
            controller,
            handle,
            events,
            now,
        })
    }

    pub fn controller(&self) -> &MeasureController<SimSession> {
        &self.controller
    }

    /// Applies one step and returns the events it produced.
    pub fn apply(&mut self, action: Action) -> Result<Vec<SessionEvent>, CommandError> {
        match action {
            Action::Tap { x, y } => self.handle.tap(x, y)?,
            Action::WorldTap { x, z } => {
                let p = self.controller.session().world().screen_point(Vec3::new(x, 0.0, z));
                log::debug!("Floor point ({x}, {z}) is at pixel ({}, {})", p.x, p.y);
                self.handle.tap(p.x, p.y)?;
            }
            Action::Freeze => self.handle.freeze_view()?,
            Action::Unfreeze => self.handle.unfreeze()?,
            Action::Clear => self.handle.clear_points()?,
            Action::LoseTracking => self.set_tracking(TrackingState::Paused),
            Action::RegainTracking => self.set_tracking(TrackingState::Tracking),
            Action::Orbit(degrees) => self.controller.session_mut().world_mut().orbit_camera(degrees.to_radians()),
            Action::Frame => {}
            Action::Wait(elapsed) => self.now += elapsed,
        }
        self.frame();
        Ok(self.events.try_iter().collect())
    }

    fn set_tracking(&mut self, tracking: TrackingState) {
        self.controller.session_mut().world_mut().set_tracking(tracking);
    }

    fn frame(&mut self) {
        self.now += FRAME_INTERVAL;
        let step = self.controller.begin_frame(self.now);
        if let FrameStep::Idle = step {
            log::debug!("No frame produced");
        }
        self.controller.end_frame(&step);
    }

    /// Stops the session and returns any final events.
    pub fn shutdown(mut self) -> Vec<SessionEvent> {
        if let Err(e) = self.handle.shutdown() {
            log::warn!("Shutdown not delivered: {e}");
        }
        self.frame();
        self.events.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use measure_core::{Measurement, Notice};

    fn runner() -> Runner {
        Runner::new(SimWorld::default(), MeasureConfig::default(), 1000, 1000).unwrap()
    }

    fn measurements(events: &[SessionEvent]) -> Option<&Vec<Measurement>> {
        events.iter().find_map(|e| match e {
            SessionEvent::MeasurementSet(m) => Some(m),
            _ => None,
        })
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!("tap:10,20".parse(), Ok(Action::Tap { x: 10.0, y: 20.0 }));
        assert_eq!("world: 0.5, -1".parse(), Ok(Action::WorldTap { x: 0.5, z: -1.0 }));
        assert_eq!("wait:250".parse(), Ok(Action::Wait(Duration::from_millis(250))));
        assert_eq!("lose-tracking".parse(), Ok(Action::LoseTracking));
        assert!("tap:10".parse::<Action>().is_err());
        assert!("freeze:1".parse::<Action>().is_err());
    }

    #[test]
    fn test_two_floor_taps_measure_distance() {
        let mut r = runner();
        let first = r.apply(Action::Frame).unwrap();
        assert!(first.contains(&SessionEvent::Notice(Notice::SurfaceDetected)));

        r.apply(Action::WorldTap { x: 0.0, z: -0.5 }).unwrap();
        let events = r.apply(Action::WorldTap { x: 0.3, z: -0.5 }).unwrap();
        assert!(events.contains(&SessionEvent::Notice(Notice::PointPlaced(2))));
        let set = measurements(&events).expect("distance after second tap");
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].label, "Distance 1");
        assert!((set[0].distance_m - 0.3).abs() < 1e-3, "{}", set[0].distance_m);
    }

    #[test]
    fn test_frozen_view_rejects_taps() {
        let mut r = runner();
        r.apply(Action::Frame).unwrap();
        let events = r.apply(Action::Freeze).unwrap();
        assert!(events.contains(&SessionEvent::Notice(Notice::ViewFrozen)));

        let events = r.apply(Action::WorldTap { x: 0.0, z: -0.5 }).unwrap();
        assert!(events.is_empty());
        assert_eq!(r.controller().state().anchors().len(), 0);

        r.apply(Action::Unfreeze).unwrap();
        let events = r.apply(Action::WorldTap { x: 0.0, z: -0.5 }).unwrap();
        assert!(events.contains(&SessionEvent::Notice(Notice::PointPlaced(1))));
    }

    #[test]
    fn test_tracking_loss_notice_after_delay() {
        let mut r = runner();
        r.apply(Action::Frame).unwrap();
        assert!(r.apply(Action::LoseTracking).unwrap().is_empty());
        let events = r.apply(Action::Wait(Duration::from_millis(600))).unwrap();
        assert_eq!(events, vec![SessionEvent::Notice(Notice::TrackingLost)]);
        let events = r.apply(Action::RegainTracking).unwrap();
        assert_eq!(events, vec![SessionEvent::Notice(Notice::SurfaceDetected)]);
    }

    #[test]
    fn test_shutdown_clears_points() {
        let mut r = runner();
        r.apply(Action::Frame).unwrap();
        r.apply(Action::WorldTap { x: 0.0, z: -0.5 }).unwrap();
        let anchors = std::sync::Arc::clone(r.controller().state().anchors());
        assert_eq!(anchors.len(), 1);
        r.shutdown();
        assert_eq!(anchors.len(), 0);
    }
}
