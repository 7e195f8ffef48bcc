//! Spatial-measurement core for a plane-anchored AR tape measure.
//!
//! This crate holds everything that does not touch the GPU: the boundary
//! traits an AR tracking subsystem must satisfy, pose and projection math,
//! plane-polygon triangulation, the lock-guarded anchor group, the
//! live/frozen measurement state machine and the per-frame controller that
//! marshals taps and commands onto the render thread.
//!
//! Rendering lives in `measure_render`; a deterministic synthetic world for
//! tests and headless runs lives in [`sim`].

pub mod anchors;
pub mod ar;
pub mod config;
pub mod controller;
pub mod display;
pub mod events;
pub mod measure;
pub mod plane_mesh;
pub mod pose;
pub mod projection;
pub mod sim;

pub use anchors::{AnchorGroup, GroupPolicy, PushOutcome};
pub use ar::{Anchor, ArError, ArSession, Camera, DepthImage, Frame, HitResult, Plane, Trackable, TrackingState};
pub use config::{MarkerConfig, MarkerStyle, MeasureConfig};
pub use controller::{Command, CommandError, FrameStep, MeasureController, MeasureHandle, Tap};
pub use display::{DisplayGeometry, DisplayRotation};
pub use events::{Measurement, Notice, NoticeTimer, SessionEvent};
pub use measure::{measure_pairs, FreezeOutcome, MeasureError, MeasureState, TapOutcome, ViewMatrices};
pub use pose::Pose;
pub use projection::{project_to_screen, Viewport, OFFSCREEN};
