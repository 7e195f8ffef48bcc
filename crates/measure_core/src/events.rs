use serde::{Deserialize, Serialize};
use std::{fmt, time::Instant};

/// One labelled distance between a pair of anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    /// Straight-line distance in meters.
    #[serde(rename = "distance")]
    pub distance_m: f32,
    #[serde(rename = "midPointScreenX")]
    pub midpoint_screen_x: f32,
    #[serde(rename = "midPointScreenY")]
    pub midpoint_screen_y: f32,
}

/// Transient user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Notice {
    SurfaceDetected,
    TrackingLost,
    SearchingForSurfaces,
    SceneNotStable,
    PointPlaced(usize),
    FreezeRejected,
    ViewFrozen,
    MeasurementsCleared,
    NoSurfaceHit,
    CameraPermissionRequired,
    ArRuntimeMissing,
    SessionFailed,
    SessionError(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SurfaceDetected => f.write_str("Surface detected. Ready."),
            Notice::TrackingLost => f.write_str("Tracking lost. Move device slowly."),
            Notice::SearchingForSurfaces => f.write_str("Searching for surfaces..."),
            Notice::SceneNotStable => f.write_str("Cannot place point: Scene not stable."),
            Notice::PointPlaced(n) => write!(f, "Placed point {n}"),
            Notice::FreezeRejected => {
                f.write_str("Cannot freeze: Scene not stable. Move device and try again.")
            }
            Notice::ViewFrozen => f.write_str("View frozen"),
            Notice::MeasurementsCleared => f.write_str("Measurements cleared"),
            Notice::NoSurfaceHit => f.write_str("No surface found at tap location"),
            Notice::CameraPermissionRequired => {
                f.write_str("Camera permission is needed to run this application")
            }
            Notice::ArRuntimeMissing => f.write_str("Please install ARCore"),
            Notice::SessionFailed => f.write_str("Failed to create AR session"),
            Notice::SessionError(msg) => write!(f, "AR session error: {msg}"),
        }
    }
}

/// Everything the measurement loop reports to the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename = "measurementSetResult")]
    MeasurementSet(Vec<Measurement>),
    PointsCleared,
    Notice(Notice),
}

/// A single pending delayed notice. Arming replaces whatever was pending.
#[derive(Debug, Default)]
pub struct NoticeTimer {
    pending: Option<(Instant, Notice)>,
}

impl NoticeTimer {
    /// Schedules `notice` for `at`, replacing any pending one.
    pub fn arm(&mut self, notice: Notice, at: Instant) {
        self.pending = Some((at, notice));
    }

    /// Drops the pending notice, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the pending notice once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<Notice> {
        let due = matches!(&self.pending, Some((at, _)) if *at <= now);
        if due {
            self.pending.take().map(|(_, notice)| notice)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_measurement_wire_names() {
        let event = SessionEvent::MeasurementSet(vec![Measurement {
            label: "Distance 1".into(),
            distance_m: 1.0,
            midpoint_screen_x: 750.0,
            midpoint_screen_y: 500.0,
        }]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "measurementSetResult");
        let m = &json["data"][0];
        assert_eq!(m["label"], "Distance 1");
        assert_eq!(m["distance"], 1.0);
        assert_eq!(m["midPointScreenX"], 750.0);
        assert_eq!(m["midPointScreenY"], 500.0);

        let cleared = serde_json::to_value(SessionEvent::PointsCleared).unwrap();
        assert_eq!(cleared["event"], "pointsCleared");
    }

    #[test]
    fn test_timer_fires_once_after_deadline() {
        let t0 = Instant::now();
        let mut timer = NoticeTimer::default();
        timer.arm(Notice::SearchingForSurfaces, t0 + Duration::from_millis(1000));
        assert_eq!(timer.poll(t0 + Duration::from_millis(999)), None);
        assert_eq!(timer.poll(t0 + Duration::from_millis(1000)), Some(Notice::SearchingForSurfaces));
        assert_eq!(timer.poll(t0 + Duration::from_millis(5000)), None);

        timer.arm(Notice::TrackingLost, t0);
        timer.arm(Notice::SearchingForSurfaces, t0);
        timer.cancel();
        assert!(!timer.is_armed());
        assert_eq!(timer.poll(t0 + Duration::from_secs(10)), None);
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(Notice::PointPlaced(3).to_string(), "Placed point 3");
        assert_eq!(
            Notice::FreezeRejected.to_string(),
            "Cannot freeze: Scene not stable. Move device and try again."
        );
    }
}
