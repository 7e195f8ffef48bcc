use crate::anchors::GroupPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How placed anchors are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkerStyle {
    /// One point per tracked anchor.
    #[default]
    Points,
    /// The two endpoints of a single segment, drawn once both exist.
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub style: MarkerStyle,
    /// RGBA.
    pub color: [f32; 4],
    /// Point size in pixels.
    pub point_size: f32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            style: MarkerStyle::Points,
            color: [1.0, 0.0, 1.0, 1.0],
            point_size: 25.0,
        }
    }
}

impl MarkerConfig {
    /// Red endpoints for the two-anchor segment.
    pub fn line() -> Self {
        Self {
            style: MarkerStyle::Line,
            color: [1.0, 0.0, 0.0, 1.0],
            ..Self::default()
        }
    }
}

/// Tunables for one measurement session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Near clip plane in meters.
    pub near: f32,
    /// Far clip plane in meters.
    pub far: f32,
    pub group: GroupPolicy,
    pub tap_queue_capacity: usize,
    /// Delay before the "searching" notice after resume or clear, in ms.
    pub search_notice_delay_ms: u64,
    /// Delay before the "tracking lost" notice, in ms.
    pub tracking_lost_notice_delay_ms: u64,
    pub clear_color: [f32; 4],
    pub marker: MarkerConfig,
    /// Draw false-color depth instead of the camera image.
    pub depth_visualization: bool,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            near: 0.1,
            far: 100.0,
            group: GroupPolicy::default(),
            tap_queue_capacity: 16,
            search_notice_delay_ms: 1000,
            tracking_lost_notice_delay_ms: 500,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            marker: MarkerConfig::default(),
            depth_visualization: false,
        }
    }
}

impl MeasureConfig {
    /// Delay before "Searching for surfaces..." is shown.
    pub fn search_notice_delay(&self) -> Duration {
        Duration::from_millis(self.search_notice_delay_ms)
    }

    /// Delay before "Tracking lost" is shown.
    pub fn tracking_lost_notice_delay(&self) -> Duration {
        Duration::from_millis(self.tracking_lost_notice_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: MeasureConfig =
            serde_json::from_str(r#"{ "group": { "size": 2 }, "marker": { "point_size": 12.0 } }"#)
                .unwrap();
        assert_eq!(cfg.group, GroupPolicy::TWO_POINT);
        assert_eq!(cfg.marker.point_size, 12.0);
        assert_eq!(cfg.marker.color, [1.0, 0.0, 1.0, 1.0]);
        assert_eq!(cfg.near, 0.1);
        assert_eq!(cfg.tap_queue_capacity, 16);
    }

    #[test]
    fn test_group_below_one_pair_fails_to_load() {
        let err = serde_json::from_str::<MeasureConfig>(r#"{ "group": { "size": 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("group size must be at least 2"), "{err}");
    }
}
