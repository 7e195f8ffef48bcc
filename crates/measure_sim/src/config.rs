use crate::script::Action;
use anyhow::Context;
use clap::Parser;
use measure_core::{GroupPolicy, MeasureConfig};
use std::path::PathBuf;

/// `measure_sim` - runs a scripted tape-measure session against a synthetic
/// AR world and prints every result event as one JSON line.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Screen width in pixels.
    #[arg(long, env = "MEASURE_SCREEN_WIDTH", default_value_t = 1080)]
    pub screen_width: u32,

    /// Screen height in pixels.
    #[arg(long, env = "MEASURE_SCREEN_HEIGHT", default_value_t = 1920)]
    pub screen_height: u32,

    /// Anchors kept before the group resets. Distances are reported for
    /// each consecutive pair.
    #[arg(long, env = "MEASURE_GROUP_SIZE")]
    pub group_size: Option<usize>,

    /// JSON file holding a full measurement configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Script step, repeatable: `tap:X,Y`, `world:X,Z`, `freeze`, `unfreeze`,
    /// `clear`, `lose-tracking`, `regain-tracking`, `orbit:DEG`, `frame`
    /// or `wait:MS`.
    #[arg(long = "step", value_name = "ACTION")]
    pub steps: Vec<Action>,
}

impl Config {
    /// File settings first, then command-line overrides.
    pub fn measure_config(&self) -> anyhow::Result<MeasureConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("invalid config in {}", path.display()))?
            }
            None => MeasureConfig::default(),
        };
        if let Some(size) = self.group_size {
            config.group = GroupPolicy::new(size);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_steps_and_overrides() {
        let config = Config::try_parse_from([
            "measure_sim",
            "--screen-width",
            "800",
            "--group-size",
            "2",
            "--step",
            "tap:400,300",
            "--step",
            "freeze",
        ])
        .unwrap();
        assert_eq!(config.screen_width, 800);
        assert_eq!(config.steps, vec![Action::Tap { x: 400.0, y: 300.0 }, Action::Freeze]);
        assert_eq!(config.measure_config().unwrap().group, GroupPolicy::TWO_POINT);
    }

    #[test]
    fn test_rejects_unknown_step() {
        assert!(Config::try_parse_from(["measure_sim", "--step", "jump"]).is_err());
    }
}
