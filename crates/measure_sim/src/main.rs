mod config;
mod script;

use crate::{config::Config, script::Runner};
use clap::Parser;
use measure_core::{sim::SimWorld, SessionEvent};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let measure = config.measure_config()?;
    log::info!(
        "Starting simulated session: {}x{}, group of {}, {} step(s)",
        config.screen_width,
        config.screen_height,
        measure.group.size,
        config.steps.len()
    );

    let mut runner = Runner::new(SimWorld::default(), measure, config.screen_width, config.screen_height)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for action in &config.steps {
        log::debug!("Step {action:?}");
        let events = runner.apply(*action)?;
        write_events(&mut out, &events)?;
    }
    write_events(&mut out, &runner.shutdown())?;
    Ok(())
}

fn write_events(out: &mut impl Write, events: &[SessionEvent]) -> anyhow::Result<()> {
    for event in events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    Ok(())
}
