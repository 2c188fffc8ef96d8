//! # Headless Runner
//!
//! Runs the two-floor basin with a spring and reports what happened.
//! Used by the `tideflow_headless` binary.

use std::path::PathBuf;

use tideflow_core::{FlowConfig, FlowStats};
use tracing::info;

use crate::error::{DriverError, DriverResult};
use crate::scenario::{two_floor_basin, Spring};
use crate::sim_loop::{EventTally, FrameStats, SimLoop};

/// Steps run when none are given.
pub const DEFAULT_TICKS: u64 = 600;

/// Units the spring adds per step.
pub const SPRING_RATE: u8 = 3;

/// Command-line arguments: `[config.toml] [ticks]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadlessArgs {
    /// Engine configuration file; defaults apply when absent.
    pub config: Option<PathBuf>,
    /// Steps to run.
    pub ticks: u64,
}

impl HeadlessArgs {
    /// Parses arguments (without the program name).
    ///
    /// A lone numeric argument is taken as the tick count.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidArgument`] for a non-numeric tick count
    /// or extra arguments.
    pub fn parse<I>(args: I) -> DriverResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        match args.as_slice() {
            [] => Ok(Self {
                config: None,
                ticks: DEFAULT_TICKS,
            }),
            [only] => match only.parse::<u64>() {
                Ok(ticks) => Ok(Self { config: None, ticks }),
                Err(_) => Ok(Self {
                    config: Some(PathBuf::from(only)),
                    ticks: DEFAULT_TICKS,
                }),
            },
            [config, ticks] => Ok(Self {
                config: Some(PathBuf::from(config)),
                ticks: parse_ticks(ticks)?,
            }),
            [_, _, extra, ..] => Err(DriverError::InvalidArgument {
                value: extra.clone(),
                expected: "at most `[config.toml] [ticks]`",
            }),
        }
    }

    /// Loads the engine configuration named by the arguments.
    ///
    /// # Errors
    ///
    /// Propagates configuration read, parse and validation errors.
    pub fn load_config(&self) -> DriverResult<FlowConfig> {
        match &self.config {
            Some(path) => Ok(FlowConfig::load(path)?),
            None => Ok(FlowConfig::default()),
        }
    }
}

fn parse_ticks(raw: &str) -> DriverResult<u64> {
    raw.parse().map_err(|_| DriverError::InvalidArgument {
        value: raw.to_owned(),
        expected: "a tick count",
    })
}

/// Outcome of a headless run.
#[derive(Clone, Debug)]
pub struct HeadlessSummary {
    /// Steps requested.
    pub ticks: u64,
    /// Engine tick at the end.
    pub final_tick: u64,
    /// Units the spring placed.
    pub spring_placed: u64,
    /// Volume on the upper floor.
    pub hall_volume: u64,
    /// Volume on the lower floor.
    pub cellar_volume: u64,
    /// Volume across all layers.
    pub total_volume: u64,
    /// Cells that exist.
    pub live_cells: usize,
    /// Cells still being processed.
    pub active_cells: usize,
    /// Step timing.
    pub frame: FrameStats,
    /// Notification counts.
    pub events: EventTally,
    /// Engine counters.
    pub flow: FlowStats,
}

/// Runs the basin for `ticks` steps. The spring pours for the first half.
///
/// # Errors
///
/// Returns [`DriverError::Config`] if `config` fails validation.
pub fn run_headless(config: FlowConfig, ticks: u64) -> DriverResult<HeadlessSummary> {
    let basin = two_floor_basin();
    let (hall, cellar, spring_key) = (basin.hall, basin.cellar, basin.spring);
    let mut spring = Spring::new(spring_key, SPRING_RATE, ticks / 2);

    info!(ticks, seed = config.seed, "headless run starting");
    let mut sim_loop = SimLoop::new(config, basin.grid)?;
    let frame = sim_loop.run(ticks, |sim, host| {
        spring.pour(sim, host);
    });

    let sim = sim_loop.simulation();
    let summary = HeadlessSummary {
        ticks,
        final_tick: sim.tick(),
        spring_placed: spring.placed(),
        hall_volume: sim.layer_volume(hall),
        cellar_volume: sim.layer_volume(cellar),
        total_volume: sim.total_volume(),
        live_cells: sim.live_cell_count(),
        active_cells: sim.active_cell_count(),
        frame,
        events: *sim_loop.events(),
        flow: sim.stats(),
    };
    info!(
        final_tick = summary.final_tick,
        total_volume = summary.total_volume,
        live_cells = summary.live_cells,
        "headless run finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = HeadlessArgs::parse(args(&[])).unwrap();
        assert_eq!(parsed.config, None);
        assert_eq!(parsed.ticks, DEFAULT_TICKS);
    }

    #[test]
    fn test_parse_lone_number_is_ticks() {
        let parsed = HeadlessArgs::parse(args(&["250"])).unwrap();
        assert_eq!(parsed.config, None);
        assert_eq!(parsed.ticks, 250);
    }

    #[test]
    fn test_parse_config_and_ticks() {
        let parsed = HeadlessArgs::parse(args(&["flow.toml", "90"])).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("flow.toml")));
        assert_eq!(parsed.ticks, 90);
    }

    #[test]
    fn test_parse_rejects_bad_ticks_and_extras() {
        assert!(matches!(
            HeadlessArgs::parse(args(&["flow.toml", "many"])),
            Err(DriverError::InvalidArgument { .. })
        ));
        assert!(matches!(
            HeadlessArgs::parse(args(&["a", "1", "b"])),
            Err(DriverError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let parsed = HeadlessArgs::parse(args(&["/nonexistent/tideflow.toml", "5"])).unwrap();
        assert!(matches!(parsed.load_config(), Err(DriverError::Config(_))));
    }
}
