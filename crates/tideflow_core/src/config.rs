//! # Engine Configuration
//!
//! Every tunable of the engine, loaded once at startup from TOML.
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! seed = 7
//!
//! [scheduler]
//! chunk_mode = true
//! checkerboard = true
//! max_cells_per_step = 2048
//!
//! [equalizer]
//! interval_ticks = 60
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tideflow_shared::{DEFAULT_CHUNK_SIZE, MAX_VOLUME};

use crate::error::{FlowError, FlowResult};

/// Active-tile scheduler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Chunk edge length in tiles.
    pub chunk_size: i32,
    /// Select work by chunk instead of by individual cell.
    pub chunk_mode: bool,
    /// Only service chunks whose parity matches the tick parity.
    pub checkerboard: bool,
    /// Global budget of cells attempted per step, across all layers.
    pub max_cells_per_step: usize,
    /// Global budget of chunks selected per step, across all layers (chunk mode only).
    pub max_chunks_per_step: usize,
    /// Run a step only every `update_frequency` calls (1 = every call).
    pub update_frequency: u32,
    /// Smallest per-cell re-check interval in ticks.
    pub check_interval_min: u32,
    /// Largest per-cell re-check interval in ticks.
    pub check_interval_max: u32,
    /// No-op attempts before a cell is deregistered as stable.
    pub stability_cap: u16,
    /// Source cells are never deregistered.
    pub sources_never_stabilize: bool,
    /// Consecutive over-budget steps before saturation is reported.
    pub saturation_warn_after: u32,
    /// Radius of the reactivation wave sent by terrain changes.
    pub terrain_wave_radius: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_mode: true,
            checkerboard: false,
            max_cells_per_step: 4096,
            max_chunks_per_step: 128,
            update_frequency: 1,
            check_interval_min: 1,
            check_interval_max: 3,
            stability_cap: 8,
            sources_never_stabilize: true,
            saturation_warn_after: 30,
            terrain_wave_radius: 3,
        }
    }
}

/// Local diffusion rule settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    /// Smallest volume difference that triggers a pairwise transfer.
    pub min_transfer_diff: u8,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self { min_transfer_diff: 2 }
    }
}

/// Pressure and splash search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Nodes a search may expand before pressure counts as trapped.
    pub max_search_nodes: usize,
    /// Ticks a cell waits after a trapped search before searching again.
    pub cooldown_ticks: u32,
    /// Outlets a splash search collects before distributing.
    pub splash_max_candidates: usize,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            max_search_nodes: 512,
            cooldown_ticks: 8,
            splash_max_candidates: 16,
        }
    }
}

/// Region equalizer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerConfig {
    /// Run every this many ticks (0 disables).
    pub interval_ticks: u64,
    /// Largest region collected by one breadth-first pass.
    pub max_region: usize,
    /// Regions equalized per layer per pass.
    pub max_regions_per_pass: usize,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            interval_ticks: 120,
            max_region: 256,
            max_regions_per_pass: 8,
        }
    }
}

/// Evaporation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaporationConfig {
    /// Shortest evaporation interval in ticks.
    pub interval_min: u32,
    /// Longest evaporation interval in ticks (0 disables evaporation).
    pub interval_max: u32,
    /// Only cells at or below this volume evaporate.
    pub max_volume: u8,
    /// Chunks swept per layer per step.
    pub chunks_per_step: usize,
}

impl Default for EvaporationConfig {
    fn default() -> Self {
        Self {
            interval_min: 600,
            interval_max: 0,
            max_volume: 1,
            chunks_per_step: 4,
        }
    }
}

/// Portal linkage cache settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Lifetime of a resolved layer link in ticks.
    pub cache_ttl: u64,
    /// Lifetime of a failed resolution in ticks.
    pub negative_ttl: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            cache_ttl: 600,
            negative_ttl: 60,
        }
    }
}

/// Throughput governor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThroughputConfig {
    /// Enable adaptive step skipping.
    pub enabled: bool,
    /// Floor for the smoothed processed-cells-per-second estimate.
    pub min_cells_per_second: f64,
    /// EMA factor in `(0, 1]`; higher reacts faster.
    pub smoothing: f64,
    /// Skipped steps inserted at a 100% shortfall.
    pub max_extra_skips: u32,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_cells_per_second: 200_000.0,
            smoothing: 0.2,
            max_extra_skips: 4,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Seed for the engine's random source.
    pub seed: u64,
    /// Scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Diffusion settings.
    pub diffusion: DiffusionConfig,
    /// Pressure/splash settings.
    pub pressure: PressureConfig,
    /// Equalizer settings.
    pub equalizer: EqualizerConfig,
    /// Evaporation settings.
    pub evaporation: EvaporationConfig,
    /// Portal cache settings.
    pub portals: PortalConfig,
    /// Throughput governor settings.
    pub throughput: ThroughputConfig,
}

impl FlowConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ConfigParse`] for malformed TOML and
    /// [`FlowError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> FlowResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::ConfigIo`] if the file cannot be read, otherwise
    /// the same errors as [`FlowConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> FlowResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks every value the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> FlowResult<()> {
        let s = &self.scheduler;
        if s.chunk_size < 1 {
            return Err(invalid("scheduler.chunk_size must be at least 1"));
        }
        if s.stability_cap == 0 {
            return Err(invalid("scheduler.stability_cap must be at least 1"));
        }
        if s.max_cells_per_step == 0 || s.max_chunks_per_step == 0 {
            return Err(invalid("scheduler step budgets must be non-zero"));
        }
        if s.check_interval_min == 0 || s.check_interval_min > s.check_interval_max {
            return Err(invalid(
                "scheduler.check_interval_min must be in 1..=check_interval_max",
            ));
        }
        if self.diffusion.min_transfer_diff == 0 || self.diffusion.min_transfer_diff > MAX_VOLUME {
            return Err(invalid("diffusion.min_transfer_diff must be in 1..=MAX_VOLUME"));
        }
        if self.pressure.max_search_nodes == 0 {
            return Err(invalid("pressure.max_search_nodes must be non-zero"));
        }
        if self.equalizer.max_region == 0 {
            return Err(invalid("equalizer.max_region must be non-zero"));
        }
        let e = &self.evaporation;
        if e.interval_max > 0 && (e.interval_min == 0 || e.interval_min > e.interval_max) {
            return Err(invalid("evaporation.interval_min must be in 1..=interval_max"));
        }
        let t = &self.throughput;
        if !(t.smoothing > 0.0 && t.smoothing <= 1.0) {
            return Err(invalid("throughput.smoothing must be in (0, 1]"));
        }
        if t.enabled && t.min_cells_per_second <= 0.0 {
            return Err(invalid("throughput.min_cells_per_second must be positive"));
        }
        Ok(())
    }

    /// Whether the evaporation sweep runs at all.
    #[inline]
    #[must_use]
    pub const fn evaporation_enabled(&self) -> bool {
        self.evaporation.interval_max > 0
    }
}

fn invalid(message: &str) -> FlowError {
    FlowError::InvalidConfig(message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = FlowConfig::from_toml_str("").unwrap();
        assert_eq!(config, FlowConfig::default());
        assert_eq!(config.diffusion.min_transfer_diff, 2);
        assert_eq!(config.scheduler.chunk_size, 8);
        assert!(!config.evaporation_enabled());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = FlowConfig::from_toml_str(
            r#"
            seed = 99

            [scheduler]
            checkerboard = true
            max_cells_per_step = 16

            [evaporation]
            interval_min = 10
            interval_max = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.seed, 99);
        assert!(config.scheduler.checkerboard);
        assert_eq!(config.scheduler.max_cells_per_step, 16);
        assert_eq!(config.scheduler.stability_cap, 8);
        assert!(config.evaporation_enabled());
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = FlowConfig::from_toml_str("[scheduler]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, FlowError::InvalidConfig(_)));

        let err = FlowConfig::from_toml_str("[diffusion]\nmin_transfer_diff = 0\n").unwrap_err();
        assert!(matches!(err, FlowError::InvalidConfig(_)));

        let err = FlowConfig::from_toml_str("[throughput]\nsmoothing = 1.5\n").unwrap_err();
        assert!(matches!(err, FlowError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = FlowConfig::from_toml_str("[scheduler\n").unwrap_err();
        assert!(matches!(err, FlowError::ConfigParse(_)));
    }
}
