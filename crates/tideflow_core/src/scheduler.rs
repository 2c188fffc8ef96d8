//! # Active-Tile Scheduler
//!
//! Decides which cells run each step and at what rate.
//!
//! ## Step Pipeline
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌───────────┐
//! │ Throttle │──>│  Gather  │──>│ Process  │──>│ Evaporate │──>│ Equalize  │
//! │ freq/EMA │   │ shuffle  │   │ diffusion│   │ round-rob │   │ periodic  │
//! └──────────┘   └──────────┘   └──────────┘   └───────────┘   └───────────┘
//! ```
//!
//! Gathering shuffles a prefix of the eligible work up to the budget, so a
//! saturated world services a different random subset every step instead of
//! starving whatever sorts last. Work beyond the budget is deferred, never
//! dropped.

use std::time::Duration;

use rand::Rng;
use tideflow_shared::{CellKey, ChunkCoord, FlowEvent, LayerId};
use tracing::{trace, warn};

use crate::config::ThroughputConfig;
use crate::diffusion::attempt_local_diffusion;
use crate::equalizer::equalize_layer;
use crate::evaporation::evaporate;
use crate::host::HostGrid;
use crate::scratch::{shuffle_prefix, SearchScratch};
use crate::world::FlowWorld;

/// Outcome of one [`Scheduler::step`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// World tick after the call.
    pub tick: u64,
    /// The call was throttled and did nothing.
    pub skipped: bool,
    /// Active cells before gathering.
    pub active_before: usize,
    /// Cells handed to the diffusion rule.
    pub processed: usize,
    /// Cells whose attempt moved volume.
    pub changed: usize,
    /// Cells deregistered this step.
    pub stabilized: usize,
    /// Eligible cells left for later steps.
    pub deferred: usize,
    /// Units removed by evaporation.
    pub evaporated: u32,
    /// Regions rewritten by the equalizer.
    pub equalized: usize,
}

/// Smoothed throughput estimate that asks for skipped steps when the
/// engine falls below its floor.
#[derive(Clone, Debug)]
pub struct ThroughputGovernor {
    config: ThroughputConfig,
    smoothed: Option<f64>,
}

impl ThroughputGovernor {
    /// Creates a governor with no samples.
    #[must_use]
    pub const fn new(config: ThroughputConfig) -> Self {
        Self {
            config,
            smoothed: None,
        }
    }

    /// Current smoothed cells-per-second estimate.
    #[must_use]
    pub const fn smoothed(&self) -> Option<f64> {
        self.smoothed
    }

    /// Feeds one measured step. Returns the extra steps to skip.
    pub fn record(&mut self, processed: usize, elapsed: Duration) -> u32 {
        if !self.config.enabled || processed == 0 || elapsed.is_zero() {
            return 0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = processed as f64 / elapsed.as_secs_f64();
        let smoothed = match self.smoothed {
            Some(previous) => previous + self.config.smoothing * (rate - previous),
            None => rate,
        };
        self.smoothed = Some(smoothed);

        let floor = self.config.min_cells_per_second;
        if smoothed >= floor {
            return 0;
        }
        let shortfall = ((floor - smoothed) / floor).clamp(0.0, 1.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let skips = (shortfall * f64::from(self.config.max_extra_skips)).ceil() as u32;
        skips
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CellOutcome {
    Gone,
    NotDue,
    Idle,
    Stabilized,
    Changed,
}

/// Per-simulation scheduler state.
#[derive(Debug)]
pub struct Scheduler {
    batch: Vec<CellKey>,
    chunk_batch: Vec<(LayerId, ChunkCoord, u32)>,
    step_counter: u64,
    skip_remaining: u32,
    consecutive_saturated: u32,
    governor: ThroughputGovernor,
}

impl Scheduler {
    /// Creates a scheduler sized for `max_cells_per_step`.
    #[must_use]
    pub fn new(max_cells_per_step: usize, throughput: ThroughputConfig) -> Self {
        Self {
            batch: Vec::with_capacity(max_cells_per_step),
            chunk_batch: Vec::new(),
            step_counter: 0,
            skip_remaining: 0,
            consecutive_saturated: 0,
            governor: ThroughputGovernor::new(throughput),
        }
    }

    /// Consecutive steps whose eligible work exceeded the budget.
    #[inline]
    #[must_use]
    pub const fn consecutive_saturated(&self) -> u32 {
        self.consecutive_saturated
    }

    /// Steps the governor still wants skipped.
    #[inline]
    #[must_use]
    pub const fn pending_skips(&self) -> u32 {
        self.skip_remaining
    }

    /// The throughput governor.
    #[must_use]
    pub const fn governor(&self) -> &ThroughputGovernor {
        &self.governor
    }

    /// Feeds a measured step duration to the governor.
    pub fn record_throughput(&mut self, processed: usize, elapsed: Duration) -> u32 {
        let extra = self.governor.record(processed, elapsed);
        self.skip_remaining = self.skip_remaining.max(extra);
        extra
    }

    /// Runs one step, unless throttled.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        world: &mut FlowWorld,
        host: &dyn HostGrid,
        scratch: &mut SearchScratch,
        rng: &mut R,
    ) -> StepReport {
        let counter = self.step_counter;
        self.step_counter += 1;

        let frequency = u64::from(world.config.scheduler.update_frequency.max(1));
        if self.skip_remaining > 0 || counter % frequency != 0 {
            self.skip_remaining = self.skip_remaining.saturating_sub(1);
            world.stats.skipped_steps += 1;
            world.clear_step_guards();
            return StepReport {
                tick: world.tick,
                skipped: true,
                ..StepReport::default()
            };
        }

        let tick = world.begin_step();
        world.stats.steps += 1;

        let mut report = StepReport {
            tick,
            active_before: world.active_cell_count(),
            ..StepReport::default()
        };

        let (deferred, busiest) = self.gather(world, rng);
        report.deferred = deferred;

        let batch = std::mem::take(&mut self.batch);
        for key in batch.iter().copied() {
            match process_cell(world, host, scratch, rng, key) {
                CellOutcome::Gone | CellOutcome::NotDue => {}
                CellOutcome::Idle => report.processed += 1,
                CellOutcome::Stabilized => {
                    report.processed += 1;
                    report.stabilized += 1;
                }
                CellOutcome::Changed => {
                    report.processed += 1;
                    report.changed += 1;
                }
            }
        }
        self.batch = batch;

        report.evaporated = evaporate(world, host, scratch, rng);

        let interval = world.config.equalizer.interval_ticks;
        if interval > 0 && tick % interval == 0 {
            let mut layers = std::mem::take(&mut scratch.layers);
            layers.clear();
            layers.extend(world.layers.keys().copied());
            for layer in layers.iter().copied() {
                report.equalized += equalize_layer(world, host, scratch, rng, layer);
            }
            scratch.layers = layers;
        }

        self.track_saturation(world, deferred, busiest);

        trace!(
            tick,
            active = report.active_before,
            processed = report.processed,
            changed = report.changed,
            deferred,
            "flow step"
        );
        report
    }

    /// Fills the batch. Returns the deferred cell count and the layer with
    /// the largest active set.
    ///
    /// In chunk mode, `max_chunks_per_step` is shared by all layers.
    fn gather<R: Rng + ?Sized>(&mut self, world: &FlowWorld, rng: &mut R) -> (usize, Option<LayerId>) {
        let s = &world.config.scheduler;
        let parity = world.tick % 2;
        let in_phase = |chunk: ChunkCoord| !s.checkerboard || chunk.parity() == parity;

        self.batch.clear();
        self.chunk_batch.clear();
        let mut deferred = 0;
        let mut busiest: Option<(LayerId, usize)> = None;

        for layer in world.layers.values() {
            let active = layer.active();
            if busiest.map_or(true, |(_, n)| active.len() > n) && !active.is_empty() {
                busiest = Some((layer.id(), active.len()));
            }

            if s.chunk_mode {
                let id = layer.id();
                self.chunk_batch.extend(
                    active
                        .chunk_loads()
                        .filter(|(chunk, _)| in_phase(*chunk))
                        .map(|(chunk, n)| (id, chunk, n)),
                );
            } else {
                let index = layer.index();
                self.batch.extend(
                    active
                        .cells()
                        .filter(|pos| in_phase(index.chunk_of(*pos)))
                        .map(|pos| CellKey::new(layer.id(), pos)),
                );
            }
        }

        if s.chunk_mode {
            let take = self.chunk_batch.len().min(s.max_chunks_per_step);
            shuffle_prefix(&mut self.chunk_batch, take, rng);

            let (selected, rest) = self.chunk_batch.split_at(take);
            deferred += rest.iter().map(|(_, _, n)| *n as usize).sum::<usize>();
            for (id, chunk, _) in selected {
                let Some(layer) = world.layers.get(id) else {
                    continue;
                };
                let active = layer.active();
                self.batch.extend(
                    layer
                        .index()
                        .cells_in(*chunk)
                        .filter(|pos| active.contains(*pos))
                        .map(|pos| CellKey::new(*id, pos)),
                );
            }
        }

        let budget = s.max_cells_per_step;
        let total = self.batch.len();
        shuffle_prefix(&mut self.batch, budget.min(total), rng);
        self.batch.truncate(budget);
        deferred += total - self.batch.len();

        (deferred, busiest.map(|(id, _)| id))
    }

    fn track_saturation(&mut self, world: &mut FlowWorld, deferred: usize, busiest: Option<LayerId>) {
        if deferred == 0 {
            self.consecutive_saturated = 0;
            return;
        }
        world.stats.saturated_steps += 1;
        self.consecutive_saturated += 1;

        let warn_after = world.config.scheduler.saturation_warn_after.max(1);
        if self.consecutive_saturated % warn_after != 0 {
            return;
        }
        let active = world.active_cell_count();
        let budget = world.config.scheduler.max_cells_per_step;
        warn!(
            active,
            budget,
            deferred,
            consecutive = self.consecutive_saturated,
            "flow scheduler saturated, work is being deferred"
        );
        world.emit(FlowEvent::Saturated {
            layer: busiest.unwrap_or_default(),
            active,
            budget,
            consecutive_steps: self.consecutive_saturated,
        });
    }
}

fn process_cell<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    key: CellKey,
) -> CellOutcome {
    let state = world
        .cell(key)
        .map(|cell| (cell.is_stable(), cell.next_local_check_tick()));
    let due = match state {
        Some((false, next_check)) => world.tick >= next_check,
        _ => {
            if let Some(layer) = world.layers.get_mut(&key.layer) {
                layer.mark_inactive(key.pos);
            }
            return CellOutcome::Gone;
        }
    };
    if !due {
        return CellOutcome::NotDue;
    }

    world.reschedule_check(key, rng);
    world.stats.cells_processed += 1;

    if attempt_local_diffusion(world, host, scratch, rng, key) {
        CellOutcome::Changed
    } else if world.record_idle(key) {
        CellOutcome::Stabilized
    } else {
        CellOutcome::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::host::{LayerInfo, MemoryGrid};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tideflow_shared::{EventBus, TilePos};

    const L: LayerId = LayerId(0);

    fn config() -> FlowConfig {
        let mut config = FlowConfig::default();
        config.scheduler.check_interval_min = 1;
        config.scheduler.check_interval_max = 1;
        config.scheduler.stability_cap = 3;
        config.equalizer.interval_ticks = 0;
        config
    }

    fn open_room() -> MemoryGrid {
        let mut grid = MemoryGrid::new();
        grid.add_layer(LayerInfo::new(L, 32, 32, 0, 0));
        grid
    }

    #[test]
    fn test_governor_skips_in_proportion_to_shortfall() {
        let mut governor = ThroughputGovernor::new(ThroughputConfig {
            enabled: true,
            min_cells_per_second: 1000.0,
            smoothing: 1.0,
            max_extra_skips: 4,
        });
        assert_eq!(governor.record(2000, Duration::from_secs(1)), 0);
        assert_eq!(governor.record(500, Duration::from_secs(1)), 2);
        assert_eq!(governor.record(1, Duration::from_secs(1)), 4);
        assert_eq!(governor.record(0, Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_disabled_governor_never_skips() {
        let mut governor = ThroughputGovernor::new(ThroughputConfig::default());
        assert_eq!(governor.record(1, Duration::from_secs(10)), 0);
        assert!(governor.smoothed().is_none());
    }

    #[test]
    fn test_update_frequency_skips_without_advancing_tick() {
        let mut config = config();
        config.scheduler.update_frequency = 3;
        let mut world = FlowWorld::new(config.clone()).unwrap();
        let mut scheduler = Scheduler::new(16, config.throughput);
        let mut scratch = SearchScratch::with_capacity(16);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let grid = open_room();

        let skipped: Vec<bool> = (0..6)
            .map(|_| scheduler.step(&mut world, &grid, &mut scratch, &mut rng).skipped)
            .collect();
        assert_eq!(skipped, vec![false, true, true, false, true, true]);
        assert_eq!(world.tick(), 2);
        assert_eq!(world.stats().skipped_steps, 4);
    }

    #[test]
    fn test_isolated_cell_stabilizes_after_cap() {
        let config = config();
        let mut grid = open_room();
        grid.carve_room(L, TilePos::new(4, 4), TilePos::new(4, 4));
        let mut world = FlowWorld::new(config.clone()).unwrap();
        let mut scheduler = Scheduler::new(16, config.throughput);
        let mut scratch = SearchScratch::with_capacity(16);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let key = CellKey::new(L, TilePos::new(4, 4));
        world.set_volume(&grid, &mut rng, key, 5);

        for _ in 0..3 {
            scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        }
        assert!(world.cell(key).unwrap().is_stable());
        assert!(!world.is_active(key));

        let report = scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        assert_eq!(report.processed, 0);
    }

    #[test]
    fn test_budget_defers_and_reports_saturation() {
        let mut config = config();
        config.scheduler.chunk_mode = false;
        config.scheduler.max_cells_per_step = 4;
        config.scheduler.saturation_warn_after = 2;
        config.scheduler.stability_cap = 100;
        let grid = open_room();
        let mut world = FlowWorld::new(config.clone()).unwrap();
        let (sender, receiver) = EventBus::create_pair(1024);
        let mut scheduler = Scheduler::new(4, config.throughput);
        let mut scratch = SearchScratch::with_capacity(16);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        // Lone single units never change, so all ten stay active.
        for i in 0..10 {
            world.set_volume(&grid, &mut rng, CellKey::new(L, TilePos::new(i * 3, 0)), 1);
        }
        world.attach_events(sender);

        let first = scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        assert_eq!(first.processed, 4);
        assert_eq!(first.deferred, 6);
        scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        assert_eq!(scheduler.consecutive_saturated(), 2);

        let saturated = receiver
            .drain()
            .into_iter()
            .filter(|e| matches!(e, FlowEvent::Saturated { .. }))
            .count();
        assert_eq!(saturated, 1);
        assert_eq!(world.stats().saturated_steps, 2);
    }

    #[test]
    fn test_checkerboard_services_alternate_chunks() {
        let mut config = config();
        config.scheduler.checkerboard = true;
        config.scheduler.stability_cap = 100;
        let grid = open_room();
        let mut world = FlowWorld::new(config.clone()).unwrap();
        let mut scheduler = Scheduler::new(64, config.throughput);
        let mut scratch = SearchScratch::with_capacity(16);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        // Chunk (0,0) is even, chunk (1,0) is odd.
        world.set_volume(&grid, &mut rng, CellKey::new(L, TilePos::new(1, 1)), 1);
        world.set_volume(&grid, &mut rng, CellKey::new(L, TilePos::new(9, 1)), 1);

        let odd = scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        let even = scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        assert_eq!(odd.tick % 2, 1);
        assert_eq!(odd.processed, 1);
        assert_eq!(odd.deferred, 0);
        assert_eq!(even.processed, 1);
    }

    #[test]
    fn test_chunk_budget_is_shared_across_layers() {
        const UPPER: LayerId = LayerId(1);
        let mut config = config();
        config.scheduler.max_chunks_per_step = 1;
        config.scheduler.stability_cap = 100;
        let mut grid = open_room();
        grid.add_layer(LayerInfo::new(UPPER, 32, 32, 0, 1));
        let mut world = FlowWorld::new(config.clone()).unwrap();
        let mut scheduler = Scheduler::new(64, config.throughput);
        let mut scratch = SearchScratch::with_capacity(16);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        world.set_volume(&grid, &mut rng, CellKey::new(L, TilePos::new(1, 1)), 1);
        world.set_volume(&grid, &mut rng, CellKey::new(UPPER, TilePos::new(20, 20)), 1);

        let report = scheduler.step(&mut world, &grid, &mut scratch, &mut rng);
        assert_eq!(report.processed, 1);
        assert_eq!(report.deferred, 1);
    }

    #[test]
    fn test_throttled_step_clears_wave_guard() {
        let mut config = config();
        config.scheduler.update_frequency = 2;
        let grid = open_room();
        let mut world = FlowWorld::new(config.clone()).unwrap();
        let mut scheduler = Scheduler::new(16, config.throughput);
        let mut scratch = SearchScratch::with_capacity(16);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let row: Vec<CellKey> = (0..3).map(|x| CellKey::new(L, TilePos::new(x, 0))).collect();
        for key in &row {
            world.set_volume(&grid, &mut rng, *key, 1);
        }
        let origin = TilePos::new(0, 0);

        assert!(!scheduler.step(&mut world, &grid, &mut scratch, &mut rng).skipped);
        row.iter().for_each(|key| {
            world.mark_stable(*key);
        });
        assert_eq!(world.reactivate_radius(L, origin, 2), 3);

        row.iter().for_each(|key| {
            world.mark_stable(*key);
        });
        assert!(scheduler.step(&mut world, &grid, &mut scratch, &mut rng).skipped);
        assert_eq!(world.reactivate_radius(L, origin, 2), 3);
    }
}
