//! # Fluid Simulation
//!
//! The engine facade: one [`FlowWorld`], its [`Scheduler`], reusable search
//! buffers and a seeded random source. Hosts drive it with [`step`] and
//! external actors (springs, drains, pumps, floodgates) use the cell API.
//!
//! ```rust
//! use tideflow_core::host::{LayerInfo, MemoryGrid};
//! use tideflow_core::{FlowConfig, FluidSimulation};
//! use tideflow_shared::{CellKey, LayerId, TilePos};
//!
//! let ground = LayerId::new(0);
//! let mut grid = MemoryGrid::new();
//! grid.add_layer(LayerInfo::new(ground, 16, 16, 1, 0));
//!
//! let mut sim = FluidSimulation::new(FlowConfig::default())?;
//! sim.load_layer(ground);
//! sim.set_volume(&grid, CellKey::new(ground, TilePos::new(8, 8)), 7);
//! for _ in 0..50 {
//!     sim.step(&grid);
//! }
//! assert_eq!(sim.total_volume(), 7);
//! # Ok::<(), tideflow_core::FlowError>(())
//! ```
//!
//! [`step`]: FluidSimulation::step

use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tideflow_shared::{CellKey, EventSender, LayerId, TilePos, MAX_VOLUME};

use crate::cell::Cell;
use crate::config::FlowConfig;
use crate::error::FlowResult;
use crate::diffusion;
use crate::equalizer;
use crate::host::HostGrid;
use crate::persistence::FlowSnapshot;
use crate::pressure;
use crate::scheduler::{Scheduler, StepReport};
use crate::scratch::SearchScratch;
use crate::stats::FlowStats;
use crate::world::FlowWorld;

/// Sparse fluid engine for layered tile grids.
pub struct FluidSimulation {
    world: FlowWorld,
    scheduler: Scheduler,
    scratch: SearchScratch,
    rng: ChaCha8Rng,
}

impl FluidSimulation {
    /// Creates an engine seeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`](crate::FlowError::InvalidConfig) if `config` fails
    /// [`FlowConfig::validate`].
    pub fn new(config: FlowConfig) -> FlowResult<Self> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Creates an engine with an explicit random source.
    ///
    /// # Errors
    ///
    /// Same as [`FluidSimulation::new`].
    pub fn with_rng(config: FlowConfig, rng: ChaCha8Rng) -> FlowResult<Self> {
        let world = FlowWorld::new(config)?;
        let c = world.config();
        let scheduler = Scheduler::new(c.scheduler.max_cells_per_step, c.throughput.clone());
        let scratch = SearchScratch::with_capacity(c.pressure.max_search_nodes);
        Ok(Self {
            world,
            scheduler,
            scratch,
            rng,
        })
    }

    /// Replaces the random source.
    pub fn set_rng(&mut self, rng: ChaCha8Rng) {
        self.rng = rng;
    }

    /// Routes notifications to `sender`.
    pub fn attach_events(&mut self, sender: EventSender) {
        self.world.attach_events(sender);
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &FlowConfig {
        self.world.config()
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.world.tick()
    }

    /// Cumulative counters.
    #[must_use]
    pub fn stats(&self) -> FlowStats {
        self.world.stats()
    }

    /// Underlying world state.
    #[must_use]
    pub const fn world(&self) -> &FlowWorld {
        &self.world
    }

    /// The scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Volume at `key` (0 when empty).
    #[must_use]
    pub fn volume(&self, key: CellKey) -> u8 {
        self.world.volume(key)
    }

    /// Cell at `key`.
    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.world.cell(key)
    }

    /// Whether `key` is scheduled for processing.
    #[must_use]
    pub fn is_active(&self, key: CellKey) -> bool {
        self.world.is_active(key)
    }

    /// Whether the cell at `key` is deregistered. Empty positions are not.
    #[must_use]
    pub fn is_stable(&self, key: CellKey) -> bool {
        self.world.cell(key).is_some_and(Cell::is_stable)
    }

    /// Active cells across layers.
    #[must_use]
    pub fn active_cell_count(&self) -> usize {
        self.world.active_cell_count()
    }

    /// Live cells across layers.
    #[must_use]
    pub fn live_cell_count(&self) -> usize {
        self.world.live_cell_count()
    }

    /// Total volume across layers.
    #[must_use]
    pub fn total_volume(&self) -> u64 {
        self.world.total_volume()
    }

    /// Total volume on one layer.
    #[must_use]
    pub fn layer_volume(&self, layer: LayerId) -> u64 {
        self.world.layer(layer).map_or(0, |l| l.total_volume())
    }

    // =========================================================================
    // Layers
    // =========================================================================

    /// Starts tracking a layer.
    pub fn load_layer(&mut self, layer: LayerId) -> bool {
        self.world.load_layer(layer)
    }

    /// Drops a layer and every cached link naming it.
    pub fn unload_layer(&mut self, layer: LayerId) -> bool {
        self.world.unload_layer(layer)
    }

    // =========================================================================
    // Cell API
    // =========================================================================

    /// Sets the volume at `key`, clamped to `0..=MAX_VOLUME`.
    pub fn set_volume(&mut self, host: &dyn HostGrid, key: CellKey, volume: u8) -> bool {
        self.world.set_volume(host, &mut self.rng, key, volume)
    }

    /// Adds `delta` (may be negative). Returns the change actually applied
    /// after clamping.
    pub fn add_volume(&mut self, host: &dyn HostGrid, key: CellKey, delta: i32) -> i32 {
        let old = i32::from(self.world.volume(key));
        let new = old.saturating_add(delta).clamp(0, i32::from(MAX_VOLUME));
        let Ok(volume) = u8::try_from(new) else {
            return 0;
        };
        self.world.set_volume(host, &mut self.rng, key, volume);
        new - old
    }

    /// Wakes the cell at `key`.
    pub fn reactivate(&mut self, key: CellKey) -> bool {
        self.world.activate(key)
    }

    /// Forces the cell at `key` into the stable state.
    pub fn mark_as_stable(&mut self, key: CellKey) -> bool {
        self.world.mark_stable(key)
    }

    /// Flags the cell at `key` as fed by an injector.
    pub fn set_source(&mut self, key: CellKey, source: bool) -> bool {
        self.world.set_source(key, source)
    }

    /// Host hook for a terrain change at `key`. Returns stable cells woken
    /// by the wave.
    pub fn notify_terrain_changed(&mut self, host: &dyn HostGrid, key: CellKey) -> usize {
        self.world.notify_terrain_changed(host, key)
    }

    /// Reactivates every cell within Manhattan `radius` of `center`.
    pub fn reactivate_radius(&mut self, layer: LayerId, center: TilePos, radius: u32) -> usize {
        self.world.reactivate_radius(layer, center, radius)
    }

    // =========================================================================
    // Algorithms
    // =========================================================================

    /// Runs the local rule once on `key`.
    pub fn attempt_local_diffusion(&mut self, host: &dyn HostGrid, key: CellKey) -> bool {
        diffusion::attempt_local_diffusion(&mut self.world, host, &mut self.scratch, &mut self.rng, key)
    }

    /// Pushes surplus from a saturated cell to the nearest outlet.
    pub fn try_propagate(&mut self, host: &dyn HostGrid, source: CellKey) -> bool {
        pressure::try_propagate(&mut self.world, host, &mut self.scratch, &mut self.rng, source)
    }

    /// Spreads `units` of new volume around `source`. Returns units placed.
    pub fn try_splash_distribute(&mut self, host: &dyn HostGrid, source: CellKey, units: u32) -> u32 {
        pressure::try_splash_distribute(&mut self.world, host, &mut self.scratch, &mut self.rng, source, units)
    }

    /// Runs one equalizer pass on `layer`. Returns regions rewritten.
    pub fn equalize_layer(&mut self, host: &dyn HostGrid, layer: LayerId) -> usize {
        equalizer::equalize_layer(&mut self.world, host, &mut self.scratch, &mut self.rng, layer)
    }

    /// Runs one scheduler step.
    pub fn step(&mut self, host: &dyn HostGrid) -> StepReport {
        self.scheduler
            .step(&mut self.world, host, &mut self.scratch, &mut self.rng)
    }

    /// Feeds a measured step to the throughput governor. Returns the extra
    /// steps it asked to skip.
    pub fn record_throughput(&mut self, processed: usize, elapsed: Duration) -> u32 {
        self.scheduler.record_throughput(processed, elapsed)
    }

    /// Layer directly below `layer`.
    pub fn resolve_lower_layer(&mut self, host: &dyn HostGrid, layer: LayerId) -> Option<LayerId> {
        let tick = self.world.tick;
        self.world.portals.resolve_lower(host, layer, tick)
    }

    /// Layer directly above `layer`.
    pub fn resolve_upper_layer(&mut self, host: &dyn HostGrid, layer: LayerId) -> Option<LayerId> {
        let tick = self.world.tick;
        self.world.portals.resolve_upper(host, layer, tick)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Captures every live cell.
    #[must_use]
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot::capture(&self.world)
    }

    /// Replaces the world with `snapshot`.
    pub fn restore(&mut self, snapshot: &FlowSnapshot) {
        snapshot.restore_into(&mut self.world);
    }

    /// Reconstructs the active sets from live cells.
    pub fn rebuild_active_set(&mut self) {
        self.world.rebuild_active_set();
    }
}
