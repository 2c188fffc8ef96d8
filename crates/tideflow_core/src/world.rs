//! # Flow World
//!
//! Owns every layer's cells, spatial index and active set, plus the portal
//! cache. All volume changes go through [`FlowWorld::set_volume`], which is
//! where the cell lifecycle invariants live:
//!
//! - volume is clamped to `0..=MAX_VOLUME`
//! - a cell exists only while its volume is non-zero
//! - any change wakes the cell, its neighbors and, through portals, the
//!   matching cells on the layers above

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use tideflow_shared::{CellKey, EventSender, FlowEvent, LayerId, TilePos, MAX_VOLUME};
use tracing::info;

use crate::cell::Cell;
use crate::config::FlowConfig;
use crate::error::FlowResult;
use crate::host::HostGrid;
use crate::layer::FlowLayer;
use crate::neighbor::classify_neighbors;
use crate::portal::PortalLinkage;
use crate::stats::FlowStats;

/// Mutable state of the whole simulated world.
pub struct FlowWorld {
    pub(crate) config: FlowConfig,
    pub(crate) layers: BTreeMap<LayerId, FlowLayer>,
    pub(crate) portals: PortalLinkage,
    pub(crate) tick: u64,
    pub(crate) stats: FlowStats,
    events: Option<EventSender>,
    upper_buf: Vec<LayerId>,
    wave_buf: Vec<TilePos>,
    wave_active: bool,
    /// Largest wave radius already sent from each center this step.
    waves_this_step: HashMap<(LayerId, TilePos), u32>,
}

impl FlowWorld {
    /// Creates an empty world.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidConfig`](crate::FlowError::InvalidConfig) if `config` fails
    /// [`FlowConfig::validate`].
    pub fn new(config: FlowConfig) -> FlowResult<Self> {
        config.validate()?;
        let portals = PortalLinkage::new(&config.portals);
        Ok(Self {
            config,
            layers: BTreeMap::new(),
            portals,
            tick: 0,
            stats: FlowStats::default(),
            events: None,
            upper_buf: Vec::new(),
            wave_buf: Vec::new(),
            wave_active: false,
            waves_this_step: HashMap::new(),
        })
    }

    /// Engine configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Current simulation tick.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> FlowStats {
        FlowStats {
            portal_resolution_failures: self.portals.failures(),
            ..self.stats
        }
    }

    /// Routes notifications to `sender`.
    pub fn attach_events(&mut self, sender: EventSender) {
        self.events = Some(sender);
    }

    /// Stops sending notifications.
    pub fn detach_events(&mut self) {
        self.events = None;
    }

    #[inline]
    pub(crate) fn emit(&self, event: FlowEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    // =========================================================================
    // Layers
    // =========================================================================

    /// Starts tracking a layer. Returns `false` if it was already loaded.
    pub fn load_layer(&mut self, id: LayerId) -> bool {
        if self.layers.contains_key(&id) {
            return false;
        }
        self.layers.insert(id, FlowLayer::new(id, self.config.scheduler.chunk_size));
        info!(layer = id.get(), "flow layer loaded");
        true
    }

    /// Drops a layer with all of its cells and cached links naming it.
    ///
    /// Links are evicted even when no cells were loaded. Returns `true` if
    /// the layer was loaded.
    pub fn unload_layer(&mut self, id: LayerId) -> bool {
        self.portals.evict_layer(id);
        let Some(layer) = self.layers.remove(&id) else {
            return false;
        };
        info!(
            layer = id.get(),
            cells = layer.index().len(),
            "flow layer unloaded"
        );
        true
    }

    pub(crate) fn ensure_layer(&mut self, id: LayerId) -> &mut FlowLayer {
        let chunk_size = self.config.scheduler.chunk_size;
        self.layers
            .entry(id)
            .or_insert_with(|| FlowLayer::new(id, chunk_size))
    }

    /// A loaded layer.
    #[inline]
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<&FlowLayer> {
        self.layers.get(&id)
    }

    /// Loaded layers in id order.
    pub fn layers(&self) -> impl Iterator<Item = &FlowLayer> + '_ {
        self.layers.values()
    }

    /// Ids of loaded layers in order.
    pub fn layer_ids(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.layers.keys().copied()
    }

    // =========================================================================
    // Cell queries
    // =========================================================================

    /// Cell at `key`, if it exists.
    #[inline]
    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.layers.get(&key.layer)?.index.get(key.pos)
    }

    #[inline]
    pub(crate) fn cell_mut(&mut self, key: CellKey) -> Option<&mut Cell> {
        self.layers.get_mut(&key.layer)?.index.get_mut(key.pos)
    }

    /// Volume at `key` (0 when no cell exists).
    #[inline]
    #[must_use]
    pub fn volume(&self, key: CellKey) -> u8 {
        self.cell(key).map_or(0, Cell::volume)
    }

    /// Whether `key` is in its layer's active set.
    #[must_use]
    pub fn is_active(&self, key: CellKey) -> bool {
        self.layers
            .get(&key.layer)
            .is_some_and(|layer| layer.active.contains(key.pos))
    }

    /// Active cells across all layers.
    #[must_use]
    pub fn active_cell_count(&self) -> usize {
        self.layers.values().map(|layer| layer.active.len()).sum()
    }

    /// Live cells across all layers.
    #[must_use]
    pub fn live_cell_count(&self) -> usize {
        self.layers.values().map(|layer| layer.index.len()).sum()
    }

    /// Sum of all volume across all layers.
    #[must_use]
    pub fn total_volume(&self) -> u64 {
        self.layers.values().map(FlowLayer::total_volume).sum()
    }

    // =========================================================================
    // Volume mutation
    // =========================================================================

    /// Sets the volume at `key`, creating or destroying the cell as needed.
    ///
    /// Returns `true` if the volume changed. Any change wakes the cell, its
    /// classified neighbors and the portal cells above it.
    pub fn set_volume<R: Rng + ?Sized>(
        &mut self,
        host: &dyn HostGrid,
        rng: &mut R,
        key: CellKey,
        volume: u8,
    ) -> bool {
        let volume = volume.min(MAX_VOLUME);
        let old = self.volume(key);
        if old == volume {
            return false;
        }

        if volume == 0 {
            if let Some(layer) = self.layers.get_mut(&key.layer) {
                layer.mark_inactive(key.pos);
                layer.index.remove(key.pos);
            }
            self.stats.cells_destroyed += 1;
            self.emit(FlowEvent::CellDestroyed { key });
        } else if old == 0 {
            let cell = self.spawn_cell(volume, rng);
            let layer = self.ensure_layer(key.layer);
            layer.index.insert(key.pos, cell);
            layer.mark_active(key.pos);
            self.stats.cells_created += 1;
            self.emit(FlowEvent::CellCreated { key, volume });
        } else {
            if let Some(cell) = self.cell_mut(key) {
                cell.volume = volume;
            }
            self.emit(FlowEvent::VolumeChanged { key, old, new: volume });
        }

        self.activate(key);
        self.activate_neighbors(host, key);
        self.propagate_activation(host, key);
        true
    }

    /// Moves up to `amount` units from `from` to `to`.
    ///
    /// Clamped by what `from` holds and what `to` can take. Returns the
    /// units actually moved.
    pub(crate) fn transfer<R: Rng + ?Sized>(
        &mut self,
        host: &dyn HostGrid,
        rng: &mut R,
        from: CellKey,
        to: CellKey,
        amount: u8,
    ) -> u8 {
        let source = self.volume(from);
        let dest = self.volume(to);
        let amount = amount.min(source).min(MAX_VOLUME - dest);
        if amount == 0 {
            return 0;
        }
        self.set_volume(host, rng, from, source - amount);
        self.set_volume(host, rng, to, dest + amount);
        self.stats.transfers += 1;
        amount
    }

    fn spawn_cell<R: Rng + ?Sized>(&self, volume: u8, rng: &mut R) -> Cell {
        let s = &self.config.scheduler;
        let phase = rng.gen_range(0..u64::from(s.check_interval_max.max(1)));
        let evaporation = if self.config.evaporation_enabled() {
            let e = &self.config.evaporation;
            self.tick + rng.gen_range(u64::from(e.interval_min)..=u64::from(e.interval_max))
        } else {
            0
        };
        Cell::new(volume, self.tick + phase, evaporation)
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Wakes the cell at `key`: clears its idle streak and registers it as
    /// active. Returns `true` if it was not already in the active set.
    pub fn activate(&mut self, key: CellKey) -> bool {
        let Some(layer) = self.layers.get_mut(&key.layer) else {
            return false;
        };
        let Some(cell) = layer.index.get_mut(key.pos) else {
            return false;
        };
        cell.wake();
        layer.mark_active(key.pos)
    }

    /// Wakes every classified neighbor of `key`, including portal targets.
    pub fn activate_neighbors(&mut self, host: &dyn HostGrid, key: CellKey) {
        let neighbors = classify_neighbors(host, &mut self.portals, key, self.tick);
        for target in neighbors.iter().filter_map(|n| n.target()) {
            self.activate(target);
        }
    }

    /// Wakes the cells above `key` whose portals drain into it.
    pub(crate) fn propagate_activation(&mut self, host: &dyn HostGrid, key: CellKey) {
        let mut uppers = std::mem::take(&mut self.upper_buf);
        self.portals.uppers_of(host, key.layer, self.tick, &mut uppers);
        for upper in uppers.iter().copied() {
            if host.portal_at(upper, key.pos).is_some() {
                self.activate(key.on_layer(upper));
            }
        }
        self.upper_buf = uppers;
    }

    /// Forces a cell into the stable state.
    pub fn mark_stable(&mut self, key: CellKey) -> bool {
        let cap = self.config.scheduler.stability_cap;
        let Some(cell) = self.cell_mut(key) else {
            return false;
        };
        cell.stability = cap;
        self.deregister(key);
        true
    }

    /// Records a no-op processing attempt. Returns `true` if the cell was
    /// deregistered by it.
    pub(crate) fn record_idle(&mut self, key: CellKey) -> bool {
        let cap = self.config.scheduler.stability_cap;
        let exempt = self.config.scheduler.sources_never_stabilize;
        let Some(cell) = self.cell_mut(key) else {
            return false;
        };
        if !cell.record_idle(cap) || (exempt && cell.is_source) {
            return false;
        }
        self.deregister(key);
        true
    }

    fn deregister(&mut self, key: CellKey) {
        let Some(layer) = self.layers.get_mut(&key.layer) else {
            return;
        };
        let Some(cell) = layer.index.get_mut(key.pos) else {
            return;
        };
        cell.deregistered = true;
        layer.mark_inactive(key.pos);
        self.stats.stabilized += 1;
        self.emit(FlowEvent::CellStabilized { key });
    }

    /// Flags or clears a cell as fed by an external injector.
    pub fn set_source(&mut self, key: CellKey, source: bool) -> bool {
        let Some(cell) = self.cell_mut(key) else {
            return false;
        };
        cell.is_source = source;
        if source {
            self.activate(key);
        }
        true
    }

    pub(crate) fn reschedule_check<R: Rng + ?Sized>(&mut self, key: CellKey, rng: &mut R) {
        let s = &self.config.scheduler;
        let next = self.tick + u64::from(rng.gen_range(s.check_interval_min..=s.check_interval_max));
        if let Some(cell) = self.cell_mut(key) {
            cell.next_local_check_tick = next;
        }
    }

    pub(crate) fn start_pressure_cooldown(&mut self, key: CellKey) {
        let until = self.tick + u64::from(self.config.pressure.cooldown_ticks);
        if let Some(cell) = self.cell_mut(key) {
            cell.pressure_cooldown_until = until;
        }
    }

    pub(crate) fn pressure_cooling(&self, key: CellKey) -> bool {
        self.cell(key).is_some_and(|cell| cell.pressure_cooling(self.tick))
    }

    /// Reactivates every live cell within Manhattan `radius` of `center`.
    ///
    /// Returns the number of stable cells woken. A wave cannot start while
    /// another is running. Within one step, a wave from a center already
    /// covered by an equal or larger radius is skipped.
    pub fn reactivate_radius(&mut self, layer: LayerId, center: TilePos, radius: u32) -> usize {
        if self.wave_active {
            return 0;
        }
        match self.waves_this_step.entry((layer, center)) {
            Entry::Occupied(mut sent) => {
                if *sent.get() >= radius {
                    return 0;
                }
                sent.insert(radius);
            }
            Entry::Vacant(slot) => {
                slot.insert(radius);
            }
        }
        self.wave_active = true;

        let mut positions = std::mem::take(&mut self.wave_buf);
        positions.clear();
        if let Some(l) = self.layers.get(&layer) {
            positions.extend(l.index.positions_within(center, radius));
        }

        let mut woken = 0;
        for pos in positions.iter().copied() {
            let key = CellKey::new(layer, pos);
            let was_stable = self.cell(key).is_some_and(Cell::is_stable);
            self.activate(key);
            if was_stable {
                woken += 1;
            }
        }

        self.wave_buf = positions;
        self.stats.reactivation_waves += 1;
        self.wave_active = false;
        woken
    }

    /// Host hook for walls, floors or gates changing at `key`.
    ///
    /// Wakes the tile and its neighbors, then sends a bounded wave.
    pub fn notify_terrain_changed(&mut self, host: &dyn HostGrid, key: CellKey) -> usize {
        self.activate(key);
        self.activate_neighbors(host, key);
        self.propagate_activation(host, key);
        self.reactivate_radius(key.layer, key.pos, self.config.scheduler.terrain_wave_radius)
    }

    /// Reconstructs every active set from the cells' flags.
    pub fn rebuild_active_set(&mut self) {
        for layer in self.layers.values_mut() {
            layer.rebuild_active();
        }
    }

    /// Advances the tick and resets per-step guards.
    pub(crate) fn begin_step(&mut self) -> u64 {
        self.tick += 1;
        self.clear_step_guards();
        self.tick
    }

    /// Resets per-step guards. Throttled steps call this without ticking.
    pub(crate) fn clear_step_guards(&mut self) {
        self.waves_this_step.clear();
    }

    /// Drops every layer and resets the clock (used by snapshot restore).
    pub(crate) fn reset(&mut self, tick: u64) {
        self.layers.clear();
        self.portals.clear();
        self.waves_this_step.clear();
        self.tick = tick;
    }
}
