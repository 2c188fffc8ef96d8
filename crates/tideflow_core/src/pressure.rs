//! # Pressure & Splash Propagation
//!
//! Breadth-first search through saturated cells ("conduits") to the nearest
//! cell with spare capacity. Portals are ordinary edges of the search graph,
//! so pressure crosses layers the same way it crosses a room.
//!
//! Both searches run to completion inside the call, bounded by
//! `pressure.max_search_nodes`, and reuse [`SearchScratch`].

use rand::Rng;
use tideflow_shared::{CellKey, MAX_VOLUME};
use tracing::debug;

use crate::host::{HostGrid, PortalKind};
use crate::neighbor::classify_neighbors;
use crate::scratch::{shuffle_prefix, SearchScratch};
use crate::world::FlowWorld;

/// Pushes surplus from a saturated `source` to the nearest outlet.
///
/// Returns `true` if volume was delivered.
pub fn try_propagate<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    source: CellKey,
) -> bool {
    propagate_through(world, host, scratch, rng, source, source)
}

/// Searches from `origin` while debiting `debit`.
///
/// With `origin != debit` this is the pass-through case: a floor opening
/// whose landing cell is full pushes through the landing cell's
/// neighborhood. A debit sitting on a gravity opening may drain to zero;
/// any other debit keeps one unit.
pub fn propagate_through<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    origin: CellKey,
    debit: CellKey,
) -> bool {
    let volume = world.volume(debit);
    let available = if matches!(host.portal_at(debit.layer, debit.pos), Some(PortalKind::Gravity)) {
        volume
    } else {
        volume.saturating_sub(1)
    };
    if available == 0 {
        return false;
    }

    let Some((outlet, capacity)) = nearest_outlet(world, host, scratch, origin, debit) else {
        world.stats.pressure_trapped += 1;
        debug!(
            layer = debit.layer.get(),
            x = debit.pos.x,
            z = debit.pos.z,
            "pressure trapped"
        );
        return false;
    };

    let moved = world.transfer(host, rng, debit, outlet, available.min(capacity));
    if moved > 0 {
        world.stats.pressure_deliveries += 1;
    }
    moved > 0
}

/// BFS to the first non-full cell, skipping `debit`.
fn nearest_outlet(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    origin: CellKey,
    debit: CellKey,
) -> Option<(CellKey, u8)> {
    let max_nodes = world.config.pressure.max_search_nodes;
    let tick = world.tick;

    scratch.begin_search();
    scratch.visit(debit);
    scratch.visit(origin);
    scratch.frontier.push_back(origin);

    let mut expanded = 0;
    while let Some(key) = scratch.frontier.pop_front() {
        let volume = world.volume(key);
        if key != debit && volume < MAX_VOLUME {
            return Some((key, MAX_VOLUME - volume));
        }
        if expanded >= max_nodes {
            return None;
        }
        expanded += 1;

        let neighbors = classify_neighbors(host, &mut world.portals, key, tick);
        for n in neighbors.iter() {
            if !n.passes_gate(volume) {
                continue;
            }
            if let Some(target) = n.target() {
                if scratch.visit(target) {
                    scratch.frontier.push_back(target);
                }
            }
        }
    }
    None
}

/// Spreads `units` of new volume over up to `splash_max_candidates`
/// outlets around `source`.
///
/// The source itself counts as an outlet when it has room. Each outlet
/// gets an even share, the remainder goes one unit each to a random subset,
/// and shares are capped by capacity. Returns the units actually placed.
pub fn try_splash_distribute<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    source: CellKey,
    units: u32,
) -> u32 {
    if units == 0 {
        return 0;
    }
    collect_outlets(world, host, scratch, source);

    let mut candidates = std::mem::take(&mut scratch.candidates);
    let placed = spread(world, host, rng, &mut candidates, units);
    debug!(
        layer = source.layer.get(),
        outlets = candidates.len(),
        units,
        placed,
        "splash distributed"
    );
    scratch.candidates = candidates;

    world.stats.splash_units += u64::from(placed);
    placed
}

fn collect_outlets(world: &mut FlowWorld, host: &dyn HostGrid, scratch: &mut SearchScratch, source: CellKey) {
    let max_nodes = world.config.pressure.max_search_nodes;
    let max_candidates = world.config.pressure.splash_max_candidates.max(1);
    let tick = world.tick;

    scratch.begin_search();
    scratch.candidates.clear();
    scratch.visit(source);
    scratch.frontier.push_back(source);

    let mut expanded = 0;
    while let Some(key) = scratch.frontier.pop_front() {
        let volume = world.volume(key);
        if volume < MAX_VOLUME {
            scratch.candidates.push((key, MAX_VOLUME - volume));
            if scratch.candidates.len() >= max_candidates {
                return;
            }
            // Outlets end a branch; only the source and conduits are expanded.
            if key != source {
                continue;
            }
        }
        if expanded >= max_nodes {
            return;
        }
        expanded += 1;

        let neighbors = classify_neighbors(host, &mut world.portals, key, tick);
        for n in neighbors.iter() {
            if !n.passes_gate(MAX_VOLUME) {
                continue;
            }
            if let Some(target) = n.target() {
                if scratch.visit(target) {
                    scratch.frontier.push_back(target);
                }
            }
        }
    }
}

fn spread<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    rng: &mut R,
    candidates: &mut [(CellKey, u8)],
    units: u32,
) -> u32 {
    let count = u32::try_from(candidates.len()).unwrap_or(u32::MAX);
    if count == 0 {
        return 0;
    }
    let base = units / count;
    let remainder = units % count;
    shuffle_prefix(candidates, candidates.len(), rng);

    let mut placed = 0;
    for (i, (key, _)) in candidates.iter().enumerate() {
        let extra = u32::from(u32::try_from(i).map_or(false, |i| i < remainder));
        let share = base + extra;
        let current = world.volume(*key);
        let room = MAX_VOLUME - current;
        let add = u8::try_from(share).map_or(room, |s| s.min(room));
        if add > 0 && world.set_volume(host, rng, *key, current + add) {
            placed += u32::from(add);
        }
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::host::{LayerInfo, MemoryGrid};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tideflow_shared::{LayerId, TilePos};

    const ROW: LayerId = LayerId(0);

    fn corridor(len: i32) -> MemoryGrid {
        let mut grid = MemoryGrid::new();
        grid.add_layer(LayerInfo::new(ROW, len + 2, 3, 0, 0));
        grid.carve_room(ROW, TilePos::new(1, 1), TilePos::new(len, 1));
        grid
    }

    fn at(x: i32) -> CellKey {
        CellKey::new(ROW, TilePos::new(x, 1))
    }

    #[test]
    fn test_delivers_to_far_end_of_saturated_corridor() {
        let grid = corridor(6);
        let mut world = FlowWorld::new(FlowConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for x in 1..=5 {
            world.set_volume(&grid, &mut rng, at(x), MAX_VOLUME);
        }
        world.set_volume(&grid, &mut rng, at(6), 4);

        let mut scratch = SearchScratch::with_capacity(32);
        assert!(try_propagate(&mut world, &grid, &mut scratch, &mut rng, at(1)));

        assert_eq!(world.volume(at(1)), 4);
        assert_eq!(world.volume(at(6)), MAX_VOLUME);
        for x in 2..=5 {
            assert_eq!(world.volume(at(x)), MAX_VOLUME);
        }
        assert_eq!(world.stats().pressure_deliveries, 1);
    }

    #[test]
    fn test_trapped_when_search_budget_too_small() {
        let grid = corridor(6);
        let mut config = FlowConfig::default();
        config.pressure.max_search_nodes = 3;
        let mut world = FlowWorld::new(config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for x in 1..=5 {
            world.set_volume(&grid, &mut rng, at(x), MAX_VOLUME);
        }

        let mut scratch = SearchScratch::with_capacity(32);
        assert!(!try_propagate(&mut world, &grid, &mut scratch, &mut rng, at(1)));
        assert_eq!(world.total_volume(), 35);
        assert_eq!(world.stats().pressure_trapped, 1);
    }

    #[test]
    fn test_splash_spreads_evenly_and_caps() {
        let grid = corridor(5);
        let mut world = FlowWorld::new(FlowConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut scratch = SearchScratch::with_capacity(32);

        // Source at the left end: itself plus one neighbor.
        let placed = try_splash_distribute(&mut world, &grid, &mut scratch, &mut rng, at(1), 5);
        assert_eq!(placed, 5);
        let a = world.volume(at(1));
        let b = world.volume(at(2));
        assert_eq!(a + b, 5);
        assert!(a.abs_diff(b) <= 1);

        // Corridor of five holds at most 35 units.
        let placed = try_splash_distribute(&mut world, &grid, &mut scratch, &mut rng, at(1), 100);
        assert!(placed <= 30);
        assert!(world.total_volume() <= 35);
    }
}
