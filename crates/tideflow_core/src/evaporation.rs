//! Evaporation sweep.
//!
//! Walks a few chunks per layer per step in round-robin order and removes
//! one unit from shallow cells whose evaporation time has come. The sweep
//! follows the spatial index, not the active set, so stable puddles dry up
//! too.

use rand::Rng;
use tideflow_shared::CellKey;

use crate::host::HostGrid;
use crate::scratch::SearchScratch;
use crate::world::FlowWorld;

/// Runs one sweep. Returns the units removed.
pub fn evaporate<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
) -> u32 {
    if !world.config.evaporation_enabled() {
        return 0;
    }

    let mut layers = std::mem::take(&mut scratch.layers);
    layers.clear();
    layers.extend(world.layers.keys().copied());

    let mut removed = 0;
    for layer in layers.iter().copied() {
        for _ in 0..world.config.evaporation.chunks_per_step {
            let Some(l) = world.layers.get_mut(&layer) else {
                break;
            };
            let Some(chunk) = l.index.next_chunk_after(l.evaporation_cursor) else {
                break;
            };
            l.evaporation_cursor = Some(chunk);
            scratch.positions.clear();
            scratch.positions.extend(l.index.cells_in(chunk));

            for i in 0..scratch.positions.len() {
                let Some(pos) = scratch.positions.get(i).copied() else {
                    break;
                };
                if sweep_cell(world, host, rng, CellKey::new(layer, pos)) {
                    removed += 1;
                }
            }
        }
    }

    scratch.layers = layers;
    world.stats.evaporated_units += u64::from(removed);
    removed
}

fn sweep_cell<R: Rng + ?Sized>(world: &mut FlowWorld, host: &dyn HostGrid, rng: &mut R, key: CellKey) -> bool {
    let tick = world.tick;
    let Some(cell) = world.cell(key) else {
        return false;
    };
    if cell.is_source() || tick < cell.next_evaporation_tick() {
        return false;
    }
    let volume = cell.volume();

    let e = &world.config.evaporation;
    let next = tick + rng.gen_range(u64::from(e.interval_min)..=u64::from(e.interval_max));
    let shallow = volume <= e.max_volume;
    if let Some(cell) = world.cell_mut(key) {
        cell.next_evaporation_tick = next;
    }
    shallow && world.set_volume(host, rng, key, volume - 1)
}
