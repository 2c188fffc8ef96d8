//! Periodic region equalization.
//!
//! Pairwise halving converges slowly along long chains and leaves a
//! staircase gradient. This pass collects connected same-layer regions and
//! rewrites each one to its flattest integer distribution in one go.

use rand::Rng;
use tideflow_shared::{CellKey, LayerId, MAX_VOLUME};
use tracing::debug;

use crate::host::HostGrid;
use crate::neighbor::{classify_neighbors, Neighbor};
use crate::scratch::{shuffle_prefix, SearchScratch};
use crate::world::FlowWorld;

/// Equalizes up to `max_regions_per_pass` regions of `layer`.
///
/// Returns the number of regions rewritten.
pub fn equalize_layer<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    layer: LayerId,
) -> usize {
    let Some(l) = world.layers.get(&layer) else {
        return 0;
    };
    let mut seeds = std::mem::take(&mut scratch.positions);
    seeds.clear();
    seeds.extend(l.index.positions());
    if seeds.is_empty() {
        scratch.positions = seeds;
        return 0;
    }

    let max_regions = world.config.equalizer.max_regions_per_pass;
    let start = rng.gen_range(0..seeds.len());
    scratch.begin_search();

    let mut rewritten = 0;
    for offset in 0..seeds.len() {
        if rewritten >= max_regions {
            break;
        }
        let seed = CellKey::new(layer, seeds[(start + offset) % seeds.len()]);
        if world.volume(seed) == 0 || !scratch.visit(seed) {
            continue;
        }
        if equalize_region(world, host, scratch, rng, seed) {
            rewritten += 1;
        }
    }

    scratch.positions = seeds;
    rewritten
}

/// Collects the region around `seed` and rewrites it if it is uneven.
fn equalize_region<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    seed: CellKey,
) -> bool {
    let max_region = world.config.equalizer.max_region;
    let tick = world.tick;

    scratch.region.clear();
    scratch.frontier.clear();
    scratch.frontier.push_back(seed);

    let (mut total, mut min, mut max) = (0_u32, MAX_VOLUME, 0_u8);
    while let Some(key) = scratch.frontier.pop_front() {
        let volume = world.volume(key);
        scratch.region.push(key.pos);
        total += u32::from(volume);
        min = min.min(volume);
        max = max.max(volume);
        if scratch.region.len() >= max_region {
            break;
        }

        let neighbors = classify_neighbors(host, &mut world.portals, key, tick);
        for n in neighbors.cardinals() {
            if let Neighbor::Open(target) = n {
                if world.volume(target) > 0 && scratch.visit(target) {
                    scratch.frontier.push_back(target);
                }
            }
        }
    }

    let count = scratch.region.len();
    if count <= 1 || max - min <= 1 {
        return false;
    }

    let mut region = std::mem::take(&mut scratch.region);
    shuffle_prefix(&mut region, count, rng);
    let n = u32::try_from(count).unwrap_or(u32::MAX);
    let base = total / n;
    let remainder = total % n;
    for (i, pos) in region.iter().enumerate() {
        let extra = u32::try_from(i).map_or(false, |i| i < remainder);
        let target = u8::try_from(base + u32::from(extra)).unwrap_or(MAX_VOLUME);
        world.set_volume(host, rng, CellKey::new(seed.layer, *pos), target);
    }
    scratch.region = region;

    world.stats.equalized_regions += 1;
    debug!(
        layer = seed.layer.get(),
        cells = count,
        total,
        min,
        max,
        "region equalized"
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::host::{LayerInfo, MemoryGrid};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tideflow_shared::TilePos;

    const L: LayerId = LayerId(0);

    fn line(volumes: &[u8]) -> (FlowWorld, MemoryGrid, ChaCha8Rng) {
        let len = i32::try_from(volumes.len()).unwrap();
        let mut grid = MemoryGrid::new();
        grid.add_layer(LayerInfo::new(L, len + 2, 3, 0, 0));
        grid.carve_room(L, TilePos::new(1, 1), TilePos::new(len, 1));
        let mut world = FlowWorld::new(FlowConfig::default()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for (i, v) in volumes.iter().enumerate() {
            let x = i32::try_from(i).unwrap() + 1;
            world.set_volume(&grid, &mut rng, CellKey::new(L, TilePos::new(x, 1)), *v);
        }
        (world, grid, rng)
    }

    fn volumes(world: &FlowWorld, len: i32) -> Vec<u8> {
        (1..=len)
            .map(|x| world.volume(CellKey::new(L, TilePos::new(x, 1))))
            .collect()
    }

    #[test]
    fn test_staircase_is_flattened_and_conserved() {
        let (mut world, grid, mut rng) = line(&[7, 6, 5, 4, 3, 2, 1]);
        let mut scratch = SearchScratch::with_capacity(16);

        assert_eq!(equalize_layer(&mut world, &grid, &mut scratch, &mut rng, L), 1);
        assert_eq!(volumes(&world, 7), vec![4; 7]);
        assert_eq!(world.total_volume(), 28);
    }

    #[test]
    fn test_remainder_goes_one_unit_each() {
        let (mut world, grid, mut rng) = line(&[7, 1, 1, 1]);
        let mut scratch = SearchScratch::with_capacity(16);

        equalize_layer(&mut world, &grid, &mut scratch, &mut rng, L);
        let after = volumes(&world, 4);
        assert_eq!(after.iter().map(|v| u32::from(*v)).sum::<u32>(), 10);
        assert_eq!(after.iter().filter(|v| **v == 3).count(), 2);
        assert_eq!(after.iter().filter(|v| **v == 2).count(), 2);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let (mut world, grid, mut rng) = line(&[7, 2, 6, 1, 5]);
        let mut scratch = SearchScratch::with_capacity(16);

        equalize_layer(&mut world, &grid, &mut scratch, &mut rng, L);
        let first = volumes(&world, 5);
        assert_eq!(equalize_layer(&mut world, &grid, &mut scratch, &mut rng, L), 0);
        assert_eq!(volumes(&world, 5), first);
    }
}
