//! # Local Diffusion Rule
//!
//! One attempt on one cell, in strict priority order:
//!
//! 1. Gravity: a cell on a floor opening drains downward and nothing else
//!    happens this attempt. A full destination falls back to a pass-through
//!    pressure search from below.
//! 2. Pressure: a full cell boxed in by full or blocked cardinals searches
//!    for a distant outlet.
//! 3. Expansion: at most one new cell per attempt, in a random empty
//!    neighbor.
//! 4. Equilibrium: halve every remaining difference of at least
//!    `min_transfer_diff` against lower neighbors.
//!
//! Every transfer goes through [`FlowWorld::set_volume`], so both endpoints
//! and their neighbors are woken by the move itself.

use rand::Rng;
use tideflow_shared::{CellKey, MAX_VOLUME};

use crate::host::HostGrid;
use crate::neighbor::{classify_neighbors, Neighbor, Neighbors};
use crate::pressure;
use crate::scratch::SearchScratch;
use crate::world::FlowWorld;

/// Runs the local rule on the cell at `key`. Returns `true` if any volume
/// moved.
pub fn attempt_local_diffusion<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    key: CellKey,
) -> bool {
    let volume = world.volume(key);
    if volume == 0 {
        return false;
    }
    let neighbors = classify_neighbors(host, &mut world.portals, key, world.tick);

    if let Some(below) = neighbors.gravity_target() {
        if drain_down(world, host, scratch, rng, key, below, volume) {
            return true;
        }
    }

    if volume <= 1 {
        return false;
    }

    if volume >= MAX_VOLUME && !world.pressure_cooling(key) && boxed_in(world, &neighbors) {
        if pressure::try_propagate(world, host, scratch, rng, key) {
            return true;
        }
        world.start_pressure_cooldown(key);
    }

    let mut survey = std::mem::take(&mut scratch.survey);
    survey.clear();
    survey.extend(
        neighbors
            .iter()
            .filter(|n| !n.is_gravity() && n.passes_gate(volume))
            .filter_map(|n| n.target())
            .map(|target| (target, world.volume(target))),
    );

    let mut changed = expand(world, host, rng, key, volume, &survey);

    let min_diff = world.config.diffusion.min_transfer_diff;
    for (target, surveyed) in survey.iter().copied() {
        // Cells created by the expansion above are not equilibrium partners.
        if surveyed == 0 {
            continue;
        }
        let current = world.volume(key);
        let dest = world.volume(target);
        if current <= dest || current - dest < min_diff {
            continue;
        }
        let amount = ((current - dest) / 2)
            .min(MAX_VOLUME - dest)
            .min(current - 1);
        if amount > 0 && world.transfer(host, rng, key, target, amount) > 0 {
            changed = true;
        }
    }

    scratch.survey = survey;
    changed
}

/// Gravity shortcut. Returns `true` if anything moved.
fn drain_down<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    scratch: &mut SearchScratch,
    rng: &mut R,
    key: CellKey,
    below: CellKey,
    volume: u8,
) -> bool {
    let capacity = MAX_VOLUME - world.volume(below);
    if capacity > 0 {
        // Keep one unit behind unless it is the last one.
        let amount = if volume > 1 {
            (volume - 1).min(capacity)
        } else {
            volume.min(capacity)
        };
        let moved = world.transfer(host, rng, key, below, amount);
        if moved > 0 {
            world.stats.gravity_transfers += 1;
        }
        return moved > 0;
    }

    if world.pressure_cooling(key) {
        return false;
    }
    let delivered = pressure::propagate_through(world, host, scratch, rng, below, key);
    if !delivered {
        world.start_pressure_cooldown(key);
    }
    delivered
}

/// Whether every same-layer cardinal is full or impassable.
fn boxed_in(world: &FlowWorld, neighbors: &Neighbors) -> bool {
    neighbors.cardinals().all(|n| match n {
        Neighbor::Open(target) => world.volume(target) >= MAX_VOLUME,
        _ => true,
    })
}

fn expand<R: Rng + ?Sized>(
    world: &mut FlowWorld,
    host: &dyn HostGrid,
    rng: &mut R,
    key: CellKey,
    volume: u8,
    survey: &[(CellKey, u8)],
) -> bool {
    let empty = survey.iter().filter(|(_, v)| *v == 0).count();
    if empty == 0 {
        return false;
    }
    let pick = rng.gen_range(0..empty);
    let Some(target) = survey
        .iter()
        .filter(|(_, v)| *v == 0)
        .nth(pick)
        .map(|(target, _)| *target)
    else {
        return false;
    };
    let amount = (volume / 2).max(1).min(volume - 1);
    world.transfer(host, rng, key, target, amount) > 0
}
