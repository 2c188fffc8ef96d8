//! # Layered World Tests
//!
//! Cross-layer behavior: floor openings, standpipes, activation from below,
//! layer lifecycle and snapshots of multi-floor worlds.

use tideflow_core::host::{LayerInfo, MemoryGrid, PortalKind};
use tideflow_core::{FlowConfig, FlowError, FlowSnapshot, FluidSimulation};
use tideflow_shared::{CellKey, EventBus, FlowEvent, LayerId, TilePos, MAX_VOLUME};

const CELLAR: LayerId = LayerId(0);
const HALL: LayerId = LayerId(1);

fn key(layer: LayerId, x: i32, z: i32) -> CellKey {
    CellKey::new(layer, TilePos::new(x, z))
}

fn two_floors(w: i32, h: i32) -> MemoryGrid {
    let mut grid = MemoryGrid::new();
    grid.add_layer(LayerInfo::new(CELLAR, w, h, 7, -1));
    grid.add_layer(LayerInfo::new(HALL, w, h, 7, 0));
    grid
}

fn config() -> FlowConfig {
    let mut config = FlowConfig::default();
    config.seed = 77;
    config.scheduler.check_interval_min = 1;
    config.scheduler.check_interval_max = 1;
    config
}

/// Test: layers resolve by footprint and level, and stop resolving once
/// unloaded from the host.
#[test]
fn test_layer_resolution() {
    let mut grid = two_floors(8, 8);
    let mut sim = FluidSimulation::new(config()).unwrap();

    assert_eq!(sim.resolve_lower_layer(&grid, HALL), Some(CELLAR));
    assert_eq!(sim.resolve_upper_layer(&grid, CELLAR), Some(HALL));
    assert_eq!(sim.resolve_lower_layer(&grid, CELLAR), None);

    grid.remove_layer(CELLAR);
    sim.unload_layer(CELLAR);
    assert_eq!(sim.resolve_lower_layer(&grid, HALL), None);
    assert!(sim.stats().portal_resolution_failures >= 2);
}

/// Test: water poured in the hall drains through a floor opening.
#[test]
fn test_water_falls_through_floor_opening() {
    let mut grid = two_floors(6, 6);
    grid.set_portal(HALL, TilePos::new(3, 3), Some(PortalKind::Gravity));
    let mut sim = FluidSimulation::new(config()).unwrap();
    sim.load_layer(HALL);
    sim.load_layer(CELLAR);

    sim.set_volume(&grid, key(HALL, 3, 3), MAX_VOLUME);
    sim.set_volume(&grid, key(HALL, 3, 2), MAX_VOLUME);
    let total = sim.total_volume();

    for _ in 0..200 {
        sim.step(&grid);
    }
    assert_eq!(sim.total_volume(), total);
    assert!(sim.layer_volume(CELLAR) > 0);
    assert!(sim.stats().gravity_transfers > 0);
}

/// Test: a full landing cell pushes through its neighborhood, and the
/// opening may drain to zero.
#[test]
fn test_pass_through_pressure_below_opening() {
    let mut grid = two_floors(5, 3);
    grid.carve_room(HALL, TilePos::new(1, 1), TilePos::new(1, 1));
    grid.carve_room(CELLAR, TilePos::new(1, 1), TilePos::new(3, 1));
    grid.set_portal(HALL, TilePos::new(1, 1), Some(PortalKind::Gravity));
    let mut sim = FluidSimulation::new(config()).unwrap();

    sim.set_volume(&grid, key(CELLAR, 1, 1), MAX_VOLUME);
    sim.set_volume(&grid, key(CELLAR, 2, 1), MAX_VOLUME);
    sim.set_volume(&grid, key(HALL, 1, 1), 3);

    assert!(sim.attempt_local_diffusion(&grid, key(HALL, 1, 1)));
    assert!(sim.cell(key(HALL, 1, 1)).is_none());
    assert_eq!(sim.volume(key(CELLAR, 3, 1)), 3);
    assert_eq!(sim.volume(key(CELLAR, 1, 1)), MAX_VOLUME);
}

/// Test: a standpipe only lifts water once the gate threshold is reached,
/// and pressure can push through it.
#[test]
fn test_standpipe_lifts_under_pressure() {
    let mut grid = two_floors(5, 3);
    grid.carve_room(CELLAR, TilePos::new(1, 1), TilePos::new(3, 1));
    grid.set_portal(CELLAR, TilePos::new(3, 1), Some(PortalKind::PressureGated { threshold: MAX_VOLUME }));
    let mut sim = FluidSimulation::new(config()).unwrap();

    for x in 1..=3 {
        sim.set_volume(&grid, key(CELLAR, x, 1), MAX_VOLUME);
    }
    assert!(sim.try_propagate(&grid, key(CELLAR, 1, 1)));
    assert_eq!(sim.volume(key(HALL, 3, 1)), MAX_VOLUME - 1);
    assert_eq!(sim.volume(key(CELLAR, 1, 1)), 1);
    assert_eq!(sim.volume(key(CELLAR, 3, 1)), MAX_VOLUME);
}

/// Test: a change on the lower floor wakes the stable cell above an opening.
#[test]
fn test_change_below_wakes_floor_above() {
    let mut grid = two_floors(6, 6);
    let hole = TilePos::new(2, 2);
    grid.set_portal(HALL, hole, Some(PortalKind::Gravity));
    let mut sim = FluidSimulation::new(config()).unwrap();

    sim.set_volume(&grid, CellKey::new(CELLAR, hole), MAX_VOLUME);
    sim.set_volume(&grid, CellKey::new(HALL, hole), 2);
    sim.mark_as_stable(CellKey::new(HALL, hole));
    assert!(!sim.is_active(CellKey::new(HALL, hole)));

    sim.set_volume(&grid, CellKey::new(CELLAR, hole), 4);
    assert!(sim.is_active(CellKey::new(HALL, hole)));
}

/// Test: unloading a layer drops its cells and stops flow into it.
#[test]
fn test_unload_layer_drops_cells() {
    let mut grid = two_floors(6, 6);
    let hole = TilePos::new(1, 1);
    grid.set_portal(HALL, hole, Some(PortalKind::Gravity));
    let mut sim = FluidSimulation::new(config()).unwrap();
    sim.set_volume(&grid, key(CELLAR, 4, 4), 5);
    sim.set_volume(&grid, key(HALL, 4, 4), 3);

    assert!(sim.unload_layer(CELLAR));
    assert_eq!(sim.layer_volume(CELLAR), 0);
    assert_eq!(sim.total_volume(), 3);
    assert!(!sim.unload_layer(CELLAR));

    grid.remove_layer(CELLAR);
    sim.set_volume(&grid, CellKey::new(HALL, hole), 4);
    sim.attempt_local_diffusion(&grid, CellKey::new(HALL, hole));
    assert_eq!(sim.layer_volume(CELLAR), 0);
    assert_eq!(sim.total_volume(), 7);
}

/// Test: splash spreads an injection over nearby outlets.
#[test]
fn test_splash_distributes_injection() {
    let grid = two_floors(9, 9);
    let mut sim = FluidSimulation::new(config()).unwrap();

    let placed = sim.try_splash_distribute(&grid, key(HALL, 4, 4), 12);
    assert_eq!(placed, 12);
    assert_eq!(sim.layer_volume(HALL), 12);
    assert!(sim.live_cell_count() > 1);
    assert_eq!(sim.stats().splash_units, 12);
}

/// Test: a snapshot survives encoding and restores an equivalent world.
#[test]
fn test_snapshot_roundtrip_through_bytes() {
    let mut grid = two_floors(8, 8);
    grid.set_portal(HALL, TilePos::new(4, 4), Some(PortalKind::Gravity));
    let mut sim = FluidSimulation::new(config()).unwrap();
    sim.set_volume(&grid, key(HALL, 4, 4), 7);
    sim.set_volume(&grid, key(HALL, 1, 1), 5);
    sim.set_volume(&grid, key(CELLAR, 6, 6), 7);
    sim.set_source(key(CELLAR, 6, 6), true);
    for _ in 0..25 {
        sim.step(&grid);
    }

    let bytes = sim.snapshot().encode();
    let decoded = FlowSnapshot::decode(&bytes).unwrap();

    let mut restored = FluidSimulation::new(config()).unwrap();
    restored.restore(&decoded);
    assert_eq!(restored.tick(), sim.tick());
    assert_eq!(restored.total_volume(), sim.total_volume());
    assert_eq!(restored.live_cell_count(), sim.live_cell_count());
    assert_eq!(restored.active_cell_count(), sim.active_cell_count());
    assert_eq!(restored.snapshot(), sim.snapshot());

    let mut truncated = bytes;
    truncated.truncate(truncated.len() - 3);
    assert!(matches!(
        FlowSnapshot::decode(&truncated),
        Err(FlowError::SnapshotCorrupt(_) | FlowError::SnapshotChecksum { .. })
    ));
}

/// Test: lifecycle notifications reach an attached receiver.
#[test]
fn test_events_reach_receiver() {
    let grid = two_floors(4, 4);
    let (sender, receiver) = EventBus::create_pair(64);
    let mut sim = FluidSimulation::new(config()).unwrap();
    sim.attach_events(sender);

    let spot = key(HALL, 1, 1);
    sim.set_volume(&grid, spot, 2);
    sim.set_volume(&grid, spot, 0);

    let events = receiver.drain();
    assert_eq!(
        events,
        vec![
            FlowEvent::CellCreated { key: spot, volume: 2 },
            FlowEvent::CellDestroyed { key: spot },
        ]
    );
}
