//! Benchmark for pressure, splash and equalizer searches.
//!
//! Run with: cargo bench --package tideflow_core --bench pressure_benchmark

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tideflow_core::host::{HostGrid, LayerInfo, MemoryGrid};
use tideflow_core::{FlowConfig, FluidSimulation};
use tideflow_shared::{CellKey, LayerId, TilePos, MAX_VOLUME};

const GROUND: LayerId = LayerId(0);

/// Serpentine corridor of `len` saturated tiles ending in one empty tile.
fn saturated_corridor(len: i32) -> (FluidSimulation, MemoryGrid, CellKey) {
    let width = 32;
    let rows = len / width + 1;
    let mut grid = MemoryGrid::new();
    grid.add_layer(LayerInfo::new(GROUND, width, rows * 2, 1, 0));
    for row in 0..rows {
        // Wall rows with a gap at alternating ends.
        let z = row * 2 + 1;
        let gap = if row % 2 == 0 { width - 1 } else { 0 };
        for x in 0..width {
            if x != gap {
                grid.set_wall(GROUND, TilePos::new(x, z), true);
            }
        }
    }

    let mut config = FlowConfig::default();
    config.pressure.max_search_nodes = usize::try_from(len).unwrap_or(usize::MAX).saturating_mul(2);
    let mut sim = FluidSimulation::new(config).unwrap();
    for z in 0..rows * 2 {
        for x in 0..width {
            if grid.is_passable(GROUND, TilePos::new(x, z)) {
                sim.set_volume(&grid, CellKey::new(GROUND, TilePos::new(x, z)), MAX_VOLUME);
            }
        }
    }
    let outlet = CellKey::new(GROUND, TilePos::new(width - 1, rows * 2 - 2));
    sim.set_volume(&grid, outlet, 0);
    (sim, grid, CellKey::new(GROUND, TilePos::new(0, 0)))
}

fn benchmark_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("pressure_search");
    for len in [64, 256, 1024] {
        group.bench_function(format!("corridor_{len}"), |b| {
            b.iter_batched(
                || saturated_corridor(len),
                |(mut sim, grid, source)| black_box(sim.try_propagate(&grid, source)),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn benchmark_splash(c: &mut Criterion) {
    let mut grid = MemoryGrid::new();
    grid.add_layer(LayerInfo::new(GROUND, 64, 64, 1, 0));

    c.bench_function("splash_64_units", |b| {
        b.iter_batched(
            || FluidSimulation::new(FlowConfig::default()).unwrap(),
            |mut sim| black_box(sim.try_splash_distribute(&grid, CellKey::new(GROUND, TilePos::new(32, 32)), 64)),
            BatchSize::SmallInput,
        );
    });
}

fn benchmark_equalizer(c: &mut Criterion) {
    let mut grid = MemoryGrid::new();
    grid.add_layer(LayerInfo::new(GROUND, 16, 16, 1, 0));

    c.bench_function("equalize_256_cells", |b| {
        b.iter_batched(
            || {
                let mut sim = FluidSimulation::new(FlowConfig::default()).unwrap();
                for z in 0..16 {
                    for x in 0..16 {
                        let v = u8::try_from((x + z) % 7 + 1).unwrap_or(1);
                        sim.set_volume(&grid, CellKey::new(GROUND, TilePos::new(x, z)), v);
                    }
                }
                sim
            },
            |mut sim| black_box(sim.equalize_layer(&grid, GROUND)),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, benchmark_pressure, benchmark_splash, benchmark_equalizer);
criterion_main!(benches);
