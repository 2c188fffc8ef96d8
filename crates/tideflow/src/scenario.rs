//! # Scenarios
//!
//! Ready-made host worlds and the actors that feed them.
//!
//! ```text
//!  HALL (level 0)                     CELLAR (level -1)
//!  ################                   ################
//!  #       #      #                   #   .          #
//!  #       #      #                   # P .  #       #
//!  #  S    #      #                   #      #       #
//!  #       #      #                   #      #       #
//!  #       #      #                   #      #       #
//!  #              #                   #      #       #
//!  #           v  #                   #      #    .  #
//!  #              #                   #      #       #
//!  ################                   ################
//!
//!  S spring   v stairwell (gravity)   P standpipe (pressure-gated, up)
//! ```

use tideflow_core::host::{LayerInfo, MemoryGrid, PortalKind};
use tideflow_core::FluidSimulation;
use tideflow_shared::{CellKey, LayerId, TilePos, MAX_VOLUME};

/// Basin width in tiles.
pub const BASIN_WIDTH: i32 = 16;
/// Basin depth in tiles.
pub const BASIN_HEIGHT: i32 = 10;

/// Two-floor test world and its landmarks.
#[derive(Clone, Debug)]
pub struct Basin {
    /// Host world.
    pub grid: MemoryGrid,
    /// Upper floor.
    pub hall: LayerId,
    /// Lower floor.
    pub cellar: LayerId,
    /// Where the spring pours.
    pub spring: CellKey,
    /// Floor opening in the hall.
    pub stairwell: TilePos,
    /// Standpipe from the cellar up into the hall.
    pub standpipe: TilePos,
}

/// Builds the two-floor basin.
#[must_use]
pub fn two_floor_basin() -> Basin {
    let cellar = LayerId::new(0);
    let hall = LayerId::new(1);
    let stairwell = TilePos::new(12, 7);
    let standpipe = TilePos::new(2, 2);
    let inner_max = TilePos::new(BASIN_WIDTH - 2, BASIN_HEIGHT - 2);

    let mut grid = MemoryGrid::new();
    grid.add_layer(LayerInfo::new(cellar, BASIN_WIDTH, BASIN_HEIGHT, 1, -1))
        .add_layer(LayerInfo::new(hall, BASIN_WIDTH, BASIN_HEIGHT, 1, 0))
        .link_layers(hall, cellar);

    grid.carve_room(hall, TilePos::new(1, 1), inner_max)
        .wall_rect(hall, TilePos::new(8, 1), TilePos::new(8, 5))
        .set_portal(hall, stairwell, Some(PortalKind::Gravity));

    grid.carve_room(cellar, TilePos::new(1, 1), inner_max)
        .wall_rect(cellar, TilePos::new(7, 2), TilePos::new(7, inner_max.z))
        .set_portal(
            cellar,
            standpipe,
            Some(PortalKind::PressureGated { threshold: MAX_VOLUME }),
        );

    Basin {
        grid,
        hall,
        cellar,
        spring: CellKey::new(hall, TilePos::new(3, 3)),
        stairwell,
        standpipe,
    }
}

/// Injector that adds a fixed amount each step for a limited time.
///
/// Overflow that does not fit into the spring cell is splashed around it.
#[derive(Clone, Debug)]
pub struct Spring {
    key: CellKey,
    rate: u8,
    remaining: u64,
    placed: u64,
    flagged: bool,
}

impl Spring {
    /// A spring at `key` pouring `rate` units per step for `steps` steps.
    #[must_use]
    pub const fn new(key: CellKey, rate: u8, steps: u64) -> Self {
        Self {
            key,
            rate,
            remaining: steps,
            placed: 0,
            flagged: false,
        }
    }

    /// Pours one step's worth. Returns the units placed.
    pub fn pour(&mut self, sim: &mut FluidSimulation, host: &MemoryGrid) -> u32 {
        if self.remaining == 0 {
            if self.flagged {
                sim.set_source(self.key, false);
                self.flagged = false;
            }
            return 0;
        }
        self.remaining -= 1;

        let applied = sim.add_volume(host, self.key, i32::from(self.rate));
        let applied = u32::try_from(applied).unwrap_or(0);
        let overflow = u32::from(self.rate).saturating_sub(applied);
        let splashed = if overflow > 0 {
            sim.try_splash_distribute(host, self.key, overflow)
        } else {
            0
        };

        if !self.flagged {
            self.flagged = sim.set_source(self.key, true);
        }
        let placed = applied + splashed;
        self.placed += u64::from(placed);
        placed
    }

    /// Total units placed so far.
    #[must_use]
    pub const fn placed(&self) -> u64 {
        self.placed
    }

    /// Whether the spring has stopped.
    #[must_use]
    pub const fn is_dry(&self) -> bool {
        self.remaining == 0
    }
}

/// Removes up to `rate` units per step from one tile.
#[derive(Clone, Debug)]
pub struct Drain {
    key: CellKey,
    rate: u8,
    removed: u64,
}

impl Drain {
    /// A drain at `key`.
    #[must_use]
    pub const fn new(key: CellKey, rate: u8) -> Self {
        Self {
            key,
            rate,
            removed: 0,
        }
    }

    /// Drains one step's worth. Returns the units removed.
    pub fn drain(&mut self, sim: &mut FluidSimulation, host: &MemoryGrid) -> u32 {
        let removed = sim.add_volume(host, self.key, -i32::from(self.rate));
        let removed = removed.unsigned_abs();
        self.removed += u64::from(removed);
        removed
    }

    /// Total units removed so far.
    #[must_use]
    pub const fn removed(&self) -> u64 {
        self.removed
    }
}
