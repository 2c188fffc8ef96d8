//! # Host Grid Interface
//!
//! The engine does not own terrain. Everything it needs to know about walls,
//! structures, layers and vertical openings comes through [`HostGrid`].
//!
//! [`MemoryGrid`] is a complete in-memory host used by tests, benches and
//! the headless driver.

use std::collections::{BTreeMap, HashMap, HashSet};

use tideflow_shared::{LayerId, TilePos};

/// Metadata of a host layer, used by portal linkage heuristics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer id.
    pub id: LayerId,
    /// Width in tiles (X extent).
    pub width: i32,
    /// Height in tiles (Z extent).
    pub height: i32,
    /// Identifier of the world location the layer belongs to.
    pub origin: u64,
    /// Level ordinal; larger is higher.
    pub level: i32,
}

impl LayerInfo {
    /// Creates layer metadata.
    #[must_use]
    pub const fn new(id: LayerId, width: i32, height: i32, origin: u64, level: i32) -> Self {
        Self {
            id,
            width,
            height,
            origin,
            level,
        }
    }

    /// Whether `pos` lies inside the layer bounds.
    #[inline]
    #[must_use]
    pub const fn contains(&self, pos: TilePos) -> bool {
        pos.x >= 0 && pos.z >= 0 && pos.x < self.width && pos.z < self.height
    }

    /// Whether two layers describe the same footprint of the same location.
    #[inline]
    #[must_use]
    pub const fn same_footprint(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.origin == other.origin
    }
}

/// Vertical direction between layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerticalDir {
    /// Toward the next lower layer.
    Down,
    /// Toward the next upper layer.
    Up,
}

/// Kind of vertical opening at a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortalKind {
    /// Opening in the floor: volume always falls to the same tile below.
    Gravity,
    /// Standpipe to the same tile above, open only while the source holds
    /// at least `threshold` units and the destination has room.
    PressureGated {
        /// Minimum source volume for upward flow.
        threshold: u8,
    },
}

/// Queries the engine makes against the host world.
pub trait HostGrid {
    /// Whether fluid may occupy `pos` on `layer` (terrain-wise).
    fn is_passable(&self, layer: LayerId, pos: TilePos) -> bool;

    /// Whether a solid structure (wall, closed gate) occupies `pos`.
    fn has_blocking_structure(&self, _layer: LayerId, _pos: TilePos) -> bool {
        false
    }

    /// Every currently loaded layer.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Vertical opening at `pos`, if any.
    fn portal_at(&self, layer: LayerId, pos: TilePos) -> Option<PortalKind>;

    /// Explicit layer linkage, when the host knows it.
    ///
    /// `None` lets the engine fall back to footprint/level matching.
    fn linked_layer(&self, _layer: LayerId, _dir: VerticalDir) -> Option<LayerId> {
        None
    }
}

/// Returns `true` when fluid can sit at `pos`.
#[inline]
#[must_use]
pub fn is_open(host: &dyn HostGrid, layer: LayerId, pos: TilePos) -> bool {
    host.is_passable(layer, pos) && !host.has_blocking_structure(layer, pos)
}

#[derive(Clone, Debug)]
struct MemoryLayer {
    info: LayerInfo,
    walls: HashSet<TilePos>,
    structures: HashSet<TilePos>,
    portals: HashMap<TilePos, PortalKind>,
    links: HashMap<VerticalDir, LayerId>,
}

/// In-memory host world.
///
/// # Example
///
/// ```rust
/// use tideflow_core::host::{HostGrid, LayerInfo, MemoryGrid};
/// use tideflow_shared::{LayerId, TilePos};
///
/// let ground = LayerId::new(0);
/// let mut grid = MemoryGrid::new();
/// grid.add_layer(LayerInfo::new(ground, 16, 16, 1, 0));
/// grid.set_wall(ground, TilePos::new(3, 3), true);
///
/// assert!(!grid.is_passable(ground, TilePos::new(3, 3)));
/// assert!(grid.is_passable(ground, TilePos::new(4, 3)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryGrid {
    layers: BTreeMap<LayerId, MemoryLayer>,
}

impl MemoryGrid {
    /// Creates a host with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a layer.
    pub fn add_layer(&mut self, info: LayerInfo) -> &mut Self {
        self.layers.insert(
            info.id,
            MemoryLayer {
                info,
                walls: HashSet::new(),
                structures: HashSet::new(),
                portals: HashMap::new(),
                links: HashMap::new(),
            },
        );
        self
    }

    /// Removes a layer.
    pub fn remove_layer(&mut self, layer: LayerId) -> bool {
        self.layers.remove(&layer).is_some()
    }

    /// Metadata of a layer.
    #[must_use]
    pub fn layer_info(&self, layer: LayerId) -> Option<LayerInfo> {
        self.layers.get(&layer).map(|l| l.info)
    }

    /// Places or clears terrain wall.
    pub fn set_wall(&mut self, layer: LayerId, pos: TilePos, wall: bool) -> &mut Self {
        if let Some(l) = self.layers.get_mut(&layer) {
            if wall {
                l.walls.insert(pos);
            } else {
                l.walls.remove(&pos);
            }
        }
        self
    }

    /// Walls every tile of the rectangle `min..=max`.
    pub fn wall_rect(&mut self, layer: LayerId, min: TilePos, max: TilePos) -> &mut Self {
        for z in min.z..=max.z {
            for x in min.x..=max.x {
                self.set_wall(layer, TilePos::new(x, z), true);
            }
        }
        self
    }

    /// Walls everything except the rectangle `min..=max`.
    pub fn carve_room(&mut self, layer: LayerId, min: TilePos, max: TilePos) -> &mut Self {
        let Some(info) = self.layer_info(layer) else {
            return self;
        };
        for z in 0..info.height {
            for x in 0..info.width {
                let inside = x >= min.x && x <= max.x && z >= min.z && z <= max.z;
                self.set_wall(layer, TilePos::new(x, z), !inside);
            }
        }
        self
    }

    /// Places or removes a blocking structure.
    pub fn set_structure(&mut self, layer: LayerId, pos: TilePos, blocking: bool) -> &mut Self {
        if let Some(l) = self.layers.get_mut(&layer) {
            if blocking {
                l.structures.insert(pos);
            } else {
                l.structures.remove(&pos);
            }
        }
        self
    }

    /// Places or removes a vertical opening.
    pub fn set_portal(&mut self, layer: LayerId, pos: TilePos, kind: Option<PortalKind>) -> &mut Self {
        if let Some(l) = self.layers.get_mut(&layer) {
            match kind {
                Some(kind) => {
                    l.portals.insert(pos, kind);
                }
                None => {
                    l.portals.remove(&pos);
                }
            }
        }
        self
    }

    /// Declares an explicit `upper` → `lower` linkage.
    pub fn link_layers(&mut self, upper: LayerId, lower: LayerId) -> &mut Self {
        if let Some(l) = self.layers.get_mut(&upper) {
            l.links.insert(VerticalDir::Down, lower);
        }
        if let Some(l) = self.layers.get_mut(&lower) {
            l.links.insert(VerticalDir::Up, upper);
        }
        self
    }
}

impl HostGrid for MemoryGrid {
    fn is_passable(&self, layer: LayerId, pos: TilePos) -> bool {
        self.layers
            .get(&layer)
            .is_some_and(|l| l.info.contains(pos) && !l.walls.contains(&pos))
    }

    fn has_blocking_structure(&self, layer: LayerId, pos: TilePos) -> bool {
        self.layers
            .get(&layer)
            .is_some_and(|l| l.structures.contains(&pos))
    }

    fn layers(&self) -> Vec<LayerInfo> {
        self.layers.values().map(|l| l.info).collect()
    }

    fn portal_at(&self, layer: LayerId, pos: TilePos) -> Option<PortalKind> {
        self.layers.get(&layer)?.portals.get(&pos).copied()
    }

    fn linked_layer(&self, layer: LayerId, dir: VerticalDir) -> Option<LayerId> {
        self.layers.get(&layer)?.links.get(&dir).copied()
    }
}
