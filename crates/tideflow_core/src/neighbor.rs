//! # Neighbor Classification
//!
//! The one place that decides whether a neighbor of a cell is an ordinary
//! same-layer tile, a cross-layer portal target, or blocked. Diffusion,
//! pressure/splash search, the equalizer and activation all walk neighbors
//! through [`classify_neighbors`], so gravity and gate semantics cannot drift
//! between algorithms.
//!
//! Order: the four cardinals in [`Direction::CARDINALS`] order, then the
//! downward link, then the upward link.

use tideflow_shared::{CellKey, Direction};

use crate::host::{is_open, HostGrid, PortalKind, VerticalDir};
use crate::portal::PortalLinkage;

/// Classification of one neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Neighbor {
    /// Same-layer tile fluid may occupy.
    Open(CellKey),
    /// Tile on another layer reached through a vertical opening.
    Portal {
        /// Destination cell.
        target: CellKey,
        /// Opening kind.
        kind: PortalKind,
        /// Direction of travel.
        direction: VerticalDir,
    },
    /// Wall, structure, out of bounds, or an opening with nothing behind it.
    Blocked,
}

impl Neighbor {
    /// Destination cell, unless blocked.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> Option<CellKey> {
        match *self {
            Self::Open(target) | Self::Portal { target, .. } => Some(target),
            Self::Blocked => None,
        }
    }

    /// Whether this is the downward gravity link.
    #[inline]
    #[must_use]
    pub const fn is_gravity(&self) -> bool {
        matches!(
            self,
            Self::Portal {
                kind: PortalKind::Gravity,
                direction: VerticalDir::Down,
                ..
            }
        )
    }

    /// Whether a cell holding `source_volume` may push through this link.
    ///
    /// Only upward pressure-gated links have a gate; capacity at the far
    /// end is checked by whoever moves the volume.
    #[inline]
    #[must_use]
    pub const fn passes_gate(&self, source_volume: u8) -> bool {
        match *self {
            Self::Open(_) => true,
            Self::Portal {
                kind: PortalKind::PressureGated { threshold },
                direction: VerticalDir::Up,
                ..
            } => source_volume >= threshold,
            Self::Portal { .. } => true,
            Self::Blocked => false,
        }
    }
}

/// Up to six classified neighbors of one cell.
#[derive(Clone, Copy, Debug)]
pub struct Neighbors {
    items: [Neighbor; 6],
    len: usize,
}

impl Neighbors {
    const fn empty() -> Self {
        Self {
            items: [Neighbor::Blocked; 6],
            len: 0,
        }
    }

    fn push(&mut self, neighbor: Neighbor) {
        if let Some(slot) = self.items.get_mut(self.len) {
            *slot = neighbor;
            self.len += 1;
        }
    }

    /// Classified neighbors in walk order.
    pub fn iter(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.items.iter().take(self.len).copied()
    }

    /// The four same-layer entries.
    pub fn cardinals(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.iter().take(Direction::CARDINALS.len())
    }

    /// Destination of the downward gravity link, if the cell sits on one.
    #[must_use]
    pub fn gravity_target(&self) -> Option<CellKey> {
        self.iter().find(Neighbor::is_gravity).and_then(|n| n.target())
    }
}

/// Classifies every neighbor of `key`.
pub fn classify_neighbors(
    host: &dyn HostGrid,
    portals: &mut PortalLinkage,
    key: CellKey,
    tick: u64,
) -> Neighbors {
    let mut out = Neighbors::empty();

    for dir in Direction::CARDINALS {
        let target = key.step(dir);
        out.push(if is_open(host, target.layer, target.pos) {
            Neighbor::Open(target)
        } else {
            Neighbor::Blocked
        });
    }

    let own = host.portal_at(key.layer, key.pos);

    // Down: our own floor opening, or the far end of a standpipe from below.
    if let Some(lower) = portals.resolve_lower(host, key.layer, tick) {
        let kind = match own {
            Some(PortalKind::Gravity) => Some(PortalKind::Gravity),
            _ => match host.portal_at(lower, key.pos) {
                Some(gated @ PortalKind::PressureGated { .. }) => Some(gated),
                _ => None,
            },
        };
        if let Some(kind) = kind {
            out.push(vertical(host, key.on_layer(lower), kind, VerticalDir::Down));
        }
    }

    // Up: only through our own standpipe.
    if let Some(gated @ PortalKind::PressureGated { .. }) = own {
        if let Some(upper) = portals.resolve_upper(host, key.layer, tick) {
            out.push(vertical(host, key.on_layer(upper), gated, VerticalDir::Up));
        }
    }

    out
}

fn vertical(host: &dyn HostGrid, target: CellKey, kind: PortalKind, direction: VerticalDir) -> Neighbor {
    if is_open(host, target.layer, target.pos) {
        Neighbor::Portal {
            target,
            kind,
            direction,
        }
    } else {
        Neighbor::Blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;
    use crate::host::{LayerInfo, MemoryGrid};
    use tideflow_shared::{LayerId, TilePos};

    const LOWER: LayerId = LayerId(0);
    const UPPER: LayerId = LayerId(1);

    fn two_floors() -> MemoryGrid {
        let mut grid = MemoryGrid::new();
        grid.add_layer(LayerInfo::new(LOWER, 6, 6, 5, 0));
        grid.add_layer(LayerInfo::new(UPPER, 6, 6, 5, 1));
        grid
    }

    #[test]
    fn test_cardinals_blocked_by_walls_and_bounds() {
        let mut grid = two_floors();
        grid.set_wall(LOWER, TilePos::new(1, 0), true);
        let mut portals = PortalLinkage::new(&PortalConfig::default());

        let n = classify_neighbors(&grid, &mut portals, CellKey::new(LOWER, TilePos::new(0, 0)), 0);
        let all: Vec<_> = n.iter().collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0], Neighbor::Blocked); // east wall
        assert_eq!(all[1], Neighbor::Blocked); // west out of bounds
        assert_eq!(all[2], Neighbor::Open(CellKey::new(LOWER, TilePos::new(0, 1))));
        assert_eq!(all[3], Neighbor::Blocked); // north out of bounds
        assert!(n.gravity_target().is_none());
    }

    #[test]
    fn test_gravity_portal_links_down() {
        let mut grid = two_floors();
        let hole = TilePos::new(2, 2);
        grid.set_portal(UPPER, hole, Some(PortalKind::Gravity));
        let mut portals = PortalLinkage::new(&PortalConfig::default());

        let n = classify_neighbors(&grid, &mut portals, CellKey::new(UPPER, hole), 0);
        assert_eq!(n.gravity_target(), Some(CellKey::new(LOWER, hole)));

        // Nothing leads back up through a floor opening.
        let below = classify_neighbors(&grid, &mut portals, CellKey::new(LOWER, hole), 0);
        assert_eq!(below.iter().count(), 4);
    }

    #[test]
    fn test_pressure_gated_standpipe_is_bidirectional() {
        let mut grid = two_floors();
        let pipe = TilePos::new(3, 3);
        grid.set_portal(LOWER, pipe, Some(PortalKind::PressureGated { threshold: 6 }));
        let mut portals = PortalLinkage::new(&PortalConfig::default());

        let up = classify_neighbors(&grid, &mut portals, CellKey::new(LOWER, pipe), 0);
        let link = up.iter().nth(4).unwrap();
        assert_eq!(link.target(), Some(CellKey::new(UPPER, pipe)));
        assert!(!link.passes_gate(5));
        assert!(link.passes_gate(6));
        assert!(!link.is_gravity());

        let down = classify_neighbors(&grid, &mut portals, CellKey::new(UPPER, pipe), 0);
        let link = down.iter().nth(4).unwrap();
        assert_eq!(link.target(), Some(CellKey::new(LOWER, pipe)));
        assert!(link.passes_gate(1));
        assert!(down.gravity_target().is_none());
    }

    #[test]
    fn test_portal_onto_wall_is_blocked() {
        let mut grid = two_floors();
        let hole = TilePos::new(1, 1);
        grid.set_portal(UPPER, hole, Some(PortalKind::Gravity));
        grid.set_wall(LOWER, hole, true);
        let mut portals = PortalLinkage::new(&PortalConfig::default());

        let n = classify_neighbors(&grid, &mut portals, CellKey::new(UPPER, hole), 0);
        assert_eq!(n.iter().nth(4), Some(Neighbor::Blocked));
        assert!(n.gravity_target().is_none());
    }
}
