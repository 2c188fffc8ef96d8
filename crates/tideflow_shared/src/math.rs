//! Grid coordinate types shared between engine and host.
//!
//! These are the canonical representations used in events and snapshots.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CHUNK_SIZE;

/// Stable identifier of a layer (one floor/level of the host world).
///
/// Layers are referenced by id, never by pointer, so a torn-down layer
/// cannot leave dangling state behind.
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct LayerId(pub u32);

impl LayerId {
    /// Creates a layer id.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Cardinal direction on a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// +X
    East,
    /// -X
    West,
    /// +Z
    South,
    /// -Z
    North,
}

impl Direction {
    /// Enumeration order used by every neighbor walk. BFS tie-breaks follow it.
    pub const CARDINALS: [Self; 4] = [Self::East, Self::West, Self::South, Self::North];

    /// Unit offset `(dx, dz)`.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::East => (1, 0),
            Self::West => (-1, 0),
            Self::South => (0, 1),
            Self::North => (0, -1),
        }
    }

    /// The opposite direction.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::East => Self::West,
            Self::West => Self::East,
            Self::South => Self::North,
            Self::North => Self::South,
        }
    }
}

/// Tile position on a layer.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct TilePos {
    /// X coordinate (tiles).
    pub x: i32,
    /// Z coordinate (tiles).
    pub z: i32,
}

impl TilePos {
    /// Creates a tile position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Position one step in `dir`.
    #[inline]
    #[must_use]
    pub const fn step(self, dir: Direction) -> Self {
        let (dx, dz) = dir.offset();
        Self::new(self.x + dx, self.z + dz)
    }

    /// The four cardinal neighbors in [`Direction::CARDINALS`] order.
    #[inline]
    #[must_use]
    pub const fn cardinals(self) -> [Self; 4] {
        [
            self.step(Direction::East),
            self.step(Direction::West),
            self.step(Direction::South),
            self.step(Direction::North),
        ]
    }

    /// Manhattan distance to another position.
    #[inline]
    #[must_use]
    pub const fn manhattan(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.z.abs_diff(other.z)
    }
}

/// Chunk coordinate (identifies a chunk of a layer's grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not tiles).
    pub x: i32,
    /// Z coordinate (in chunks, not tiles).
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing `pos` for a given chunk edge length.
    #[inline]
    #[must_use]
    pub const fn from_tile(pos: TilePos, chunk_size: i32) -> Self {
        Self {
            x: pos.x.div_euclid(chunk_size),
            z: pos.z.div_euclid(chunk_size),
        }
    }

    /// Chunk containing `pos` using [`DEFAULT_CHUNK_SIZE`].
    #[inline]
    #[must_use]
    pub const fn from_tile_default(pos: TilePos) -> Self {
        Self::from_tile(pos, DEFAULT_CHUNK_SIZE)
    }

    /// Checkerboard parity (0 or 1).
    #[inline]
    #[must_use]
    pub const fn parity(self) -> u64 {
        (self.x + self.z).rem_euclid(2) as u64
    }

    /// Tile position of the chunk's origin corner.
    #[inline]
    #[must_use]
    pub const fn origin(self, chunk_size: i32) -> TilePos {
        TilePos::new(self.x * chunk_size, self.z * chunk_size)
    }
}

/// Identity of a cell: the layer it lives on and its tile position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellKey {
    /// Owning layer.
    pub layer: LayerId,
    /// Tile position on the layer.
    pub pos: TilePos,
}

impl CellKey {
    /// Creates a cell key.
    #[inline]
    #[must_use]
    pub const fn new(layer: LayerId, pos: TilePos) -> Self {
        Self { layer, pos }
    }

    /// Same-layer neighbor in `dir`.
    #[inline]
    #[must_use]
    pub const fn step(self, dir: Direction) -> Self {
        Self::new(self.layer, self.pos.step(dir))
    }

    /// Same position on another layer.
    #[inline]
    #[must_use]
    pub const fn on_layer(self, layer: LayerId) -> Self {
        Self::new(layer, self.pos)
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@({}, {})", self.layer, self.pos.x, self.pos.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_coord_from_tile() {
        assert_eq!(ChunkCoord::from_tile(TilePos::new(0, 0), 8), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_tile(TilePos::new(7, 7), 8), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_tile(TilePos::new(8, 8), 8), ChunkCoord::new(1, 1));
        assert_eq!(ChunkCoord::from_tile(TilePos::new(-1, -1), 8), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_tile(TilePos::new(-8, -9), 8), ChunkCoord::new(-1, -2));
    }

    #[test]
    fn test_checkerboard_parity() {
        assert_eq!(ChunkCoord::new(0, 0).parity(), 0);
        assert_eq!(ChunkCoord::new(1, 0).parity(), 1);
        assert_eq!(ChunkCoord::new(-1, 0).parity(), 1);
        assert_eq!(ChunkCoord::new(-1, -1).parity(), 0);
    }

    #[test]
    fn test_cardinals_follow_direction_order() {
        let origin = TilePos::new(3, 3);
        let cardinals = origin.cardinals();
        for (dir, pos) in Direction::CARDINALS.iter().zip(cardinals) {
            assert_eq!(origin.step(*dir), pos);
            assert_eq!(pos.step(dir.opposite()), origin);
        }
        assert_eq!(origin.manhattan(TilePos::new(0, 5)), 5);
    }
}
