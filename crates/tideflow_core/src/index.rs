//! # Spatial Index
//!
//! Per-layer cell storage organized for sparse processing:
//! - `cells`: O(1) position → cell lookup
//! - `chunks`: chunk → occupied positions, ordered for deterministic walks
//!
//! A chunk exists in the index exactly while its occupied set is non-empty.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tideflow_shared::{ChunkCoord, TilePos};

use crate::cell::Cell;

/// Chunked index of the live cells of one layer.
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    chunk_size: i32,
    cells: HashMap<TilePos, Cell>,
    chunks: BTreeMap<ChunkCoord, BTreeSet<TilePos>>,
}

impl SpatialIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(chunk_size: i32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            cells: HashMap::new(),
            chunks: BTreeMap::new(),
        }
    }

    /// Chunk edge length in tiles.
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// Chunk containing `pos`.
    #[inline]
    #[must_use]
    pub const fn chunk_of(&self, pos: TilePos) -> ChunkCoord {
        ChunkCoord::from_tile(pos, self.chunk_size)
    }

    /// Number of live cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the layer holds no cells.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Looks up a cell.
    #[inline]
    #[must_use]
    pub fn get(&self, pos: TilePos) -> Option<&Cell> {
        self.cells.get(&pos)
    }

    /// Looks up a cell mutably.
    #[inline]
    pub fn get_mut(&mut self, pos: TilePos) -> Option<&mut Cell> {
        self.cells.get_mut(&pos)
    }

    /// Whether a cell exists at `pos`.
    #[inline]
    #[must_use]
    pub fn contains(&self, pos: TilePos) -> bool {
        self.cells.contains_key(&pos)
    }

    /// Inserts or replaces a cell, registering its chunk occupancy.
    pub fn insert(&mut self, pos: TilePos, cell: Cell) -> Option<Cell> {
        let chunk = self.chunk_of(pos);
        self.chunks.entry(chunk).or_default().insert(pos);
        self.cells.insert(pos, cell)
    }

    /// Removes a cell, dropping its chunk once the chunk is empty.
    pub fn remove(&mut self, pos: TilePos) -> Option<Cell> {
        let cell = self.cells.remove(&pos)?;
        let chunk = self.chunk_of(pos);
        if let Some(occupied) = self.chunks.get_mut(&chunk) {
            occupied.remove(&pos);
            if occupied.is_empty() {
                self.chunks.remove(&chunk);
            }
        }
        Some(cell)
    }

    /// Drops every cell.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.chunks.clear();
    }

    /// Number of occupied chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Occupied chunks in coordinate order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Occupied positions of one chunk in position order.
    pub fn cells_in(&self, chunk: ChunkCoord) -> impl Iterator<Item = TilePos> + '_ {
        self.chunks.get(&chunk).into_iter().flatten().copied()
    }

    /// Every occupied position, chunk by chunk.
    pub fn positions(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.chunks.values().flatten().copied()
    }

    /// Every live cell (unordered).
    pub fn cells(&self) -> impl Iterator<Item = (TilePos, &Cell)> + '_ {
        self.cells.iter().map(|(pos, cell)| (*pos, cell))
    }

    /// Every live cell mutably (unordered).
    pub fn cells_mut(&mut self) -> impl Iterator<Item = (TilePos, &mut Cell)> + '_ {
        self.cells.iter_mut().map(|(pos, cell)| (*pos, cell))
    }

    /// Occupied positions within Manhattan `radius` of `center`.
    pub fn positions_within(&self, center: TilePos, radius: u32) -> impl Iterator<Item = TilePos> + '_ {
        let r = i32::try_from(radius).unwrap_or(i32::MAX);
        let min = self.chunk_of(TilePos::new(center.x.saturating_sub(r), center.z.saturating_sub(r)));
        let max = self.chunk_of(TilePos::new(center.x.saturating_add(r), center.z.saturating_add(r)));
        self.chunks
            .range(ChunkCoord::new(min.x, i32::MIN)..=ChunkCoord::new(max.x, i32::MAX))
            .filter(move |(coord, _)| coord.z >= min.z && coord.z <= max.z)
            .flat_map(|(_, occupied)| occupied.iter().copied())
            .filter(move |pos| pos.manhattan(center) <= radius)
    }

    /// First occupied chunk strictly after `cursor`, wrapping to the start.
    #[must_use]
    pub fn next_chunk_after(&self, cursor: Option<ChunkCoord>) -> Option<ChunkCoord> {
        use std::ops::Bound::{Excluded, Unbounded};

        match cursor {
            Some(after) => self
                .chunks
                .range((Excluded(after), Unbounded))
                .next()
                .or_else(|| self.chunks.iter().next())
                .map(|(coord, _)| *coord),
            None => self.chunks.keys().next().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_lifecycle_follows_occupancy() {
        let mut index = SpatialIndex::new(8);
        let a = TilePos::new(1, 1);
        let b = TilePos::new(2, 1);

        index.insert(a, Cell::new(3, 0, 0));
        index.insert(b, Cell::new(3, 0, 0));
        assert_eq!(index.chunk_count(), 1);
        assert_eq!(index.cells_in(ChunkCoord::new(0, 0)).count(), 2);

        index.remove(a);
        assert_eq!(index.chunk_count(), 1);
        index.remove(b);
        assert_eq!(index.chunk_count(), 0);
        assert!(index.is_empty());
        assert!(index.remove(b).is_none());
    }

    #[test]
    fn test_positions_within_radius_spans_chunks() {
        let mut index = SpatialIndex::new(4);
        for x in -6..6 {
            index.insert(TilePos::new(x, 0), Cell::new(1, 0, 0));
        }
        index.insert(TilePos::new(0, 3), Cell::new(1, 0, 0));

        let mut found: Vec<_> = index.positions_within(TilePos::new(0, 0), 2).collect();
        found.sort();
        assert_eq!(
            found,
            vec![
                TilePos::new(-2, 0),
                TilePos::new(-1, 0),
                TilePos::new(0, 0),
                TilePos::new(1, 0),
                TilePos::new(2, 0),
            ]
        );
    }

    #[test]
    fn test_chunk_cursor_wraps() {
        let mut index = SpatialIndex::new(8);
        index.insert(TilePos::new(0, 0), Cell::new(1, 0, 0));
        index.insert(TilePos::new(20, 0), Cell::new(1, 0, 0));

        let first = index.next_chunk_after(None).unwrap();
        let second = index.next_chunk_after(Some(first)).unwrap();
        assert_ne!(first, second);
        assert_eq!(index.next_chunk_after(Some(second)), Some(first));
    }
}
