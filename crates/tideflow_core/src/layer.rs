//! Per-layer engine state: the spatial index plus the derived active set.

use std::collections::{BTreeMap, BTreeSet};

use tideflow_shared::{ChunkCoord, LayerId, TilePos};

use crate::index::SpatialIndex;

/// Cells currently eligible for processing, with per-chunk active counts.
///
/// Derived data: it can always be rebuilt from the cells whose
/// `deregistered` flag is clear.
#[derive(Clone, Debug, Default)]
pub struct ActiveSet {
    cells: BTreeSet<TilePos>,
    chunks: BTreeMap<ChunkCoord, u32>,
}

impl ActiveSet {
    /// Registers a position. Returns `true` if it was not already active.
    pub fn insert(&mut self, pos: TilePos, chunk: ChunkCoord) -> bool {
        if !self.cells.insert(pos) {
            return false;
        }
        *self.chunks.entry(chunk).or_insert(0) += 1;
        true
    }

    /// Unregisters a position. Returns `true` if it was active.
    pub fn remove(&mut self, pos: TilePos, chunk: ChunkCoord) -> bool {
        if !self.cells.remove(&pos) {
            return false;
        }
        if let Some(count) = self.chunks.get_mut(&chunk) {
            *count -= 1;
            if *count == 0 {
                self.chunks.remove(&chunk);
            }
        }
        true
    }

    /// Whether `pos` is active.
    #[inline]
    #[must_use]
    pub fn contains(&self, pos: TilePos) -> bool {
        self.cells.contains(&pos)
    }

    /// Active cell count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether nothing is active.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Active positions in order.
    pub fn cells(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.cells.iter().copied()
    }

    /// Chunks holding at least one active cell, in order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        self.chunks.keys().copied()
    }

    /// Active chunks with their active-cell counts.
    pub fn chunk_loads(&self) -> impl Iterator<Item = (ChunkCoord, u32)> + '_ {
        self.chunks.iter().map(|(chunk, count)| (*chunk, *count))
    }

    /// Number of active chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.chunks.clear();
    }
}

/// One layer of the simulated world.
#[derive(Clone, Debug)]
pub struct FlowLayer {
    id: LayerId,
    pub(crate) index: SpatialIndex,
    pub(crate) active: ActiveSet,
    pub(crate) evaporation_cursor: Option<ChunkCoord>,
}

impl FlowLayer {
    /// Creates an empty layer.
    #[must_use]
    pub fn new(id: LayerId, chunk_size: i32) -> Self {
        Self {
            id,
            index: SpatialIndex::new(chunk_size),
            active: ActiveSet::default(),
            evaporation_cursor: None,
        }
    }

    /// Layer id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> LayerId {
        self.id
    }

    /// The layer's cells.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// The layer's active set.
    #[inline]
    #[must_use]
    pub const fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Registers `pos` as active if a cell lives there.
    pub(crate) fn mark_active(&mut self, pos: TilePos) -> bool {
        if !self.index.contains(pos) {
            return false;
        }
        let chunk = self.index.chunk_of(pos);
        self.active.insert(pos, chunk)
    }

    /// Removes `pos` from the active set.
    pub(crate) fn mark_inactive(&mut self, pos: TilePos) -> bool {
        let chunk = self.index.chunk_of(pos);
        self.active.remove(pos, chunk)
    }

    /// Rebuilds the active set from the cells' `deregistered` flags.
    pub(crate) fn rebuild_active(&mut self) {
        self.active.clear();
        let chunk_size = self.index.chunk_size();
        for (pos, cell) in self.index.cells() {
            if !cell.is_stable() {
                self.active.insert(pos, ChunkCoord::from_tile(pos, chunk_size));
            }
        }
    }

    /// Sum of all volume on the layer.
    #[must_use]
    pub fn total_volume(&self) -> u64 {
        self.index.cells().map(|(_, cell)| u64::from(cell.volume())).sum()
    }
}
