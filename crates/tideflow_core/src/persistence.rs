//! # Snapshot Persistence
//!
//! Saves the per-cell state a host needs to resume a world: volume,
//! stability counter, deregistered flag, source flag and the two schedule
//! countdowns, plus the ids of every loaded layer (including empty ones).
//! The active set is not saved; restoring re-registers every live
//! non-stable cell.
//!
//! ## Format
//!
//! ```text
//! ┌────────┬─────────┬──────┬───────┬────────┬───────┬───────────┬──────────────────────────┐
//! │ "TDFL" │ version │ tick │ count │ layers │ crc32 │ layer ids │ lz4(size ++ CellRecord*) │
//! │  4 B   │  u32    │ u64  │  u32  │  u32   │  u32  │ u32 each  │                          │
//! └────────┴─────────┴──────┴───────┴────────┴───────┴───────────┴──────────────────────────┘
//! ```
//!
//! The checksum covers the layer ids and the uncompressed record bytes.
//! Header integers and layer ids are little-endian; records are native
//! `Pod` layout.

use bytemuck::{Pod, Zeroable};
use tideflow_shared::{CellKey, LayerId, TilePos};
use tracing::info;

use crate::cell::Cell;
use crate::error::{FlowError, FlowResult};
use crate::world::FlowWorld;

/// Leading bytes of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"TDFL";
/// Current format version.
pub const SNAPSHOT_VERSION: u32 = 2;
/// Size of the fixed header.
pub const HEADER_LEN: usize = 28;
/// Size of one record.
pub const RECORD_SIZE: usize = std::mem::size_of::<CellRecord>();

const FLAG_DEREGISTERED: u8 = 1 << 0;
const FLAG_SOURCE: u8 = 1 << 1;

/// Persisted state of one cell.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CellRecord {
    /// Layer id.
    pub layer: u32,
    /// Tile X.
    pub x: i32,
    /// Tile Z.
    pub z: i32,
    /// Consecutive no-op attempts.
    pub stability: u16,
    /// Volume (1..=MAX_VOLUME).
    pub volume: u8,
    /// Bit 0: deregistered. Bit 1: source.
    pub flags: u8,
    /// Ticks until the next local check, relative to the snapshot tick.
    pub check_countdown: u64,
    /// Ticks until the next evaporation, relative to the snapshot tick.
    pub evaporation_countdown: u64,
}

const _: () = assert!(std::mem::size_of::<CellRecord>() == 32);

impl CellRecord {
    fn capture(key: CellKey, cell: &Cell, tick: u64) -> Self {
        let mut flags = 0;
        if cell.is_stable() {
            flags |= FLAG_DEREGISTERED;
        }
        if cell.is_source() {
            flags |= FLAG_SOURCE;
        }
        Self {
            layer: key.layer.get(),
            x: key.pos.x,
            z: key.pos.z,
            stability: cell.stability_counter(),
            volume: cell.volume(),
            flags,
            check_countdown: cell.next_local_check_tick().saturating_sub(tick),
            evaporation_countdown: cell.next_evaporation_tick().saturating_sub(tick),
        }
    }

    /// Cell key of the record.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> CellKey {
        CellKey::new(LayerId::new(self.layer), TilePos::new(self.x, self.z))
    }

    fn to_cell(self, tick: u64) -> Cell {
        let mut cell = Cell::new(
            self.volume,
            tick.saturating_add(self.check_countdown),
            tick.saturating_add(self.evaporation_countdown),
        );
        cell.stability = self.stability;
        cell.deregistered = self.flags & FLAG_DEREGISTERED != 0;
        cell.is_source = self.flags & FLAG_SOURCE != 0;
        cell
    }
}

/// Point-in-time copy of every live cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowSnapshot {
    /// Tick the snapshot was taken at.
    pub tick: u64,
    /// Every loaded layer, in id order.
    pub layers: Vec<LayerId>,
    /// Cell records in layer, chunk, position order.
    pub records: Vec<CellRecord>,
}

impl FlowSnapshot {
    /// Captures `world`.
    #[must_use]
    pub fn capture(world: &FlowWorld) -> Self {
        let tick = world.tick();
        let mut records = Vec::with_capacity(world.live_cell_count());
        for layer in world.layers() {
            let index = layer.index();
            for pos in index.positions() {
                if let Some(cell) = index.get(pos) {
                    records.push(CellRecord::capture(CellKey::new(layer.id(), pos), cell, tick));
                }
            }
        }
        Self {
            tick,
            layers: world.layer_ids().collect(),
            records,
        }
    }

    /// Replaces the contents of `world` with this snapshot.
    ///
    /// Records with zero volume are ignored. The active set is rebuilt from
    /// the restored flags.
    pub fn restore_into(&self, world: &mut FlowWorld) {
        world.reset(self.tick);
        for id in &self.layers {
            world.ensure_layer(*id);
        }
        for record in &self.records {
            if record.volume == 0 {
                continue;
            }
            let key = record.key();
            world
                .ensure_layer(key.layer)
                .index
                .insert(key.pos, record.to_cell(self.tick));
        }
        world.rebuild_active_set();
        info!(
            tick = self.tick,
            cells = world.live_cell_count(),
            active = world.active_cell_count(),
            "flow snapshot restored"
        );
    }

    /// Serializes to the on-disk format.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let raw: &[u8] = bytemuck::cast_slice(&self.records);
        let layer_bytes: Vec<u8> = self.layers.iter().flat_map(|id| id.get().to_le_bytes()).collect();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&layer_bytes);
        hasher.update(raw);
        let crc = hasher.finalize();
        let payload = lz4_flex::compress_prepend_size(raw);
        let count = u32::try_from(self.records.len()).unwrap_or(u32::MAX);
        let layers = u32::try_from(self.layers.len()).unwrap_or(u32::MAX);

        let mut out = Vec::with_capacity(HEADER_LEN + layer_bytes.len() + payload.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&self.tick.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&layers.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&layer_bytes);
        out.extend_from_slice(&payload);
        out
    }

    /// Parses the on-disk format.
    ///
    /// # Errors
    ///
    /// - [`FlowError::SnapshotCorrupt`] for a bad magic, truncated input,
    ///   undecodable payload, or a record count that does not match the
    ///   payload size (checked before decompressing)
    /// - [`FlowError::SnapshotVersion`] for an unknown version
    /// - [`FlowError::SnapshotChecksum`] when the payload fails its CRC
    pub fn decode(bytes: &[u8]) -> FlowResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(corrupt("truncated header"));
        }
        let (header, payload) = bytes.split_at(HEADER_LEN);
        if read_array::<4>(header, 0)? != SNAPSHOT_MAGIC {
            return Err(corrupt("bad magic"));
        }
        let version = u32::from_le_bytes(read_array(header, 4)?);
        if version != SNAPSHOT_VERSION {
            return Err(FlowError::SnapshotVersion(version));
        }
        let tick = u64::from_le_bytes(read_array(header, 8)?);
        let count = u32::from_le_bytes(read_array(header, 16)?);
        let layer_count = u32::from_le_bytes(read_array(header, 20)?);
        let expected = u32::from_le_bytes(read_array(header, 24)?);

        let layer_len = usize::try_from(layer_count)
            .ok()
            .and_then(|n| n.checked_mul(4))
            .filter(|len| *len <= payload.len())
            .ok_or_else(|| corrupt("layer table exceeds input"))?;
        let (layer_bytes, payload) = payload.split_at(layer_len);

        let raw_len = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(RECORD_SIZE))
            .ok_or_else(|| corrupt("record count overflows"))?;
        let prefix = u32::from_le_bytes(read_array(payload, 0)?);
        if usize::try_from(prefix).ok() != Some(raw_len) {
            return Err(corrupt("record count does not match payload size"));
        }

        let raw = lz4_flex::decompress_size_prepended(payload).map_err(|e| corrupt(&e.to_string()))?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(layer_bytes);
        hasher.update(&raw);
        let actual = hasher.finalize();
        if actual != expected {
            return Err(FlowError::SnapshotChecksum { expected, actual });
        }
        if raw.len() != raw_len {
            return Err(corrupt("record count does not match payload size"));
        }

        let layers = layer_bytes
            .chunks_exact(4)
            .map(|b| LayerId::new(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            .collect();

        let records = raw
            .chunks_exact(RECORD_SIZE)
            .map(bytemuck::pod_read_unaligned::<CellRecord>)
            .collect();
        Ok(Self { tick, layers, records })
    }
}

fn read_array<const N: usize>(bytes: &[u8], at: usize) -> FlowResult<[u8; N]> {
    bytes
        .get(at..at + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| corrupt("truncated input"))
}

fn corrupt(message: &str) -> FlowError {
    FlowError::SnapshotCorrupt(message.to_owned())
}
