//! # Tideflow Shared
//!
//! Common types used by the engine, its driver and host integrations.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER contain simulation logic. It only describes
//! *where* things are (layers, tiles, chunks) and *what happened* (events).

pub mod constants;
pub mod events;
pub mod math;

pub use constants::{DEFAULT_CHUNK_SIZE, MAX_VOLUME, MIN_VOLUME};
pub use events::{EventBus, EventReceiver, EventSender, FlowEvent};
pub use math::{CellKey, ChunkCoord, Direction, LayerId, TilePos};
