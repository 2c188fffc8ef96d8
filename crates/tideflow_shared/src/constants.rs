//! # Engine Constants
//!
//! **CRITICAL:** These values are part of the persisted snapshot format.
//! Changing `MAX_VOLUME` invalidates every saved world.

/// Maximum volume a single cell can hold.
pub const MAX_VOLUME: u8 = 7;

/// Smallest volume a live cell can hold. A cell at 0 does not exist.
pub const MIN_VOLUME: u8 = 1;

/// Default chunk edge length in tiles (chunks are square).
pub const DEFAULT_CHUNK_SIZE: i32 = 8;

/// Default capacity of the notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;
