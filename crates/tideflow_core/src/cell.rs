//! # Cell State
//!
//! Per-position volume and the timers of the processing state machine:
//!
//! ```text
//! Active ──(no change, stability++)──> Active ──(stability >= cap)──> Stable
//!   ^                                                                   │
//!   └────────────(neighbor change / terrain change / wave)──────────────┘
//! ```
//!
//! A cell only exists while it holds volume. Creation and destruction are
//! owned by [`crate::FlowWorld`], which keeps the spatial index and active
//! set in step with the cell map.

use tideflow_shared::{MAX_VOLUME, MIN_VOLUME};

/// Flow state of one occupied tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub(crate) volume: u8,
    pub(crate) stability: u16,
    pub(crate) deregistered: bool,
    pub(crate) is_source: bool,
    pub(crate) next_local_check_tick: u64,
    pub(crate) next_evaporation_tick: u64,
    pub(crate) pressure_cooldown_until: u64,
}

impl Cell {
    /// Creates an active cell.
    ///
    /// `volume` is clamped to `MIN_VOLUME..=MAX_VOLUME`.
    #[must_use]
    pub fn new(volume: u8, next_local_check_tick: u64, next_evaporation_tick: u64) -> Self {
        Self {
            volume: volume.clamp(MIN_VOLUME, MAX_VOLUME),
            stability: 0,
            deregistered: false,
            is_source: false,
            next_local_check_tick,
            next_evaporation_tick,
            pressure_cooldown_until: 0,
        }
    }

    /// Current volume.
    #[inline]
    #[must_use]
    pub const fn volume(&self) -> u8 {
        self.volume
    }

    /// Free capacity before the cell is saturated.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u8 {
        MAX_VOLUME - self.volume
    }

    /// Whether the cell holds `MAX_VOLUME`.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.volume >= MAX_VOLUME
    }

    /// Consecutive no-op processing attempts.
    #[inline]
    #[must_use]
    pub const fn stability_counter(&self) -> u16 {
        self.stability
    }

    /// Whether the cell has been excluded from processing.
    #[inline]
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        self.deregistered
    }

    /// Whether an external injector feeds this cell.
    #[inline]
    #[must_use]
    pub const fn is_source(&self) -> bool {
        self.is_source
    }

    /// Tick at or after which the scheduler may process the cell again.
    #[inline]
    #[must_use]
    pub const fn next_local_check_tick(&self) -> u64 {
        self.next_local_check_tick
    }

    /// Tick at or after which the cell may evaporate.
    #[inline]
    #[must_use]
    pub const fn next_evaporation_tick(&self) -> u64 {
        self.next_evaporation_tick
    }

    /// Whether a trapped pressure search is still cooling down at `tick`.
    #[inline]
    #[must_use]
    pub const fn pressure_cooling(&self, tick: u64) -> bool {
        tick < self.pressure_cooldown_until
    }

    /// Clears the idle streak and re-enters the active state.
    #[inline]
    pub(crate) fn wake(&mut self) {
        self.stability = 0;
        self.deregistered = false;
    }

    /// Records a no-op attempt. Returns `true` once the cap is reached.
    #[inline]
    pub(crate) fn record_idle(&mut self, cap: u16) -> bool {
        self.stability = self.stability.saturating_add(1).min(cap);
        self.stability >= cap
    }
}
