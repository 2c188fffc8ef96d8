//! Engine counters.
//!
//! Plain monotonically increasing counters. Hosts sample them and diff
//! between frames; nothing in the engine reads them back.

/// Cumulative engine statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowStats {
    /// Steps executed.
    pub steps: u64,
    /// Host calls that were skipped by frequency or throughput throttling.
    pub skipped_steps: u64,
    /// Cells handed to the local diffusion rule.
    pub cells_processed: u64,
    /// Individual volume transfers between two cells.
    pub transfers: u64,
    /// Gravity shortcut transfers.
    pub gravity_transfers: u64,
    /// Cells created by volume arriving at an empty position.
    pub cells_created: u64,
    /// Cells destroyed by draining to zero.
    pub cells_destroyed: u64,
    /// Pressure searches that delivered volume.
    pub pressure_deliveries: u64,
    /// Pressure searches that exhausted their node budget or found no outlet.
    pub pressure_trapped: u64,
    /// Units placed by splash distribution.
    pub splash_units: u64,
    /// Regions rewritten by the equalizer.
    pub equalized_regions: u64,
    /// Units removed by evaporation.
    pub evaporated_units: u64,
    /// Cells deregistered as stable.
    pub stabilized: u64,
    /// Steps whose eligible work exceeded the budget.
    pub saturated_steps: u64,
    /// Layer link resolutions that found nothing.
    pub portal_resolution_failures: u64,
    /// Radius reactivation waves that ran.
    pub reactivation_waves: u64,
}
