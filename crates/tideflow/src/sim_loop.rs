//! # Simulation Loop
//!
//! Fixed-step driver around [`FluidSimulation`]:
//!
//! ```text
//! step N:
//! ┌────────────────────────────────────────────────────────────┐
//! │ 1. ACTORS   springs/drains mutate cells via the cell API   │
//! │ 2. STEP     scheduler runs one bounded batch               │
//! │ 3. MEASURE  step time → FrameStats, throughput → governor  │
//! │ 4. EVENTS   drain notifications into the tally             │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop never sleeps. Pacing against wall time belongs to the host.

use std::time::{Duration, Instant};

use tideflow_core::host::HostGrid;
use tideflow_core::{FlowConfig, FluidSimulation, StepReport};
use tideflow_shared::constants::DEFAULT_EVENT_CAPACITY;
use tideflow_shared::{CellKey, EventBus, EventReceiver, FlowEvent};
use tracing::{debug, warn};

use crate::error::DriverResult;

/// Step time budget for a 60 Hz host.
pub const TARGET_STEP_TIME: Duration = Duration::from_micros(16_666);

/// Loop configuration.
#[derive(Clone, Debug)]
pub struct SimLoopConfig {
    /// Steps slower than this count as late.
    pub step_budget: Duration,
    /// Notification channel capacity.
    pub event_capacity: usize,
    /// Report measured throughput to the engine's governor.
    pub feed_governor: bool,
}

impl Default for SimLoopConfig {
    fn default() -> Self {
        Self {
            step_budget: TARGET_STEP_TIME,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            feed_governor: true,
        }
    }
}

/// Step timing statistics.
#[derive(Clone, Copy, Debug)]
pub struct FrameStats {
    /// Minimum step time (microseconds).
    pub min_step_us: u64,
    /// Maximum step time (microseconds).
    pub max_step_us: u64,
    /// Rolling average step time (microseconds).
    pub avg_step_us: u64,
    /// Steps that exceeded the budget.
    pub late_steps: u64,
    /// Steps that did work.
    pub total_steps: u64,
    /// Steps the scheduler throttled.
    pub skipped_steps: u64,
    /// Cells processed across all steps.
    pub cells_processed: u64,
}

impl FrameStats {
    const fn new(budget: Duration) -> Self {
        Self {
            min_step_us: u64::MAX,
            max_step_us: 0,
            avg_step_us: saturating_micros(budget),
            late_steps: 0,
            total_steps: 0,
            skipped_steps: 0,
            cells_processed: 0,
        }
    }

    fn record(&mut self, duration: Duration, budget: Duration, processed: usize) {
        let duration_us = saturating_micros(duration);
        self.total_steps += 1;
        self.min_step_us = self.min_step_us.min(duration_us);
        self.max_step_us = self.max_step_us.max(duration_us);
        self.avg_step_us = (self.avg_step_us.saturating_mul(15).saturating_add(duration_us)) / 16;
        self.cells_processed += processed as u64;
        if duration > budget {
            self.late_steps += 1;
        }
    }

    /// Minimum step time, or `None` before the first working step.
    #[must_use]
    pub const fn min_step(&self) -> Option<u64> {
        if self.total_steps == 0 {
            None
        } else {
            Some(self.min_step_us)
        }
    }
}

const fn saturating_micros(duration: Duration) -> u64 {
    let micros = duration.as_micros();
    if micros > u64::MAX as u128 {
        u64::MAX
    } else {
        micros as u64
    }
}

/// Counts of notifications received from the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventTally {
    /// Cells created.
    pub created: u64,
    /// Cells destroyed.
    pub destroyed: u64,
    /// Volume changes on live cells.
    pub changed: u64,
    /// Cells that stabilized.
    pub stabilized: u64,
    /// Saturation warnings.
    pub saturated: u64,
}

impl EventTally {
    fn count(&mut self, event: &FlowEvent) {
        match event {
            FlowEvent::CellCreated { .. } => self.created += 1,
            FlowEvent::CellDestroyed { .. } => self.destroyed += 1,
            FlowEvent::VolumeChanged { .. } => self.changed += 1,
            FlowEvent::CellStabilized { .. } => self.stabilized += 1,
            FlowEvent::Saturated { .. } => self.saturated += 1,
        }
    }

    /// Live cells implied by the notifications so far.
    #[must_use]
    pub const fn net_cells(&self) -> i64 {
        self.created as i64 - self.destroyed as i64
    }
}

/// Fixed-step loop owning an engine and its host world.
pub struct SimLoop<H: HostGrid> {
    sim: FluidSimulation,
    host: H,
    events: EventReceiver,
    config: SimLoopConfig,
    stats: FrameStats,
    tally: EventTally,
    last_report: StepReport,
}

impl<H: HostGrid> SimLoop<H> {
    /// Creates a loop around a fresh engine.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`](crate::DriverError::Config) if `flow` fails validation.
    pub fn new(flow: FlowConfig, host: H) -> DriverResult<Self> {
        Self::with_config(flow, host, SimLoopConfig::default())
    }

    /// Creates a loop with explicit loop settings.
    ///
    /// # Errors
    ///
    /// Same as [`SimLoop::new`].
    pub fn with_config(flow: FlowConfig, host: H, config: SimLoopConfig) -> DriverResult<Self> {
        let sim = FluidSimulation::new(flow)?;
        Ok(Self::from_simulation(sim, host, config))
    }

    /// Wraps an existing engine, e.g. one restored from a snapshot.
    #[must_use]
    pub fn from_simulation(mut sim: FluidSimulation, host: H, config: SimLoopConfig) -> Self {
        let (sender, events) = EventBus::create_pair(config.event_capacity);
        sim.attach_events(sender);
        for info in host.layers() {
            sim.load_layer(info.id);
        }
        let stats = FrameStats::new(config.step_budget);
        Self {
            sim,
            host,
            events,
            config,
            stats,
            tally: EventTally::default(),
            last_report: StepReport::default(),
        }
    }

    /// Runs one step without actors.
    pub fn step(&mut self) -> StepReport {
        self.step_with(|_, _| {})
    }

    /// Runs one step, letting `actor` mutate cells first.
    pub fn step_with<F>(&mut self, actor: F) -> StepReport
    where
        F: FnOnce(&mut FluidSimulation, &H),
    {
        actor(&mut self.sim, &self.host);

        let start = Instant::now();
        let report = self.sim.step(&self.host);
        let elapsed = start.elapsed();

        if report.skipped {
            self.stats.skipped_steps += 1;
        } else {
            self.stats.record(elapsed, self.config.step_budget, report.processed);
            if elapsed > self.config.step_budget {
                warn!(
                    tick = report.tick,
                    elapsed_us = saturating_micros(elapsed),
                    processed = report.processed,
                    "step over budget"
                );
            }
            if self.config.feed_governor {
                let skips = self.sim.record_throughput(report.processed, elapsed);
                if skips > 0 {
                    debug!(tick = report.tick, skips, "governor throttling");
                }
            }
        }

        self.drain_events();
        self.last_report = report;
        report
    }

    /// Runs `steps` steps, calling `actor` before each.
    pub fn run<F>(&mut self, steps: u64, mut actor: F) -> FrameStats
    where
        F: FnMut(&mut FluidSimulation, &H),
    {
        for _ in 0..steps {
            self.step_with(&mut actor);
        }
        self.stats
    }

    fn drain_events(&mut self) {
        for event in self.events.drain() {
            self.tally.count(&event);
        }
    }

    /// The engine.
    #[must_use]
    pub const fn simulation(&self) -> &FluidSimulation {
        &self.sim
    }

    /// Mutable engine access for direct cell edits.
    pub fn simulation_mut(&mut self) -> &mut FluidSimulation {
        &mut self.sim
    }

    /// The host world.
    #[must_use]
    pub const fn host(&self) -> &H {
        &self.host
    }

    /// Edits the host world, then wakes the engine around `changed`.
    pub fn edit_host<F>(&mut self, changed: &[CellKey], edit: F) -> usize
    where
        F: FnOnce(&mut H),
    {
        edit(&mut self.host);
        changed
            .iter()
            .map(|&key| self.sim.notify_terrain_changed(&self.host, key))
            .sum()
    }

    /// Step timing statistics.
    #[must_use]
    pub const fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Notification counts.
    #[must_use]
    pub const fn events(&self) -> &EventTally {
        &self.tally
    }

    /// Report of the most recent step.
    #[must_use]
    pub const fn last_report(&self) -> &StepReport {
        &self.last_report
    }

    /// Clears timing statistics.
    pub fn reset_stats(&mut self) {
        self.stats = FrameStats::new(self.config.step_budget);
    }
}
