//! # Tideflow
//!
//! Driver for the sparse fluid engine.
//!
//! ```text
//! ┌──────────────┐   step()    ┌─────────────────┐   events   ┌─────────────┐
//! │   SimLoop    │ ──────────> │ FluidSimulation │ ─────────> │ EventTally  │
//! │ (FrameStats) │ <────────── │ (tideflow_core) │            │             │
//! └──────┬───────┘ throughput  └────────┬────────┘            └─────────────┘
//!        │ actors                       │ queries
//!        v                              v
//! ┌──────────────┐              ┌─────────────────┐
//! │ Spring/Drain │              │   HostGrid      │
//! └──────────────┘              └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `error`: setup errors
//! - `headless`: command-line runner
//! - `sim_loop`: fixed-step orchestration and timing
//! - `scenario`: test worlds and actors

pub mod error;
pub mod headless;
pub mod scenario;
pub mod sim_loop;

pub use tideflow_core as core;
pub use tideflow_shared as shared;

pub use error::{DriverError, DriverResult};
pub use headless::{run_headless, HeadlessArgs, HeadlessSummary};
pub use scenario::{two_floor_basin, Basin, Drain, Spring};
pub use sim_loop::{EventTally, FrameStats, SimLoop, SimLoopConfig, TARGET_STEP_TIME};
