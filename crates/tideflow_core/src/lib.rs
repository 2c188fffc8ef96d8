//! # Tideflow Core
//!
//! Sparse cellular-automaton fluid engine for layered tile grids.
//!
//! Integer volume units move between cells under a local rule (gravity,
//! pressure, expansion, equilibrium). Only active cells are processed, a
//! bounded random subset per step, so a flooded basin that has settled costs
//! nothing until something disturbs it.
//!
//! ## Architecture Rules
//!
//! 1. **Single writer per step** - mutations are immediate, no double-buffering
//! 2. **Deterministic for a seed** - all tie-breaks draw from one injectable RNG
//! 3. **No allocation in searches** - BFS buffers live in [`SearchScratch`]
//! 4. **The host owns terrain** - everything topological goes through [`HostGrid`]
//!
//! ## Modules
//!
//! - [`world`]: cells, per-layer index and active set, activation
//! - [`diffusion`]: the local rule
//! - [`pressure`]: pressure search and splash distribution
//! - [`equalizer`]: periodic region flattening
//! - [`scheduler`]: step selection, budgets and throttling
//! - [`portal`] / [`neighbor`]: cross-layer linkage and neighbor classification
//! - [`persistence`]: snapshots

pub mod cell;
pub mod config;
pub mod diffusion;
pub mod equalizer;
pub mod error;
pub mod evaporation;
pub mod host;
pub mod index;
pub mod layer;
pub mod neighbor;
pub mod persistence;
pub mod portal;
pub mod pressure;
pub mod scheduler;
pub mod scratch;
pub mod simulation;
pub mod stats;
pub mod world;

pub use cell::Cell;
pub use config::{
    DiffusionConfig, EqualizerConfig, EvaporationConfig, FlowConfig, PortalConfig, PressureConfig,
    SchedulerConfig, ThroughputConfig,
};
pub use error::{FlowError, FlowResult};
pub use host::{HostGrid, LayerInfo, MemoryGrid, PortalKind, VerticalDir};
pub use layer::{ActiveSet, FlowLayer};
pub use neighbor::{classify_neighbors, Neighbor, Neighbors};
pub use persistence::{CellRecord, FlowSnapshot};
pub use portal::PortalLinkage;
pub use scheduler::{Scheduler, StepReport, ThroughputGovernor};
pub use scratch::SearchScratch;
pub use simulation::FluidSimulation;
pub use stats::FlowStats;
pub use world::FlowWorld;
