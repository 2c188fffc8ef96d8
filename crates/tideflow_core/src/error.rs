//! # Flow Error Types
//!
//! The simulation itself never fails: missing neighbors, trapped pressure and
//! unresolved portals are ordinary `bool`/`Option` results. Errors only exist
//! at the edges, when loading configuration or decoding a snapshot.

use thiserror::Error;

/// Errors that can occur at the engine's edges.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Configuration file is not valid TOML for [`crate::FlowConfig`].
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but holds values the engine cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot bytes are truncated, mislabelled or fail to decompress.
    #[error("corrupt snapshot: {0}")]
    SnapshotCorrupt(String),

    /// Snapshot payload does not match its recorded checksum.
    #[error("snapshot checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    SnapshotChecksum {
        /// Checksum stored in the header.
        expected: u32,
        /// Checksum of the decoded payload.
        actual: u32,
    },

    /// Snapshot was written by an unsupported format version.
    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),
}

/// Result type for fallible engine operations.
pub type FlowResult<T> = Result<T, FlowError>;
