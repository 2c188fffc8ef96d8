//! Driver errors.

use thiserror::Error;
use tideflow_core::FlowError;

/// Errors raised while setting up a run.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Engine configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] FlowError),

    /// A command-line argument could not be parsed.
    #[error("invalid argument `{value}`: expected {expected}")]
    InvalidArgument {
        /// Raw argument.
        value: String,
        /// What was expected instead.
        expected: &'static str,
    },
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;
