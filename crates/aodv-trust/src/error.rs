//! Routing error types
//!
//! Re-exports core routing errors and adds router-specific errors.

use thiserror::Error;

use crate::config::ConfigWarning;

// Re-export core routing errors
pub use aodv_core::RoutingError as CoreRoutingError;

/// Extended routing errors for the router
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Core routing error
    #[error("Core routing error: {0}")]
    Core(#[from] CoreRoutingError),

    /// Wire encoding or decoding failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] aodv_core::ProtocolError),

    /// Configuration rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Data addressed to the local node itself
    #[error("Destination is the local node")]
    SelfAddressed,
}

/// Rejected configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more checks failed
    #[error("invalid configuration: {}", join_warnings(.0))]
    Invalid(Vec<ConfigWarning>),
}

fn join_warnings(warnings: &[ConfigWarning]) -> String {
    warnings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
