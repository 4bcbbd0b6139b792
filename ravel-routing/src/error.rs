//! Cluster client error types.

use ravel_core::NodeError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced to callers of the cluster client.
///
/// Connectivity failures and redirections are absorbed by the router's
/// retry loop and only show up here as `TooManyRedirections`.
#[derive(Debug, Clone, Error)]
pub enum ClusterError {
    /// The command has no single key to route by.
    #[error("no way to dispatch '{command}' to the cluster: command has no single routing key")]
    Unroutable {
        /// The command name.
        command: String,
    },

    /// No candidate node answered a connection attempt and health probe.
    #[error("cannot reach any of {candidates} candidate nodes")]
    NoReachableNode {
        /// How many candidates were tried.
        candidates: usize,
    },

    /// The redirection budget ran out.
    #[error("too many cluster redirections after {attempts} attempts (last error: {last_error})")]
    TooManyRedirections {
        /// Attempts made.
        attempts: u32,
        /// Message of the last underlying failure.
        last_error: String,
    },

    /// A non-redirect error reply or protocol failure, surfaced verbatim.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for cluster client operations.
pub type ClusterResult<T> = Result<T, ClusterError>;
