//! Ravel Runtime - Production node client.
//!
//! This crate connects the cluster router to real nodes over TCP,
//! speaking RESP2.
//!
//! # Overview
//!
//! The runtime provides:
//! - `TcpConnector`/`TcpNodeClient`: the node client the router drives
//! - `ConnectionConfig`: connect and I/O timeouts
//! - `connect`: builds a cluster client and loads the topology
//!
//! # Example
//!
//! ```ignore
//! use ravel_core::{Command, NodeAddr};
//! use ravel_routing::ClusterConfig;
//!
//! let config = ClusterConfig::new(vec![NodeAddr::new("127.0.0.1", 7000)]);
//! let client = ravel_runtime::connect(config).await?;
//!
//! let reply = client.execute(&Command::new("GET").arg("user:1")).await?;
//! client.close().await;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cluster_slots;
pub mod codec;
mod config;
mod connection;

use ravel_routing::{ClusterClient, ClusterConfig, ClusterError};
use thiserror::Error;

pub use cluster_slots::parse_cluster_slots;
pub use config::{ConfigError, ConnectionConfig};
pub use connection::{TcpConnector, TcpNodeClient};

/// A cluster client over TCP.
pub type TcpClusterClient = ClusterClient<TcpConnector>;

/// Errors from building a TCP cluster client.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The connection configuration is invalid.
    #[error("invalid connection configuration: {0}")]
    Connection(#[from] ConfigError),

    /// The cluster client could not be created.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Creates a TCP cluster client with default connection settings and
/// loads the cluster topology.
///
/// # Errors
///
/// Returns an error if the configuration is invalid. An unreachable
/// cluster is not an error here; see `ClusterClient::connect`.
pub async fn connect(config: ClusterConfig) -> RuntimeResult<TcpClusterClient> {
    connect_with(config, ConnectionConfig::default()).await
}

/// Creates a TCP cluster client with custom connection settings and
/// loads the cluster topology.
///
/// # Errors
///
/// Returns an error if either configuration is invalid.
pub async fn connect_with(
    config: ClusterConfig,
    connection: ConnectionConfig,
) -> RuntimeResult<TcpClusterClient> {
    connection.validate()?;
    let client = ClusterClient::connect(config, TcpConnector::new(connection)).await?;
    Ok(client)
}
