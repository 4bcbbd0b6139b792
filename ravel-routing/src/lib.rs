//! Ravel Routing - Cluster-aware request routing.
//!
//! This crate maps every command to the node that owns its key's hash
//! slot, keeps a bounded pool of node connections, learns slot ownership
//! from the cluster, and follows `MOVED`/`ASK` redirections within a
//! bounded retry budget.
//!
//! # Design
//!
//! - **Stale is normal**: the slot map is a hint, corrected by redirects
//! - **Lock-free routing state**: readers never wait on writers
//! - **Explicit limits**: connections and retries are bounded

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod candidates;
mod client;
mod config;
mod error;
mod key;
mod pool;
mod redirect;
mod slot_map;
mod topology;

#[cfg(test)]
mod test_support;

pub use candidates::Candidates;
pub use client::ClusterClient;
pub use config::{ClusterConfig, ConfigError};
pub use error::{ClusterError, ClusterResult};
pub use key::routing_key;
pub use pool::ConnectionPool;
pub use redirect::{Attempt, Redirect, RedirectKind};
pub use slot_map::SlotMap;
pub use topology::TopologyLoader;
