//! Ravel Tests - integration tests for the cluster client.
//!
//! Unit tests live next to the code in each crate under `#[cfg(test)]`.
//! This crate holds the tests that need more than one crate or a live
//! socket.
//!
//! ## Test Organization
//!
//! **Integration Tests** (`*_tests.rs`):
//! - `router_tests`: routing, redirections, retries and pool pressure
//!   against a `SimulatedCluster`
//! - `tcp_tests`: the TCP client and a full cluster client talking RESP
//!   to `FakeNode` servers over loopback
//!
//! **Support Modules**:
//! - `simulated_cluster`: in-memory scriptable nodes implementing
//!   `NodeConnector`
//! - `fake_node`: in-process RESP server
//!
//! ## Naming Conventions
//!
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod fake_node;
pub mod simulated_cluster;

#[cfg(test)]
mod router_tests;
