//! Ravel Core - Shared types for the ravel cluster client.
//!
//! This crate provides the vocabulary every other ravel crate speaks:
//! node addresses, hash slots, commands and replies, and the traits a
//! single-node client must implement so the cluster router can drive it.
//! It does NOT know anything about sockets or wire encoding; those live
//! in `ravel-runtime`.
//!
//! # Design Principles
//!
//! - **Strongly-typed values**: a `Slot` is never confused with a port
//! - **Explicit limits**: protocol constants live in one place
//! - **Collaborator seams as traits**: `NodeClient` and `NodeConnector`
//!   let the router run against TCP in production and scripted nodes in
//!   tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod command;
mod error;
pub mod limits;
mod node;
mod slot;
mod types;

pub use command::{Command, Value};
pub use error::{Error, Result};
pub use node::{NodeClient, NodeConnector, NodeError, NodeResult};
pub use slot::{hash_tag, key_slot};
pub use types::{NodeAddr, Slot, SlotRange};
