//! Node client abstraction.
//!
//! The cluster router never touches sockets. It drives single-node
//! clients through these traits, which allows different implementations
//! for production (TCP, in `ravel-runtime`) and tests (scripted nodes).
//!
//! # Failure Classes
//!
//! Every node operation fails with a `NodeError`. The router cares about
//! one distinction: whether the connection itself is unusable
//! (`is_connectivity`), which is retried against another node, or the
//! server answered with an error reply, which is inspected for
//! redirections and otherwise surfaced to the caller.

use async_trait::async_trait;
use thiserror::Error;

use crate::command::{Command, Value};
use crate::types::{NodeAddr, SlotRange};

/// Errors from a single-node client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Could not establish a connection.
    #[error("failed to connect to {addr}: {message}")]
    Connect {
        /// The node we tried to reach.
        addr: NodeAddr,
        /// The underlying failure.
        message: String,
    },

    /// An established connection broke or timed out mid-request.
    #[error("connection to {addr} broken: {message}")]
    Broken {
        /// The node the connection pointed at.
        addr: NodeAddr,
        /// The underlying failure.
        message: String,
    },

    /// The connection was closed locally, e.g. by pool eviction.
    #[error("connection to {addr} is closed")]
    Closed {
        /// The node the connection pointed at.
        addr: NodeAddr,
    },

    /// The server answered with an error reply. Holds the reply text
    /// verbatim, e.g. `MOVED 3999 10.0.0.2:7001`.
    #[error("{0}")]
    Reply(String),

    /// The server sent something the client could not make sense of.
    #[error("protocol error: {message}")]
    Protocol {
        /// What was wrong.
        message: String,
    },
}

impl NodeError {
    /// Returns true if the connection is unusable and another node
    /// should be tried.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Broken { .. } | Self::Closed { .. }
        )
    }
}

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// An open connection to one node.
///
/// A handle is shared between concurrent requests; implementations must
/// keep request/response pairs from interleaving on the wire.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Returns the node this client is connected to.
    fn addr(&self) -> &NodeAddr;

    /// Runs a command and returns its reply.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Reply` for server error replies (including
    /// redirections) and a connectivity-class error if the connection
    /// failed.
    async fn execute(&self, command: &Command) -> NodeResult<Value>;

    /// Lightweight liveness probe (`PING`).
    ///
    /// # Errors
    ///
    /// Returns an error if the node did not answer `PONG`.
    async fn ping(&self) -> NodeResult<()>;

    /// Issues the one-shot `ASKING` directive that lets a node serve a
    /// key of a slot it is importing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directive could not be delivered.
    async fn asking(&self) -> NodeResult<()>;

    /// Queries the node's view of slot ownership (`CLUSTER SLOTS`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query failed or the reply was malformed.
    async fn cluster_slots(&self) -> NodeResult<Vec<SlotRange>>;

    /// Closes the connection gracefully. Best effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown did not complete; the
    /// connection is unusable afterwards either way.
    async fn close(&self) -> NodeResult<()>;
}

/// Factory for node connections.
#[async_trait]
pub trait NodeConnector: Send + Sync + 'static {
    /// The client type this connector produces.
    type Client: NodeClient;

    /// Opens a new connection to the given node.
    ///
    /// # Errors
    ///
    /// Returns a connectivity-class error if the node is unreachable.
    async fn connect(&self, addr: &NodeAddr) -> NodeResult<Self::Client>;
}
