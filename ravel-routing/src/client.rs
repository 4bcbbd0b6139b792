//! Cluster client - routes commands to the node that owns their key.
//!
//! # Request Flow
//!
//! ```text
//! execute(cmd)
//!   |
//!   +-- no routing key ----------------------------> Unroutable
//!   +-- topology stale? load it (soft-fail)
//!   |
//!   +-> pick connection (owner | random healthy | ask target)
//!        |
//!        +-- ask target? send ASKING first
//!        +-- run command
//!             +-- Success -------------------------> reply
//!             +-- MOVED: patch slot, mark stale ---+
//!             +-- ASK: next hop is the target -----+
//!             +-- connection unusable: random hop -+-- budget left? loop
//!             +-- other error ---------------------> error, verbatim
//! ```
//!
//! Every loop iteration spends one unit of the redirection budget. Once
//! less than half of it remains, connectivity failures pause for the
//! configured backoff before retrying.

use std::fmt;
use std::sync::Arc;

use ravel_core::{
    key_slot, Command, NodeAddr, NodeClient, NodeConnector, NodeError, Slot, Value,
};
use tracing::{debug, info};

use crate::candidates::Candidates;
use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::key::routing_key;
use crate::pool::ConnectionPool;
use crate::redirect::{Attempt, RedirectKind};
use crate::slot_map::SlotMap;
use crate::topology::TopologyLoader;

/// Where the next attempt is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Hop {
    /// The slot's believed owner, or a random node if unknown.
    Owner,
    /// A random healthy candidate.
    Random,
    /// An `ASK` target, primed with `ASKING`.
    Ask(NodeAddr),
}

/// Cluster-aware client.
///
/// Cheap to share behind an `Arc`; any number of requests may run
/// concurrently on one instance.
pub struct ClusterClient<C: NodeConnector> {
    config: ClusterConfig,
    topology: TopologyLoader<C>,
    pool: ConnectionPool<C>,
}

impl<C: NodeConnector> ClusterClient<C> {
    /// Creates a client without contacting the cluster.
    ///
    /// The slot map starts out empty and stale; the first request loads
    /// it.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Config` if the configuration is invalid.
    pub fn new(config: ClusterConfig, connector: C) -> ClusterResult<Self> {
        config.validate()?;
        let connector = Arc::new(connector);
        Ok(Self {
            topology: TopologyLoader::new(Arc::clone(&connector), config.seeds.clone()),
            pool: ConnectionPool::new(connector, config.max_connections),
            config,
        })
    }

    /// Creates a client and loads the cluster topology.
    ///
    /// An unreachable cluster does not fail construction; the client
    /// retries the load on its first request.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Config` if the configuration is invalid.
    pub async fn connect(config: ClusterConfig, connector: C) -> ClusterResult<Self> {
        let client = Self::new(config, connector)?;
        client.refresh().await;
        Ok(client)
    }

    /// Reloads the cluster topology now.
    ///
    /// Returns true if the slot map was rebuilt.
    pub async fn refresh(&self) -> bool {
        self.topology.load().await
    }

    /// Runs a command on the node that owns its key.
    ///
    /// Redirections and connection failures are retried until the
    /// redirection budget runs out.
    ///
    /// # Errors
    ///
    /// - `ClusterError::Unroutable` if the command has no routing key.
    /// - `ClusterError::NoReachableNode` if a random node was needed and
    ///   no candidate answered.
    /// - `ClusterError::TooManyRedirections` if the budget ran out.
    /// - `ClusterError::Node` for any other error reply, verbatim.
    pub async fn execute(&self, command: &Command) -> ClusterResult<Value> {
        let Some(key) = routing_key(command) else {
            return Err(ClusterError::Unroutable {
                command: command.name().to_string(),
            });
        };
        let slot = key_slot(key);

        if self.topology.needs_refresh() {
            self.topology.load().await;
        }

        let max_redirects = self.config.max_redirects;
        let mut budget = max_redirects;
        let mut hop = Hop::Owner;
        let mut last_error = String::new();

        while budget > 0 {
            budget -= 1;
            let current = std::mem::replace(&mut hop, Hop::Owner);

            match self.attempt(command, slot, &current).await? {
                Attempt::Success(value) => return Ok(value),
                Attempt::Redirect(redirect) => {
                    debug!(
                        command = command.name(),
                        slot = redirect.slot.get(),
                        node = %redirect.target,
                        kind = ?redirect.kind,
                        budget,
                        "redirected"
                    );
                    last_error = redirect.to_string();
                    match redirect.kind {
                        RedirectKind::Moved => {
                            self.topology.slot_map().patch(redirect.slot, redirect.target);
                            self.topology.mark_stale();
                        }
                        RedirectKind::Ask => hop = Hop::Ask(redirect.target),
                    }
                }
                Attempt::Connectivity(e) => {
                    debug!(
                        command = command.name(),
                        slot = slot.get(),
                        error = %e,
                        budget,
                        "connection failed, retrying on a random node"
                    );
                    last_error = e.to_string();
                    hop = Hop::Random;
                    if u64::from(budget) * 2 < u64::from(max_redirects) {
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                }
                Attempt::Fatal(e) => return Err(e.into()),
            }
        }

        Err(ClusterError::TooManyRedirections {
            attempts: max_redirects,
            last_error,
        })
    }

    /// Closes every pooled connection and marks the topology stale.
    pub async fn close(&self) {
        let closed = self.pool.close_all().await;
        self.topology.mark_stale();
        info!(closed, "cluster client closed");
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Returns the slot map.
    #[must_use]
    pub const fn slot_map(&self) -> &SlotMap {
        self.topology.slot_map()
    }

    /// Returns the candidate node set.
    #[must_use]
    pub const fn candidates(&self) -> &Candidates {
        self.topology.candidates()
    }

    /// Returns the connection pool.
    #[must_use]
    pub const fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Returns true if the next request reloads topology first.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.topology.needs_refresh()
    }

    /// Runs one attempt against the node chosen by `hop`.
    ///
    /// Only a failure to find any random node is returned as an error;
    /// everything else is classified into an `Attempt`. A handle that
    /// failed with a connectivity error or an undecodable reply is dropped
    /// from the pool.
    async fn attempt(&self, command: &Command, slot: Slot, hop: &Hop) -> ClusterResult<Attempt> {
        let client = match hop {
            Hop::Random => self.random_connection().await?,
            Hop::Ask(target) => match self.pool.get(target).await {
                Ok(client) => client,
                Err(e) => return Ok(Attempt::from_error(e)),
            },
            Hop::Owner => match self.topology.slot_map().lookup(slot) {
                Some(owner) => match self.pool.get(&owner).await {
                    Ok(client) => client,
                    Err(e) => return Ok(Attempt::from_error(e)),
                },
                None => {
                    debug!(slot = slot.get(), "slot owner unknown, using a random node");
                    self.random_connection().await?
                }
            },
        };

        let result = match hop {
            Hop::Ask(_) => match client.asking().await {
                Ok(()) => client.execute(command).await,
                Err(e) => Err(e),
            },
            Hop::Owner | Hop::Random => client.execute(command).await,
        };

        let outcome = Attempt::from_result(result);
        if matches!(
            outcome,
            Attempt::Connectivity(_) | Attempt::Fatal(NodeError::Protocol { .. })
        ) {
            self.pool.discard(&client).await;
        }
        Ok(outcome)
    }

    async fn random_connection(&self) -> ClusterResult<Arc<C::Client>> {
        let candidates = self.topology.candidates().snapshot();
        self.pool.get_random_healthy(&candidates).await
    }
}

impl<C: NodeConnector> fmt::Debug for ClusterClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("config", &self.config)
            .field("slots", self.topology.slot_map())
            .field("candidates", &self.topology.candidates().len())
            .field("pool", &self.pool)
            .field("refresh_needed", &self.topology.needs_refresh())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ravel_core::SlotRange;

    use crate::config::ConfigError;
    use crate::test_support::{node, Counters, StubConnector};

    fn full_range(owner: NodeAddr) -> Vec<SlotRange> {
        vec![SlotRange::new(Slot::new(0), Slot::new(16_383), owner).unwrap()]
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = ClusterClient::new(ClusterConfig::new(Vec::new()), StubConnector::default())
            .unwrap_err();
        assert!(matches!(err, ClusterError::Config(ConfigError::NoSeeds)));
    }

    #[tokio::test]
    async fn test_connect_loads_topology() {
        let connector = StubConnector::default();
        connector.serve_topology(&node(7000), full_range(node(7000)));

        let client = ClusterClient::connect(ClusterConfig::for_testing(vec![node(7000)]), connector)
            .await
            .unwrap();

        assert!(!client.needs_refresh());
        assert_eq!(client.slot_map().assigned_count(), 16_384);
    }

    #[tokio::test]
    async fn test_unroutable_command_touches_nothing() {
        let connector = StubConnector::default();
        let counters = Arc::clone(&connector.counters);
        let client =
            ClusterClient::new(ClusterConfig::for_testing(vec![node(7000)]), connector).unwrap();

        let err = client.execute(&Command::new("INFO")).await.unwrap_err();

        assert!(matches!(err, ClusterError::Unroutable { command } if command == "INFO"));
        assert_eq!(Counters::get(&counters.connects), 0);
        assert!(client.needs_refresh());
    }

    #[tokio::test]
    async fn test_first_request_loads_topology_and_routes() {
        let connector = StubConnector::default();
        connector.serve_topology(&node(7000), full_range(node(7000)));
        let client =
            ClusterClient::new(ClusterConfig::for_testing(vec![node(7000)]), connector).unwrap();

        let reply = client.execute(&Command::new("GET").arg("foo")).await.unwrap();

        assert_eq!(reply, Value::Nil);
        assert!(!client.needs_refresh());
        assert!(client.pool().contains(&node(7000)));
    }

    #[tokio::test]
    async fn test_no_reachable_node_is_fatal() {
        let connector = StubConnector::unreachable(&[node(7000)]);
        let counters = Arc::clone(&connector.counters);
        let client =
            ClusterClient::new(ClusterConfig::for_testing(vec![node(7000)]), connector).unwrap();

        let err = client.execute(&Command::new("GET").arg("k")).await.unwrap_err();

        assert!(matches!(err, ClusterError::NoReachableNode { candidates: 1 }));
        // One topology attempt plus one random-node attempt.
        assert_eq!(Counters::get(&counters.connects), 2);
    }

    #[tokio::test]
    async fn test_close_marks_stale() {
        let connector = StubConnector::default();
        connector.serve_topology(&node(7000), full_range(node(7000)));
        let client = ClusterClient::connect(ClusterConfig::for_testing(vec![node(7000)]), connector)
            .await
            .unwrap();
        client.execute(&Command::new("GET").arg("k")).await.unwrap();
        assert_eq!(client.pool().len(), 1);

        client.close().await;

        assert!(client.pool().is_empty());
        assert!(client.needs_refresh());
    }
}
