//! Connection pool - bounded set of live node connections.
//!
//! Connections are keyed by node name and shared: concurrent requests to
//! the same node use the same handle. The pool never holds more than
//! `max_connections` handles. When a new handle is about to be opened
//! and the pool is full, a uniformly random entry is evicted and closed
//! first. Eviction is lazy; nothing is closed proactively.
//!
//! An evicted handle may still be in use by a concurrent request. That
//! request sees a connectivity failure and retries through the router.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use rand::seq::{IteratorRandom, SliceRandom};
use ravel_core::{NodeAddr, NodeClient, NodeConnector, NodeResult};
use tracing::{debug, warn};

use crate::error::{ClusterError, ClusterResult};

/// Bounded pool of node connections.
pub struct ConnectionPool<C: NodeConnector> {
    /// Factory for new connections.
    connector: Arc<C>,
    /// Cap on open handles.
    max_connections: usize,
    /// Open handles by node name.
    connections: Mutex<HashMap<String, Arc<C::Client>>>,
}

impl<C: NodeConnector> ConnectionPool<C> {
    /// Creates an empty pool.
    ///
    /// # Panics
    ///
    /// Panics if `max_connections` is zero.
    #[must_use]
    pub fn new(connector: Arc<C>, max_connections: usize) -> Self {
        assert!(max_connections > 0, "max_connections must be positive");
        Self {
            connector,
            max_connections,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the connection cap.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Returns the number of open handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the pool holds no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns true if the pool holds a handle for the node.
    #[must_use]
    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.lock().contains_key(&addr.name())
    }

    /// Returns the pooled handle for a node, opening one if needed.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if a new connection cannot be opened.
    pub async fn get(&self, addr: &NodeAddr) -> NodeResult<Arc<C::Client>> {
        let name = addr.name();
        if let Some(client) = self.pooled(&name) {
            return Ok(client);
        }

        self.make_room().await;
        let client = Arc::new(self.connector.connect(addr).await?);
        debug!(node = %addr, "opened connection");
        Ok(self.register(name, client).await)
    }

    /// Returns a handle to a random candidate that answers a health probe.
    ///
    /// Candidates are tried in a freshly shuffled order. A pooled handle
    /// is reused if it answers; one that does not is dropped from the
    /// pool. Otherwise a new handle is opened and probed.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::NoReachableNode` if every candidate fails.
    pub async fn get_random_healthy(
        &self,
        candidates: &[NodeAddr],
    ) -> ClusterResult<Arc<C::Client>> {
        let mut order = candidates.to_vec();
        order.shuffle(&mut rand::thread_rng());

        for addr in &order {
            let name = addr.name();

            if let Some(client) = self.pooled(&name) {
                match client.ping().await {
                    Ok(()) => return Ok(client),
                    Err(e) => {
                        warn!(node = %addr, error = %e, "pooled connection failed health probe");
                        self.discard(&client).await;
                        continue;
                    }
                }
            }

            self.make_room().await;
            let client = match self.connector.connect(addr).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    debug!(node = %addr, error = %e, "candidate unreachable");
                    continue;
                }
            };
            match client.ping().await {
                Ok(()) => return Ok(self.register(name, client).await),
                Err(e) => {
                    warn!(node = %addr, error = %e, "new connection failed health probe");
                    close_quietly(client.as_ref()).await;
                }
            }
        }

        Err(ClusterError::NoReachableNode {
            candidates: order.len(),
        })
    }

    /// Closes every pooled handle and empties the pool.
    ///
    /// Returns the number of handles closed. Close failures are logged.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<C::Client>> = {
            let mut connections = self.lock();
            connections.drain().map(|(_, client)| client).collect()
        };
        for client in &drained {
            close_quietly(client.as_ref()).await;
        }
        drained.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<C::Client>>> {
        self.connections.lock().expect("connection pool lock poisoned")
    }

    fn pooled(&self, name: &str) -> Option<Arc<C::Client>> {
        self.lock().get(name).cloned()
    }

    /// Evicts random entries until there is room for one more handle.
    async fn make_room(&self) {
        let victims = {
            let mut connections = self.lock();
            self.evict_locked(&mut connections)
        };
        for victim in &victims {
            debug!(node = %victim.addr(), "evicting connection, pool at capacity");
            close_quietly(victim.as_ref()).await;
        }
    }

    /// Inserts a freshly opened handle.
    ///
    /// If a concurrent caller registered a handle for the same node first,
    /// that one is kept and ours is closed, so callers converge on one
    /// handle per node.
    async fn register(&self, name: String, client: Arc<C::Client>) -> Arc<C::Client> {
        let (winner, mut to_close) = {
            let mut connections = self.lock();
            if let Some(existing) = connections.get(&name) {
                (Arc::clone(existing), vec![client])
            } else {
                let victims = self.evict_locked(&mut connections);
                connections.insert(name, Arc::clone(&client));
                (client, victims)
            }
        };
        for stale in to_close.drain(..) {
            close_quietly(stale.as_ref()).await;
        }
        winner
    }

    /// Drops a handle that turned out to be unusable and closes it.
    ///
    /// The pool entry is only removed if it is still this very handle; a
    /// replacement opened concurrently stays. Returns true if an entry
    /// was removed.
    pub async fn discard(&self, client: &Arc<C::Client>) -> bool {
        let name = client.addr().name();
        let removed = {
            let mut connections = self.lock();
            let same = connections
                .get(&name)
                .is_some_and(|pooled| Arc::ptr_eq(pooled, client));
            if same {
                connections.remove(&name);
            }
            same
        };
        close_quietly(client.as_ref()).await;
        removed
    }

    fn evict_locked(
        &self,
        connections: &mut HashMap<String, Arc<C::Client>>,
    ) -> Vec<Arc<C::Client>> {
        let mut victims = Vec::new();
        while connections.len() >= self.max_connections {
            let Some(name) = connections.keys().choose(&mut rand::thread_rng()).cloned() else {
                break;
            };
            if let Some(victim) = connections.remove(&name) {
                victims.push(victim);
            }
        }
        victims
    }
}

impl<C: NodeConnector> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_connections", &self.max_connections)
            .field("open", &self.len())
            .finish_non_exhaustive()
    }
}

/// Closes a handle, logging instead of propagating failures.
async fn close_quietly<T: NodeClient + ?Sized>(client: &T) {
    if let Err(e) = client.close().await {
        warn!(node = %client.addr(), error = %e, "failed to close connection");
    }
}
