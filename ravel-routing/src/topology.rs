//! Topology loader - learns slot ownership from the cluster.
//!
//! A load walks the candidate nodes in order (seeds first) and asks each
//! for its authoritative slot listing over a short-lived connection that
//! bypasses the pool. The first answer wins: the slot map is rebuilt from
//! it and every owner it names joins the candidate set.
//!
//! Loading soft-fails. If no candidate answers, the slot map is left as
//! it was and the client keeps routing on whatever it has, falling back
//! to random nodes for unknown slots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ravel_core::{NodeAddr, NodeClient, NodeConnector, NodeResult, SlotRange};
use tracing::{info, warn};

use crate::candidates::Candidates;
use crate::slot_map::SlotMap;

/// Owns the slot map and candidate set, and refreshes them.
#[derive(Debug)]
pub struct TopologyLoader<C> {
    connector: Arc<C>,
    slots: SlotMap,
    candidates: Candidates,
    /// Set when the slot map is known or suspected to be stale.
    refresh_needed: AtomicBool,
}

impl<C: NodeConnector> TopologyLoader<C> {
    /// Creates a loader with an empty slot map.
    ///
    /// The map starts out stale, so the first routed request loads it if
    /// nobody called `load` before.
    #[must_use]
    pub fn new(connector: Arc<C>, seeds: impl IntoIterator<Item = NodeAddr>) -> Self {
        Self {
            connector,
            slots: SlotMap::new(),
            candidates: Candidates::new(seeds),
            refresh_needed: AtomicBool::new(true),
        }
    }

    /// Loads the slot map from the first candidate that answers.
    ///
    /// Returns true if the map was rebuilt. On false, every candidate
    /// failed and the previous map is untouched.
    pub async fn load(&self) -> bool {
        let candidates = self.candidates.snapshot();
        for addr in candidates.iter() {
            match self.query(addr).await {
                Ok(ranges) => {
                    self.slots.rebuild(&ranges);
                    self.candidates
                        .merge(ranges.into_iter().map(|range| range.owner));
                    self.refresh_needed.store(false, Ordering::Release);
                    info!(
                        node = %addr,
                        assigned = self.slots.assigned_count(),
                        candidates = self.candidates.len(),
                        "loaded cluster topology"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(node = %addr, error = %e, "topology query failed");
                }
            }
        }

        warn!(
            candidates = candidates.len(),
            "topology unavailable, keeping previous slot map"
        );
        false
    }

    /// Returns the slot map.
    #[must_use]
    pub const fn slot_map(&self) -> &SlotMap {
        &self.slots
    }

    /// Returns the candidate set.
    #[must_use]
    pub const fn candidates(&self) -> &Candidates {
        &self.candidates
    }

    /// Returns true if the next request should reload topology first.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.refresh_needed.load(Ordering::Acquire)
    }

    /// Flags the slot map as stale.
    pub fn mark_stale(&self) {
        self.refresh_needed.store(true, Ordering::Release);
    }

    /// Runs one topology query on a throwaway connection.
    async fn query(&self, addr: &NodeAddr) -> NodeResult<Vec<SlotRange>> {
        let client = self.connector.connect(addr).await?;
        let result = client.cluster_slots().await;
        if let Err(e) = client.close().await {
            warn!(node = %addr, error = %e, "failed to close topology connection");
        }
        result
    }
}
