//! Candidate node set.
//!
//! Every node the client is willing to try when a slot's owner is unknown
//! or unreachable: the configured seeds first, then every node discovered
//! by topology loads, de-duplicated by name. The set only grows within a
//! session.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use ravel_core::NodeAddr;

/// Append-only, de-duplicated list of candidate nodes.
#[derive(Debug)]
pub struct Candidates {
    nodes: ArcSwap<Vec<NodeAddr>>,
}

impl Candidates {
    /// Creates the set from the seed nodes.
    #[must_use]
    pub fn new(seeds: impl IntoIterator<Item = NodeAddr>) -> Self {
        let seeds: Vec<NodeAddr> = seeds.into_iter().collect();
        Self {
            nodes: ArcSwap::from_pointee(merged(&[], &seeds)),
        }
    }

    /// Returns the current candidates in order: seeds, then discoveries.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<NodeAddr>> {
        self.nodes.load_full()
    }

    /// Appends nodes not already present.
    pub fn merge(&self, discovered: impl IntoIterator<Item = NodeAddr>) {
        let discovered: Vec<NodeAddr> = discovered.into_iter().collect();
        self.nodes.rcu(|current| merged(current, &discovered));
    }

    /// Returns the number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    /// Returns true if there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.load().is_empty()
    }
}

/// Concatenates `existing` and `extra`, keeping the first occurrence of each name.
fn merged(existing: &[NodeAddr], extra: &[NodeAddr]) -> Vec<NodeAddr> {
    let mut seen = HashSet::with_capacity(existing.len() + extra.len());
    existing
        .iter()
        .chain(extra)
        .filter(|node| seen.insert(node.name()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeAddr {
        name.parse().unwrap()
    }

    #[test]
    fn test_seeds_are_deduplicated() {
        let candidates = Candidates::new([node("a:1"), node("b:2"), node("a:1")]);
        assert_eq!(*candidates.snapshot(), vec![node("a:1"), node("b:2")]);
    }

    #[test]
    fn test_merge_appends_after_seeds() {
        let candidates = Candidates::new([node("a:1"), node("b:2")]);
        candidates.merge([node("c:3"), node("a:1"), node("d:4"), node("c:3")]);

        assert_eq!(
            *candidates.snapshot(),
            vec![node("a:1"), node("b:2"), node("c:3"), node("d:4")]
        );
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn test_merge_never_shrinks() {
        let candidates = Candidates::new([node("a:1")]);
        candidates.merge([node("b:2")]);
        candidates.merge(Vec::new());
        candidates.merge([node("c:3")]);

        assert_eq!(
            *candidates.snapshot(),
            vec![node("a:1"), node("b:2"), node("c:3")]
        );
    }

    #[test]
    fn test_snapshot_is_stable_across_merge() {
        let candidates = Candidates::new([node("a:1")]);
        let before = candidates.snapshot();
        candidates.merge([node("b:2")]);

        assert_eq!(before.len(), 1);
        assert_eq!(candidates.snapshot().len(), 2);
    }

    #[test]
    fn test_empty() {
        let candidates = Candidates::new(Vec::new());
        assert!(candidates.is_empty());
    }
}
