//! Slot map - mapping of hash slots to the nodes that own them.
//!
//! The map is shared by every in-flight request of a client and is
//! mutated without a lock:
//!
//! - `rebuild` builds a fresh table and swaps it in atomically, so a
//!   reader sees either the old table or the new one, never a mix.
//! - `patch` overwrites one slot of the current table atomically.
//!
//! Writers race last-write-wins. A patch that lands on a table that is
//! being replaced by a concurrent rebuild is lost; the rebuilt table is
//! authoritative anyway.

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use ravel_core::limits::SLOT_COUNT;
use ravel_core::{NodeAddr, Slot, SlotRange};

/// One owner cell per slot.
struct SlotTable {
    owners: Box<[ArcSwapOption<NodeAddr>]>,
}

impl SlotTable {
    fn from_owners(owners: Vec<Option<Arc<NodeAddr>>>) -> Self {
        debug_assert_eq!(owners.len(), usize::from(SLOT_COUNT));
        Self {
            owners: owners.into_iter().map(ArcSwapOption::new).collect(),
        }
    }

    fn empty() -> Self {
        Self::from_owners(vec![None; usize::from(SLOT_COUNT)])
    }
}

/// Maps each of the `SLOT_COUNT` slots to its believed owner.
///
/// Slots without a known owner are legal; the router sends their keys to
/// a random healthy node and lets the cluster redirect.
pub struct SlotMap {
    table: ArcSwap<SlotTable>,
}

impl SlotMap {
    /// Creates a map with no owners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(SlotTable::empty()),
        }
    }

    /// Replaces the whole map with the given assignments.
    ///
    /// Slots outside every range end up without an owner. When ranges
    /// overlap, the later range wins.
    pub fn rebuild(&self, ranges: &[SlotRange]) {
        let mut owners: Vec<Option<Arc<NodeAddr>>> = vec![None; usize::from(SLOT_COUNT)];
        for range in ranges {
            let owner = Arc::new(range.owner.clone());
            for slot in range.slots() {
                owners[slot.index()] = Some(Arc::clone(&owner));
            }
        }
        self.table.store(Arc::new(SlotTable::from_owners(owners)));
    }

    /// Returns the believed owner of a slot.
    #[must_use]
    pub fn lookup(&self, slot: Slot) -> Option<Arc<NodeAddr>> {
        self.table.load().owners[slot.index()].load_full()
    }

    /// Overwrites the owner of a single slot.
    pub fn patch(&self, slot: Slot, owner: NodeAddr) {
        self.table.load().owners[slot.index()].store(Some(Arc::new(owner)));
    }

    /// Returns the number of slots with a known owner.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.table
            .load()
            .owners
            .iter()
            .filter(|cell| cell.load().is_some())
            .count()
    }

    /// Returns true if no slot has a known owner.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.load().owners.iter().all(|cell| cell.load().is_none())
    }
}

impl Default for SlotMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SlotMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotMap")
            .field("assigned", &self.assigned_count())
            .finish()
    }
}
