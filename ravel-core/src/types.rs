//! Strongly-typed values for cluster routing.
//!
//! `NodeAddr` locates a shard-owning process, `Slot` names one of the
//! fixed key-space partitions, and `SlotRange` ties a contiguous run of
//! slots to its owner as reported by the cluster.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::limits::{DEFAULT_PORT, SLOT_COUNT};

/// Address of a node process in the cluster.
///
/// A pure locator: it owns no network resources. Equality, hashing and
/// the pooling key (`name`) depend only on host and port.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddr {
    host: String,
    port: u16,
}

impl NodeAddr {
    /// Creates a node address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the host part.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the `host:port` name used as the pool and candidate key.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddr({}:{})", self.host, self.port)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = Error;

    /// Parses `host:port`, `host` (default port) or `[v6-host]:port`.
    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        let invalid = |reason| Error::InvalidAddress {
            input: s.to_string(),
            reason,
        };

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| invalid("unclosed '['"))?;
            match tail {
                "" => (host, None),
                _ => {
                    let port = tail
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after ']'"))?;
                    (host, Some(port))
                }
            }
        } else {
            match input.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            None => DEFAULT_PORT,
        };
        if port == 0 {
            return Err(invalid("port must be positive"));
        }

        Ok(Self::new(host, port))
    }
}

/// One of the `SLOT_COUNT` partitions of the key space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Slot(u16);

impl Slot {
    /// Creates a slot.
    ///
    /// # Panics
    /// Panics if `value >= SLOT_COUNT`.
    #[inline]
    #[must_use]
    pub const fn new(value: u16) -> Self {
        assert!(value < SLOT_COUNT, "slot out of range");
        Self(value)
    }

    /// Creates a slot from an untrusted number, such as one parsed off the wire.
    ///
    /// # Errors
    /// Returns `Error::SlotOutOfRange` if `value >= SLOT_COUNT`.
    pub fn try_new(value: u64) -> Result<Self> {
        u16::try_from(value)
            .ok()
            .filter(|v| *v < SLOT_COUNT)
            .map(Self)
            .ok_or(Error::SlotOutOfRange { slot: value })
    }

    /// Returns the raw slot number.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Returns the slot as a table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates every slot in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..SLOT_COUNT).map(Self)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot({})", self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Slot> for u16 {
    fn from(slot: Slot) -> Self {
        slot.get()
    }
}

/// A contiguous, inclusive run of slots and the node that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// First slot of the range (inclusive).
    pub start: Slot,
    /// Last slot of the range (inclusive).
    pub end: Slot,
    /// Node currently serving every slot in the range.
    pub owner: NodeAddr,
}

impl SlotRange {
    /// Creates a slot range.
    ///
    /// # Errors
    /// Returns `Error::InvertedRange` if `start > end`.
    pub fn new(start: Slot, end: Slot, owner: NodeAddr) -> Result<Self> {
        if start > end {
            return Err(Error::InvertedRange {
                start: start.get(),
                end: end.get(),
            });
        }
        Ok(Self { start, end, owner })
    }

    /// Returns true if the range contains the given slot.
    #[must_use]
    pub fn contains(&self, slot: Slot) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Returns the number of slots in the range.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end.index() - self.start.index() + 1
    }

    /// Always false: a range holds at least one slot.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Iterates the slots of the range.
    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        (self.start.get()..=self.end.get()).map(Slot)
    }
}
