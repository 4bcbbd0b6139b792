//! Protocol constants and default bounds.
//!
//! Every retry loop and every pool in ravel is bounded. The defaults here
//! are referenced by the configuration types of the other crates.

/// Number of hash slots the key space is partitioned into.
pub const SLOT_COUNT: u16 = 16_384;

/// Highest valid slot number.
pub const SLOT_MAX: u16 = SLOT_COUNT - 1;

/// Port assumed for a node address given without one.
pub const DEFAULT_PORT: u16 = 6379;

/// Default redirection budget for one logical request.
pub const REDIRECTS_MAX_DEFAULT: u32 = 16;

/// Default cap on simultaneously open pooled connections.
pub const CONNECTIONS_MAX_DEFAULT: usize = 16;

/// Default pause before a retry once half the budget is spent (milliseconds).
pub const RETRY_BACKOFF_MS_DEFAULT: u64 = 100;
