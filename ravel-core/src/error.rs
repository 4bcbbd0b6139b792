//! Error types for constructing core values.
//!
//! These are the errors of parsing and validating addresses, slots and
//! slot ranges. Failures talking to a node are `NodeError`s instead.

use std::fmt;

/// The result type for core value construction.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building core values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A node address could not be parsed.
    InvalidAddress {
        /// The input that failed to parse.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A slot number is outside `[0, SLOT_COUNT)`.
    SlotOutOfRange {
        /// The offending slot number.
        slot: u64,
    },

    /// A slot range has its start after its end.
    InvertedRange {
        /// Range start.
        start: u16,
        /// Range end.
        end: u16,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAddress { input, reason } => {
                write!(f, "invalid node address '{input}': {reason}")
            }
            Self::SlotOutOfRange { slot } => {
                write!(f, "slot {slot} out of range (max {})", crate::limits::SLOT_MAX)
            }
            Self::InvertedRange { start, end } => {
                write!(f, "slot range start {start} is after end {end}")
            }
        }
    }
}

impl std::error::Error for Error {}
