//! Redirection replies and attempt outcomes.
//!
//! A redirection is syntactically an error reply but semantically a retry
//! instruction. Each attempt's result is classified into an `Attempt` so
//! the router handles every outcome with one exhaustive match.
//!
//! # Payload Format
//!
//! ```text
//! MOVED <slot> <host>:<port>     slot ownership has moved for good
//! ASK   <slot> <host>:<port>     this key is mid-migration, ask once
//! ```

use std::fmt;

use ravel_core::{NodeAddr, NodeError, NodeResult, Slot, Value};

/// Kind of redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Ownership has moved permanently.
    Moved,
    /// The key is being migrated; the target serves it after `ASKING`.
    Ask,
}

impl RedirectKind {
    const fn code(self) -> &'static str {
        match self {
            Self::Moved => "MOVED",
            Self::Ask => "ASK",
        }
    }
}

/// A parsed redirection reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Kind of redirection.
    pub kind: RedirectKind,
    /// The slot the redirection is about.
    pub slot: Slot,
    /// The node to retry against.
    pub target: NodeAddr,
}

impl Redirect {
    /// Parses an error reply as a redirection.
    ///
    /// Returns `None` if the reply is not a well-formed redirection. A
    /// leading `-` on the code token is tolerated.
    #[must_use]
    pub fn parse(message: &str) -> Option<Self> {
        let mut tokens = message.split_whitespace();
        let code = tokens.next()?;
        let kind = match code.strip_prefix('-').unwrap_or(code) {
            "MOVED" => RedirectKind::Moved,
            "ASK" => RedirectKind::Ask,
            _ => return None,
        };
        let slot = tokens.next()?.parse::<u64>().ok()?;
        let slot = Slot::try_new(slot).ok()?;
        let target = tokens.next()?.parse::<NodeAddr>().ok()?;

        Some(Self { kind, slot, target })
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.kind.code(), self.slot, self.target)
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug)]
pub enum Attempt {
    /// The node answered.
    Success(Value),
    /// The node redirected us.
    Redirect(Redirect),
    /// The connection was unusable; try another node.
    Connectivity(NodeError),
    /// Any other failure; not retried.
    Fatal(NodeError),
}

impl Attempt {
    /// Classifies a node result.
    #[must_use]
    pub fn from_result(result: NodeResult<Value>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::from_error(err),
        }
    }

    /// Classifies a node error.
    #[must_use]
    pub fn from_error(err: NodeError) -> Self {
        if err.is_connectivity() {
            return Self::Connectivity(err);
        }
        match err {
            NodeError::Reply(message) => match Redirect::parse(&message) {
                Some(redirect) => Self::Redirect(redirect),
                None => Self::Fatal(NodeError::Reply(message)),
            },
            other => Self::Fatal(other),
        }
    }
}
