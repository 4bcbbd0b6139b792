//! `CLUSTER SLOTS` reply parsing.
//!
//! The reply is an array with one entry per contiguous slot range:
//!
//! ```text
//! 1) 1) (integer) 0            start slot
//!    2) (integer) 5460         end slot
//!    3) 1) "10.0.0.1"          primary host
//!       2) (integer) 7000      primary port
//!       3) "09dbe9..."         node id (optional)
//!    4) ...                    replicas (ignored)
//! ```
//!
//! An empty host means "the node you asked".

use ravel_core::{NodeAddr, NodeError, NodeResult, Slot, SlotRange, Value};

/// Parses a `CLUSTER SLOTS` reply into primary-owned slot ranges.
///
/// `queried` fills in empty host fields.
///
/// # Errors
///
/// Returns `NodeError::Protocol` if the reply does not have the expected
/// shape.
pub fn parse_cluster_slots(reply: &Value, queried: &NodeAddr) -> NodeResult<Vec<SlotRange>> {
    let entries = reply
        .as_array()
        .ok_or_else(|| malformed("reply is not an array"))?;

    entries
        .iter()
        .map(|entry| parse_entry(entry, queried))
        .collect()
}

fn parse_entry(entry: &Value, queried: &NodeAddr) -> NodeResult<SlotRange> {
    let fields = entry
        .as_array()
        .ok_or_else(|| malformed("range entry is not an array"))?;
    let [start, end, primary, ..] = fields else {
        return Err(malformed("range entry has fewer than three fields"));
    };

    let start = parse_slot(start)?;
    let end = parse_slot(end)?;
    let owner = parse_node(primary, queried)?;

    SlotRange::new(start, end, owner).map_err(|e| malformed(&e.to_string()))
}

fn parse_slot(value: &Value) -> NodeResult<Slot> {
    let n = value.as_int().ok_or_else(|| malformed("slot is not an integer"))?;
    let n = u64::try_from(n).map_err(|_| malformed("slot is negative"))?;
    Slot::try_new(n).map_err(|e| malformed(&e.to_string()))
}

fn parse_node(value: &Value, queried: &NodeAddr) -> NodeResult<NodeAddr> {
    let fields = value
        .as_array()
        .ok_or_else(|| malformed("node entry is not an array"))?;
    let [host, port, ..] = fields else {
        return Err(malformed("node entry has fewer than two fields"));
    };

    let host = host.as_str().ok_or_else(|| malformed("host is not a string"))?;
    let port = port
        .as_int()
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| malformed("port is not a valid port number"))?;

    let host = if host.is_empty() { queried.host() } else { host };
    Ok(NodeAddr::new(host, port))
}

fn malformed(message: &str) -> NodeError {
    NodeError::Protocol {
        message: format!("malformed CLUSTER SLOTS reply: {message}"),
    }
}
