//! Routing key extraction.

use ravel_core::Command;

/// Commands that never carry a single routing key.
const KEYLESS_COMMANDS: &[&str] = &[
    "info", "multi", "exec", "discard", "slaveof", "replicaof", "config", "shutdown",
];

/// Returns the key a command should be routed by.
///
/// The key is the first argument. Administrative and transaction
/// commands, and commands without arguments, have no routing key.
#[must_use]
pub fn routing_key(command: &Command) -> Option<&[u8]> {
    if KEYLESS_COMMANDS
        .iter()
        .any(|name| command.name().eq_ignore_ascii_case(name))
    {
        return None;
    }
    command.first_arg()
}
