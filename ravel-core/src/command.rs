//! Commands and reply values.
//!
//! The router treats both as opaque apart from the command name and the
//! first argument, which is where the routing key lives.

use bytes::Bytes;

/// A command to run on a node: a name plus ordered binary arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Creates a command from a name and an argument list.
    #[must_use]
    pub fn with_args<I, A>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        args.into_iter().fold(Self::new(name), Self::arg)
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Returns the command name as given.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the arguments.
    #[must_use]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Returns the first argument, if any.
    #[must_use]
    pub fn first_arg(&self) -> Option<&[u8]> {
        self.args.first().map(Bytes::as_ref)
    }
}

/// A successful reply from a node.
///
/// Error replies are not values; they surface as `NodeError::Reply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absent value (null bulk or null array).
    Nil,
    /// Integer reply.
    Int(i64),
    /// Status reply such as `OK` or `PONG`.
    Simple(String),
    /// Binary-safe string reply.
    Bulk(Bytes),
    /// Array reply.
    Array(Vec<Value>),
}

impl Value {
    /// Returns true for `Nil`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the integer, if this is an integer reply.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the raw bytes of a status or bulk reply.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Simple(s) => Some(s.as_bytes()),
            Self::Bulk(b) => Some(b),
            _ => None,
        }
    }

    /// Returns a status or bulk reply as UTF-8 text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Returns the elements of an array reply.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}
