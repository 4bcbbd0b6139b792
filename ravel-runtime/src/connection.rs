//! TCP node client.
//!
//! One `TcpNodeClient` wraps one TCP connection. The connection is shared
//! by concurrent requests, so each request holds the stream for its whole
//! round trip; replies therefore always pair with their requests.
//!
//! # Failure Handling
//!
//! Any I/O error, timeout, or undecodable reply leaves the stream at an
//! unknown position, so the client marks itself broken and every later
//! request fails fast with `NodeError::Closed`. Error replies from the
//! server are not failures of the connection.
//!
//! A request whose future is dropped mid-exchange (an outer timeout, an
//! aborted task) also breaks the client: its reply may still arrive and
//! would otherwise be read by the next request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use ravel_core::{
    Command, NodeAddr, NodeClient, NodeConnector, NodeError, NodeResult, SlotRange, Value,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cluster_slots::parse_cluster_slots;
use crate::codec::{decode_frame, encode_command, CodecError, Frame};
use crate::config::ConnectionConfig;

/// Time allowed for the goodbye `QUIT` on close.
const QUIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Stream plus the bytes read but not yet decoded.
struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Connection {
    /// Writes one request and reads exactly one reply frame.
    async fn round_trip(&mut self, request: &[u8]) -> Result<Frame, CodecError> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;

        loop {
            match decode_frame(&self.buffer) {
                Ok((frame, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(frame);
                }
                Err(e) if e.is_incomplete() => {}
                Err(e) => return Err(e),
            }

            let bytes_read = self.stream.read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return Err(CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                )));
            }
        }
    }
}

/// Breaks the client on drop unless the exchange completed.
struct ExchangeGuard<'a> {
    broken: &'a AtomicBool,
    completed: bool,
}

impl<'a> ExchangeGuard<'a> {
    const fn new(broken: &'a AtomicBool) -> Self {
        Self {
            broken,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.broken.store(true, Ordering::Release);
        }
    }
}

/// A connection to one node.
pub struct TcpNodeClient {
    addr: NodeAddr,
    io_timeout: Duration,
    connection: Mutex<Connection>,
    /// Set once the stream is unusable or closed.
    broken: AtomicBool,
}

impl TcpNodeClient {
    fn new(addr: NodeAddr, stream: TcpStream, config: &ConnectionConfig) -> Self {
        Self {
            addr,
            io_timeout: config.io_timeout,
            connection: Mutex::new(Connection {
                stream,
                buffer: BytesMut::with_capacity(config.read_buffer_bytes),
            }),
            broken: AtomicBool::new(false),
        }
    }

    /// Returns true once the connection is unusable.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Sends a command and returns the raw reply frame.
    #[allow(clippy::significant_drop_tightening)]
    async fn request(&self, command: &Command) -> NodeResult<Frame> {
        if self.is_broken() {
            return Err(self.closed());
        }

        let request = encode_command(command);
        let mut connection = self.connection.lock().await;
        // A concurrent request may have broken the stream while we waited.
        if self.is_broken() {
            return Err(self.closed());
        }

        let guard = ExchangeGuard::new(&self.broken);
        match tokio::time::timeout(self.io_timeout, connection.round_trip(&request)).await {
            Ok(Ok(frame)) => {
                guard.complete();
                Ok(frame)
            }
            Ok(Err(CodecError::Io(e))) => Err(self.fail(e.to_string())),
            Ok(Err(e)) => {
                self.broken.store(true, Ordering::Release);
                Err(NodeError::Protocol {
                    message: e.to_string(),
                })
            }
            Err(_) => Err(self.fail(format!(
                "no reply within {}ms",
                self.io_timeout.as_millis()
            ))),
        }
    }

    /// Sends a command and converts the reply, mapping error replies to
    /// `NodeError::Reply`.
    async fn call(&self, command: &Command) -> NodeResult<Value> {
        self.request(command).await?.into_reply().map_err(NodeError::Reply)
    }

    /// Sends a command that must answer with a specific status.
    async fn expect_status(&self, command: &Command, status: &str) -> NodeResult<()> {
        match self.call(command).await? {
            Value::Simple(s) if s == status => Ok(()),
            other => Err(NodeError::Protocol {
                message: format!("expected {status} to {}, got {other:?}", command.name()),
            }),
        }
    }

    fn fail(&self, message: String) -> NodeError {
        self.broken.store(true, Ordering::Release);
        debug!(node = %self.addr, error = %message, "connection broken");
        NodeError::Broken {
            addr: self.addr.clone(),
            message,
        }
    }

    fn closed(&self) -> NodeError {
        NodeError::Closed {
            addr: self.addr.clone(),
        }
    }
}

#[async_trait]
impl NodeClient for TcpNodeClient {
    fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    async fn execute(&self, command: &Command) -> NodeResult<Value> {
        self.call(command).await
    }

    async fn ping(&self) -> NodeResult<()> {
        self.expect_status(&Command::new("PING"), "PONG").await
    }

    async fn asking(&self) -> NodeResult<()> {
        self.expect_status(&Command::new("ASKING"), "OK").await
    }

    async fn cluster_slots(&self) -> NodeResult<Vec<SlotRange>> {
        let reply = self.call(&Command::new("CLUSTER").arg("SLOTS")).await?;
        parse_cluster_slots(&reply, &self.addr)
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn close(&self) -> NodeResult<()> {
        if self.broken.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut connection = self.connection.lock().await;
        let quit = encode_command(&Command::new("QUIT"));
        let said_goodbye = tokio::time::timeout(QUIT_TIMEOUT, connection.round_trip(&quit)).await;
        // Best effort; the peer may already be gone.
        let _ = connection.stream.shutdown().await;

        match said_goodbye {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(NodeError::Broken {
                addr: self.addr.clone(),
                message: format!("QUIT failed: {e}"),
            }),
            Err(_) => Err(NodeError::Broken {
                addr: self.addr.clone(),
                message: "QUIT timed out".to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for TcpNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpNodeClient")
            .field("addr", &self.addr)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

/// Opens TCP connections to nodes.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: ConnectionConfig,
}

impl TcpConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Returns the connection configuration.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl NodeConnector for TcpConnector {
    type Client = TcpNodeClient;

    /// Connects with timeout.
    ///
    /// The address is resolved at connection time to support hostnames.
    async fn connect(&self, addr: &NodeAddr) -> NodeResult<TcpNodeClient> {
        let target = (addr.host().to_string(), addr.port());
        let connect_future = async {
            let mut addrs = tokio::net::lookup_host(target).await?;
            let resolved = addrs.next().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no addresses found for {addr}"),
                )
            })?;
            TcpStream::connect(resolved).await
        };

        let connect_error = |message: String| NodeError::Connect {
            addr: addr.clone(),
            message,
        };

        let stream = match tokio::time::timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(connect_error(e.to_string())),
            Err(_) => return Err(connect_error("connection timed out".to_string())),
        };
        // Disable Nagle's algorithm for lower latency.
        stream
            .set_nodelay(true)
            .map_err(|e| connect_error(e.to_string()))?;

        debug!(node = %addr, "connected");
        Ok(TcpNodeClient::new(addr.clone(), stream, &self.config))
    }
}
