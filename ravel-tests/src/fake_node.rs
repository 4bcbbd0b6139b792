//! In-process RESP server standing in for a cluster node.
//!
//! `FakeNode` listens on `127.0.0.1:0` and understands just enough of
//! the protocol to exercise the TCP client: `PING`, `ASKING`, `QUIT`,
//! `CLUSTER SLOTS`, `GET` and `SET`. Keys can be given a canned error
//! reply to simulate redirections, and `DROP` makes the server hang up
//! without answering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use ravel_core::{NodeAddr, SlotRange};
use ravel_runtime::codec::{decode_frame, encode_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct FakeState {
    data: HashMap<Bytes, Bytes>,
    slots: Vec<SlotRange>,
    /// Canned error replies by key.
    redirects: HashMap<Bytes, String>,
    /// Command names in arrival order.
    received: Vec<String>,
    /// When set, commands are recorded but never answered.
    silent: bool,
}

type SharedFakeState = Arc<Mutex<FakeState>>;

/// A fake node listening on a loopback port.
#[derive(Debug)]
pub struct FakeNode {
    addr: NodeAddr,
    state: SharedFakeState,
    accept_task: JoinHandle<()>,
}

impl FakeNode {
    /// Starts listening on an ephemeral loopback port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local = listener.local_addr()?;
        let addr = NodeAddr::new(local.ip().to_string(), local.port());
        let state = SharedFakeState::default();

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Ok(Self {
            addr,
            state,
            accept_task,
        })
    }

    /// Returns the node's address.
    #[must_use]
    pub const fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Sets the `CLUSTER SLOTS` answer.
    pub fn set_slots(&self, slots: Vec<SlotRange>) {
        self.lock().slots = slots;
    }

    /// Answers every command on `key` with the error reply `reply`.
    pub fn redirect(&self, key: &str, reply: impl Into<String>) {
        self.lock()
            .redirects
            .insert(Bytes::copy_from_slice(key.as_bytes()), reply.into());
    }

    /// Stops or resumes answering.
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Returns the names of all commands received so far.
    #[must_use]
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake node lock poisoned")
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// What to do after handling one command.
enum Next {
    Reply(Frame),
    Silence,
    Hangup,
    ReplyAndHangup(Frame),
}

async fn serve(mut stream: TcpStream, state: SharedFakeState) {
    let mut buffer = BytesMut::with_capacity(4096);
    loop {
        match stream.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        loop {
            let (frame, consumed) = match decode_frame(&buffer) {
                Ok(decoded) => decoded,
                Err(e) if e.is_incomplete() => break,
                Err(e) => {
                    debug!(error = %e, "fake node got garbage");
                    return;
                }
            };
            let _ = buffer.split_to(consumed);

            let mut out = BytesMut::new();
            match handle(&state, frame) {
                Next::Reply(reply) => encode_frame(&reply, &mut out),
                Next::Silence => continue,
                Next::Hangup => return,
                Next::ReplyAndHangup(reply) => {
                    encode_frame(&reply, &mut out);
                    let _ = stream.write_all(&out).await;
                    return;
                }
            }
            if stream.write_all(&out).await.is_err() {
                return;
            }
        }
    }
}

fn handle(state: &SharedFakeState, frame: Frame) -> Next {
    let Frame::Array(Some(items)) = frame else {
        return Next::Reply(Frame::Error("ERR expected an array".to_string()));
    };
    let args: Vec<Bytes> = items
        .into_iter()
        .filter_map(|item| match item {
            Frame::Bulk(Some(bytes)) => Some(bytes),
            _ => None,
        })
        .collect();
    let Some((name, args)) = args.split_first() else {
        return Next::Reply(Frame::Error("ERR empty command".to_string()));
    };
    let name = String::from_utf8_lossy(name).to_uppercase();

    let mut state = state.lock().expect("fake node lock poisoned");
    state.received.push(name.clone());
    if state.silent {
        return Next::Silence;
    }

    if let Some(reply) = args.first().and_then(|key| state.redirects.get(key)) {
        return Next::Reply(Frame::Error(reply.clone()));
    }

    let ok = || Frame::Simple("OK".to_string());
    match (name.as_str(), args) {
        ("PING", []) => Next::Reply(Frame::Simple("PONG".to_string())),
        ("ASKING", []) => Next::Reply(ok()),
        ("QUIT", []) => Next::ReplyAndHangup(ok()),
        ("DROP", _) => Next::Hangup,
        ("CLUSTER", [sub]) if sub.eq_ignore_ascii_case(b"SLOTS") => {
            Next::Reply(slots_frame(&state.slots))
        }
        ("GET", [key]) => Next::Reply(Frame::Bulk(state.data.get(key).cloned())),
        ("SET", [key, value]) => {
            state.data.insert(key.clone(), value.clone());
            Next::Reply(ok())
        }
        _ => Next::Reply(Frame::Error(format!("ERR unknown command '{name}'"))),
    }
}

fn slots_frame(slots: &[SlotRange]) -> Frame {
    let entries = slots
        .iter()
        .map(|range| {
            let owner = Frame::Array(Some(vec![
                Frame::Bulk(Some(Bytes::copy_from_slice(range.owner.host().as_bytes()))),
                Frame::Integer(i64::from(range.owner.port())),
                Frame::Bulk(Some(Bytes::from_static(b"0000000000000000000000000000000000000000"))),
            ]));
            Frame::Array(Some(vec![
                Frame::Integer(i64::from(range.start.get())),
                Frame::Integer(i64::from(range.end.get())),
                owner,
            ]))
        })
        .collect();
    Frame::Array(Some(entries))
}
