//! Simulated cluster for router tests.
//!
//! `SimulatedCluster` is a `NodeConnector` whose nodes live in memory.
//! Tests script what each node does with the commands it receives and
//! then inspect what the router actually did: which node ran which
//! command, whether `ASKING` came first, how many connections were
//! opened and closed.
//!
//! # Node Behavior
//!
//! A node answers each command with the next queued `Response` if one
//! was scripted, otherwise with its standing response if one was set,
//! otherwise with its own name as a bulk string. Replying with the name
//! lets tests see which node served a request.
//!
//! Topology queries are answered from one cluster-wide slot listing by
//! every node that serves topology.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use ravel_core::{
    Command, NodeAddr, NodeClient, NodeConnector, NodeError, NodeResult, Slot, SlotRange, Value,
};

/// What a node does with one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Answer with a value.
    Reply(Value),
    /// Answer with an error reply, verbatim.
    Error(String),
    /// Answer `MOVED <slot> <target>`.
    Moved(Slot, NodeAddr),
    /// Answer `ASK <slot> <target>`.
    Ask(Slot, NodeAddr),
    /// Break the connection mid-request.
    Drop,
    /// Break the connection and stop accepting new ones.
    Crash,
    /// Answer with bytes that do not decode.
    Garbage,
}

/// One command as seen by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    /// The node that ran the command.
    pub node: NodeAddr,
    /// The command name.
    pub command: String,
    /// Whether `ASKING` was issued on the connection right before.
    pub asked: bool,
}

/// Counters for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Connections opened.
    pub connects: usize,
    /// Connections closed by the client.
    pub closes: usize,
    /// Commands executed.
    pub executes: usize,
    /// Health probes answered or refused.
    pub pings: usize,
    /// `ASKING` directives received.
    pub askings: usize,
    /// Topology queries received.
    pub topology_queries: usize,
}

#[derive(Debug)]
struct SimNode {
    reachable: bool,
    healthy: bool,
    serves_topology: bool,
    script: VecDeque<Response>,
    standing: Option<Response>,
    stats: NodeStats,
}

impl SimNode {
    fn new() -> Self {
        Self {
            reachable: true,
            healthy: true,
            serves_topology: true,
            script: VecDeque::new(),
            standing: None,
            stats: NodeStats::default(),
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: HashMap<String, SimNode>,
    topology: Vec<SlotRange>,
    log: Vec<Executed>,
}

type SharedClusterState = Arc<Mutex<ClusterState>>;

/// In-memory cluster of scriptable nodes.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCluster {
    state: SharedClusterState,
}

impl SimulatedCluster {
    /// Creates a cluster with the given nodes, all reachable and healthy.
    #[must_use]
    pub fn new(nodes: &[NodeAddr]) -> Self {
        let cluster = Self::default();
        for node in nodes {
            cluster.add_node(node);
        }
        cluster
    }

    /// Adds a reachable, healthy node.
    pub fn add_node(&self, node: &NodeAddr) {
        self.lock().nodes.insert(node.name(), SimNode::new());
    }

    /// Sets the slot listing every topology-serving node reports.
    pub fn set_topology(&self, ranges: Vec<SlotRange>) {
        self.lock().topology = ranges;
    }

    /// Queues a one-shot response for the node's next command.
    pub fn script(&self, node: &NodeAddr, response: Response) {
        self.with_node(node, |n| n.script.push_back(response));
    }

    /// Sets the response for every command once the script runs out.
    pub fn always(&self, node: &NodeAddr, response: Response) {
        self.with_node(node, |n| n.standing = Some(response));
    }

    /// Makes the node accept or refuse new connections.
    pub fn set_reachable(&self, node: &NodeAddr, reachable: bool) {
        self.with_node(node, |n| n.reachable = reachable);
    }

    /// Makes the node pass or fail health probes.
    pub fn set_healthy(&self, node: &NodeAddr, healthy: bool) {
        self.with_node(node, |n| n.healthy = healthy);
    }

    /// Makes the node answer or refuse topology queries.
    pub fn set_serves_topology(&self, node: &NodeAddr, serves: bool) {
        self.with_node(node, |n| n.serves_topology = serves);
    }

    /// Returns the node's counters.
    ///
    /// # Panics
    ///
    /// Panics if the node was never added.
    #[must_use]
    pub fn stats(&self, node: &NodeAddr) -> NodeStats {
        self.lock()
            .nodes
            .get(&node.name())
            .map(|n| n.stats)
            .unwrap_or_else(|| panic!("unknown simulated node {node}"))
    }

    /// Returns the sum of all nodes' counters.
    #[must_use]
    pub fn total(&self) -> NodeStats {
        self.lock()
            .nodes
            .values()
            .fold(NodeStats::default(), |acc, n| NodeStats {
                connects: acc.connects + n.stats.connects,
                closes: acc.closes + n.stats.closes,
                executes: acc.executes + n.stats.executes,
                pings: acc.pings + n.stats.pings,
                askings: acc.askings + n.stats.askings,
                topology_queries: acc.topology_queries + n.stats.topology_queries,
            })
    }

    /// Returns every executed command in order.
    #[must_use]
    pub fn executed(&self) -> Vec<Executed> {
        self.lock().log.clone()
    }

    /// Returns the reply a node gives when nothing was scripted.
    #[must_use]
    pub fn default_reply(node: &NodeAddr) -> Value {
        Value::Bulk(Bytes::from(node.name()))
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("simulated cluster lock poisoned")
    }

    fn with_node(&self, node: &NodeAddr, f: impl FnOnce(&mut SimNode)) {
        let mut state = self.lock();
        let sim = state
            .nodes
            .get_mut(&node.name())
            .unwrap_or_else(|| panic!("unknown simulated node {node}"));
        f(sim);
    }
}

#[async_trait]
impl NodeConnector for SimulatedCluster {
    type Client = SimulatedClient;

    async fn connect(&self, addr: &NodeAddr) -> NodeResult<SimulatedClient> {
        let mut state = self.lock();
        match state.nodes.get_mut(&addr.name()) {
            Some(node) if node.reachable => node.stats.connects += 1,
            _ => {
                return Err(NodeError::Connect {
                    addr: addr.clone(),
                    message: "connection refused".to_string(),
                })
            }
        }
        drop(state);

        Ok(SimulatedClient {
            addr: addr.clone(),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            asking: AtomicBool::new(false),
        })
    }
}

/// A connection to a simulated node.
#[derive(Debug)]
pub struct SimulatedClient {
    addr: NodeAddr,
    state: SharedClusterState,
    closed: AtomicBool,
    /// Set by `ASKING`, consumed by the next command.
    asking: AtomicBool,
}

impl SimulatedClient {
    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("simulated cluster lock poisoned")
    }

    fn check_open(&self) -> NodeResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Closed {
                addr: self.addr.clone(),
            });
        }
        Ok(())
    }

    fn broken(&self, message: &str) -> NodeError {
        self.closed.store(true, Ordering::Release);
        NodeError::Broken {
            addr: self.addr.clone(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl NodeClient for SimulatedClient {
    fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    async fn execute(&self, command: &Command) -> NodeResult<Value> {
        self.check_open()?;
        let asked = self.asking.swap(false, Ordering::AcqRel);

        let mut state = self.lock();
        state.log.push(Executed {
            node: self.addr.clone(),
            command: command.name().to_string(),
            asked,
        });
        let node = state
            .nodes
            .get_mut(&self.addr.name())
            .expect("connected to an unknown node");
        node.stats.executes += 1;
        let response = node.script.pop_front().or_else(|| node.standing.clone());

        match response {
            None => Ok(SimulatedCluster::default_reply(&self.addr)),
            Some(Response::Reply(value)) => Ok(value),
            Some(Response::Error(message)) => Err(NodeError::Reply(message)),
            Some(Response::Moved(slot, target)) => {
                Err(NodeError::Reply(format!("MOVED {slot} {target}")))
            }
            Some(Response::Ask(slot, target)) => {
                Err(NodeError::Reply(format!("ASK {slot} {target}")))
            }
            Some(Response::Drop) => Err(self.broken("connection reset by peer")),
            Some(Response::Crash) => {
                node.reachable = false;
                Err(self.broken("node crashed"))
            }
            Some(Response::Garbage) => {
                self.closed.store(true, Ordering::Release);
                Err(NodeError::Protocol {
                    message: "invalid frame type byte 0x3f".to_string(),
                })
            }
        }
    }

    async fn ping(&self) -> NodeResult<()> {
        self.check_open()?;
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(&self.addr.name())
            .expect("connected to an unknown node");
        node.stats.pings += 1;
        if node.reachable && node.healthy {
            Ok(())
        } else {
            Err(self.broken("no PONG"))
        }
    }

    async fn asking(&self) -> NodeResult<()> {
        self.check_open()?;
        self.asking.store(true, Ordering::Release);
        let mut state = self.lock();
        if let Some(node) = state.nodes.get_mut(&self.addr.name()) {
            node.stats.askings += 1;
        }
        Ok(())
    }

    async fn cluster_slots(&self) -> NodeResult<Vec<SlotRange>> {
        self.check_open()?;
        let mut state = self.lock();
        let topology = state.topology.clone();
        let node = state
            .nodes
            .get_mut(&self.addr.name())
            .expect("connected to an unknown node");
        node.stats.topology_queries += 1;
        if node.serves_topology {
            Ok(topology)
        } else {
            Err(NodeError::Reply(
                "ERR This instance has cluster support disabled".to_string(),
            ))
        }
    }

    async fn close(&self) -> NodeResult<()> {
        self.closed.store(true, Ordering::Release);
        let mut state = self.lock();
        if let Some(node) = state.nodes.get_mut(&self.addr.name()) {
            node.stats.closes += 1;
        }
        Ok(())
    }
}

/// Returns `127.0.0.1:<port>`.
#[must_use]
pub fn node(port: u16) -> NodeAddr {
    NodeAddr::new("127.0.0.1", port)
}

/// Returns the inclusive slot range `start..=end` owned by `owner`.
///
/// # Panics
///
/// Panics if `start > end` or either is out of range.
#[must_use]
pub fn range(start: u16, end: u16, owner: &NodeAddr) -> SlotRange {
    SlotRange::new(Slot::new(start), Slot::new(end), owner.clone()).expect("valid slot range")
}

/// Returns a key that hashes to `slot`.
#[must_use]
pub fn key_for_slot(slot: Slot) -> String {
    (0u64..)
        .map(|i| format!("key:{i}"))
        .find(|key| ravel_core::key_slot(key.as_bytes()) == slot)
        .expect("every slot is reachable by some key")
}
