//! Stub node client shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ravel_core::{
    Command, NodeAddr, NodeClient, NodeConnector, NodeError, NodeResult, SlotRange, Value,
};

pub fn node(port: u16) -> NodeAddr {
    NodeAddr::new("127.0.0.1", port)
}

#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub topology_queries: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct StubClient {
    addr: NodeAddr,
    healthy: bool,
    topology: Option<Vec<SlotRange>>,
    counters: Arc<Counters>,
}

#[async_trait]
impl NodeClient for StubClient {
    fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    async fn execute(&self, _command: &Command) -> NodeResult<Value> {
        Ok(Value::Nil)
    }

    async fn ping(&self) -> NodeResult<()> {
        if self.healthy {
            Ok(())
        } else {
            Err(NodeError::Broken {
                addr: self.addr.clone(),
                message: "no pong".to_string(),
            })
        }
    }

    async fn asking(&self) -> NodeResult<()> {
        Ok(())
    }

    async fn cluster_slots(&self) -> NodeResult<Vec<SlotRange>> {
        self.counters.topology_queries.fetch_add(1, Ordering::SeqCst);
        self.topology
            .clone()
            .ok_or_else(|| NodeError::Reply("ERR This instance has cluster support disabled".into()))
    }

    async fn close(&self) -> NodeResult<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct StubConnector {
    pub unreachable: HashSet<String>,
    pub unhealthy: HashSet<String>,
    pub topology: Mutex<HashMap<String, Vec<SlotRange>>>,
    pub counters: Arc<Counters>,
}

impl StubConnector {
    pub fn unreachable(nodes: &[NodeAddr]) -> Self {
        Self {
            unreachable: nodes.iter().map(NodeAddr::name).collect(),
            ..Self::default()
        }
    }

    pub fn serve_topology(&self, addr: &NodeAddr, ranges: Vec<SlotRange>) {
        self.topology
            .lock()
            .expect("stub lock poisoned")
            .insert(addr.name(), ranges);
    }
}

#[async_trait]
impl NodeConnector for StubConnector {
    type Client = StubClient;

    async fn connect(&self, addr: &NodeAddr) -> NodeResult<StubClient> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.contains(&addr.name()) {
            return Err(NodeError::Connect {
                addr: addr.clone(),
                message: "connection refused".to_string(),
            });
        }
        let topology = self
            .topology
            .lock()
            .expect("stub lock poisoned")
            .get(&addr.name())
            .cloned();
        Ok(StubClient {
            addr: addr.clone(),
            healthy: !self.unhealthy.contains(&addr.name()),
            topology,
            counters: Arc::clone(&self.counters),
        })
    }
}
