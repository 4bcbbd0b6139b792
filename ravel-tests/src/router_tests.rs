//! Router behavior against a simulated cluster.

use std::sync::Arc;
use std::time::Duration;

use ravel_core::{key_slot, Command, NodeAddr, NodeError, Slot, Value};
use ravel_routing::{ClusterClient, ClusterConfig, ClusterError};

use crate::simulated_cluster::{key_for_slot, node, range, Response, SimulatedCluster};

type Client = ClusterClient<SimulatedCluster>;

/// Three nodes splitting the slot space, topology served by all.
fn three_node_cluster() -> (SimulatedCluster, [NodeAddr; 3]) {
    let nodes = [node(7000), node(7001), node(7002)];
    let cluster = SimulatedCluster::new(&nodes);
    cluster.set_topology(vec![
        range(0, 5460, &nodes[0]),
        range(5461, 10922, &nodes[1]),
        range(10923, 16383, &nodes[2]),
    ]);
    (cluster, nodes)
}

async fn connect(cluster: &SimulatedCluster, seeds: &[NodeAddr]) -> Client {
    ClusterClient::connect(ClusterConfig::for_testing(seeds.to_vec()), cluster.clone())
        .await
        .unwrap()
}

fn get(key: &str) -> Command {
    Command::new("GET").arg(key)
}

fn reply_from(addr: &NodeAddr) -> Value {
    SimulatedCluster::default_reply(addr)
}

#[tokio::test]
async fn test_router_dispatches_to_known_owner() {
    let (cluster, nodes) = three_node_cluster();
    let client = connect(&cluster, &nodes[..1]).await;

    // "foo" hashes to slot 12182, owned by the third node.
    assert_eq!(key_slot(b"foo"), Slot::new(12182));
    let reply = client.execute(&get("foo")).await.unwrap();

    assert_eq!(reply, reply_from(&nodes[2]));
    // No random fallback: nothing was probed.
    assert_eq!(cluster.total().pings, 0);
    assert_eq!(cluster.stats(&nodes[2]).executes, 1);
    assert_eq!(cluster.stats(&nodes[0]).executes, 0);
}

#[tokio::test]
async fn test_router_every_key_reaches_its_owner() {
    let (cluster, nodes) = three_node_cluster();
    let client = connect(&cluster, &nodes).await;

    for slot in [0, 5460, 5461, 10922, 10923, 16383] {
        let slot = Slot::new(slot);
        let owner = client.slot_map().lookup(slot).unwrap();
        let reply = client.execute(&get(&key_for_slot(slot))).await.unwrap();
        assert_eq!(reply, reply_from(&owner), "slot {slot}");
    }
    assert_eq!(cluster.total().pings, 0);
}

#[tokio::test]
async fn test_router_unknown_owner_falls_back_to_random_node() {
    let (cluster, nodes) = three_node_cluster();
    // Only slots 0-100 are assigned.
    cluster.set_topology(vec![range(0, 100, &nodes[0])]);
    let client = connect(&cluster, &nodes).await;
    assert!(client.slot_map().lookup(Slot::new(12182)).is_none());

    let reply = client.execute(&get("foo")).await.unwrap();

    assert!(nodes.iter().any(|n| reply == reply_from(n)));
    assert!(cluster.total().pings >= 1);
}

#[tokio::test]
async fn test_router_follows_moved_chain_within_budget() {
    // Fifteen redirects plus the final answer use the whole budget of 16.
    let nodes: Vec<NodeAddr> = (0..16).map(|i| node(7000 + i)).collect();
    let cluster = SimulatedCluster::new(&nodes);
    cluster.set_topology(vec![range(0, 16383, &nodes[0])]);
    let slot = key_slot(b"foo");
    for pair in nodes.windows(2) {
        cluster.script(&pair[0], Response::Moved(slot, pair[1].clone()));
    }
    let client = connect(&cluster, &nodes[..1]).await;

    let reply = client.execute(&get("foo")).await.unwrap();

    let last = nodes.last().unwrap();
    assert_eq!(reply, reply_from(last));
    assert_eq!(client.slot_map().lookup(slot).as_deref(), Some(last));
    assert_eq!(cluster.total().executes, 16);
    // Redirects patch the map and flag it; no reload happens mid-request.
    assert!(client.needs_refresh());
    assert_eq!(cluster.total().topology_queries, 1);
}

#[tokio::test]
async fn test_router_moved_beyond_budget_fails() {
    // Two nodes bouncing the key back and forth: 20 redirects would be
    // needed, the budget is 16.
    let a = node(7000);
    let b = node(7001);
    let cluster = SimulatedCluster::new(&[a.clone(), b.clone()]);
    cluster.set_topology(vec![range(0, 16383, &a)]);
    let slot = key_slot(b"foo");
    for _ in 0..10 {
        cluster.script(&a, Response::Moved(slot, b.clone()));
        cluster.script(&b, Response::Moved(slot, a.clone()));
    }
    let client = connect(&cluster, &[a.clone()]).await;

    let err = client.execute(&get("foo")).await.unwrap_err();

    match err {
        ClusterError::TooManyRedirections {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 16);
            assert!(last_error.starts_with("MOVED"), "{last_error}");
        }
        other => panic!("expected TooManyRedirections, got {other:?}"),
    }
    assert_eq!(cluster.total().executes, 16);
}

#[tokio::test]
async fn test_router_ask_primes_target_without_patching() {
    let (cluster, nodes) = three_node_cluster();
    let [a, _, c] = &nodes;
    let slot = Slot::new(100);
    let key = key_for_slot(slot);
    cluster.script(a, Response::Ask(slot, c.clone()));
    let client = connect(&cluster, &nodes).await;

    let reply = client.execute(&get(&key)).await.unwrap();

    assert_eq!(reply, reply_from(c));
    // Ownership has not moved.
    assert_eq!(client.slot_map().lookup(slot).as_deref(), Some(a));
    assert!(!client.needs_refresh());

    let log = cluster.executed();
    assert_eq!(log.len(), 2);
    assert_eq!((&log[0].node, log[0].asked), (a, false));
    assert_eq!((&log[1].node, log[1].asked), (c, true));
    assert_eq!(cluster.stats(c).askings, 1);

    // The ask was one-shot; the next request goes back to the owner.
    let reply = client.execute(&get(&key)).await.unwrap();
    assert_eq!(reply, reply_from(a));
    assert!(!cluster.executed()[2].asked);
}

#[tokio::test]
async fn test_router_unroutable_commands_use_no_budget() {
    let (cluster, nodes) = three_node_cluster();
    let client =
        ClusterClient::new(ClusterConfig::for_testing(nodes.to_vec()), cluster.clone()).unwrap();

    for command in [
        Command::new("INFO"),
        Command::new("MULTI"),
        Command::new("CONFIG").arg("GET").arg("maxmemory"),
        Command::new("DBSIZE"),
    ] {
        let err = client.execute(&command).await.unwrap_err();
        assert!(matches!(err, ClusterError::Unroutable { .. }), "{err}");
    }

    // Rejected before topology, pool or any node was touched.
    assert_eq!(cluster.total(), Default::default());
    assert!(client.needs_refresh());
}

#[tokio::test]
async fn test_router_permanent_redirect_scenario() {
    // Seeds A and B; A reports 0-8191 -> A, 8192-16383 -> B.
    let a = node(7000);
    let b = node(7001);
    let c = node(7002);
    let cluster = SimulatedCluster::new(&[a.clone(), b.clone(), c.clone()]);
    cluster.set_topology(vec![range(0, 8191, &a), range(8192, 16383, &b)]);
    let client = connect(&cluster, &[a.clone(), b.clone()]).await;
    assert_eq!(cluster.stats(&a).topology_queries, 1);

    let slot = Slot::new(100);
    let key = key_for_slot(slot);

    // Slot 100 is served by A.
    assert_eq!(client.execute(&get(&key)).await.unwrap(), reply_from(&a));

    // A hands slot 100 over to C.
    cluster.script(&a, Response::Moved(slot, c.clone()));
    assert_eq!(client.execute(&get(&key)).await.unwrap(), reply_from(&c));
    assert_eq!(client.slot_map().lookup(slot).as_deref(), Some(&c));
    assert_eq!(cluster.total().topology_queries, 1);

    // The next request reloads topology, which now reflects the move,
    // and goes straight to C.
    cluster.set_topology(vec![
        range(0, 99, &a),
        range(100, 100, &c),
        range(101, 8191, &a),
        range(8192, 16383, &b),
    ]);
    let executes_on_a = cluster.stats(&a).executes;
    assert_eq!(client.execute(&get(&key)).await.unwrap(), reply_from(&c));
    assert_eq!(cluster.stats(&a).executes, executes_on_a);
    assert!(!client.needs_refresh());
    assert!(client.candidates().snapshot().contains(&c));
}

#[tokio::test]
async fn test_router_patched_slot_survives_failed_reload() {
    let a = node(7000);
    let c = node(7002);
    let cluster = SimulatedCluster::new(&[a.clone(), c.clone()]);
    cluster.set_topology(vec![range(0, 16383, &a)]);
    let client = connect(&cluster, &[a.clone()]).await;
    let slot = Slot::new(100);
    let key = key_for_slot(slot);

    cluster.script(&a, Response::Moved(slot, c.clone()));
    assert_eq!(client.execute(&get(&key)).await.unwrap(), reply_from(&c));

    // The reload fails softly and the patched map keeps routing to C.
    cluster.set_serves_topology(&a, false);
    assert_eq!(client.execute(&get(&key)).await.unwrap(), reply_from(&c));
    assert!(client.needs_refresh());
}

#[tokio::test]
async fn test_router_connectivity_failure_retries_elsewhere() {
    let (cluster, nodes) = three_node_cluster();
    let [a, b, c] = &nodes;
    let slot = Slot::new(100);
    cluster.script(a, Response::Crash);
    let client = connect(&cluster, &nodes).await;
    let closes_before = cluster.stats(a).closes;

    let reply = client.execute(&get(&key_for_slot(slot))).await.unwrap();

    assert!(reply == reply_from(b) || reply == reply_from(c));
    // The dead handle left the pool.
    assert!(!client.pool().contains(a));
    assert_eq!(cluster.stats(a).closes, closes_before + 1);
}

#[tokio::test]
async fn test_router_dropped_connection_is_replaced() {
    let a = node(7000);
    let cluster = SimulatedCluster::new(&[a.clone()]);
    cluster.set_topology(vec![range(0, 16383, &a)]);
    cluster.script(&a, Response::Drop);
    let client = connect(&cluster, &[a.clone()]).await;

    // The only candidate is A again, over a fresh connection.
    let reply = client.execute(&get("foo")).await.unwrap();

    assert_eq!(reply, reply_from(&a));
    // One topology connection, the dropped one, and its replacement.
    assert_eq!(cluster.stats(&a).connects, 3);
    assert_eq!(client.pool().len(), 1);
}

#[tokio::test]
async fn test_router_other_errors_are_fatal() {
    let (cluster, nodes) = three_node_cluster();
    cluster.script(&nodes[2], Response::Error("WRONGTYPE Operation against a key".into()));
    let client = connect(&cluster, &nodes).await;

    let err = client.execute(&get("foo")).await.unwrap_err();

    assert!(matches!(
        &err,
        ClusterError::Node(NodeError::Reply(message)) if message.starts_with("WRONGTYPE")
    ));
    assert_eq!(err.to_string(), "WRONGTYPE Operation against a key");
    assert_eq!(cluster.total().executes, 1);
}

#[tokio::test]
async fn test_router_malformed_redirect_is_fatal() {
    let (cluster, nodes) = three_node_cluster();
    cluster.script(&nodes[2], Response::Error("MOVED not-a-slot".into()));
    let client = connect(&cluster, &nodes).await;

    let err = client.execute(&get("foo")).await.unwrap_err();

    assert!(matches!(err, ClusterError::Node(NodeError::Reply(_))));
    assert_eq!(cluster.total().executes, 1);
}

#[tokio::test]
async fn test_router_undecodable_reply_drops_connection() {
    let a = node(7000);
    let cluster = SimulatedCluster::new(&[a.clone()]);
    cluster.set_topology(vec![range(0, 16383, &a)]);
    cluster.script(&a, Response::Garbage);
    let client = connect(&cluster, &[a.clone()]).await;

    let err = client.execute(&get("foo")).await.unwrap_err();
    assert!(matches!(err, ClusterError::Node(NodeError::Protocol { .. })), "{err:?}");
    assert!(!client.pool().contains(&a));

    // The next request opens a fresh connection and spends no retries.
    let reply = client.execute(&get("foo")).await.unwrap();
    assert_eq!(reply, reply_from(&a));
    assert_eq!(cluster.stats(&a).executes, 2);
}

#[tokio::test]
async fn test_router_no_reachable_node() {
    let a = node(7000);
    let cluster = SimulatedCluster::new(&[a.clone()]);
    cluster.set_reachable(&a, false);
    let client = connect(&cluster, &[a.clone()]).await;

    let err = client.execute(&get("foo")).await.unwrap_err();

    assert!(matches!(err, ClusterError::NoReachableNode { candidates: 1 }));
}

#[tokio::test]
async fn test_router_works_without_topology() {
    let (cluster, nodes) = three_node_cluster();
    for n in &nodes {
        cluster.set_serves_topology(n, false);
    }
    let client = connect(&cluster, &nodes).await;
    assert!(client.slot_map().is_empty());
    assert!(client.needs_refresh());

    let reply = client.execute(&get("foo")).await.unwrap();

    assert!(nodes.iter().any(|n| reply == reply_from(n)));
}

#[tokio::test(start_paused = true)]
async fn test_router_backs_off_in_second_half_of_budget() {
    let a = node(7000);
    let cluster = SimulatedCluster::new(&[a.clone()]);
    cluster.set_topology(vec![range(0, 16383, &a)]);
    cluster.always(&a, Response::Drop);
    let config = ClusterConfig::new(vec![a.clone()])
        .with_max_redirects(4)
        .with_retry_backoff(Duration::from_millis(100));
    let client = ClusterClient::connect(config, cluster.clone()).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = client.execute(&get("foo")).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ClusterError::TooManyRedirections { attempts: 4, .. }));
    // Remaining budget after each failure: 3, 2, 1, 0. Only the last two
    // are below half of 4.
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    assert_eq!(cluster.stats(&a).executes, 4);
}

#[tokio::test(start_paused = true)]
async fn test_router_backoff_with_odd_budget() {
    let a = node(7000);
    let cluster = SimulatedCluster::new(&[a.clone()]);
    cluster.set_topology(vec![range(0, 16383, &a)]);
    cluster.always(&a, Response::Drop);
    let config = ClusterConfig::new(vec![a.clone()])
        .with_max_redirects(5)
        .with_retry_backoff(Duration::from_millis(100));
    let client = ClusterClient::connect(config, cluster.clone()).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = client.execute(&get("foo")).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ClusterError::TooManyRedirections { attempts: 5, .. }));
    // Remaining budget after each failure: 4, 3, 2, 1, 0. The last three
    // are below half of 5.
    assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    assert_eq!(cluster.stats(&a).executes, 5);
}

#[tokio::test]
async fn test_router_close_releases_connections() {
    let (cluster, nodes) = three_node_cluster();
    let client = connect(&cluster, &nodes).await;
    for slot in [0, 6000, 12000] {
        client.execute(&get(&key_for_slot(Slot::new(slot)))).await.unwrap();
    }
    assert_eq!(client.pool().len(), 3);
    let closes_before = cluster.total().closes;

    client.close().await;

    assert!(client.pool().is_empty());
    assert_eq!(cluster.total().closes, closes_before + 3);
    assert!(client.needs_refresh());

    // A reused client rediscovers topology first.
    let queries = cluster.total().topology_queries;
    client.execute(&get("foo")).await.unwrap();
    assert_eq!(cluster.total().topology_queries, queries + 1);
}

#[tokio::test]
async fn test_router_pool_cap_evicts_one_per_new_node() {
    let nodes: Vec<NodeAddr> = (0..4).map(|i| node(7000 + i)).collect();
    let cluster = SimulatedCluster::new(&nodes);
    cluster.set_topology(vec![
        range(0, 4095, &nodes[0]),
        range(4096, 8191, &nodes[1]),
        range(8192, 12287, &nodes[2]),
        range(12288, 16383, &nodes[3]),
    ]);
    let config = ClusterConfig::for_testing(nodes[..1].to_vec()).with_max_connections(2);
    let client = ClusterClient::connect(config, cluster.clone()).await.unwrap();
    // The topology connection is not pooled.
    let mut closes = cluster.total().closes;

    for (i, slot) in [0u16, 5000, 9000, 13000].into_iter().enumerate() {
        client.execute(&get(&key_for_slot(Slot::new(slot)))).await.unwrap();
        assert!(client.pool().len() <= 2);
        let now = cluster.total().closes;
        if i >= 2 {
            assert_eq!(now, closes + 1, "request {i} should evict exactly one");
        } else {
            assert_eq!(now, closes);
        }
        closes = now;
    }
}

#[tokio::test]
async fn test_router_concurrent_requests_respect_pool_cap() {
    let (cluster, nodes) = three_node_cluster();
    let config = ClusterConfig::for_testing(nodes.to_vec()).with_max_connections(2);
    let client = Arc::new(ClusterClient::connect(config, cluster.clone()).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..64 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client.execute(&get(&format!("user:{i}"))).await
        }));
    }
    for handle in handles {
        // Evicted handles surface as connectivity failures and are retried.
        assert!(handle.await.unwrap().is_ok());
    }

    assert!(client.pool().len() <= 2);
}
