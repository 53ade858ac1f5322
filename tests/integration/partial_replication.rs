//! Integration test: partial replication.
//!
//! Replicas that load only the newest part of a peer's history, or that
//! cannot reach some blocks, keep working with what they have and report
//! where their history is cut off.

use tidelog::{AppendConfig, LogConfig};
use tidelog_integration_tests::{ReplicaNetwork, init_tracing, payload_str};

/// Load the newest 10 of 50 entries, then fill in the rest from the tails.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_bounded_load_then_fill_gaps() {
    init_tracing();
    let mut net = ReplicaNetwork::new(2, "shared");
    let written = net.append_n(0, 50).await;

    let remote = net.load_remote(0, 1, Some(10)).await.unwrap();
    assert_eq!(remote.len(), 10);
    net.replica_mut(1).join(&remote, None).await.unwrap();

    let partial = net.replica(1);
    assert_eq!(partial.len(), 10);
    assert_eq!(partial.tail_hashes(), vec![written[39].hash]);
    let tails = partial.tails();
    assert_eq!(tails.len(), 1);
    assert_eq!(payload_str(tails[0]), "r0-41");

    let added = net.fill_gaps(1).await.unwrap();

    assert_eq!(added, 40);
    assert_eq!(net.replica(1).len(), 50);
    assert!(net.replica(1).tail_hashes().is_empty());
    assert!(net.converged());
}

/// An unreachable block cuts a plain chain short without failing the sync.
#[tokio::test]
async fn test_unreachable_block_shrinks_history() {
    let mut net = ReplicaNetwork::new(2, "shared");
    let written = net.append_n(0, 20).await;
    net.make_unreachable(1, written[9].hash);

    net.sync(0, 1).await.unwrap();

    let replica = net.replica(1);
    assert_eq!(replica.len(), 10, "only r0-11 ..= r0-20 are reachable");
    assert!(!replica.has(&written[9].hash));
    assert_eq!(replica.tail_hashes(), vec![written[9].hash]);
    assert_eq!(replica.heads()[0].hash, written[19].hash);
}

/// With reference links, history behind an unreachable block is still
/// found through the entries that skip over it.
#[tokio::test]
async fn test_reference_links_bridge_unreachable_block() {
    let config = LogConfig {
        append: AppendConfig { reference_count: 8 },
        ..Default::default()
    };
    let mut net = ReplicaNetwork::with_config(2, "shared", config);
    let written = net.append_n(0, 20).await;
    net.make_unreachable(1, written[9].hash);

    net.sync(0, 1).await.unwrap();

    let replica = net.replica(1);
    assert_eq!(replica.len(), 19);
    assert!(!replica.has(&written[9].hash));
    assert!(replica.has(&written[0].hash), "the root is reached through refs");
}

/// A bounded load of a merged history keeps the newest entries across
/// both writers.
#[tokio::test]
async fn test_bounded_load_of_merged_history() {
    let mut net = ReplicaNetwork::new(3, "shared");
    net.append_n(0, 6).await;
    net.append_n(1, 6).await;
    net.sync(1, 0).await.unwrap();

    let remote = net.load_remote(0, 2, Some(4)).await.unwrap();

    assert_eq!(remote.len(), 4);
    let mut got: Vec<String> = remote.values().into_iter().map(payload_str).collect();
    got.sort();
    assert_eq!(got, vec!["r0-5", "r0-6", "r1-5", "r1-6"]);
    assert_eq!(remote.heads().len(), 2);
}
