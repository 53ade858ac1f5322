//! Integration test: replication.
//!
//! Several writers append to one stream concurrently and exchange head-sets.
//! Every replica must end up with the same entries in the same order, no
//! matter in which order the merges happened.

use tidelog::JoinOutcome;
use tidelog_integration_tests::{ReplicaNetwork, init_tracing, payload_str};

/// Three writers, ten entries each, one gossip round.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_concurrent_writers_converge() {
    init_tracing();
    let mut net = ReplicaNetwork::new(3, "shared");

    for i in 0..net.len() {
        net.append_n(i, 10).await;
    }
    assert!(!net.converged());

    net.gossip_round().await;

    assert!(net.converged(), "replicas disagree after a full gossip round");
    for i in 0..net.len() {
        assert_eq!(net.replica(i).len(), 30, "replica {i} is missing entries");
    }
    assert_eq!(net.entry_set(0), net.entry_set(1));
    assert_eq!(net.entry_set(1), net.entry_set(2));
}

/// Merging A into B then C gives the same result as C then A.
#[tokio::test]
async fn test_merge_order_does_not_matter() {
    let mut forward = ReplicaNetwork::new(3, "shared");
    for i in 0..3 {
        forward.append_n(i, 4).await;
    }
    let mut backward = ReplicaNetwork::new(3, "shared");
    for i in 0..3 {
        backward.append_n(i, 4).await;
    }

    forward.sync(0, 1).await.unwrap();
    forward.sync(2, 1).await.unwrap();
    backward.sync(2, 1).await.unwrap();
    backward.sync(0, 1).await.unwrap();

    let a: Vec<String> = forward.replica(1).values().into_iter().map(payload_str).collect();
    let b: Vec<String> = backward.replica(1).values().into_iter().map(payload_str).collect();
    assert_eq!(a.len(), 12);
    assert_eq!(a, b);
}

/// A replica that already holds everything adds nothing on a repeat sync.
#[tokio::test]
async fn test_repeated_sync_is_idempotent() {
    let mut net = ReplicaNetwork::new(2, "shared");
    net.append_n(0, 5).await;

    let first = net.sync(0, 1).await.unwrap();
    assert_eq!(first, JoinOutcome::Merged { added: 5 });

    let second = net.sync(0, 1).await.unwrap();
    assert_eq!(second, JoinOutcome::Merged { added: 0 });
    assert_eq!(net.replica(1).len(), 5);
}

/// After a sync the receiver's next append is ordered after everything it
/// received, and links to the received head.
#[tokio::test]
async fn test_append_after_sync_extends_merged_history() {
    let mut net = ReplicaNetwork::new(2, "shared");
    net.append_n(0, 7).await;
    net.append_n(1, 2).await;

    net.sync(0, 1).await.unwrap();
    assert_eq!(net.replica(1).clock().time, 7);

    let entry = net.append(1, "after").await;
    assert_eq!(entry.clock.time, 8);
    assert_eq!(entry.next.len(), 2, "both branches are merged by the new entry");

    net.sync(1, 0).await.unwrap();
    let heads = net.replica(0).heads();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].hash, entry.hash);
    assert!(net.converged());
}

/// Writers keep appending between rounds; a final round brings everyone
/// back in line.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_interleaved_rounds_converge() {
    let mut net = ReplicaNetwork::new(4, "shared");

    for round in 0..3 {
        for i in 0..net.len() {
            net.append(i, &format!("round{round}-r{i}")).await;
        }
        net.gossip_round().await;
        assert!(net.converged(), "diverged after round {round}");
    }

    for i in 0..net.len() {
        assert_eq!(net.replica(i).len(), 12);
        assert!(net.replica(i).tail_hashes().is_empty());
    }
}

/// Loading a peer's head-set reproduces the peer's view exactly.
#[tokio::test]
async fn test_remote_load_matches_sender() {
    let mut net = ReplicaNetwork::new(2, "shared");
    net.append_n(0, 5).await;

    let remote = net.load_remote(0, 1, None).await.unwrap();

    assert_eq!(remote.id(), "shared");
    assert_eq!(remote.len(), 5);
    let got: Vec<String> = remote.values().into_iter().map(payload_str).collect();
    assert_eq!(got, vec!["r0-1", "r0-2", "r0-3", "r0-4", "r0-5"]);
    assert_eq!(remote.heads()[0].hash, net.replica(0).heads()[0].hash);
    assert_eq!(remote.identity(), net.replica(1).identity(), "loaded as the receiver");
}
