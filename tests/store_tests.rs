//! RPC-path tests for the core dispatcher: RequestStore envelopes,
//! gossip broadcasts, and protocol violations.

mod test_harness;

use std::time::Duration;

use quorum_bus::error::ConsensusError;
use quorum_bus::ledger::Command;
use quorum_bus::membership::GossipMessage;
use quorum_bus::rpc::{Envelope, Request, Response, StoreRequest};
use test_harness::TestCluster;

fn store_envelope(action: &str) -> Envelope {
    Envelope::new(Request::RequestStore(StoreRequest::new(Command::Invoke {
        action: action.to_string(),
        params: serde_json::json!({}),
    })))
}

#[tokio::test]
async fn request_store_envelope_commits_through_the_leader() {
    let cluster = TestCluster::new(3).await;
    let leader = cluster
        .wait_for_agreement(Duration::from_secs(5))
        .await
        .expect("leader");

    // A remote client's envelope, delivered the way the broker would.
    let resp = cluster
        .get(&leader)
        .handle
        .deliver(store_envelope("orders.create"))
        .await
        .expect("leader accepts the store");
    match resp {
        Response::RequestStore(store) => {
            assert!(store.committed);
            assert!(store.index >= 1);
        }
        other => panic!("expected a store response, got {other:?}"),
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn request_store_envelope_to_follower_is_rejected() {
    let cluster = TestCluster::new(3).await;
    let leader = cluster
        .wait_for_agreement(Duration::from_secs(5))
        .await
        .expect("leader");
    let follower = cluster
        .nodes
        .keys()
        .find(|id| **id != leader)
        .cloned()
        .expect("a follower exists");

    let err = cluster
        .get(&follower)
        .handle
        .deliver(store_envelope("orders.create"))
        .await
        .expect_err("followers reject stores");
    assert!(matches!(err, ConsensusError::NotLeader(_)));

    cluster.shutdown().await;
}

#[tokio::test]
async fn unrecognized_mode_is_a_protocol_violation() {
    let cluster = TestCluster::new(1).await;

    let raw = serde_json::json!({
        "mode": "Teleport",
        "payload": { "anywhere": true }
    });
    let err = cluster
        .get("n1")
        .handle
        .deliver_raw(raw)
        .await
        .expect_err("bogus mode must be rejected");
    assert!(matches!(err, ConsensusError::ProtocolViolation(_)));

    cluster.shutdown().await;
}

#[tokio::test]
async fn broadcast_envelope_feeds_the_membership_tracker() {
    let cluster = TestCluster::new(1).await;
    let node = cluster.get("n1");

    let resp = node
        .handle
        .deliver(Envelope::new(Request::Broadcast(GossipMessage {
            peer_id: "visitor".to_string(),
            joining: true,
        })))
        .await
        .expect("gossip accepted");
    assert_eq!(resp, Response::Ack);

    let status = node.status().await;
    assert!(status.quorum_size >= 2, "the visitor joined the quorum view");

    cluster.shutdown().await;
}
