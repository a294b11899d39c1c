//! Scenario: a node joining an existing single-node cluster is gossiped in
//! and onboarded into the bootstrapper's ring within a couple of gossip
//! intervals.
//!
//! The harness has no hook into a running node's `endpointStateMap` or ring
//! (both live inside tasks spawned by `Node::run`), so convergence is
//! observed the way a client would notice it: with `replica=2` across a
//! two-node cluster and `response_protocol=all`, a `put` against the
//! bootstrapper only reaches the joiner once the bootstrapper's partitioner
//! has onboarded it as a live vnode owner. A `get` issued straight at the
//! joiner succeeding is proof the write fanned out to it, which is proof
//! gossip already converged.

use kv_coordinator::QuorumPolicy;
use kv_test_utils::{wait_until, ClusterOpts, TestClient, TestCluster};
use std::time::Duration;

#[tokio::test]
async fn joiner_is_onboarded_within_a_few_gossip_intervals() {
    let opts = ClusterOpts {
        vnode: 2,
        replica: 2,
        gossip_interval: Duration::from_millis(50),
        response_protocol: QuorumPolicy::All,
        ..ClusterOpts::default()
    };
    let cluster = TestCluster::start(2, opts.clone()).await;

    let mut bootstrapper = TestClient::connect(&cluster.addr(0)).await.unwrap();

    let converged = wait_until(Duration::from_secs(5), opts.gossip_interval, || {
        let addr = cluster.addr(0);
        async move {
            let mut client = match TestClient::connect(&addr).await {
                Ok(c) => c,
                Err(_) => return false,
            };
            let put = client
                .request(vec!["put".to_owned(), "joined".to_owned(), "yes".to_owned()])
                .await;
            matches!(put, Ok(r) if r.status)
        }
    })
    .await;
    assert!(converged, "put via response_protocol=all never succeeded");

    let put = bootstrapper
        .request(vec!["put".to_owned(), "k".to_owned(), "v".to_owned()])
        .await
        .unwrap();
    assert!(put.status, "put should succeed once the joiner is onboarded: {:?}", put.description);

    let mut joiner = TestClient::connect(&cluster.addr(1)).await.unwrap();
    let get = joiner.request(vec!["get".to_owned(), "k".to_owned()]).await.unwrap();
    assert!(get.status, "get on the joiner should succeed: {:?}", get.description);
    assert_eq!(get.description, serde_json::json!(["v", 1]), "joiner should have received the replicated write");

    cluster.shutdown();
}
