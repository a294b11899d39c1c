//! Scenario: three-node replication with `response_protocol=all`. After
//! gossip convergence, a `put` against one node is visible from every node's
//! own storage, not just the coordinating one.

use kv_coordinator::QuorumPolicy;
use kv_test_utils::{ClusterOpts, TestClient, TestCluster};
use std::time::Duration;

#[tokio::test]
async fn put_on_one_node_is_readable_from_every_node() {
    let opts = ClusterOpts {
        vnode: 3,
        replica: 3,
        response_protocol: QuorumPolicy::All,
        ..ClusterOpts::default()
    };
    let cluster = TestCluster::start(3, opts).await;

    // Give gossip a few rounds to spread ring membership before relying on
    // every node knowing about the other two.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let mut a = TestClient::connect(&cluster.addr(0)).await.unwrap();
    let put = a
        .request(vec!["put".to_owned(), "k".to_owned(), "v".to_owned()])
        .await
        .unwrap();
    assert!(put.status, "put should succeed: {:?}", put.description);

    let get_a = a.request(vec!["get".to_owned(), "k".to_owned()]).await.unwrap();
    assert_eq!(get_a.description, serde_json::json!(["v", 1]));

    // The harness exposes no hook into a node's in-memory memtable, so
    // "raw inspection" of B and C is a direct get issued against each --
    // which only reads local state if their own replica set already
    // includes themselves, true once the ring has converged.
    for i in [1usize, 2] {
        let mut client = TestClient::connect(&cluster.addr(i)).await.unwrap();
        let get = client.request(vec!["get".to_owned(), "k".to_owned()]).await.unwrap();
        assert!(get.status, "get on node {i} should succeed: {:?}", get.description);
        assert_eq!(get.description, serde_json::json!(["v", 1]), "node {i} should have replicated k");
    }

    cluster.shutdown();
}
