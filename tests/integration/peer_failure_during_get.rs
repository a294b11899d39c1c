//! Scenario: a replica going down mid-cluster doesn't stall requests served
//! by the survivors, as long as `response_protocol=any` only needs one reply.

use kv_coordinator::QuorumPolicy;
use kv_test_utils::{ClusterOpts, TestClient, TestCluster};
use std::time::Duration;

#[tokio::test]
async fn surviving_node_still_serves_requests_after_a_peer_dies() {
    let opts = ClusterOpts {
        vnode: 3,
        replica: 3,
        response_protocol: QuorumPolicy::Any,
        response_timeout: Duration::from_secs(2),
        ..ClusterOpts::default()
    };
    let mut cluster = TestCluster::start(3, opts).await;
    tokio::time::sleep(Duration::from_millis(800)).await;

    cluster.kill(2);

    let mut client = TestClient::connect(&cluster.addr(0)).await.unwrap();
    let put = tokio::time::timeout(
        Duration::from_secs(3),
        client.request(vec!["put".to_owned(), "k".to_owned(), "v".to_owned()]),
    )
    .await
    .expect("put should not hang past response_timeout")
    .unwrap();
    assert!(put.status, "put should succeed with one replica down: {:?}", put.description);

    let get = tokio::time::timeout(
        Duration::from_secs(3),
        client.request(vec!["get".to_owned(), "k".to_owned()]),
    )
    .await
    .expect("get should not hang past response_timeout")
    .unwrap();
    assert!(get.status, "get should succeed with one replica down: {:?}", get.description);
    assert_eq!(get.description, serde_json::json!(["v", 1]));

    cluster.shutdown();
}
