//! Scenario: single-node put/get, including a version bump on overwrite.

use kv_test_utils::{ClusterOpts, TestClient, TestCluster};

#[tokio::test]
async fn put_then_get_returns_value_with_version_one() {
    let cluster = TestCluster::start(1, ClusterOpts { vnode: 1, replica: 1, ..ClusterOpts::default() }).await;
    let mut client = TestClient::connect(&cluster.addr(0)).await.unwrap();

    let put = client
        .request(vec!["put".to_owned(), "alpha".to_owned(), "one".to_owned()])
        .await
        .unwrap();
    assert!(put.status);

    let get = client.request(vec!["get".to_owned(), "alpha".to_owned()]).await.unwrap();
    assert!(get.status);
    assert_eq!(get.description, serde_json::json!(["one", 1]));

    cluster.shutdown();
}

#[tokio::test]
async fn overwrite_bumps_version_to_two() {
    let cluster = TestCluster::start(1, ClusterOpts { vnode: 1, replica: 1, ..ClusterOpts::default() }).await;
    let mut client = TestClient::connect(&cluster.addr(0)).await.unwrap();

    client
        .request(vec!["put".to_owned(), "alpha".to_owned(), "one".to_owned()])
        .await
        .unwrap();
    let second_put = client
        .request(vec!["put".to_owned(), "alpha".to_owned(), "two".to_owned()])
        .await
        .unwrap();
    assert!(second_put.status);

    let get = client.request(vec!["get".to_owned(), "alpha".to_owned()]).await.unwrap();
    assert_eq!(get.description, serde_json::json!(["two", 2]));

    cluster.shutdown();
}
