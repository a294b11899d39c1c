//! Scenario: a small `max_data_per_sstable` forces the memtable to flush to
//! disk mid-run, and reads stay correct across the flushed/unflushed split.

use kv_test_utils::{ClusterOpts, TestClient, TestCluster};

#[tokio::test]
async fn flushed_sstable_pairs_appear_on_disk_and_reads_stay_correct() {
    let opts = ClusterOpts {
        vnode: 1,
        replica: 1,
        max_data_per_sstable: 10,
        ..ClusterOpts::default()
    };
    let cluster = TestCluster::start(1, opts).await;
    let mut client = TestClient::connect(&cluster.addr(0)).await.unwrap();

    for i in 0..10 {
        let put = client
            .request(vec!["put".to_owned(), format!("k{i}"), "abcd".to_owned()])
            .await
            .unwrap();
        assert!(put.status, "put {i} should succeed: {:?}", put.description);
    }

    let entries: Vec<_> = std::fs::read_dir(cluster.datadir(0))
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    let has_index = entries.iter().any(|e| e.path().extension().and_then(|x| x.to_str()) == Some("ssif"));
    let has_data = entries.iter().any(|e| e.path().extension().and_then(|x| x.to_str()) == Some("ssdf"));
    assert!(has_index, "expected at least one .ssif file after exceeding max_data_per_sstable");
    assert!(has_data, "expected at least one .ssdf file after exceeding max_data_per_sstable");

    for i in 0..10 {
        let get = client.request(vec!["get".to_owned(), format!("k{i}")]).await.unwrap();
        assert!(get.status, "get k{i} should succeed: {:?}", get.description);
        assert_eq!(get.description, serde_json::json!(["abcd", 1]), "k{i} should read back its written value");
    }

    cluster.shutdown();
}
