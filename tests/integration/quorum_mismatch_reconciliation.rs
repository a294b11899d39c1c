//! Scenario: one stale replica reply among a quorum shouldn't change what
//! the client sees. Drives a `Coordinator` directly against fake channels --
//! the same technique the coordinator crate's own unit tests use -- so a
//! disagreeing reply can be injected deterministically instead of racing a
//! real cluster for one.

use kv_coordinator::{Coordinator, CoordinatorConfig, QuorumPolicy};
use kv_messaging::{Dispatched, SenderHandle, SendWork};
use kv_partitioner::{RingPartitioner, SharedPartitioner};
use kv_wire::request::request_hash;
use kv_wire::{EndpointId, Frame, MessageCode, RequestPayload, ResponsePayload};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn ep(s: &str) -> EndpointId {
    EndpointId::from_str(s).unwrap()
}

fn request_frame(client: &EndpointId, request: Vec<&str>) -> Frame {
    let request: Vec<String> = request.into_iter().map(str::to_owned).collect();
    let hash = request_hash(client.as_str(), &request);
    let payload = RequestPayload::new(request, hash);
    Frame::new(MessageCode::REQUEST, client.clone(), serde_json::to_vec(&payload).unwrap())
}

#[tokio::test]
async fn majority_fresh_response_wins_over_one_stale_replica() {
    let self_addr = ep("10.0.0.1:9042");
    let mut ring = RingPartitioner::new(self_addr.as_str(), 3, 3);
    ring.new_physical_node("10.0.0.2:9042").unwrap();
    ring.new_physical_node("10.0.0.3:9042").unwrap();
    let partitioner = SharedPartitioner::new(ring);

    let (tx, mut sent) = mpsc::channel(16);
    let sender = SenderHandle::new(tx);
    let (req_tx, req_rx) = mpsc::channel(16);
    let (resp_tx, resp_rx) = mpsc::channel(16);
    let (storage, _storage_rx) = mpsc::channel(16);

    let config = CoordinatorConfig {
        response_protocol: QuorumPolicy::N(3),
        vnode: 3,
        ..CoordinatorConfig::default()
    };
    let coordinator = Coordinator::new(self_addr.clone(), partitioner, sender, req_rx, resp_rx, storage, config);
    tokio::spawn(coordinator.run());

    let client = ep("192.168.0.1:4000");
    let frame = request_frame(&client, vec!["get", "alpha"]);
    req_tx
        .send(Dispatched { code: MessageCode::REQUEST, remote_identifier: client.clone(), frame })
        .await
        .unwrap();

    let mut fanned_out_hash = None;
    let mut replicas = Vec::new();
    for _ in 0..3 {
        let work = timeout(Duration::from_millis(200), sent.recv()).await.unwrap().unwrap();
        match work {
            SendWork::SendMessage { identifier, frame, .. } => {
                let payload: RequestPayload = serde_json::from_slice(&frame.payload).unwrap();
                fanned_out_hash = Some(payload.request_hash);
                replicas.push(identifier);
            }
            other => panic!("unexpected work: {other:?}"),
        }
    }
    let hash = fanned_out_hash.expect("coordinator should fan out to all three replicas");

    // Two replicas agree on the fresh value; one answers with a stale one.
    let fresh = ResponsePayload::success(serde_json::json!(["v", 2]), hash);
    let stale = ResponsePayload::success(serde_json::json!(["v", 1]), hash);

    for (i, replica) in replicas.iter().enumerate() {
        let response = if i == 1 { &stale } else { &fresh };
        let frame = Frame::new(MessageCode::RESPONSE, self_addr.clone(), serde_json::to_vec(response).unwrap());
        resp_tx
            .send(Dispatched { code: MessageCode::RESPONSE, remote_identifier: replica.clone(), frame })
            .await
            .unwrap();
    }

    let reply = timeout(Duration::from_millis(200), sent.recv()).await.unwrap().unwrap();
    match reply {
        SendWork::SendMessage { identifier, frame, .. } => {
            assert_eq!(identifier, client);
            let resp: ResponsePayload = serde_json::from_slice(&frame.payload).unwrap();
            assert!(resp.status);
            assert_eq!(resp.description, serde_json::json!(["v", 2]), "majority fresh response should win");
        }
        other => panic!("unexpected work: {other:?}"),
    }
}
