//! The coordinator: receives client requests, fans out to the replica set
//! computed by the partitioner, reconciles replica responses under a quorum
//! policy, and answers the client.

use crate::pending::{PendingRegistry, PendingRequest};
use crate::policy::QuorumPolicy;
use kv_messaging::{Dispatched, SenderHandle};
use kv_partitioner::SharedPartitioner;
use kv_wire::request::request_hash;
use kv_wire::{EndpointId, Frame, MessageCode, RequestPayload, ResponsePayload};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct CoordinatorConfig {
    pub response_protocol: QuorumPolicy,
    pub vnode: usize,
    pub response_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            response_protocol: QuorumPolicy::All,
            vnode: 3,
            response_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

pub struct Coordinator {
    self_addr: EndpointId,
    partitioner: SharedPartitioner,
    sender: SenderHandle,
    requests: mpsc::Receiver<Dispatched>,
    responses: mpsc::Receiver<Dispatched>,
    storage: mpsc::Sender<Dispatched>,
    config: CoordinatorConfig,
    pending: PendingRegistry,
}

impl Coordinator {
    /// `storage` is the local `StorageActor`'s request channel. The
    /// coordinator is the sole subscriber of the wire-level `REQUEST` code;
    /// a request already fanned out to this node as a replica (`forwarded`)
    /// is handed straight to `storage` rather than processed as a fresh
    /// client request.
    pub fn new(
        self_addr: EndpointId,
        partitioner: SharedPartitioner,
        sender: SenderHandle,
        requests: mpsc::Receiver<Dispatched>,
        responses: mpsc::Receiver<Dispatched>,
        storage: mpsc::Sender<Dispatched>,
        config: CoordinatorConfig,
    ) -> Self {
        Coordinator {
            self_addr,
            partitioner,
            sender,
            requests,
            responses,
            storage,
            config,
            pending: PendingRegistry::new(),
        }
    }

    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                _ = sweep.tick() => self.sweep_timeouts(),
                item = self.requests.recv() => {
                    match item {
                        Some(d) => self.handle_request(d).await,
                        None => {
                            tracing::info!("coordinator request channel closed, stopping");
                            return;
                        }
                    }
                }
                item = self.responses.recv() => {
                    match item {
                        Some(d) => self.handle_response(d).await,
                        None => {
                            tracing::info!("coordinator response channel closed, stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_request(&mut self, dispatched: Dispatched) {
        let payload: RequestPayload = match serde_json::from_slice(&dispatched.frame.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(from = %dispatched.remote_identifier, error = %e, "malformed request payload");
                return;
            }
        };

        if payload.forwarded() {
            tracing::debug!(from = %dispatched.remote_identifier, "executing request fanned out to this replica");
            if self.storage.send(dispatched).await.is_err() {
                tracing::error!("local storage channel closed, dropping forwarded request");
            }
            return;
        }

        let client_addr = dispatched.remote_identifier;
        let expected = request_hash(client_addr.as_str(), &payload.request);
        if expected != payload.request_hash {
            tracing::warn!(client = %client_addr, "request hash mismatch, rejecting");
            self.reply(&client_addr, ResponsePayload::failure("request hash mismatch", payload.request_hash))
                .await;
            return;
        }

        match payload.op() {
            Some("get") | Some("put") => self.fan_out(client_addr, payload).await,
            Some("set") => {
                let resp = self.apply_set(&payload);
                self.reply(&client_addr, resp).await;
            }
            Some(other) => {
                tracing::warn!(client = %client_addr, op = other, "unknown request op");
                self.reply(
                    &client_addr,
                    ResponsePayload::failure(format!("unknown op {other}"), payload.request_hash),
                )
                .await;
            }
            None => {
                self.reply(&client_addr, ResponsePayload::failure("missing op", payload.request_hash))
                    .await;
            }
        }
    }

    async fn fan_out(&mut self, client_addr: EndpointId, payload: RequestPayload) {
        let Some(key) = payload.key() else {
            self.reply(&client_addr, ResponsePayload::failure("missing key", payload.request_hash))
                .await;
            return;
        };

        let replicas = self.partitioner.find_replicas(key);
        if replicas.is_empty() {
            self.reply(
                &client_addr,
                ResponsePayload::failure("no replicas available", payload.request_hash),
            )
            .await;
            return;
        }

        tracing::debug!(client = %client_addr, key, replicas = replicas.len(), "fanning out request");
        self.pending.insert(
            payload.request_hash,
            PendingRequest::new(client_addr, replicas.clone()),
        );

        let forwarded_payload = payload.as_forwarded();
        let forwarded = Frame::new(
            MessageCode::REQUEST,
            self.self_addr.clone(),
            serde_json::to_vec(&forwarded_payload).expect("RequestPayload always serializes"),
        );
        for replica in replicas {
            self.sender.send_message(replica, forwarded.clone()).await;
        }
    }

    fn apply_set(&mut self, payload: &RequestPayload) -> ResponsePayload {
        match (payload.request.get(1).map(String::as_str), payload.request.get(2)) {
            (Some("response_protocol"), Some(value)) => match QuorumPolicy::parse(value) {
                Ok(policy) => {
                    self.config.response_protocol = policy;
                    tracing::info!(value, "updated response_protocol");
                    ResponsePayload::success(serde_json::json!("ok"), payload.request_hash)
                }
                Err(e) => ResponsePayload::failure(e.to_string(), payload.request_hash),
            },
            _ => ResponsePayload::failure("unsupported set target", payload.request_hash),
        }
    }

    async fn handle_response(&mut self, dispatched: Dispatched) {
        let replica = dispatched.remote_identifier;
        let resp: ResponsePayload = match serde_json::from_slice(&dispatched.frame.payload) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(replica = %replica, error = %e, "malformed response payload");
                return;
            }
        };

        let request_hash = resp.request_hash;
        let Some(pending) = self.pending.find_mut(request_hash, &replica) else {
            tracing::debug!(replica = %replica, request_hash, "response for unknown or already-settled request, dropping");
            return;
        };

        if pending.responses.get(&replica).is_some_and(Option::is_some) {
            tracing::warn!(replica = %replica, request_hash, "duplicate response, dropping");
            return;
        }
        pending.responses.insert(replica, Some(resp));

        let threshold = self.config.response_protocol.threshold(self.config.vnode);
        if pending.received_count() < threshold {
            return;
        }

        let client_addr = pending.client_addr.clone();
        let modal = pending.modal_response();
        self.pending.remove(request_hash, &client_addr);

        if let Some(resp) = modal {
            self.reply(&client_addr, resp).await;
        }
    }

    fn sweep_timeouts(&mut self) {
        let expired = self.pending.sweep_expired(self.config.response_timeout);
        for pending in expired {
            tracing::warn!(
                client = %pending.client_addr,
                received = pending.received_count(),
                expected = pending.replicas.len(),
                "pending request timed out without quorum"
            );
        }
    }

    async fn reply(&self, client_addr: &EndpointId, resp: ResponsePayload) {
        let frame = Frame::new(
            MessageCode::RESPONSE,
            self.self_addr.clone(),
            serde_json::to_vec(&resp).expect("ResponsePayload always serializes"),
        );
        self.sender.send_message(client_addr.clone(), frame).await;
    }
}
