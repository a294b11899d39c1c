//! The pending-request registry: tracks in-flight client requests awaiting
//! quorum from their replica set.

use kv_wire::{EndpointId, ResponsePayload};
use std::collections::HashMap;
use std::time::Instant;

/// One client request fanned out to its replica set, waiting on responses.
pub struct PendingRequest {
    pub client_addr: EndpointId,
    pub replicas: Vec<EndpointId>,
    pub responses: HashMap<EndpointId, Option<ResponsePayload>>,
    pub created_at: Instant,
}

impl PendingRequest {
    pub fn new(client_addr: EndpointId, replicas: Vec<EndpointId>) -> Self {
        let responses = replicas.iter().cloned().map(|r| (r, None)).collect();
        PendingRequest {
            client_addr,
            replicas,
            responses,
            created_at: Instant::now(),
        }
    }

    pub fn received_count(&self) -> usize {
        self.responses.values().filter(|r| r.is_some()).count()
    }

    /// The response value that a plurality of replicas agree on, comparing
    /// by `(status, description)` and ignoring `request_hash` (shared across
    /// every reply to this request anyway).
    pub fn modal_response(&self) -> Option<ResponsePayload> {
        let mut counts: Vec<(ResponsePayload, usize)> = Vec::new();
        for resp in self.responses.values().flatten() {
            if let Some(entry) = counts
                .iter_mut()
                .find(|(r, _)| r.status == resp.status && r.description == resp.description)
            {
                entry.1 += 1;
            } else {
                counts.push((resp.clone(), 1));
            }
        }
        counts.into_iter().max_by_key(|(_, count)| *count).map(|(r, _)| r)
    }
}

/// Registry keyed by `(client_addr, request_hash)`, per the resolved
/// collision concern: a bare `request_hash` can collide across distinct
/// clients, so the pair is the real key. A secondary `request_hash ->
/// client_addr` index lets a `RESPONSE` frame (which only carries the hash)
/// find its pending entry.
#[derive(Default)]
pub struct PendingRegistry {
    by_key: HashMap<(EndpointId, i32), PendingRequest>,
    by_hash: HashMap<i32, Vec<EndpointId>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        PendingRegistry::default()
    }

    pub fn insert(&mut self, request_hash: i32, pending: PendingRequest) {
        let client_addr = pending.client_addr.clone();
        self.by_hash.entry(request_hash).or_default().push(client_addr.clone());
        self.by_key.insert((client_addr, request_hash), pending);
    }

    /// Find the pending entry that expects a response from `replica` for
    /// `request_hash`, disambiguating hash collisions by checking which
    /// candidate's replica set actually includes the responder.
    pub fn find_mut(&mut self, request_hash: i32, replica: &EndpointId) -> Option<&mut PendingRequest> {
        let candidates = self.by_hash.get(&request_hash)?;
        let client_addr = candidates
            .iter()
            .find(|client| {
                self.by_key
                    .get(&((*client).clone(), request_hash))
                    .is_some_and(|p| p.replicas.contains(replica))
            })
            .cloned()?;
        self.by_key.get_mut(&(client_addr, request_hash))
    }

    pub fn remove(&mut self, request_hash: i32, client_addr: &EndpointId) -> Option<PendingRequest> {
        let pending = self.by_key.remove(&(client_addr.clone(), request_hash))?;
        if let Some(clients) = self.by_hash.get_mut(&request_hash) {
            clients.retain(|c| c != client_addr);
            if clients.is_empty() {
                self.by_hash.remove(&request_hash);
            }
        }
        Some(pending)
    }

    /// Remove and return every entry older than `timeout`.
    pub fn sweep_expired(&mut self, timeout: std::time::Duration) -> Vec<PendingRequest> {
        let now = Instant::now();
        let expired_keys: Vec<(EndpointId, i32)> = self
            .by_key
            .iter()
            .filter(|(_, p)| now.duration_since(p.created_at) > timeout)
            .map(|(k, _)| k.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_keys.len());
        for (client_addr, hash) in expired_keys {
            if let Some(pending) = self.remove(hash, &client_addr) {
                expired.push(pending);
            }
        }
        expired
    }
}
