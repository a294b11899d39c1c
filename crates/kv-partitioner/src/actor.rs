//! Async wrapper around [`RingPartitioner`]: mutated by gossip liveness
//! notifications, read synchronously (no `.await`) by the coordinator's
//! replica lookups.

use crate::ring::RingPartitioner;
use kv_wire::EndpointId;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Liveness events the partitioner reacts to, forwarded from the gossip
/// engine via the Controller.
#[derive(Debug, Clone)]
pub enum PartitionerInbound {
    NewLiveNode(EndpointId),
    LostLiveNode(EndpointId),
}

/// Cheaply cloneable handle to the shared ring. `find_replicas` is a plain
/// synchronous call so the coordinator can use it inline while handling a
/// request, without a channel round-trip.
#[derive(Clone)]
pub struct SharedPartitioner {
    inner: Arc<Mutex<RingPartitioner>>,
}

impl SharedPartitioner {
    pub fn new(partitioner: RingPartitioner) -> Self {
        SharedPartitioner {
            inner: Arc::new(Mutex::new(partitioner)),
        }
    }

    pub fn find_replicas(&self, key: &str) -> Vec<EndpointId> {
        self.inner
            .lock()
            .expect("partitioner mutex poisoned")
            .find_replicas(key)
            .into_iter()
            .map(EndpointId::new)
            .collect()
    }
}

pub struct PartitionerActor {
    shared: SharedPartitioner,
    inbound: mpsc::Receiver<PartitionerInbound>,
}

impl PartitionerActor {
    pub fn new(
        partitioner: RingPartitioner,
    ) -> (Self, SharedPartitioner, mpsc::Sender<PartitionerInbound>) {
        let (tx, rx) = mpsc::channel(256);
        let shared = SharedPartitioner::new(partitioner);
        let actor = PartitionerActor {
            shared: shared.clone(),
            inbound: rx,
        };
        (actor, shared, tx)
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.inbound.recv().await {
            self.handle(msg);
        }
        tracing::info!("partitioner inbound channel closed, stopping");
    }

    fn handle(&mut self, msg: PartitionerInbound) {
        let mut ring = self.shared.inner.lock().expect("partitioner mutex poisoned");
        match msg {
            PartitionerInbound::NewLiveNode(ep) => {
                if !ring.contains_physical_node(ep.as_str()) {
                    if let Err(e) = ring.new_physical_node(ep.as_str()) {
                        tracing::warn!(endpoint = %ep, error = %e, "failed to onboard live node");
                    }
                }
            }
            PartitionerInbound::LostLiveNode(ep) => {
                ring.delete_physical_node(ep.as_str());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ep(s: &str) -> EndpointId {
        EndpointId::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn new_live_node_onboards_into_shared_ring() {
        let (actor, shared, tx) = PartitionerActor::new(RingPartitioner::with_defaults("10.0.0.1:9042"));
        tokio::spawn(actor.run());

        tx.send(PartitionerInbound::NewLiveNode(ep("10.0.0.2:9042")))
            .await
            .unwrap();
        tokio::task::yield_now().await;
        // give the actor a moment to process
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let replicas = shared.find_replicas("some-key");
        assert!(replicas.len() >= 1);
    }

    #[tokio::test]
    async fn lost_live_node_removes_from_shared_ring() {
        let mut ring = RingPartitioner::with_defaults("10.0.0.1:9042");
        ring.new_physical_node("10.0.0.2:9042").unwrap();
        let (actor, shared, tx) = PartitionerActor::new(ring);
        tokio::spawn(actor.run());

        tx.send(PartitionerInbound::LostLiveNode(ep("10.0.0.2:9042")))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let replicas = shared.find_replicas("some-key");
        assert_eq!(replicas, vec![ep("10.0.0.1:9042")]);
    }
}
