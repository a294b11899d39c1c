//! The gossip actor: drives [`Gossiper`] from a periodic tick and inbound
//! wire/liveness messages, emitting outbound sends and notifications over
//! channels — no shared state with any other actor.

use crate::gossiper::{GossipEvent, Gossiper};
use kv_wire::{EndpointId, GossipDigest, GossipPayload};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// What the gossip actor consumes: wire messages already decoded by the
/// messaging substrate, plus liveness events forwarded from the Controller.
#[derive(Debug, Clone)]
pub enum GossipInbound {
    Syn {
        from: EndpointId,
        digests: Vec<GossipDigest>,
    },
    Ack {
        from: EndpointId,
        digests: Vec<GossipDigest>,
        states: HashMap<EndpointId, kv_wire::EndpointStateWire>,
    },
    Ack2 {
        from: EndpointId,
        states: HashMap<EndpointId, kv_wire::EndpointStateWire>,
    },
    NewConnection(EndpointId),
    ConnectionLost(EndpointId),
}

/// What the gossip actor produces: a frame to send, or a liveness
/// notification for the partitioner (and anyone else subscribed).
#[derive(Debug, Clone)]
pub enum GossipOutbound {
    Send { to: EndpointId, payload: GossipPayload },
    Notify(GossipEvent),
}

pub struct GossipActor {
    gossiper: Gossiper,
    inbound: mpsc::Receiver<GossipInbound>,
    outbound: mpsc::Sender<GossipOutbound>,
    tick_interval: Duration,
    seeds: Vec<EndpointId>,
}

impl GossipActor {
    pub fn new(
        self_addr: EndpointId,
        generation: u64,
        seeds: Vec<EndpointId>,
        tick_interval: Duration,
        outbound: mpsc::Sender<GossipOutbound>,
    ) -> (Self, mpsc::Sender<GossipInbound>) {
        let (tx, rx) = mpsc::channel(256);
        let actor = GossipActor {
            gossiper: Gossiper::new(self_addr, generation),
            inbound: rx,
            outbound,
            tick_interval,
            seeds,
        };
        (actor, tx)
    }

    /// Run the actor loop. Never returns except when the inbound channel
    /// closes (node shutting down).
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick().await,
                msg = self.inbound.recv() => {
                    match msg {
                        Some(msg) => self.handle_inbound(msg).await,
                        None => {
                            tracing::info!("gossip inbound channel closed, stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        let digests = self.gossiper.tick();
        if digests.is_empty() {
            return;
        }
        tracing::debug!(my_heartbeat = ?digests.first(), "gossip tick");

        let live: Vec<EndpointId> = self.gossiper.live_endpoints().cloned().collect();
        let unreachable: Vec<EndpointId> = self.gossiper.unreachable_endpoints().cloned().collect();
        let payload = GossipPayload::GossipDigestSyn { digests };

        let mut gossiped_to_seed = false;
        if let Some(target) = pick_random(&live) {
            gossiped_to_seed = self.seeds.contains(&target);
            self.send(target, payload.clone()).await;
        }

        if !unreachable.is_empty()
            && rand_probability() < unreachable.len() as f64 / (live.len() + 1) as f64
        {
            if let Some(target) = pick_random(&unreachable) {
                self.send(target, payload.clone()).await;
            }
        }

        self.maybe_gossip_to_seed(&payload, &live, &unreachable, gossiped_to_seed)
            .await;
    }

    async fn maybe_gossip_to_seed(
        &self,
        payload: &GossipPayload,
        live: &[EndpointId],
        unreachable: &[EndpointId],
        gossiped_to_seed: bool,
    ) {
        if self.seeds.is_empty() {
            return;
        }
        if self.seeds.len() == 1 && self.seeds[0] == *self.gossiper.self_addr() {
            return;
        }

        if live.is_empty() {
            if let Some(target) = pick_random(&self.seeds) {
                self.send(target, payload.clone()).await;
            }
            return;
        }

        if !gossiped_to_seed || live.len() < self.seeds.len() {
            let denom = (live.len() + unreachable.len()).max(1) as f64;
            if rand_probability() <= self.seeds.len() as f64 / denom {
                if let Some(target) = pick_random(&self.seeds) {
                    self.send(target, payload.clone()).await;
                }
            }
        }
    }

    async fn handle_inbound(&mut self, msg: GossipInbound) {
        match msg {
            GossipInbound::NewConnection(ep) => {
                self.gossiper.connection_established(ep);
            }
            GossipInbound::ConnectionLost(ep) => {
                self.gossiper.connection_lost(ep.clone());
                self.notify(GossipEvent::LostLiveNode(ep)).await;
            }
            GossipInbound::Syn { from, digests } => {
                if !self.gossiper.has_sent_first_syn() {
                    tracing::debug!(peer = %from, "ignoring gossip syn before first syn sent");
                    return;
                }
                let (delta_digests, delta_states) = self.gossiper.examine_gossiper(&digests);
                let ack = GossipPayload::GossipDigestAck {
                    digests: delta_digests,
                    states: delta_states,
                };
                self.send(from, ack).await;
            }
            GossipInbound::Ack { from, digests, states } => {
                if !states.is_empty() {
                    let events = self.gossiper.apply_state_locally(states);
                    for event in events {
                        self.notify(event).await;
                    }
                }

                let mut delta_states = HashMap::new();
                for digest in digests {
                    if let Some(wire) = self
                        .gossiper
                        .state_for_version_above(&digest.endpoint, digest.max_version)
                    {
                        delta_states.insert(digest.endpoint, wire);
                    }
                }

                if delta_states.is_empty() {
                    tracing::debug!(peer = %from, "no newer state to send, skipping ack2");
                } else {
                    self.send(from, GossipPayload::GossipDigestAck2 { states: delta_states })
                        .await;
                }
            }
            GossipInbound::Ack2 { states, .. } => {
                let events = self.gossiper.apply_state_locally(states);
                for event in events {
                    self.notify(event).await;
                }
            }
        }
    }

    async fn send(&self, to: EndpointId, payload: GossipPayload) {
        if self.outbound.send(GossipOutbound::Send { to, payload }).await.is_err() {
            tracing::warn!("gossip outbound channel closed while sending");
        }
    }

    async fn notify(&self, event: GossipEvent) {
        if self.outbound.send(GossipOutbound::Notify(event)).await.is_err() {
            tracing::warn!("gossip outbound channel closed while notifying");
        }
    }
}

fn pick_random(items: &[EndpointId]) -> Option<EndpointId> {
    items.choose(&mut rand::thread_rng()).cloned()
}

fn rand_probability() -> f64 {
    rand::random::<f64>()
}
