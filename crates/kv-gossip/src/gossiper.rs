//! Core gossip algorithm: digest building, the SYN/ACK/ACK2 examiner, and
//! state merging. Pure and synchronous — the actor in [`crate::actor`] drives
//! it from a tick timer and inbound wire messages.

use crate::state::{now_unix, EndpointState};
use kv_wire::{EndpointId, GossipDigest, HeartBeatWire};
use rand::seq::SliceRandom;
use std::collections::HashMap;

/// A liveness notification the partitioner (and anything else subscribed)
/// cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipEvent {
    NewLiveNode(EndpointId),
    LostLiveNode(EndpointId),
}

/// Maintains this node's view of cluster membership and per-endpoint
/// versioned state.
pub struct Gossiper {
    self_addr: EndpointId,
    endpoint_state_map: HashMap<EndpointId, EndpointState>,
    live_endpoints: std::collections::HashSet<EndpointId>,
    unreachable_endpoints: HashMap<EndpointId, u64>,
    first_syn_sent_at: Option<u64>,
}

impl Gossiper {
    pub fn new(self_addr: EndpointId, generation: u64) -> Self {
        let mut endpoint_state_map = HashMap::new();
        endpoint_state_map.insert(self_addr.clone(), EndpointState::new_local(generation));
        Gossiper {
            self_addr,
            endpoint_state_map,
            live_endpoints: std::collections::HashSet::new(),
            unreachable_endpoints: HashMap::new(),
            first_syn_sent_at: None,
        }
    }

    pub fn self_addr(&self) -> &EndpointId {
        &self.self_addr
    }

    pub fn live_endpoints(&self) -> impl Iterator<Item = &EndpointId> {
        self.live_endpoints.iter()
    }

    pub fn unreachable_endpoints(&self) -> impl Iterator<Item = &EndpointId> {
        self.unreachable_endpoints.keys()
    }

    pub fn has_sent_first_syn(&self) -> bool {
        self.first_syn_sent_at.is_some()
    }

    fn mark_first_syn_sent(&mut self) {
        if self.first_syn_sent_at.is_none() {
            self.first_syn_sent_at = Some(now_unix());
        }
    }

    /// Bump our own heartbeat version and build the randomized digest set
    /// for this tick's SYN.
    pub fn tick(&mut self) -> Vec<GossipDigest> {
        if let Some(local) = self.endpoint_state_map.get_mut(&self.self_addr) {
            local.update_heartbeat();
        }
        self.mark_first_syn_sent();
        self.make_random_digest()
    }

    fn make_random_digest(&self) -> Vec<GossipDigest> {
        let mut endpoints: Vec<&EndpointId> = self.endpoint_state_map.keys().collect();
        endpoints.shuffle(&mut rand::thread_rng());
        endpoints
            .into_iter()
            .map(|ep| {
                let state = &self.endpoint_state_map[ep];
                GossipDigest::new(ep.clone(), state.generation(), state.max_version())
            })
            .collect()
    }

    /// `NEW_CONNECTION` from the messaging layer: the peer is reachable.
    pub fn connection_established(&mut self, peer: EndpointId) {
        self.unreachable_endpoints.remove(&peer);
        self.live_endpoints.insert(peer);
    }

    /// `CONNECTION_LOST` from the messaging layer: the peer dropped off.
    pub fn connection_lost(&mut self, peer: EndpointId) {
        if self.live_endpoints.remove(&peer) {
            self.unreachable_endpoints.insert(peer.clone(), now_unix());
        }
    }

    /// Examine an incoming SYN's digests, producing the delta digest list
    /// (what we want the sender to tell us) and delta state map (what we
    /// have that the sender doesn't), for a `GossipDigestAck` reply.
    pub fn examine_gossiper(
        &self,
        digests: &[GossipDigest],
    ) -> (Vec<GossipDigest>, HashMap<EndpointId, kv_wire::EndpointStateWire>) {
        let mut delta_digests = Vec::new();
        let mut delta_states = HashMap::new();

        for digest in digests {
            let Some(local) = self.endpoint_state_map.get(&digest.endpoint) else {
                delta_digests.push(request_all(digest));
                continue;
            };

            let local_gen = local.generation();
            let local_max = local.max_version();

            if digest.generation == local_gen && local_max == digest.max_version {
                continue;
            }

            if digest.generation > local_gen {
                delta_digests.push(request_all(digest));
            } else if digest.generation == local_gen {
                if local_max > digest.max_version {
                    if let Some(wire) = local.state_newer_than(digest.max_version) {
                        delta_states.insert(digest.endpoint.clone(), wire);
                    }
                } else if local_max < digest.max_version {
                    delta_digests.push(GossipDigest::new(
                        digest.endpoint.clone(),
                        digest.generation,
                        local_max,
                    ));
                }
            } else {
                // digest.generation < local_gen: the peer's whole generation
                // is stale relative to ours. Send everything we have so it
                // can catch up, rather than comparing versions across
                // generations (which the source's diverging revisions did,
                // incoherently).
                if let Some(wire) = local.state_newer_than(0) {
                    delta_states.insert(digest.endpoint.clone(), wire);
                }
            }
        }

        (delta_digests, delta_states)
    }

    /// Merge received endpoint state into our local view, returning any
    /// liveness notifications that resulted.
    pub fn apply_state_locally(
        &mut self,
        remote: HashMap<EndpointId, kv_wire::EndpointStateWire>,
    ) -> Vec<GossipEvent> {
        let mut events = Vec::new();
        for (ep, remote_wire) in remote {
            if ep == self.self_addr {
                continue;
            }

            match self.endpoint_state_map.get(&ep) {
                None => {
                    events.push(self.handle_major_state_change(ep, remote_wire));
                }
                Some(local) => {
                    let local_gen = local.generation();
                    let remote_gen = remote_wire.heartbeat.generation;

                    if remote_gen > now_unix() {
                        tracing::warn!(
                            endpoint = %ep,
                            remote_generation = remote_gen,
                            "received an invalid gossip generation, ignoring"
                        );
                        continue;
                    }

                    if remote_gen == local_gen {
                        let local_max = local.max_version();
                        if remote_wire.max_version() > local_max {
                            self.apply_new_states(&ep, remote_wire);
                        }
                    } else if remote_gen > local_gen {
                        // Generation jumps are only ever surfaced through the
                        // examiner's request-all path (§4.6); do not
                        // silently overwrite local state here.
                        tracing::debug!(
                            endpoint = %ep,
                            remote_generation = remote_gen,
                            local_generation = local_gen,
                            "ignoring higher remote generation in apply_state_locally"
                        );
                    } else {
                        tracing::debug!(
                            endpoint = %ep,
                            remote_generation = remote_gen,
                            local_generation = local_gen,
                            "ignoring stale remote generation"
                        );
                    }
                }
            }
        }
        events
    }

    fn handle_major_state_change(
        &mut self,
        ep: EndpointId,
        wire: kv_wire::EndpointStateWire,
    ) -> GossipEvent {
        tracing::debug!(endpoint = %ep, "adding endpoint state for new/restarted node");
        self.endpoint_state_map
            .insert(ep.clone(), EndpointState::from_wire(wire));
        self.unreachable_endpoints.remove(&ep);
        self.live_endpoints.insert(ep.clone());
        GossipEvent::NewLiveNode(ep)
    }

    fn apply_new_states(&mut self, ep: &EndpointId, remote_wire: kv_wire::EndpointStateWire) {
        if let Some(local) = self.endpoint_state_map.get_mut(ep) {
            local.wire.heartbeat = remote_wire.heartbeat;
            for (key, value) in remote_wire.application_states {
                let should_replace = local
                    .wire
                    .application_states
                    .get(&key)
                    .is_none_or(|existing| value.version > existing.version);
                if should_replace {
                    local.wire.application_states.insert(key, value);
                }
            }
        }
    }

    /// Resolve the `CONNECTION_LOST` → `LOST_LIVE_NODE` notification the
    /// actor emits alongside [`Gossiper::connection_lost`].
    pub fn lost_live_node_event(peer: EndpointId) -> GossipEvent {
        GossipEvent::LostLiveNode(peer)
    }

    pub fn state_for_version_above(
        &self,
        ep: &EndpointId,
        version: u64,
    ) -> Option<kv_wire::EndpointStateWire> {
        self.endpoint_state_map.get(ep)?.state_newer_than(version)
    }
}

fn request_all(digest: &GossipDigest) -> GossipDigest {
    GossipDigest::new(digest.endpoint.clone(), digest.generation, 0)
}
