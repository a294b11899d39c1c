//! Per-endpoint gossip state: the heartbeat plus whatever this node locally
//! knows about liveness, layered over the wire-format [`EndpointStateWire`].

use kv_wire::{AppStateValue, EndpointStateWire, HeartBeatWire, StateKey};
use std::time::{SystemTime, UNIX_EPOCH};

/// The full gossip state this node holds for one endpoint: the wire-visible
/// heartbeat/application-state plus local-only bookkeeping (`is_alive`,
/// `last_update`) that never crosses the wire.
#[derive(Debug, Clone)]
pub struct EndpointState {
    pub wire: EndpointStateWire,
    pub is_alive: bool,
    pub last_update: u64,
}

impl EndpointState {
    /// A fresh state for a node starting up now: generation pinned to the
    /// current unix timestamp, version zero.
    pub fn new_local(now_generation: u64) -> Self {
        EndpointState {
            wire: EndpointStateWire::new(HeartBeatWire {
                generation: now_generation,
                version: 0,
            }),
            is_alive: true,
            last_update: now_unix(),
        }
    }

    pub fn from_wire(wire: EndpointStateWire) -> Self {
        EndpointState {
            wire,
            is_alive: true,
            last_update: now_unix(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.wire.heartbeat.generation
    }

    pub fn max_version(&self) -> u64 {
        self.wire.max_version()
    }

    /// Bump the heartbeat version — called once per gossip tick for this
    /// node's own state.
    pub fn update_heartbeat(&mut self) {
        self.wire.heartbeat.version += 1;
        self.last_update = now_unix();
    }

    pub fn set_application_state(&mut self, key: StateKey, value: String) {
        let version = self.wire.heartbeat.version + 1;
        self.wire
            .application_states
            .insert(key, AppStateValue { value, version });
    }

    /// The subset of this state with version strictly greater than
    /// `version`, or `None` if nothing qualifies (including the heartbeat
    /// itself).
    pub fn state_newer_than(&self, version: u64) -> Option<EndpointStateWire> {
        let newer_states: std::collections::HashMap<_, _> = self
            .wire
            .application_states
            .iter()
            .filter(|(_, v)| v.version > version)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if self.wire.heartbeat.version > version || !newer_states.is_empty() {
            Some(EndpointStateWire {
                heartbeat: self.wire.heartbeat,
                application_states: newer_states,
            })
        } else {
            None
        }
    }
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
