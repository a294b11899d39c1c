//! Gossip payload types: digests, endpoint state, and the SYN/ACK/ACK2
//! envelope.
//!
//! Endpoint states serialize with a string-tagged application-state map
//! rather than a fixed struct of named slots, per the source's "application
//! state enumeration" note — new state kinds don't require a wire format
//! change.

use crate::endpoint::EndpointId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A key identifying one slot of per-endpoint application state.
///
/// Serializes as its string tag (`"STATUS"`, or the custom tag verbatim) so
/// the wire format never hard-codes a fixed slot list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    Status,
    Custom(String),
}

impl StateKey {
    pub fn tag(&self) -> &str {
        match self {
            StateKey::Status => "STATUS",
            StateKey::Custom(s) => s.as_str(),
        }
    }
}

impl Serialize for StateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "STATUS" => StateKey::Status,
            _ => StateKey::Custom(tag),
        })
    }
}

/// A versioned application-state value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateValue {
    pub value: String,
    pub version: u64,
}

/// Per-endpoint heartbeat: a fixed `generation` (process start time) and a
/// monotonically increasing `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartBeatWire {
    pub generation: u64,
    pub version: u64,
}

/// The full state this node knows about one endpoint, as exchanged over the
/// wire (local-only fields like `is_alive` and `last_update` live in
/// `kv-gossip::EndpointState`, not here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStateWire {
    pub heartbeat: HeartBeatWire,
    #[serde(default)]
    pub application_states: HashMap<StateKey, AppStateValue>,
}

impl EndpointStateWire {
    pub fn new(heartbeat: HeartBeatWire) -> Self {
        EndpointStateWire {
            heartbeat,
            application_states: HashMap::new(),
        }
    }

    /// The largest version across the heartbeat and every application-state
    /// entry — the quantity gossip digests compare.
    pub fn max_version(&self) -> u64 {
        self.application_states
            .values()
            .map(|v| v.version)
            .fold(self.heartbeat.version, u64::max)
    }
}

/// `(endpoint, generation, maxVersion)` triple exchanged in the SYN phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipDigest {
    pub endpoint: EndpointId,
    pub generation: u64,
    pub max_version: u64,
}

impl GossipDigest {
    pub fn new(endpoint: EndpointId, generation: u64, max_version: u64) -> Self {
        GossipDigest {
            endpoint,
            generation,
            max_version,
        }
    }
}

/// The three-phase gossip envelope. Serializes with a `type` tag so a fixed
/// dispatch table (rather than a runtime class registry) can reconstruct it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GossipPayload {
    GossipDigestSyn {
        digests: Vec<GossipDigest>,
    },
    GossipDigestAck {
        digests: Vec<GossipDigest>,
        states: HashMap<EndpointId, EndpointStateWire>,
    },
    GossipDigestAck2 {
        states: HashMap<EndpointId, EndpointStateWire>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_key_round_trips_through_json() {
        let mut states = HashMap::new();
        states.insert(
            StateKey::Status,
            AppStateValue {
                value: "UP".to_owned(),
                version: 3,
            },
        );
        let wire = EndpointStateWire {
            heartbeat: HeartBeatWire {
                generation: 1,
                version: 5,
            },
            application_states: states,
        };
        let json = serde_json::to_string(&wire).unwrap();
        assert!(json.contains("\"STATUS\""));
        let back: EndpointStateWire = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wire);
    }

    #[test]
    fn max_version_considers_application_states() {
        let mut states = HashMap::new();
        states.insert(
            StateKey::Status,
            AppStateValue {
                value: "UP".to_owned(),
                version: 42,
            },
        );
        let wire = EndpointStateWire {
            heartbeat: HeartBeatWire {
                generation: 1,
                version: 5,
            },
            application_states: states,
        };
        assert_eq!(wire.max_version(), 42);
    }

    #[test]
    fn gossip_payload_tag_round_trips() {
        let ep = EndpointId::from_str("127.0.0.1:9042").unwrap();
        let syn = GossipPayload::GossipDigestSyn {
            digests: vec![GossipDigest::new(ep, 1, 0)],
        };
        let json = serde_json::to_string(&syn).unwrap();
        assert!(json.contains("\"GossipDigestSyn\""));
        let back: GossipPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, syn);
    }

    #[test]
    fn custom_state_key_preserves_tag() {
        let key = StateKey::Custom("LOAD".to_owned());
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"LOAD\"");
    }
}
