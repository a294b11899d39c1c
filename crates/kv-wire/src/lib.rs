//! Wire framing, message codes, and payload types for the cluster protocol.
//!
//! All inter-node and client traffic crosses the wire as a `Frame`: a fixed
//! 4-byte header (`size`, `code`), a 6-byte source listen-address, and an
//! opaque payload. Gossip, request, and response payloads are JSON; nothing
//! in this crate depends on `tokio` — it is pure codec and data model.

pub mod codes;
pub mod endpoint;
pub mod frame;
pub mod gossip;
pub mod hash;
pub mod request;

pub use codes::MessageCode;
pub use endpoint::EndpointId;
pub use frame::{Frame, FrameError};
pub use gossip::{
    AppStateValue, EndpointStateWire, GossipDigest, GossipPayload, HeartBeatWire, StateKey,
};
pub use hash::murmur3_32;
pub use request::{RequestPayload, ResponsePayload};
