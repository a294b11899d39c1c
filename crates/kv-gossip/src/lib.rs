//! The gossip engine: three-phase SYN/ACK/ACK2 anti-entropy over cluster
//! membership and per-endpoint versioned state.

pub mod actor;
pub mod gossiper;
pub mod state;

pub use actor::{GossipActor, GossipInbound, GossipOutbound};
pub use gossiper::{GossipEvent, Gossiper};
pub use state::EndpointState;
