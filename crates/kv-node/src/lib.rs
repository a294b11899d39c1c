//! Wires the messaging substrate, gossip, partitioner, storage, and
//! coordinator crates into a single running cluster node, plus the TOML
//! configuration loader that describes one.

pub mod config;
pub mod error;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use error::NodeError;
pub use node::Node;
