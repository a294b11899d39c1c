//! Consistent-hash ring partitioner: maps keys to the physical nodes
//! responsible for replicating them.

pub mod actor;
pub mod error;
pub mod ring;

pub use actor::{PartitionerActor, PartitionerInbound, SharedPartitioner};
pub use error::PartitionerError;
pub use ring::RingPartitioner;
