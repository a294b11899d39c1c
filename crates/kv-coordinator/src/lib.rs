//! The coordinator: client request fan-out, quorum reconciliation, and
//! reply, sitting on top of the messaging substrate and the partitioner.

pub mod coordinator;
pub mod error;
pub mod pending;
pub mod policy;

pub use coordinator::{Coordinator, CoordinatorConfig};
pub use error::CoordinatorError;
pub use pending::{PendingRegistry, PendingRequest};
pub use policy::QuorumPolicy;
