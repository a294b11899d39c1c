//! The messaging substrate: the connection pool, the accept loop, the
//! per-connection readers, the outbound sender, and the pub/sub controller
//! that ties them together for the rest of the node.

pub mod controller;
pub mod pool;
pub mod receiver;
pub mod sender;
pub mod server;

pub use controller::{Controller, ControllerInbound, Dispatched};
pub use pool::{ConnectionPool, PoolError};
pub use receiver::Receiver;
pub use sender::{SendWork, Sender, SenderHandle};
pub use server::Server;
