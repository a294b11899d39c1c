//! Shared test utilities for cluster integration tests.
//!
//! Provides an in-memory multi-node cluster harness and a raw client for
//! driving `REQUEST`/`RESPONSE` traffic against it, plus a poll-with-timeout
//! helper for waiting on eventually-consistent conditions (gossip
//! convergence, ring membership, replication).

pub mod client;
pub mod cluster;
pub mod wait;

pub use client::TestClient;
pub use cluster::{ClusterOpts, TestCluster, TestNode};
pub use wait::wait_until;
