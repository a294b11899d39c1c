//! Spins up a small cluster of [`kv_node::Node`]s bound to ephemeral
//! loopback ports, each backed by its own temporary data directory.

use kv_coordinator::QuorumPolicy;
use kv_node::config::{ConnConfig, NodeConfig, PartitionerConfig, ServerConfig, StoragerConfig};
use kv_node::Node;
use kv_wire::EndpointId;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// One running node in a [`TestCluster`].
pub struct TestNode {
    pub addr: EndpointId,
    handle: JoinHandle<()>,
    datadir: TempDir,
}

/// A cluster of nodes wired into each other via a shared seed list, running
/// on background tasks for the lifetime of the harness.
pub struct TestCluster {
    pub nodes: Vec<TestNode>,
}

/// Tuning knobs a test may want to override; [`ClusterOpts::default`] picks
/// values fast enough for gossip and ring convergence to settle well within
/// a test's timeout.
#[derive(Debug, Clone)]
pub struct ClusterOpts {
    pub vnode: usize,
    pub replica: usize,
    pub gossip_interval: Duration,
    pub response_protocol: QuorumPolicy,
    pub response_timeout: Duration,
    pub max_data_per_sstable: u64,
}

impl Default for ClusterOpts {
    fn default() -> Self {
        ClusterOpts {
            vnode: 4,
            replica: 3,
            gossip_interval: Duration::from_millis(100),
            response_protocol: QuorumPolicy::All,
            response_timeout: Duration::from_secs(5),
            max_data_per_sstable: 1 << 20,
        }
    }
}

impl TestCluster {
    /// Bind and start `count` nodes, the first acting as every later node's
    /// bootstrapper and seed. Nodes are bound sequentially because each
    /// needs the first node's real (post-bind) ephemeral address.
    pub async fn start(count: usize, opts: ClusterOpts) -> Self {
        assert!(count > 0, "a cluster needs at least one node");
        let mut nodes = Vec::with_capacity(count);
        let mut seed: Option<EndpointId> = None;

        for i in 0..count {
            let datadir = TempDir::new().expect("create node temp datadir");
            let config = NodeConfig {
                conn: ConnConfig {
                    listen_addr: EndpointId::new("127.0.0.1:0"),
                    bootstrapper: seed.clone(),
                    seeds: seed.iter().cloned().collect(),
                    max_connections: 1024,
                    max_retry: 3,
                    gossip_interval: opts.gossip_interval,
                },
                partitioner: PartitionerConfig {
                    vnode: opts.vnode,
                    replica: opts.replica,
                },
                storager: StoragerConfig {
                    datafile_dir: datadir.path().to_path_buf(),
                    max_indices_in_memory: -1,
                    max_data_per_sstable: opts.max_data_per_sstable,
                },
                server: ServerConfig {
                    interval: Duration::from_millis(200),
                    response_timeout: opts.response_timeout,
                    response_protocol: opts.response_protocol,
                },
            };

            let node = Node::bind(config).await.unwrap_or_else(|e| {
                panic!("failed to bind test node {i}: {e}");
            });
            let addr = node.local_addr().expect("bound node has a local addr");
            if seed.is_none() {
                seed = Some(addr.clone());
            }
            let handle = tokio::spawn(node.run());
            nodes.push(TestNode {
                addr,
                handle,
                datadir,
            });
        }

        TestCluster { nodes }
    }

    pub fn addrs(&self) -> Vec<EndpointId> {
        self.nodes.iter().map(|n| n.addr.clone()).collect()
    }

    pub fn addr(&self, i: usize) -> EndpointId {
        self.nodes[i].addr.clone()
    }

    pub fn datadir(&self, i: usize) -> &std::path::Path {
        self.nodes[i].datadir.path()
    }

    /// Simulate a crashed peer: abort node `i`'s driving task without
    /// touching the others. Its temp directory stays alive (still owned by
    /// `self.nodes[i]`) but the node no longer accepts connections or
    /// participates in gossip.
    pub fn kill(&mut self, i: usize) {
        self.nodes[i].handle.abort();
    }

    /// Abort every node's driving task. The harness's temp directories are
    /// cleaned up when `self` subsequently drops.
    pub fn shutdown(self) {
        for node in self.nodes {
            node.handle.abort();
        }
    }
}
