//! Wires the messaging substrate, the gossip engine, the partitioner, local
//! storage, and the coordinator into one running node.
//!
//! The Controller is the only pub/sub hub: every other actor registers for
//! the message codes it cares about and is fed exclusively through the
//! channel that registration returns. `REQUEST` has a single subscriber,
//! the `Coordinator` — it is the only actor that decides whether an
//! incoming request needs fanning out or can be handed straight to local
//! storage (see [`kv_wire::RequestPayload::forwarded`]).

use crate::config::NodeConfig;
use crate::error::NodeError;
use kv_coordinator::{Coordinator, CoordinatorConfig};
use kv_gossip::{GossipActor, GossipEvent, GossipInbound, GossipOutbound};
use kv_messaging::{ConnectionPool, Controller, ControllerInbound, Sender, SenderHandle, Server};
use kv_partitioner::{PartitionerActor, PartitionerInbound, RingPartitioner};
use kv_storage::{StorageActor, StorageCommand, StorageConfig};
use kv_wire::{EndpointId, Frame, GossipPayload, MessageCode};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};

/// A fully wired, not-yet-running node. [`Node::run`] consumes it and drives
/// every actor to completion (normally: forever, until the process is
/// killed or [`Node::shutdown`] is used to flush storage first).
pub struct Node {
    server: Server,
    sender: Sender,
    controller: Controller,
    gossip: GossipActor,
    partitioner: PartitionerActor,
    storage: StorageActor,
    coordinator: Coordinator,
    storage_commands: mpsc::Sender<StorageCommand>,
    bridges: Vec<tokio::task::JoinHandle<()>>,
}

impl Node {
    pub async fn bind(config: NodeConfig) -> Result<Self, NodeError> {
        let listen_addr = config.conn.listen_addr.clone();
        let pool = ConnectionPool::new();

        let (mut controller, controller_tx) = Controller::new(pool.clone(), listen_addr.clone());
        let (sender, sender_handle) =
            Sender::new(listen_addr.clone(), pool.clone(), config.conn.max_retry, controller_tx.clone());

        if let Some(bootstrapper) = config.conn.bootstrapper.clone() {
            sender_handle.new_connection(bootstrapper).await;
        }

        let server = Server::bind(&listen_addr, pool.clone(), controller_tx.clone())
            .await
            .map_err(NodeError::Bind)?;

        let gossip_rx = controller.register(MessageCode::GOSSIP);
        let new_conn_rx = controller.register(MessageCode::NEW_CONNECTION);
        let conn_lost_rx = controller.register(MessageCode::CONNECTION_LOST);
        let new_live_rx = controller.register(MessageCode::NEW_LIVE_NODE);
        let lost_live_rx = controller.register(MessageCode::LOST_LIVE_NODE);
        let request_rx = controller.register(MessageCode::REQUEST);
        let response_rx = controller.register(MessageCode::RESPONSE);

        let generation = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before 1970")
            .as_secs();

        let (gossip_outbound_tx, gossip_outbound_rx) = mpsc::channel(256);
        let (gossip_actor, gossip_inbound_tx) = GossipActor::new(
            listen_addr.clone(),
            generation,
            config.conn.seeds.clone(),
            config.conn.gossip_interval,
            gossip_outbound_tx,
        );

        let partitioner_ring =
            RingPartitioner::new(listen_addr.as_str(), config.partitioner.vnode, config.partitioner.replica);
        let (partitioner_actor, shared_partitioner, partitioner_inbound_tx) =
            PartitionerActor::new(partitioner_ring);

        let storage_config = StorageConfig {
            datafile_dir: config.storager.datafile_dir.clone(),
            max_indices_in_memory: config.storager.max_indices_in_memory,
            max_data_per_sstable: config.storager.max_data_per_sstable,
        };
        let (storage_req_tx, storage_req_rx) = mpsc::channel(256);
        let (storage_actor, storage_commands) =
            StorageActor::new(storage_config, listen_addr.clone(), sender_handle.clone(), storage_req_rx)?;

        let coordinator_config = CoordinatorConfig {
            response_protocol: config.server.response_protocol,
            vnode: config.partitioner.vnode,
            response_timeout: config.server.response_timeout,
            sweep_interval: config.server.interval,
        };
        let coordinator = Coordinator::new(
            listen_addr.clone(),
            shared_partitioner,
            sender_handle.clone(),
            request_rx,
            response_rx,
            storage_req_tx,
            coordinator_config,
        );

        let mut bridges = Vec::new();
        bridges.push(spawn_gossip_wire_bridge(gossip_rx, gossip_inbound_tx.clone()));
        bridges.push(spawn_gossip_liveness_bridge(new_conn_rx, conn_lost_rx, gossip_inbound_tx));
        bridges.push(spawn_gossip_outbound_bridge(
            gossip_outbound_rx,
            sender_handle.clone(),
            listen_addr.clone(),
            controller_tx,
        ));
        bridges.push(spawn_partitioner_liveness_bridge(new_live_rx, lost_live_rx, partitioner_inbound_tx));

        Ok(Node {
            server,
            sender,
            controller,
            gossip: gossip_actor,
            partitioner: partitioner_actor,
            storage: storage_actor,
            coordinator,
            storage_commands,
            bridges,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<EndpointId> {
        self.server.local_addr()
    }

    /// Drive every actor forever. Returns only if every actor's channel
    /// closes, which doesn't happen in ordinary operation. For a process
    /// that needs to flush storage before exiting, use
    /// [`Node::run_until_shutdown`] instead.
    pub async fn run(self) {
        let Node {
            server,
            sender,
            controller,
            gossip,
            partitioner,
            storage,
            coordinator,
            bridges,
            ..
        } = self;

        tokio::join!(
            server.run(),
            sender.run(),
            controller.run(),
            gossip.run(),
            partitioner.run(),
            storage.run(),
            coordinator.run(),
        );
        for bridge in bridges {
            bridge.abort();
        }
    }

    /// Drive every actor until `shutdown` resolves, then flush the storage
    /// engine's memtable before returning. `shutdown` is normally a future
    /// that completes on Ctrl+C or SIGTERM.
    pub async fn run_until_shutdown(self, shutdown: impl std::future::Future<Output = ()>) {
        let Node {
            server,
            sender,
            controller,
            gossip,
            partitioner,
            storage,
            coordinator,
            storage_commands,
            bridges,
        } = self;

        let actors = async {
            tokio::join!(
                server.run(),
                sender.run(),
                controller.run(),
                gossip.run(),
                partitioner.run(),
                storage.run(),
                coordinator.run(),
            );
        };
        tokio::pin!(actors);

        tokio::select! {
            () = &mut actors => {
                tracing::warn!("all actors exited on their own");
            }
            () = shutdown => {
                tracing::info!("shutdown signal received, flushing storage");
                let (tx, rx) = oneshot::channel();
                if storage_commands.send(StorageCommand::Flush(tx)).await.is_ok() {
                    match rx.await {
                        Ok(Ok(())) => tracing::info!("storage flushed"),
                        Ok(Err(e)) => tracing::error!(error = %e, "flush on shutdown failed"),
                        Err(_) => {}
                    }
                }
            }
        }
        for bridge in bridges {
            bridge.abort();
        }
    }
}

fn spawn_gossip_wire_bridge(
    mut gossip_rx: mpsc::Receiver<kv_messaging::Dispatched>,
    gossip_inbound_tx: mpsc::Sender<GossipInbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(dispatched) = gossip_rx.recv().await {
            let payload: GossipPayload = match serde_json::from_slice(&dispatched.frame.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(from = %dispatched.remote_identifier, error = %e, "malformed gossip payload");
                    continue;
                }
            };
            let from = dispatched.frame.source_addr;
            let inbound = match payload {
                GossipPayload::GossipDigestSyn { digests } => GossipInbound::Syn { from, digests },
                GossipPayload::GossipDigestAck { digests, states } => {
                    GossipInbound::Ack { from, digests, states }
                }
                GossipPayload::GossipDigestAck2 { states } => GossipInbound::Ack2 { from, states },
            };
            if gossip_inbound_tx.send(inbound).await.is_err() {
                tracing::warn!("gossip actor inbox closed, stopping wire bridge");
                return;
            }
        }
    })
}

fn spawn_gossip_liveness_bridge(
    mut new_conn_rx: mpsc::Receiver<kv_messaging::Dispatched>,
    mut conn_lost_rx: mpsc::Receiver<kv_messaging::Dispatched>,
    gossip_inbound_tx: mpsc::Sender<GossipInbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                item = new_conn_rx.recv() => {
                    match item {
                        Some(d) => {
                            if gossip_inbound_tx.send(GossipInbound::NewConnection(d.remote_identifier)).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                item = conn_lost_rx.recv() => {
                    match item {
                        Some(d) => {
                            if gossip_inbound_tx.send(GossipInbound::ConnectionLost(d.remote_identifier)).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    })
}

fn spawn_gossip_outbound_bridge(
    mut outbound_rx: mpsc::Receiver<GossipOutbound>,
    sender: SenderHandle,
    self_addr: EndpointId,
    to_controller: mpsc::Sender<ControllerInbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            match event {
                GossipOutbound::Send { to, payload } => {
                    let bytes = serde_json::to_vec(&payload).expect("GossipPayload always serializes");
                    let frame = Frame::new(MessageCode::GOSSIP, self_addr.clone(), bytes);
                    sender.send_message(to, frame).await;
                }
                GossipOutbound::Notify(event) => {
                    let (code, endpoint) = match event {
                        GossipEvent::NewLiveNode(ep) => (MessageCode::NEW_LIVE_NODE, ep),
                        GossipEvent::LostLiveNode(ep) => (MessageCode::LOST_LIVE_NODE, ep),
                    };
                    let frame = Frame::new(code, endpoint, Vec::new());
                    if to_controller
                        .send(ControllerInbound::Notification { code, frame })
                        .await
                        .is_err()
                    {
                        tracing::warn!("controller inbox closed, stopping gossip notify bridge");
                        return;
                    }
                }
            }
        }
    })
}

fn spawn_partitioner_liveness_bridge(
    mut new_live_rx: mpsc::Receiver<kv_messaging::Dispatched>,
    mut lost_live_rx: mpsc::Receiver<kv_messaging::Dispatched>,
    partitioner_inbound_tx: mpsc::Sender<PartitionerInbound>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                item = new_live_rx.recv() => {
                    match item {
                        Some(d) => {
                            if partitioner_inbound_tx.send(PartitionerInbound::NewLiveNode(d.remote_identifier)).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                item = lost_live_rx.recv() => {
                    match item {
                        Some(d) => {
                            if partitioner_inbound_tx.send(PartitionerInbound::LostLiveNode(d.remote_identifier)).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    })
}
