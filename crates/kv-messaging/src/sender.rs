//! The sender: the single actor that owns all outbound I/O, multiplexing a
//! work queue of sends and new-connection requests.

use crate::controller::ControllerInbound;
use crate::pool::{ConnectionPool, PoolError};
use crate::receiver::Receiver;
use kv_wire::{EndpointId, Frame, MessageCode};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const DEFAULT_MAX_RETRY: u32 = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug)]
pub enum SendWork {
    SendMessage {
        identifier: EndpointId,
        frame: Frame,
        retry_counter: u32,
    },
    NewConnection {
        identifier: EndpointId,
        retry_counter: u32,
    },
}

/// Cheaply cloneable handle applications use to ask the Sender to deliver a
/// frame or establish a connection.
#[derive(Clone)]
pub struct SenderHandle {
    tx: mpsc::Sender<SendWork>,
}

impl SenderHandle {
    pub fn new(tx: mpsc::Sender<SendWork>) -> Self {
        SenderHandle { tx }
    }

    pub async fn send_message(&self, identifier: EndpointId, frame: Frame) {
        let work = SendWork::SendMessage {
            identifier,
            frame,
            retry_counter: 0,
        };
        if self.tx.send(work).await.is_err() {
            tracing::warn!("sender work queue closed while enqueuing a send");
        }
    }

    pub async fn new_connection(&self, identifier: EndpointId) {
        let work = SendWork::NewConnection {
            identifier,
            retry_counter: 0,
        };
        if self.tx.send(work).await.is_err() {
            tracing::warn!("sender work queue closed while enqueuing a connection request");
        }
    }
}

pub struct Sender {
    listen_addr: EndpointId,
    pool: ConnectionPool,
    max_retry: u32,
    rx: mpsc::Receiver<SendWork>,
    self_tx: mpsc::Sender<SendWork>,
    to_controller: mpsc::Sender<ControllerInbound>,
}

impl Sender {
    pub fn new(
        listen_addr: EndpointId,
        pool: ConnectionPool,
        max_retry: u32,
        to_controller: mpsc::Sender<ControllerInbound>,
    ) -> (Self, SenderHandle) {
        let (tx, rx) = mpsc::channel(256);
        let sender = Sender {
            listen_addr,
            pool,
            max_retry,
            rx,
            self_tx: tx.clone(),
            to_controller,
        };
        (sender, SenderHandle::new(tx))
    }

    pub fn with_default_retry(
        listen_addr: EndpointId,
        pool: ConnectionPool,
        to_controller: mpsc::Sender<ControllerInbound>,
    ) -> (Self, SenderHandle) {
        Self::new(listen_addr, pool, DEFAULT_MAX_RETRY, to_controller)
    }

    pub async fn run(mut self) {
        while let Some(work) = self.rx.recv().await {
            self.handle(work).await;
        }
        tracing::info!("sender work queue closed, stopping");
    }

    async fn handle(&mut self, work: SendWork) {
        match work {
            SendWork::SendMessage {
                identifier,
                frame,
                retry_counter,
            } => self.handle_send(identifier, frame, retry_counter).await,
            SendWork::NewConnection {
                identifier,
                retry_counter,
            } => self.handle_new_connection(identifier, retry_counter).await,
        }
    }

    async fn handle_send(&mut self, identifier: EndpointId, frame: Frame, retry_counter: u32) {
        if identifier == self.listen_addr {
            if self
                .to_controller
                .send(ControllerInbound::Received {
                    identifier: identifier.clone(),
                    frame,
                })
                .await
                .is_err()
            {
                tracing::warn!("controller inbox closed while looping back a local send");
            }
            return;
        }

        let bytes = match frame.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound frame, dropping");
                return;
            }
        };

        match self.pool.send(&identifier, &bytes).await {
            Ok(()) => {
                tracing::debug!(to = %identifier, code = %frame.code, "sent message");
            }
            Err(PoolError::IdentifierNotFound(_)) => {
                if retry_counter == 0 {
                    tracing::debug!(to = %identifier, "connection not found, dialing first");
                    self.enqueue(SendWork::NewConnection {
                        identifier: identifier.clone(),
                        retry_counter: 0,
                    })
                    .await;
                }
                if retry_counter <= self.max_retry {
                    self.enqueue(SendWork::SendMessage {
                        identifier,
                        frame,
                        retry_counter: retry_counter + 1,
                    })
                    .await;
                } else {
                    tracing::error!(to = %identifier, "discarding message after max retries");
                }
            }
            Err(e) => {
                tracing::error!(to = %identifier, error = %e, "send failed");
            }
        }
    }

    async fn handle_new_connection(&mut self, identifier: EndpointId, retry_counter: u32) {
        tracing::info!(to = %identifier, "establishing new connection");
        let Ok(sock_addr) = identifier.to_socket_addr_v4() else {
            tracing::error!(to = %identifier, "cannot dial a malformed identifier");
            return;
        };

        match TcpStream::connect(sock_addr).await {
            Ok(stream) => self.on_dial_success(identifier, stream).await,
            Err(e) => {
                tracing::error!(to = %identifier, error = %e, "connection attempt failed");
                if retry_counter >= self.max_retry {
                    tracing::error!(to = %identifier, "reached maximum connection retries, giving up");
                } else {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    self.enqueue(SendWork::NewConnection {
                        identifier,
                        retry_counter: retry_counter + 1,
                    })
                    .await;
                }
            }
        }
    }

    async fn on_dial_success(&mut self, identifier: EndpointId, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        if let Err(e) = self
            .pool
            .add(identifier.clone(), write_half, Some(identifier.clone()))
            .await
        {
            tracing::error!(to = %identifier, error = %e, "failed to register dialed connection");
            return;
        }
        tracing::info!(to = %identifier, "added connection to pool");

        Receiver::spawn(
            read_half,
            identifier.clone(),
            self.to_controller.clone(),
            self.pool.clone(),
        );

        if self
            .to_controller
            .send(ControllerInbound::NewConnection {
                identifier: identifier.clone(),
            })
            .await
            .is_err()
        {
            tracing::warn!("controller inbox closed while announcing new connection");
        }

        let handshake = Frame::new(
            MessageCode::NEW_CONNECTION_HANDSHAKE,
            self.listen_addr.clone(),
            Vec::new(),
        );
        match handshake.encode() {
            Ok(bytes) => {
                if let Err(e) = self.pool.send(&identifier, &bytes).await {
                    tracing::error!(to = %identifier, error = %e, "failed to send handshake");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode handshake frame"),
        }
    }

    async fn enqueue(&self, work: SendWork) {
        if self.self_tx.send(work).await.is_err() {
            tracing::warn!("sender work queue closed while requeuing");
        }
    }
}
