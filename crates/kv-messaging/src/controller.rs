//! The pub/sub controller: routes every inbound item to the applications
//! registered for its message code, and resolves the handshake that turns a
//! raw accepted socket into a canonically-addressed peer.

use crate::pool::ConnectionPool;
use kv_wire::{EndpointId, Frame, MessageCode};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// An item delivered to the Controller's inbox, from a `Receiver`, the
/// `Sender`, or an application's intra-process notification.
#[derive(Debug)]
pub enum ControllerInbound {
    Received { identifier: EndpointId, frame: Frame },
    NewConnection { identifier: EndpointId },
    ConnectionLost { identifier: EndpointId },
    Notification { code: MessageCode, frame: Frame },
}

/// What a subscriber receives: the message code (redundant with how they
/// registered, but useful when one subscriber registers for several codes),
/// the identifier of whoever it came from, and the frame.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub code: MessageCode,
    pub remote_identifier: EndpointId,
    pub frame: Frame,
}

pub struct Controller {
    pool: ConnectionPool,
    listen_addr: EndpointId,
    inbound: mpsc::Receiver<ControllerInbound>,
    subscribers: HashMap<MessageCode, Vec<mpsc::Sender<Dispatched>>>,
}

impl Controller {
    /// `bootstrapper`, if any, is no longer dialed here (the Controller
    /// doesn't need a `SenderHandle` at all): the caller wires the Sender
    /// after the Controller so it dials the bootstrapper once both are
    /// constructed, via the plain `SenderHandle` it already holds.
    pub fn new(
        pool: ConnectionPool,
        listen_addr: EndpointId,
    ) -> (Self, mpsc::Sender<ControllerInbound>) {
        let (tx, rx) = mpsc::channel(256);
        let controller = Controller {
            pool,
            listen_addr,
            inbound: rx,
            subscribers: HashMap::new(),
        };
        (controller, tx)
    }

    /// Register interest in a message code, returning the inbox the
    /// subscriber should poll. Call before [`Controller::run`].
    pub fn register(&mut self, code: MessageCode) -> mpsc::Receiver<Dispatched> {
        let (tx, rx) = mpsc::channel(256);
        self.subscribers.entry(code).or_default().push(tx);
        rx
    }

    pub async fn run(mut self) {
        while let Some(item) = self.inbound.recv().await {
            self.handle(item).await;
        }
        tracing::info!("controller inbound channel closed, stopping");
    }

    async fn handle(&mut self, item: ControllerInbound) {
        match item {
            ControllerInbound::Received { identifier, frame } => {
                if frame.code == MessageCode::NEW_CONNECTION_HANDSHAKE {
                    self.handle_handshake(identifier, frame).await;
                } else {
                    self.spread(frame.code, identifier, frame).await;
                }
            }
            ControllerInbound::NewConnection { identifier } => {
                let frame = Frame::new(MessageCode::NEW_CONNECTION, identifier.clone(), Vec::new());
                self.spread(MessageCode::NEW_CONNECTION, identifier, frame).await;
            }
            ControllerInbound::ConnectionLost { identifier } => {
                let frame = Frame::new(MessageCode::CONNECTION_LOST, identifier.clone(), Vec::new());
                self.spread(MessageCode::CONNECTION_LOST, identifier, frame).await;
            }
            ControllerInbound::Notification { code, frame } => {
                let remote = frame.source_addr.clone();
                self.spread(code, remote, frame).await;
            }
        }
    }

    async fn handle_handshake(&mut self, identifier: EndpointId, frame: Frame) {
        let canonical = frame.source_addr.clone();
        if let Err(e) = self.pool.update(&identifier, canonical.clone()).await {
            tracing::warn!(remote = %identifier, alias = %canonical, error = %e, "handshake alias update failed");
            return;
        }
        tracing::debug!(remote = %identifier, alias = %canonical, "aliased connection from handshake");

        let synthesized = Frame::new(MessageCode::NEW_CONNECTION, canonical.clone(), Vec::new());
        self.spread(MessageCode::NEW_CONNECTION, canonical, synthesized).await;
    }

    async fn spread(&mut self, code: MessageCode, remote_identifier: EndpointId, frame: Frame) {
        let Some(subs) = self.subscribers.get(&code) else {
            return;
        };
        for sub in subs {
            let dispatched = Dispatched {
                code,
                remote_identifier: remote_identifier.clone(),
                frame: frame.clone(),
            };
            if sub.send(dispatched).await.is_err() {
                tracing::warn!(?code, "subscriber inbox closed, dropping message");
            }
        }
    }

    pub fn listen_addr(&self) -> &EndpointId {
        &self.listen_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;
    use tokio::time::timeout;

    fn ep(s: &str) -> EndpointId {
        EndpointId::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn new_connection_is_spread_to_subscribers() {
        let pool = ConnectionPool::new();
        let (mut controller, inbound_tx) = Controller::new(pool, ep("127.0.0.1:9001"));
        let mut sub = controller.register(MessageCode::NEW_CONNECTION);

        let task = tokio::spawn(controller.run());
        inbound_tx
            .send(ControllerInbound::NewConnection {
                identifier: ep("127.0.0.1:9002"),
            })
            .await
            .unwrap();

        let dispatched = timeout(Duration::from_millis(200), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dispatched.remote_identifier, ep("127.0.0.1:9002"));
        drop(inbound_tx);
        let _ = task.await;
    }

    #[tokio::test]
    async fn handshake_updates_alias_and_synthesizes_new_connection() {
        let pool = ConnectionPool::new();
        let (_client, server) = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let connect = tokio::net::TcpStream::connect(addr);
            let (a, (b, _)) = tokio::join!(connect, listener.accept());
            (a.unwrap(), b)
        };
        let (_r, w) = server.into_split();
        pool.add(ep("127.0.0.1:1"), w, None).await.unwrap();

        let (mut controller, inbound_tx) = Controller::new(pool.clone(), ep("127.0.0.1:9001"));
        let mut sub = controller.register(MessageCode::NEW_CONNECTION);

        let task = tokio::spawn(controller.run());
        let handshake = Frame::new(
            MessageCode::NEW_CONNECTION_HANDSHAKE,
            ep("10.0.0.5:9042"),
            Vec::new(),
        );
        inbound_tx
            .send(ControllerInbound::Received {
                identifier: ep("127.0.0.1:1"),
                frame: handshake,
            })
            .await
            .unwrap();

        let dispatched = timeout(Duration::from_millis(200), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dispatched.remote_identifier, ep("10.0.0.5:9042"));
        assert!(pool.contains(&ep("10.0.0.5:9042")).await);
        drop(inbound_tx);
        let _ = task.await;
    }
}
