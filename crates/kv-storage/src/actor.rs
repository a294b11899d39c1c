//! Async wrapper around [`StorageEngine`]: a single task owns the engine,
//! serializing every `REQUEST` against it and flushing on shutdown.

use crate::engine::{StorageConfig, StorageEngine};
use crate::error::StorageError;
use kv_messaging::{Dispatched, SenderHandle};
use kv_wire::{EndpointId, Frame, MessageCode, RequestPayload};
use tokio::sync::{mpsc, oneshot};

/// Out-of-band commands for the storage actor, distinct from the normal
/// `REQUEST` traffic routed through the Controller.
pub enum StorageCommand {
    /// Flush the memtable and acknowledge once durable, used by the node's
    /// graceful-shutdown handler.
    Flush(oneshot::Sender<Result<(), StorageError>>),
}

pub struct StorageActor {
    engine: StorageEngine,
    self_addr: EndpointId,
    sender: SenderHandle,
    requests: mpsc::Receiver<Dispatched>,
    commands: mpsc::Receiver<StorageCommand>,
}

impl StorageActor {
    pub fn new(
        config: StorageConfig,
        self_addr: EndpointId,
        sender: SenderHandle,
        requests: mpsc::Receiver<Dispatched>,
    ) -> Result<(Self, mpsc::Sender<StorageCommand>), StorageError> {
        let engine = StorageEngine::open(config)?;
        let (tx, rx) = mpsc::channel(16);
        let actor = StorageActor {
            engine,
            self_addr,
            sender,
            requests,
            commands: rx,
        };
        Ok((actor, tx))
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                item = self.requests.recv() => {
                    match item {
                        Some(d) => self.handle_request(d).await,
                        None => {
                            tracing::info!("storage request channel closed, stopping");
                            return;
                        }
                    }
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(StorageCommand::Flush(ack)) => {
                            let result = self.engine.flush_to_file();
                            if let Err(e) = &result {
                                tracing::error!(error = %e, "flush on shutdown failed");
                            }
                            let _ = ack.send(result);
                        }
                        None => {
                            tracing::info!("storage command channel closed, stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_request(&mut self, dispatched: Dispatched) {
        let payload: RequestPayload = match serde_json::from_slice(&dispatched.frame.payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(from = %dispatched.remote_identifier, error = %e, "malformed request payload at storage");
                return;
            }
        };

        let response = self.engine.handle_request(&payload);
        let frame = Frame::new(
            MessageCode::RESPONSE,
            self.self_addr.clone(),
            serde_json::to_vec(&response).expect("ResponsePayload always serializes"),
        );
        self.sender.send_message(dispatched.remote_identifier, frame).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_messaging::SendWork;
    use std::str::FromStr;
    use std::time::Duration;
    use tokio::time::timeout;

    fn ep(s: &str) -> EndpointId {
        EndpointId::from_str(s).unwrap()
    }

    fn fake_sender() -> (SenderHandle, mpsc::Receiver<SendWork>) {
        let (tx, rx) = mpsc::channel(16);
        (SenderHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn request_dispatch_replies_to_sender() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            datafile_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let (sender, mut sent) = fake_sender();
        let (req_tx, req_rx) = mpsc::channel(16);
        let (actor, _cmds) =
            StorageActor::new(config, ep("10.0.0.1:9042"), sender, req_rx).unwrap();
        tokio::spawn(actor.run());

        let payload = RequestPayload::new(
            vec!["put".to_owned(), "alpha".to_owned(), "one".to_owned()],
            1,
        );
        let frame = Frame::new(MessageCode::REQUEST, ep("10.0.0.2:9042"), serde_json::to_vec(&payload).unwrap());
        req_tx
            .send(Dispatched {
                code: MessageCode::REQUEST,
                remote_identifier: ep("10.0.0.2:9042"),
                frame,
            })
            .await
            .unwrap();

        let work = timeout(Duration::from_millis(200), sent.recv()).await.unwrap().unwrap();
        match work {
            SendWork::SendMessage { identifier, frame, .. } => {
                assert_eq!(identifier, ep("10.0.0.2:9042"));
                let resp: kv_wire::ResponsePayload = serde_json::from_slice(&frame.payload).unwrap();
                assert!(resp.status);
            }
            other => panic!("unexpected work: {other:?}"),
        }
    }

    #[tokio::test]
    async fn flush_command_acknowledges() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            datafile_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        };
        let (sender, _sent) = fake_sender();
        let (_req_tx, req_rx) = mpsc::channel(16);
        let (actor, commands) =
            StorageActor::new(config, ep("10.0.0.1:9042"), sender, req_rx).unwrap();
        tokio::spawn(actor.run());

        let (ack_tx, ack_rx) = oneshot::channel();
        commands.send(StorageCommand::Flush(ack_tx)).await.unwrap();
        let result = timeout(Duration::from_millis(200), ack_rx).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
