//! The accept loop: binds the node's listen address and spawns a `Receiver`
//! for each inbound connection, registered in the pool under the connecting
//! peer's raw (pre-handshake) socket address.

use crate::controller::ControllerInbound;
use crate::pool::ConnectionPool;
use crate::receiver::Receiver;
use kv_wire::EndpointId;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct Server {
    listener: TcpListener,
    pool: ConnectionPool,
    to_controller: mpsc::Sender<ControllerInbound>,
}

impl Server {
    pub async fn bind(
        listen_addr: &EndpointId,
        pool: ConnectionPool,
        to_controller: mpsc::Sender<ControllerInbound>,
    ) -> std::io::Result<Self> {
        let sock_addr = listen_addr
            .to_socket_addr_v4()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let listener = TcpListener::bind(sock_addr).await?;
        Ok(Server {
            listener,
            pool,
            to_controller,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<EndpointId> {
        self.listener
            .local_addr()
            .map(|a| EndpointId::new(a.to_string()))
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let remote = EndpointId::new(peer_addr.to_string());
                    let (read_half, write_half) = stream.into_split();

                    if let Err(e) = self.pool.add(remote.clone(), write_half, None).await {
                        tracing::warn!(remote = %remote, error = %e, "failed to register accepted connection");
                        continue;
                    }
                    tracing::info!(remote = %remote, "accepted connection");

                    Receiver::spawn(
                        read_half,
                        remote,
                        self.to_controller.clone(),
                        self.pool.clone(),
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
