//! Per-connection frame reader. Each accepted or dialed socket gets one
//! `Receiver` task, reading the size/code header then the body, and handing
//! decoded frames to the Controller. On EOF or a decode error the connection
//! is torn down and the Controller is told it was lost.

use crate::controller::ControllerInbound;
use crate::pool::ConnectionPool;
use kv_wire::{Frame, frame::HEADER_LEN};
use kv_wire::EndpointId;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;

pub struct Receiver {
    read_half: OwnedReadHalf,
    remote_addr: EndpointId,
    to_controller: mpsc::Sender<ControllerInbound>,
    pool: ConnectionPool,
}

impl Receiver {
    pub fn spawn(
        read_half: OwnedReadHalf,
        remote_addr: EndpointId,
        to_controller: mpsc::Sender<ControllerInbound>,
        pool: ConnectionPool,
    ) {
        let receiver = Receiver {
            read_half,
            remote_addr,
            to_controller,
            pool,
        };
        tokio::spawn(receiver.run());
    }

    async fn run(mut self) {
        loop {
            match self.read_one_frame().await {
                Ok(Some(frame)) => {
                    let item = ControllerInbound::Received {
                        identifier: self.remote_addr.clone(),
                        frame,
                    };
                    if self.to_controller.send(item).await.is_err() {
                        tracing::warn!(remote = %self.remote_addr, "controller inbox closed, stopping receiver");
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(remote = %self.remote_addr, "connection closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(remote = %self.remote_addr, error = %e, "read failed, closing connection");
                    break;
                }
            }
        }

        self.pool.remove(&self.remote_addr).await;
        let lost = ControllerInbound::ConnectionLost {
            identifier: self.remote_addr.clone(),
        };
        if self.to_controller.send(lost).await.is_err() {
            tracing::warn!(remote = %self.remote_addr, "controller inbox closed while reporting connection loss");
        }
    }

    /// Reads one frame off the socket. `Ok(None)` means a clean EOF before
    /// any bytes of the next frame arrived.
    async fn read_one_frame(&mut self) -> std::io::Result<Option<Frame>> {
        let mut header = [0u8; HEADER_LEN];
        match read_exact_or_eof(&mut self.read_half, &mut header).await? {
            false => return Ok(None),
            true => {}
        }

        let (size, code) = Frame::decode_header(&header);
        let mut body = vec![0u8; size as usize];
        self.read_half.read_exact(&mut body).await?;

        match Frame::decode_body(code, &body) {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        }
    }
}

/// Like `read_exact`, but treats EOF on the very first byte as `Ok(false)`
/// rather than an error, since that is the ordinary way a peer closes.
async fn read_exact_or_eof(
    read_half: &mut OwnedReadHalf,
    buf: &mut [u8],
) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = read_half.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-header",
            ));
        }
        filled += n;
    }
    Ok(true)
}
