//! A bare client for driving `REQUEST`/`RESPONSE` traffic against a node,
//! speaking the same framing a real node speaks to its peers but without
//! ever running a `Receiver`/`Controller` of its own — tests just want the
//! one reply a request produces.

use kv_wire::frame::HEADER_LEN;
use kv_wire::request::request_hash;
use kv_wire::{EndpointId, Frame, MessageCode, RequestPayload, ResponsePayload};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub struct TestClient {
    stream: TcpStream,
    local_addr: EndpointId,
}

impl TestClient {
    pub async fn connect(to: &EndpointId) -> std::io::Result<Self> {
        let sock_addr = to
            .to_socket_addr_v4()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
        let stream = TcpStream::connect(sock_addr).await?;
        let local_addr = EndpointId::new(stream.local_addr()?.to_string());
        Ok(TestClient { stream, local_addr })
    }

    /// Send `request` (e.g. `["get", "key"]`) and wait for the matching
    /// response. The request hash is computed over this client's own
    /// observed local address, matching how the coordinator recomputes it
    /// from the socket it accepted the connection on.
    pub async fn request(&mut self, request: Vec<String>) -> std::io::Result<ResponsePayload> {
        let hash = request_hash(self.local_addr.as_str(), &request);
        let payload = RequestPayload::new(request, hash);
        let bytes = serde_json::to_vec(&payload).expect("RequestPayload always serializes");
        let frame = Frame::new(MessageCode::REQUEST, self.local_addr.clone(), bytes);
        let encoded = frame
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
        self.stream.write_all(&encoded).await?;

        let response_frame = self.read_frame().await?;
        serde_json::from_slice(&response_frame.payload)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    async fn read_frame(&mut self) -> std::io::Result<Frame> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        let (size, code) = Frame::decode_header(&header);
        let mut body = vec![0u8; size as usize];
        self.stream.read_exact(&mut body).await?;
        Frame::decode_body(code, &body)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}
