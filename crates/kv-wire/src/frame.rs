//! On-wire frame encoding.
//!
//! ```text
//! [size: uint16][code: uint16][source_addr: 6 bytes][payload: size-6 bytes]
//! ```
//!
//! `size` counts every byte that follows the 4-byte `size`+`code` header,
//! i.e. `6 + payload.len()`. All integers are big-endian.

use crate::codes::MessageCode;
use crate::endpoint::EndpointId;

/// Bytes in the `size`+`code` header, before `source_addr`.
pub const HEADER_LEN: usize = 4;
/// Bytes in the `source_addr` field.
pub const ADDR_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload too large: {0} bytes exceeds u16 frame size limit")]
    PayloadTooLarge(usize),
    #[error("truncated frame: expected at least {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("malformed source address in frame")]
    BadSourceAddr,
}

/// A decoded wire message: message code, the sender's listen address, and
/// opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: MessageCode,
    pub source_addr: EndpointId,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: MessageCode, source_addr: EndpointId, payload: Vec<u8>) -> Self {
        Frame {
            code,
            source_addr,
            payload,
        }
    }

    /// Encode this frame to its on-wire byte representation.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let addr_bytes = self
            .source_addr
            .to_wire_bytes()
            .map_err(|_| FrameError::BadSourceAddr)?;
        let body_len = ADDR_LEN + self.payload.len();
        let size: u16 = body_len
            .try_into()
            .map_err(|_| FrameError::PayloadTooLarge(self.payload.len()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + body_len);
        out.extend_from_slice(&size.to_be_bytes());
        out.extend_from_slice(&self.code.as_u16().to_be_bytes());
        out.extend_from_slice(&addr_bytes);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse the 4-byte header, returning the body length (`size`) still to
    /// be read. Callers read `size` more bytes and pass them to
    /// [`Frame::decode_body`].
    pub fn decode_header(header: &[u8; HEADER_LEN]) -> (u16, MessageCode) {
        let size = u16::from_be_bytes([header[0], header[1]]);
        let code = MessageCode::from(u16::from_be_bytes([header[2], header[3]]));
        (size, code)
    }

    /// Parse the frame body (`source_addr` + `payload`) given the code from
    /// the header and the exact `size` bytes that followed it.
    pub fn decode_body(code: MessageCode, body: &[u8]) -> Result<Frame, FrameError> {
        if body.len() < ADDR_LEN {
            return Err(FrameError::Truncated {
                expected: ADDR_LEN,
                got: body.len(),
            });
        }
        let mut addr_bytes = [0u8; ADDR_LEN];
        addr_bytes.copy_from_slice(&body[0..ADDR_LEN]);
        let source_addr = EndpointId::from_wire_bytes(addr_bytes);
        let payload = body[ADDR_LEN..].to_vec();
        Ok(Frame {
            code,
            source_addr,
            payload,
        })
    }

    /// Decode a complete buffer holding exactly one frame (header + body).
    /// Mainly useful for tests; production code streams header and body
    /// separately off the socket (see `kv-messaging::Receiver`).
    pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN,
                got: buf.len(),
            });
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&buf[0..HEADER_LEN]);
        let (size, code) = Frame::decode_header(&header);
        let body = &buf[HEADER_LEN..];
        if body.len() < size as usize {
            return Err(FrameError::Truncated {
                expected: HEADER_LEN + size as usize,
                got: buf.len(),
            });
        }
        Frame::decode_body(code, &body[..size as usize])
    }
}
