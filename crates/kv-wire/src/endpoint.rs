//! Endpoint identifiers: `"host:port"` strings naming a peer by its
//! *listening* address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// A peer identified by its listening address, e.g. `"10.0.0.1:9042"`.
///
/// This is the canonical identity used by the gossiper, partitioner, and
/// connection pool alias map. It is distinct from the transient remote
/// socket address a `Receiver` sees on accept (which is usually an ephemeral
/// client port, not the peer's listen port).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(String);

#[derive(Debug, thiserror::Error)]
pub enum EndpointParseError {
    #[error("invalid endpoint identifier: {0}")]
    Malformed(String),
}

impl EndpointId {
    pub fn new(addr: impl Into<String>) -> Self {
        EndpointId(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode as the wire's 6-byte `source_addr`: 4 bytes IPv4 + 2 bytes port (big-endian).
    pub fn to_wire_bytes(&self) -> Result<[u8; 6], EndpointParseError> {
        let sock = self.to_socket_addr_v4()?;
        let mut out = [0u8; 6];
        out[0..4].copy_from_slice(&sock.ip().octets());
        out[4..6].copy_from_slice(&sock.port().to_be_bytes());
        Ok(out)
    }

    /// Decode from the wire's 6-byte `source_addr`.
    pub fn from_wire_bytes(bytes: [u8; 6]) -> Self {
        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let port = u16::from_be_bytes([bytes[4], bytes[5]]);
        EndpointId(format!("{ip}:{port}"))
    }

    pub fn to_socket_addr_v4(&self) -> Result<SocketAddrV4, EndpointParseError> {
        self.0
            .parse::<SocketAddrV4>()
            .map_err(|_| EndpointParseError::Malformed(self.0.clone()))
    }

    /// The physical-node identifier a virtual-node id belongs to: the part
    /// before the `$` separator (virtual node ids are `"<endpoint>$<i>"`).
    pub fn from_vnode_id(vnode_id: &str) -> Self {
        let phy = vnode_id.split('$').next().unwrap_or(vnode_id);
        EndpointId(phy.to_owned())
    }
}

impl FromStr for EndpointId {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Validate early so bogus identifiers fail at the boundary, not deep
        // inside the wire codec.
        s.parse::<SocketAddrV4>()
            .map_err(|_| EndpointParseError::Malformed(s.to_owned()))?;
        Ok(EndpointId(s.to_owned()))
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddrV4> for EndpointId {
    fn from(addr: SocketAddrV4) -> Self {
        EndpointId(addr.to_string())
    }
}
