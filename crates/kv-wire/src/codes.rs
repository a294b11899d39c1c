//! Message codes carried in the frame header.
//!
//! Any consistent numbering works across the cluster as long as every node
//! agrees; these values are frozen for this implementation's wire
//! compatibility.

/// A message code identifying the payload's type, carried in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageCode(pub u16);

impl MessageCode {
    pub const NEW_CONNECTION: MessageCode = MessageCode(1);
    pub const NEW_CONNECTION_HANDSHAKE: MessageCode = MessageCode(2);
    pub const CONNECTION_LOST: MessageCode = MessageCode(3);
    pub const NEW_LIVE_NODE: MessageCode = MessageCode(4);
    pub const LOST_LIVE_NODE: MessageCode = MessageCode(5);
    pub const GOSSIP: MessageCode = MessageCode(6);
    pub const REGISTRATION: MessageCode = MessageCode(7);
    pub const REQUEST: MessageCode = MessageCode(8);
    pub const RESPONSE: MessageCode = MessageCode(9);

    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for MessageCode {
    fn from(value: u16) -> Self {
        MessageCode(value)
    }
}

impl std::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match *self {
            MessageCode::NEW_CONNECTION => "NEW_CONNECTION",
            MessageCode::NEW_CONNECTION_HANDSHAKE => "NEW_CONNECTION_HANDSHAKE",
            MessageCode::CONNECTION_LOST => "CONNECTION_LOST",
            MessageCode::NEW_LIVE_NODE => "NEW_LIVE_NODE",
            MessageCode::LOST_LIVE_NODE => "LOST_LIVE_NODE",
            MessageCode::GOSSIP => "GOSSIP",
            MessageCode::REGISTRATION => "REGISTRATION",
            MessageCode::REQUEST => "REQUEST",
            MessageCode::RESPONSE => "RESPONSE",
            MessageCode(other) => return write!(f, "UNKNOWN({other})"),
        };
        write!(f, "{name}")
    }
}
