// ─── Echo Wire Format ──────────────────────────────────────
//
// Both directions carry exactly two bytes. There is no sequence number, so a
// reply is attributed to a probe by its UDP source address alone.

/// Port the echo service listens on unless a probe says otherwise.
pub const DEFAULT_PORT: u16 = 3075;

/// Client → server.
pub const ECHO_REQUEST: [u8; 2] = [0xFF, 0xFF];

/// Server → client acknowledgement.
pub const ECHO_REPLY: [u8; 2] = [0x00, 0x00];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoMessage {
    Request,
    Reply,
}

impl EchoMessage {
    /// Classify a received datagram. Any other pattern or length is `None`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [0xFF, 0xFF] => Some(Self::Request),
            [0x00, 0x00] => Some(Self::Reply),
            _ => None,
        }
    }

    pub fn as_bytes(self) -> &'static [u8; 2] {
        match self {
            Self::Request => &ECHO_REQUEST,
            Self::Reply => &ECHO_REPLY,
        }
    }
}
