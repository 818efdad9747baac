//! Protocol constants.

/// The network magic that opens every envelope.
pub const MAGIC: [u8; 4] = [0xF9, 0xBE, 0xB4, 0xD9];

/// The length of an envelope header: magic, command, payload length,
/// checksum.
pub const HEADER_LEN: usize = 24;

/// Maximum size of an envelope payload.
pub const MAX_PROTOCOL_MESSAGE_LEN: usize = 2 * 1024 * 1024;

/// The fixed handshake payload, echoed back by a live peer.
pub const HANDSHAKE_PAYLOAD: [u8; 4] = [0x05, 0xF5, 0xE1, 0x00];

/// The end-of-stream sentinel inside a `Finished` payload.
pub const FINISHED_SENTINEL: [u8; 4] = [0x0A, 0x11, 0x09, 0x07];

/// How many blocks a peer streams per `requestBlock`.
pub const SEND_LIMIT: usize = 50;

/// How long to wait for an outbound connection before giving the peer up.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;
