use thiserror::Error;

use okapi_chain::SerializationError;

/// A peer-protocol error. All of these are local: log, drop the connection,
/// continue.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The envelope did not start with the network magic.
    #[error("bad network magic {0:02x?}")]
    BadMagic([u8; 4]),
    /// The payload checksum did not match the header.
    #[error("envelope checksum mismatch")]
    BadChecksum,
    /// The command field named no known command.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    /// The header claimed a payload larger than the protocol allows.
    #[error("payload of {0} bytes exceeds the protocol limit")]
    OversizedPayload(usize),
    /// The peer hung up before a complete exchange.
    #[error("connection closed mid-exchange")]
    ConnectionClosed,
    /// The payload bytes did not parse as the command's type.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    /// The local store failed while answering a request.
    #[error(transparent)]
    Storage(#[from] okapi_state::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
