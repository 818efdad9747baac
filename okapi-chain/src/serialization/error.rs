use std::io;

use thiserror::Error;

/// A serialization error.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// An io error that prevented deserialization, including truncated
    /// streams.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The data to be deserialized was malformed.
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// A variable-length integer used a longer encoding than its value
    /// requires.
    #[error("non-canonical variable-length integer")]
    BadVarInt,
    /// A script push exceeded the 520-byte limit.
    #[error("script push of {0} bytes exceeds the 520-byte limit")]
    ScriptTooLong(usize),
}
