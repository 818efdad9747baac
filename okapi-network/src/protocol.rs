//! The wire protocol: commands, messages, and the envelope codec.

pub mod codec;
mod command;
mod message;

pub use codec::Codec;
pub use command::Command;
pub use message::Message;
