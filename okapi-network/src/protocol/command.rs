use std::fmt;

use crate::error::PeerError;

/// A peer-protocol command, identified on the wire by a 12-byte
/// zero-padded ASCII name.
///
/// Two command names from the protocol's documentation exceed the 12-byte
/// field (`requestMemPool`, `requestSecondaryChain`); their wire names are
/// shortened to fit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// Liveness probe; the reply is identical.
    Handshake,
    /// A list of `host:port` peer addresses.
    NodeList,
    /// Request up to 50 blocks from a start height.
    RequestBlock,
    /// Gossip a block ("newBlockAvbl").
    Block,
    /// Gossip a transaction ("newTxMemPool").
    Tx,
    /// Request every mempool transaction.
    RequestMempool,
    /// Request the blocks of the secondary chain.
    RequestSecondaryChain,
    /// Request the node list.
    RequestNodes,
    /// End-of-stream marker with an optional "last known height" parameter.
    Finished,
}

impl Command {
    fn name(self) -> &'static [u8] {
        match self {
            Command::Handshake => b"handshake",
            Command::NodeList => b"nodelist",
            Command::RequestBlock => b"requestBlock",
            Command::Block => b"newBlockAvbl",
            Command::Tx => b"newTxMemPool",
            Command::RequestMempool => b"requestMpool",
            Command::RequestSecondaryChain => b"requestSecCh",
            Command::RequestNodes => b"requestNodes",
            Command::Finished => b"Finished",
        }
    }

    /// The zero-padded wire form.
    pub fn bytes(self) -> [u8; 12] {
        let name = self.name();
        let mut field = [0u8; 12];
        field[..name.len()].copy_from_slice(name);
        field
    }

    pub fn from_bytes(field: [u8; 12]) -> Result<Command, PeerError> {
        for command in [
            Command::Handshake,
            Command::NodeList,
            Command::RequestBlock,
            Command::Block,
            Command::Tx,
            Command::RequestMempool,
            Command::RequestSecondaryChain,
            Command::RequestNodes,
            Command::Finished,
        ] {
            if command.bytes() == field {
                return Ok(command);
            }
        }
        let name = field
            .iter()
            .take_while(|byte| **byte != 0)
            .map(|byte| *byte as char)
            .collect();
        Err(PeerError::UnknownCommand(name))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_fit_the_field() {
        for command in [
            Command::Handshake,
            Command::NodeList,
            Command::RequestBlock,
            Command::Block,
            Command::Tx,
            Command::RequestMempool,
            Command::RequestSecondaryChain,
            Command::RequestNodes,
            Command::Finished,
        ] {
            assert!(command.name().len() <= 12);
            assert_eq!(Command::from_bytes(command.bytes()).unwrap(), command);
        }
    }

    #[test]
    fn padding_is_zero() {
        let field = Command::Handshake.bytes();
        assert_eq!(&field[..9], b"handshake");
        assert!(field[9..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut field = [0u8; 12];
        field[..7].copy_from_slice(b"version");
        match Command::from_bytes(field) {
            Err(PeerError::UnknownCommand(name)) => assert_eq!(name, "version"),
            other => panic!("expected UnknownCommand, got {:?}", other),
        }
    }
}
