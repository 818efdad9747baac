//! A Tokio codec mapping byte streams to Okapi message streams.

use std::fmt;
use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use okapi_chain::block::{Block, Height};
use okapi_chain::serialization::sha256d;
use okapi_chain::transaction::Transaction;
use okapi_chain::{CompactInt, OkapiDeserialize, OkapiSerialize, SerializationError};

use crate::constants::{
    FINISHED_SENTINEL, HANDSHAKE_PAYLOAD, HEADER_LEN, MAGIC, MAX_PROTOCOL_MESSAGE_LEN,
};
use crate::error::PeerError;

use super::{Command, Message};

/// A codec which produces Okapi messages from byte streams and vice versa.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

/// A builder for specifying [`Codec`] options.
pub struct Builder {
    /// The maximum allowable payload length.
    max_len: usize,
    /// An optional label for reporting metrics, usually the peer address.
    metrics_label: Option<String>,
}

impl Codec {
    /// Return a builder for constructing a [`Codec`].
    pub fn builder() -> Builder {
        Builder {
            max_len: MAX_PROTOCOL_MESSAGE_LEN,
            metrics_label: None,
        }
    }
}

impl Builder {
    /// Finalize the builder and return a [`Codec`].
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    /// Configure the codec's maximum accepted payload size, in bytes.
    #[allow(dead_code)]
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }

    /// Configure the codec for the given peer address.
    pub fn with_metrics_label(mut self, metrics_label: String) -> Self {
        self.metrics_label = Some(metrics_label);
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = PeerError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = Vec::new();
        self.write_body(&item, &mut body)
            .map_err(SerializationError::from)?;

        if body.len() > self.builder.max_len {
            return Err(PeerError::OversizedPayload(body.len()));
        }

        if self.builder.metrics_label.is_some() {
            metrics::counter!("peer.bytes.written").increment((body.len() + HEADER_LEN) as u64);
        }

        let mut header = [0u8; HEADER_LEN];
        let mut header_writer = Cursor::new(&mut header[..]);
        header_writer
            .write_all(&MAGIC)
            .map_err(SerializationError::from)?;
        header_writer
            .write_all(&item.command().bytes())
            .map_err(SerializationError::from)?;
        header_writer
            .write_u32::<LittleEndian>(body.len() as u32)
            .map_err(SerializationError::from)?;
        header_writer
            .write_all(&sha256d::Checksum::from(&body[..]).0)
            .map_err(SerializationError::from)?;

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

impl Codec {
    /// Write the body of the message into the given writer, so the header
    /// can carry a checksum of the body.
    fn write_body<W: Write>(&self, msg: &Message, mut writer: W) -> Result<(), std::io::Error> {
        match msg {
            Message::Handshake => writer.write_all(&HANDSHAKE_PAYLOAD)?,
            Message::NodeList(nodes) => {
                CompactInt::from(nodes.len()).okapi_serialize(&mut writer)?;
                for node in nodes {
                    writer.write_all(&[node.len() as u8])?;
                    writer.write_all(node.as_bytes())?;
                }
            }
            Message::RequestBlocks {
                start_height,
                stop_hash,
            } => {
                start_height.okapi_serialize(&mut writer)?;
                match stop_hash {
                    Some(hash) => hash.okapi_serialize(&mut writer)?,
                    None => writer.write_all(&[0u8; 32])?,
                }
            }
            Message::Block(block) => block.okapi_serialize(&mut writer)?,
            Message::Tx(tx) => tx.okapi_serialize(&mut writer)?,
            Message::RequestMempool => { /* Empty payload -- no-op */ }
            Message::RequestSecondaryChain => { /* Empty payload -- no-op */ }
            Message::RequestNodes => { /* Empty payload -- no-op */ }
            Message::Finished(param) => {
                writer.write_all(&FINISHED_SENTINEL)?;
                if let Some(param) = param {
                    writer.write_u32::<LittleEndian>(*param)?;
                }
            }
        }
        Ok(())
    }
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        command: Command,
        checksum: sha256d::Checksum,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("command", &command)
                .field("checksum", &checksum)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = PeerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.state {
            DecodeState::Head => {
                // Wait for an entire header before parsing anything.
                if src.len() < HEADER_LEN {
                    return Ok(None);
                }

                let header = src.split_to(HEADER_LEN);
                let mut header_reader = Cursor::new(&header[..]);
                let magic = <[u8; 4]>::okapi_deserialize(&mut header_reader)?;
                let command_field = <[u8; 12]>::okapi_deserialize(&mut header_reader)?;
                let body_len = header_reader.read_u32::<LittleEndian>()? as usize;
                let checksum =
                    sha256d::Checksum(<[u8; 4]>::okapi_deserialize(&mut header_reader)?);

                if magic != MAGIC {
                    return Err(PeerError::BadMagic(magic));
                }
                let command = Command::from_bytes(command_field)?;
                if body_len > self.builder.max_len {
                    return Err(PeerError::OversizedPayload(body_len));
                }

                if self.builder.metrics_label.is_some() {
                    metrics::counter!("peer.bytes.read")
                        .increment((body_len + HEADER_LEN) as u64);
                }

                // Reserve space for the body and the following header.
                src.reserve(body_len + HEADER_LEN);

                self.state = DecodeState::Body {
                    body_len,
                    command,
                    checksum,
                };

                // Recurse to attempt body decoding.
                self.decode(src)
            }
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => {
                if src.len() < body_len {
                    // Wait for the full body.
                    return Ok(None);
                }

                // Split off the body and reset the decoder state, so the
                // next header is not read as part of this body.
                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                if checksum != sha256d::Checksum::from(&body[..]) {
                    return Err(PeerError::BadChecksum);
                }

                let mut body_reader = Cursor::new(&body[..]);
                let msg = match command {
                    Command::Handshake => {
                        let payload = <[u8; 4]>::okapi_deserialize(&mut body_reader)?;
                        if payload != HANDSHAKE_PAYLOAD {
                            return Err(SerializationError::Parse(
                                "handshake payload mismatch",
                            )
                            .into());
                        }
                        Message::Handshake
                    }
                    Command::NodeList => self.read_node_list(&mut body_reader)?,
                    Command::RequestBlock => {
                        let start_height = Height::okapi_deserialize(&mut body_reader)?;
                        let stop_hash = if body_reader.remaining() >= 32 {
                            let raw =
                                okapi_chain::block::Hash::okapi_deserialize(&mut body_reader)?;
                            if raw.is_zero() {
                                None
                            } else {
                                Some(raw)
                            }
                        } else {
                            None
                        };
                        Message::RequestBlocks {
                            start_height,
                            stop_hash,
                        }
                    }
                    Command::Block => {
                        Message::Block(<std::sync::Arc<Block>>::okapi_deserialize(
                            &mut body_reader,
                        )?)
                    }
                    Command::Tx => Message::Tx(<std::sync::Arc<Transaction>>::okapi_deserialize(
                        &mut body_reader,
                    )?),
                    Command::RequestMempool => Message::RequestMempool,
                    Command::RequestSecondaryChain => Message::RequestSecondaryChain,
                    Command::RequestNodes => Message::RequestNodes,
                    Command::Finished => {
                        let sentinel = <[u8; 4]>::okapi_deserialize(&mut body_reader)?;
                        if sentinel != FINISHED_SENTINEL {
                            return Err(SerializationError::Parse(
                                "finished sentinel mismatch",
                            )
                            .into());
                        }
                        let param = if body_reader.remaining() >= 4 {
                            Some(body_reader.read_u32::<LittleEndian>()?)
                        } else {
                            None
                        };
                        Message::Finished(param)
                    }
                };
                Ok(Some(msg))
            }
        }
    }
}

impl Codec {
    fn read_node_list<R: Read>(&self, mut reader: R) -> Result<Message, PeerError> {
        let count = CompactInt::okapi_deserialize(&mut reader)?.value();
        let mut nodes = Vec::with_capacity(std::cmp::min(count as usize, 1024));
        for _ in 0..count {
            let len = reader.read_u8()? as usize;
            let mut address = vec![0u8; len];
            reader.read_exact(&mut address)?;
            let address = String::from_utf8(address)
                .map_err(|_| SerializationError::Parse("node address is not utf-8"))?;
            nodes.push(address);
        }
        Ok(Message::NodeList(nodes))
    }
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;
    use std::sync::Arc;

    use futures::prelude::*;
    use tokio::runtime::Runtime;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use okapi_chain::block::{merkle, Header};
    use okapi_chain::transaction::{Input, Output};
    use okapi_chain::work::CompactBits;

    use super::*;

    fn sample_block() -> Arc<Block> {
        let coinbase = Arc::new(Transaction::new(
            1,
            vec![Input::coinbase(Height(7))],
            vec![Output::pay_to(5_000_000_000, [0x42; 20])],
            0,
            1_700_000_000,
        ));
        let merkle_root = merkle::Root::from_iter(vec![coinbase.hash()]);
        Arc::new(Block {
            height: Height(7),
            size: 200,
            header: Header::new(
                1,
                okapi_chain::block::Hash([0x33; 32]),
                merkle_root,
                1_700_000_000,
                CompactBits::initial(),
                99,
            ),
            transactions: vec![coinbase],
        })
    }

    fn encode(message: Message) -> Vec<u8> {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(&mut bytes, Codec::builder().finish());
                fw.send(message).await.expect("message should serialize");
            }
            bytes
        })
    }

    fn decode(bytes: &[u8]) -> Result<Message, PeerError> {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let mut fr = FramedRead::new(Cursor::new(bytes), Codec::builder().finish());
            fr.next().await.expect("a message should be available")
        })
    }

    fn round_trip(message: Message) {
        let bytes = encode(message.clone());
        let parsed = decode(&bytes).expect("encoded message should decode");
        assert_eq!(parsed, message);
    }

    #[test]
    fn message_round_trips() {
        round_trip(Message::Handshake);
        round_trip(Message::NodeList(vec![
            "10.0.0.1:4001".to_string(),
            "okapi.example:4001".to_string(),
        ]));
        round_trip(Message::RequestBlocks {
            start_height: Height(12),
            stop_hash: None,
        });
        round_trip(Message::RequestBlocks {
            start_height: Height(12),
            stop_hash: Some(okapi_chain::block::Hash([0xAB; 32])),
        });
        round_trip(Message::Block(sample_block()));
        round_trip(Message::Tx(sample_block().transactions[0].clone()));
        round_trip(Message::RequestMempool);
        round_trip(Message::RequestSecondaryChain);
        round_trip(Message::RequestNodes);
        round_trip(Message::Finished(None));
        round_trip(Message::Finished(Some(412)));
    }

    #[test]
    fn envelope_layout() {
        let bytes = encode(Message::Handshake);
        assert_eq!(&bytes[..4], &MAGIC);
        assert_eq!(&bytes[4..13], b"handshake");
        assert!(bytes[13..16].iter().all(|byte| *byte == 0));
        // Payload length, then checksum, then the four handshake bytes.
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(&bytes[24..], &HANDSHAKE_PAYLOAD);
        assert_eq!(
            &bytes[20..24],
            &sha256d::Checksum::from(&HANDSHAKE_PAYLOAD[..]).0
        );
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = encode(Message::Tx(sample_block().transactions[0].clone()));
        // Flip one bit of the payload; the checksum in the header no longer
        // matches.
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        match decode(&bytes) {
            Err(PeerError::BadChecksum) => {}
            other => panic!("expected BadChecksum, got {:?}", other),
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = encode(Message::Handshake);
        bytes[0] = 0x00;
        match decode(&bytes) {
            Err(PeerError::BadMagic(_)) => {}
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut bytes = encode(Message::Handshake);
        bytes[4..16].copy_from_slice(b"digdigdigdig");
        match decode(&bytes) {
            Err(PeerError::UnknownCommand(name)) => assert_eq!(name, "digdigdigdig"),
            other => panic!("expected UnknownCommand, got {:?}", other),
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let bytes = encode(Message::Block(sample_block()));
        let rt = Runtime::new().unwrap();
        let result = rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&bytes),
                Codec::builder().with_max_body_len(8).finish(),
            );
            fr.next().await.expect("a result should be available")
        });
        match result {
            Err(PeerError::OversizedPayload(_)) => {}
            other => panic!("expected OversizedPayload, got {:?}", other),
        }
    }

    #[test]
    fn split_delivery_reassembles() {
        let rt = Runtime::new().unwrap();
        let bytes = encode(Message::Block(sample_block()));
        rt.block_on(async {
            let mut codec = Codec::builder().finish();
            let mut buffer = BytesMut::new();
            let split_at = HEADER_LEN + 3;
            buffer.extend_from_slice(&bytes[..split_at]);
            assert!(codec.decode(&mut buffer).unwrap().is_none());
            buffer.extend_from_slice(&bytes[split_at..]);
            let message = codec.decode(&mut buffer).unwrap().unwrap();
            assert_eq!(message, Message::Block(sample_block()));
        });
    }
}
