//! A tiny stack script: serialization and P2PKH evaluation.
//!
//! A script is an ordered sequence of commands, each either a one-byte
//! opcode or a pushed byte string of at most 520 bytes. The whole script is
//! serialized with a compact-int byte-length prefix. Evaluation supports
//! exactly the pay-to-public-key-hash opcodes; any other opcode fails the
//! script.

use std::io::{self, Read};
use std::ops::Add;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::keys::{hash160, PublicKey, Signature};
use crate::{CompactInt, OkapiDeserialize, OkapiSerialize, SerializationError};

pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xA9;
pub const OP_CHECKSIG: u8 = 0xAC;

const OP_PUSHDATA1: u8 = 0x4C;
const OP_PUSHDATA2: u8 = 0x4D;

/// The longest byte string a single push may carry.
pub const MAX_PUSH_BYTES: usize = 520;

/// One script command: an opcode or a pushed byte string.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Cmd {
    Op(u8),
    Push(Vec<u8>),
}

/// An ordered sequence of script commands.
#[derive(Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Script {
    pub cmds: Vec<Cmd>,
}

impl Script {
    pub fn new(cmds: Vec<Cmd>) -> Script {
        Script { cmds }
    }

    /// The standard pay-to-public-key-hash locking script:
    /// `OP_DUP OP_HASH160 <20-byte hash160> OP_EQUALVERIFY OP_CHECKSIG`.
    pub fn p2pkh(pub_key_hash: [u8; 20]) -> Script {
        Script {
            cmds: vec![
                Cmd::Op(OP_DUP),
                Cmd::Op(OP_HASH160),
                Cmd::Push(pub_key_hash.to_vec()),
                Cmd::Op(OP_EQUALVERIFY),
                Cmd::Op(OP_CHECKSIG),
            ],
        }
    }

    /// The owner hash160 of a P2PKH locking script, if this is one.
    pub fn p2pkh_owner(&self) -> Option<[u8; 20]> {
        match self.cmds.as_slice() {
            [Cmd::Op(OP_DUP), Cmd::Op(OP_HASH160), Cmd::Push(hash), Cmd::Op(OP_EQUALVERIFY), Cmd::Op(OP_CHECKSIG)]
                if hash.len() == 20 =>
            {
                let mut owner = [0u8; 20];
                owner.copy_from_slice(hash);
                Some(owner)
            }
            _ => None,
        }
    }

    /// The serialized length in bytes, including the length prefix.
    pub fn serialized_size(&self) -> usize {
        let body = self.body_size();
        CompactInt::size(body) + body
    }

    fn body_size(&self) -> usize {
        self.cmds
            .iter()
            .map(|cmd| match cmd {
                Cmd::Op(_) => 1,
                Cmd::Push(data) if data.len() < OP_PUSHDATA1 as usize => 1 + data.len(),
                Cmd::Push(data) if data.len() < 0x100 => 2 + data.len(),
                Cmd::Push(data) => 3 + data.len(),
            })
            .sum()
    }

    /// Evaluate this script against a signature digest.
    ///
    /// Returns true iff no operation failed and the stack ends non-empty
    /// with a truthy top element. Verification callers concatenate
    /// `script_sig + script_pubkey` first.
    pub fn evaluate(&self, digest: &[u8; 32]) -> bool {
        let mut stack: Vec<Vec<u8>> = Vec::new();
        for cmd in &self.cmds {
            match cmd {
                Cmd::Push(data) => stack.push(data.clone()),
                Cmd::Op(OP_DUP) => match stack.last() {
                    Some(top) => stack.push(top.clone()),
                    None => return false,
                },
                Cmd::Op(OP_HASH160) => match stack.pop() {
                    Some(element) => stack.push(hash160(&element).to_vec()),
                    None => return false,
                },
                Cmd::Op(OP_EQUALVERIFY) => match (stack.pop(), stack.pop()) {
                    (Some(a), Some(b)) if a == b => {}
                    _ => return false,
                },
                Cmd::Op(OP_CHECKSIG) => {
                    let (pubkey, sig) = match (stack.pop(), stack.pop()) {
                        (Some(pubkey), Some(sig)) => (pubkey, sig),
                        _ => return false,
                    };
                    if sig.is_empty() {
                        return false;
                    }
                    // The last signature byte is the sighash type.
                    let der = &sig[..sig.len() - 1];
                    let verified = match (PublicKey::from_slice(&pubkey), Signature::from_der(der))
                    {
                        (Ok(pubkey), Ok(signature)) => pubkey.verify(digest, &signature).is_ok(),
                        _ => false,
                    };
                    if !verified {
                        return false;
                    }
                    stack.push(vec![1]);
                }
                Cmd::Op(unknown) => {
                    trace!(opcode = *unknown, "unknown opcode in script");
                    return false;
                }
            }
        }
        match stack.last() {
            Some(top) => top.iter().any(|byte| *byte != 0),
            None => false,
        }
    }
}

/// Concatenation, used to combine an unlocking script with a locking script
/// for evaluation.
impl Add for Script {
    type Output = Script;

    fn add(mut self, mut other: Script) -> Script {
        self.cmds.append(&mut other.cmds);
        self
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut list = f.debug_list();
        for cmd in &self.cmds {
            match cmd {
                Cmd::Op(op) => list.entry(&format_args!("OP_{:02x}", op)),
                Cmd::Push(data) => list.entry(&format_args!("push({})", hex::encode(data))),
            };
        }
        list.finish()
    }
}

impl OkapiSerialize for Script {
    fn okapi_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        let mut body = Vec::with_capacity(self.body_size());
        for cmd in &self.cmds {
            match cmd {
                Cmd::Op(op) => body.push(*op),
                Cmd::Push(data) => {
                    let length = data.len();
                    if length < OP_PUSHDATA1 as usize {
                        body.push(length as u8);
                    } else if length < 0x100 {
                        body.push(OP_PUSHDATA1);
                        body.push(length as u8);
                    } else if length <= MAX_PUSH_BYTES {
                        body.push(OP_PUSHDATA2);
                        body.extend_from_slice(&(length as u16).to_le_bytes());
                    } else {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "script push exceeds 520 bytes",
                        ));
                    }
                    body.extend_from_slice(data);
                }
            }
        }
        CompactInt::from(body.len()).okapi_serialize(&mut writer)?;
        writer.write_all(&body)
    }
}

impl OkapiDeserialize for Script {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let length = CompactInt::okapi_deserialize(&mut reader)?.value();
        let mut body = &mut reader.take(length);
        let mut cmds = Vec::new();
        let mut consumed = 0u64;
        while consumed < length {
            let marker = u8::okapi_deserialize(&mut body)?;
            consumed += 1;
            match marker {
                1..=75 => {
                    cmds.push(Cmd::Push(read_push(&mut body, marker as usize)?));
                    consumed += marker as u64;
                }
                OP_PUSHDATA1 => {
                    let data_length = u8::okapi_deserialize(&mut body)? as usize;
                    cmds.push(Cmd::Push(read_push(&mut body, data_length)?));
                    consumed += 1 + data_length as u64;
                }
                OP_PUSHDATA2 => {
                    let data_length = u16::okapi_deserialize(&mut body)? as usize;
                    if data_length > MAX_PUSH_BYTES {
                        return Err(SerializationError::ScriptTooLong(data_length));
                    }
                    cmds.push(Cmd::Push(read_push(&mut body, data_length)?));
                    consumed += 2 + data_length as u64;
                }
                op => cmds.push(Cmd::Op(op)),
            }
        }
        if consumed != length {
            return Err(SerializationError::Parse("script body length mismatch"));
        }
        Ok(Script { cmds })
    }
}

fn read_push<R: io::Read>(reader: &mut R, length: usize) -> Result<Vec<u8>, SerializationError> {
    let mut data = vec![0u8; length];
    reader.read_exact(&mut data)?;
    Ok(data)
}
