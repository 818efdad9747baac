use std::io;

use okapi_serde_derive::{OkDeserialize, OkSerialize};
use serde::{Deserialize, Serialize};

use crate::block::Height;
use crate::script::{Cmd, Script};
use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

use super::Hash;

/// The `prev_index` sentinel that marks a coinbase input.
pub const COINBASE_PREV_INDEX: u32 = 0xFFFF_FFFF;

/// OutPoint
///
/// A reference to a particular output of a previous transaction.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, OkSerialize, OkDeserialize,
)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct OutPoint {
    /// The transaction that contains the output being spent.
    pub hash: super::Hash,
    /// Which output of that transaction is referenced; the first output is
    /// 0.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }
}

/// A transaction input.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output being spent.
        outpoint: OutPoint,
        /// The script that authorizes spending `outpoint`; empty only
        /// transiently during signing.
        script_sig: Script,
        /// The input sequence number.
        sequence: u32,
    },
    /// New coins created by the block reward. On the wire this is an
    /// all-zero previous hash with index `0xFFFFFFFF`.
    Coinbase {
        /// The script_sig contents; the first push is the block height in
        /// minimal little-endian bytes.
        data: Script,
        /// The input sequence number.
        sequence: u32,
    },
}

impl Input {
    /// A coinbase input carrying `height` in its script data.
    pub fn coinbase(height: Height) -> Input {
        Input::Coinbase {
            data: Script::new(vec![Cmd::Push(minimal_le_bytes(height.0))]),
            sequence: COINBASE_PREV_INDEX,
        }
    }

    /// The block height a coinbase input reports, if parseable.
    pub fn coinbase_height(&self) -> Option<Height> {
        match self {
            Input::Coinbase { data, .. } => match data.cmds.first() {
                Some(Cmd::Push(bytes)) if !bytes.is_empty() && bytes.len() <= 4 => {
                    let mut le = [0u8; 4];
                    le[..bytes.len()].copy_from_slice(bytes);
                    Some(Height(u32::from_le_bytes(le)))
                }
                _ => None,
            },
            Input::PrevOut { .. } => None,
        }
    }

    /// The serialized length in bytes.
    pub fn serialized_size(&self) -> usize {
        match self {
            Input::PrevOut { script_sig, .. } => OutPoint::len() + script_sig.serialized_size() + 4,
            Input::Coinbase { data, .. } => OutPoint::len() + data.serialized_size() + 4,
        }
    }
}

impl OkapiSerialize for Input {
    fn okapi_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                script_sig,
                sequence,
            } => {
                outpoint.okapi_serialize(&mut writer)?;
                script_sig.okapi_serialize(&mut writer)?;
                sequence.okapi_serialize(&mut writer)
            }
            Input::Coinbase { data, sequence } => {
                Hash::zero().okapi_serialize(&mut writer)?;
                COINBASE_PREV_INDEX.okapi_serialize(&mut writer)?;
                data.okapi_serialize(&mut writer)?;
                sequence.okapi_serialize(&mut writer)
            }
        }
    }
}

impl OkapiDeserialize for Input {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let hash = Hash::okapi_deserialize(&mut reader)?;
        let index = u32::okapi_deserialize(&mut reader)?;
        let script = Script::okapi_deserialize(&mut reader)?;
        let sequence = u32::okapi_deserialize(&mut reader)?;
        if hash.is_zero() && index == COINBASE_PREV_INDEX {
            Ok(Input::Coinbase {
                data: script,
                sequence,
            })
        } else {
            Ok(Input::PrevOut {
                outpoint: OutPoint { hash, index },
                script_sig: script,
                sequence,
            })
        }
    }
}

/// The shortest little-endian encoding of `value`; one zero byte for zero.
fn minimal_le_bytes(value: u32) -> Vec<u8> {
    let needed = std::cmp::max(1, (4 - value.leading_zeros() / 8) as usize);
    value.to_le_bytes()[..needed].to_vec()
}
