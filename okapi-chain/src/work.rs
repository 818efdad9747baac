//! Proof-of-work difficulty: compact bits and 256-bit expanded targets.
//!
//! A block header stores the target threshold in the 4-byte compact form
//! `coefficient(3 bytes, little-endian) ‖ exponent`, where the expanded
//! target is `coefficient · 256^(exponent − 3)`. The header hash,
//! interpreted as a little-endian 256-bit integer, must be below the
//! expanded target.

use lazy_static::lazy_static;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

lazy_static! {
    /// The easiest permitted target, also the target of the genesis block:
    /// `0x0000FFFF · 2^224`.
    pub static ref MAX_TARGET: U256 = U256::from(0xFFFFu64) << 224;
}

/// The compact 4-byte encoding of a difficulty target.
///
/// Stored as a u32 whose little-endian serialization is exactly the wire
/// form: three coefficient bytes followed by the exponent byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CompactBits(pub u32);

impl CompactBits {
    /// Compress a 256-bit target to compact form.
    ///
    /// The exponent is the byte length of the target with leading zeros
    /// trimmed and the coefficient its leading three bytes; if the high
    /// coefficient byte would have the sign bit set (>0x7F), the coefficient
    /// shifts one more byte and the exponent grows by one.
    pub fn compress(target: U256) -> CompactBits {
        let mut exponent = (target.bits() + 7) / 8;
        let mut coefficient: u32 = if exponent <= 3 {
            (target.low_u64() << (8 * (3 - exponent))) as u32
        } else {
            (target >> (8 * (exponent - 3))).low_u32()
        };
        if coefficient & 0x0080_0000 != 0 {
            coefficient >>= 8;
            exponent += 1;
        }
        CompactBits(((exponent as u32) << 24) | coefficient)
    }

    /// Expand to the full 256-bit target.
    pub fn expand(self) -> U256 {
        let exponent = (self.0 >> 24) as usize;
        let coefficient = U256::from(self.0 & 0x00FF_FFFF);
        if exponent <= 3 {
            coefficient >> (8 * (3 - exponent))
        } else {
            coefficient << (8 * (exponent - 3))
        }
    }

    /// The compact form of [`struct@MAX_TARGET`], used by the genesis block.
    pub fn initial() -> CompactBits {
        CompactBits::compress(*MAX_TARGET)
    }
}

impl OkapiSerialize for CompactBits {
    fn okapi_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.okapi_serialize(writer)
    }
}

impl OkapiDeserialize for CompactBits {
    fn okapi_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactBits(u32::okapi_deserialize(reader)?))
    }
}
