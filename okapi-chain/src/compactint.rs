//! Bitcoin-style variable-length integers.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

/// A variable-length integer: one byte below `0xFD`, otherwise a marker byte
/// followed by a little-endian u16, u32, or u64.
///
/// Decoding rejects non-canonical encodings so that every value has exactly
/// one byte representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The encoded length, in bytes, of `value`.
    pub fn size(value: usize) -> usize {
        if value < 0xFD {
            1
        } else if value <= 0xFFFF {
            3
        } else if value <= 0xFFFF_FFFF {
            5
        } else {
            9
        }
    }
}

impl OkapiSerialize for CompactInt {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.0 < 0xFD {
            target.write_all(&[self.0 as u8])
        } else if self.0 <= 0xFFFF {
            target.write_all(&[0xFD])?;
            target.write_u16::<LittleEndian>(self.0 as u16)
        } else if self.0 <= 0xFFFF_FFFF {
            target.write_all(&[0xFE])?;
            target.write_u32::<LittleEndian>(self.0 as u32)
        } else {
            target.write_all(&[0xFF])?;
            target.write_u64::<LittleEndian>(self.0)
        }
    }
}

impl OkapiDeserialize for CompactInt {
    fn okapi_deserialize<R: std::io::Read>(
        mut reader: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::okapi_deserialize(&mut reader)?;
        let value = match first {
            0xFD => {
                let value = u16::okapi_deserialize(&mut reader)? as u64;
                if value < 0xFD {
                    return Err(SerializationError::BadVarInt);
                }
                value
            }
            0xFE => {
                let value = u32::okapi_deserialize(&mut reader)? as u64;
                if value <= 0xFFFF {
                    return Err(SerializationError::BadVarInt);
                }
                value
            }
            0xFF => {
                let value = u64::okapi_deserialize(&mut reader)?;
                if value <= 0xFFFF_FFFF {
                    return Err(SerializationError::BadVarInt);
                }
                value
            }
            small => small as u64,
        };
        Ok(CompactInt(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: u64) -> Vec<u8> {
        let encoded = CompactInt(value)
            .okapi_serialize_to_vec()
            .expect("writing to a Vec never fails");
        let decoded = CompactInt::okapi_deserialize(&encoded[..]).expect("canonical encoding");
        assert_eq!(decoded.value(), value);
        encoded
    }

    #[test]
    fn boundary_encodings() {
        assert_eq!(round_trip(0), vec![0]);
        assert_eq!(round_trip(0xFC), vec![0xFC]);
        assert_eq!(round_trip(0xFD), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(round_trip(0xFFFF), vec![0xFD, 0xFF, 0xFF]);
        assert_eq!(round_trip(0x10000), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(round_trip(0xFFFF_FFFF).len(), 5);
        assert_eq!(round_trip(0x1_0000_0000).len(), 9);
    }

    #[test]
    fn encoded_size_matches() {
        for value in [0usize, 0xFC, 0xFD, 0xFFFF, 0x10000, 0xFFFF_FFFF, usize::MAX] {
            let encoded = CompactInt::from(value)
                .okapi_serialize_to_vec()
                .expect("writing to a Vec never fails");
            assert_eq!(encoded.len(), CompactInt::size(value));
        }
    }

    #[test]
    fn non_canonical_rejected() {
        // 0xFC encoded with the u16 marker.
        let err = CompactInt::okapi_deserialize(&[0xFD, 0xFC, 0x00][..]).unwrap_err();
        assert!(matches!(err, SerializationError::BadVarInt));
        // 0xFFFF encoded with the u32 marker.
        let err = CompactInt::okapi_deserialize(&[0xFE, 0xFF, 0xFF, 0x00, 0x00][..]).unwrap_err();
        assert!(matches!(err, SerializationError::BadVarInt));
    }

    #[test]
    fn truncated_stream_is_io_error() {
        let err = CompactInt::okapi_deserialize(&[0xFD, 0x01][..]).unwrap_err();
        assert!(matches!(err, SerializationError::Io(_)));
    }
}
