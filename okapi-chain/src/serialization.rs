//! Consensus-critical serialization.
//!
//! This module contains the `OkapiSerialize` and `OkapiDeserialize` traits,
//! analogs of the Serde `Serialize` and `Deserialize` traits but intended for
//! the canonical Okapi wire formats: little-endian integers, fixed field
//! widths, and Bitcoin-style variable-length integers at specific positions.
//! Hash outputs depend on these canonical bytes only.

mod deserialize;
mod error;

pub mod sha256d;

pub use deserialize::{OkapiDeserialize, OkapiDeserializeInto};
pub use error::SerializationError;

use crate::compactint::CompactInt;
use byteorder::{LittleEndian, WriteBytesExt};

pub trait OkapiSerialize {
    fn okapi_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error>;

    fn okapi_serialize_to_vec(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut data = Vec::new();
        self.okapi_serialize(&mut data)?;
        Ok(data)
    }
}

impl OkapiSerialize for bool {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(&[*self as u8])
    }
}

impl OkapiSerialize for u16 {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u16::<LittleEndian>(*self)
    }
}

impl OkapiSerialize for u32 {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u32::<LittleEndian>(*self)
    }
}

impl OkapiSerialize for u64 {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_u64::<LittleEndian>(*self)
    }
}

impl OkapiSerialize for i32 {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i32::<LittleEndian>(*self)
    }
}

impl OkapiSerialize for i64 {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_i64::<LittleEndian>(*self)
    }
}

impl OkapiSerialize for [u8; 4] {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl OkapiSerialize for [u8; 12] {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl OkapiSerialize for [u8; 20] {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl OkapiSerialize for [u8; 32] {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

impl OkapiSerialize for &[u8] {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        target.write_all(self)
    }
}

/// Byte vectors are written with a length prefix; raw byte runs inside
/// fixed-layout structures use `&[u8]` instead.
impl OkapiSerialize for Vec<u8> {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).okapi_serialize(&mut target)?;
        target.write_all(self)
    }
}

impl<T> OkapiSerialize for Vec<T>
where
    T: OkapiSerialize,
{
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).okapi_serialize(&mut target)?;
        for item in self.iter() {
            item.okapi_serialize(&mut target)?;
        }
        Ok(())
    }
}

impl OkapiSerialize for String {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        CompactInt::from(self.len()).okapi_serialize(&mut target)?;
        target.write_all(self.as_bytes())
    }
}

/// `None` writes nothing; optional trailing fields are implicitly encoded by
/// the payload length.
impl<T: OkapiSerialize> OkapiSerialize for Option<T> {
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        match self {
            Some(contents) => contents.okapi_serialize(&mut target),
            None => Ok(()),
        }
    }
}

impl<T, U> OkapiSerialize for (T, U)
where
    T: OkapiSerialize,
    U: OkapiSerialize,
{
    fn okapi_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        self.0.okapi_serialize(&mut target)?;
        self.1.okapi_serialize(&mut target)?;
        Ok(())
    }
}

impl<T> OkapiSerialize for std::sync::Arc<T>
where
    T: OkapiSerialize,
{
    fn okapi_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        T::okapi_serialize(self, target)
    }
}
