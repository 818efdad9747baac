use std::io;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};

use super::SerializationError;
use crate::compactint::CompactInt;

type Result<R> = std::result::Result<R, SerializationError>;

pub trait OkapiDeserialize {
    fn okapi_deserialize<R: io::Read>(reader: R) -> Result<Self>
    where
        Self: Sized;
}

/// Helper for deserializing more succinctly via type inference.
pub trait OkapiDeserializeInto {
    /// Deserialize based on type inference.
    fn okapi_deserialize_into<T>(self) -> Result<T>
    where
        T: OkapiDeserialize;
}

impl<R: io::Read> OkapiDeserializeInto for R {
    fn okapi_deserialize_into<T>(self) -> Result<T>
    where
        T: OkapiDeserialize,
    {
        T::okapi_deserialize(self)
    }
}

impl OkapiDeserialize for bool {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<bool> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SerializationError::Parse("invalid bool")),
        }
    }
}

impl OkapiDeserialize for u8 {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<u8> {
        Ok(reader.read_u8()?)
    }
}

impl OkapiDeserialize for u16 {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<u16> {
        Ok(reader.read_u16::<LittleEndian>()?)
    }
}

impl OkapiDeserialize for u32 {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<u32> {
        Ok(reader.read_u32::<LittleEndian>()?)
    }
}

impl OkapiDeserialize for u64 {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<u64> {
        Ok(reader.read_u64::<LittleEndian>()?)
    }
}

impl OkapiDeserialize for i32 {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<i32> {
        Ok(reader.read_i32::<LittleEndian>()?)
    }
}

impl OkapiDeserialize for i64 {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<i64> {
        Ok(reader.read_i64::<LittleEndian>()?)
    }
}

impl<T> OkapiDeserialize for Vec<T>
where
    T: OkapiDeserialize,
{
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<Vec<T>> {
        let len = CompactInt::okapi_deserialize(&mut reader)?.value() as usize;
        // Blind preallocation from an attacker-controlled length is a DoS
        // vector, so the initial capacity is capped.
        let blind_alloc_limit = 1024;
        let mut result: Vec<T> = Vec::with_capacity(std::cmp::min(len, blind_alloc_limit));
        for _ in 0..len {
            result.push(T::okapi_deserialize(&mut reader)?);
        }
        Ok(result)
    }
}

impl OkapiDeserialize for String {
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<String> {
        let len = CompactInt::okapi_deserialize(&mut reader)?.value() as usize;
        if len > 1024 {
            return Err(SerializationError::Parse("string field too long"));
        }
        let mut buf = vec![0; len];
        reader.read_exact(&mut buf)?;
        String::from_utf8(buf).map_err(|_| SerializationError::Parse("invalid utf-8"))
    }
}

/// Reading an `Option<T>` always produces `Some`; absent optional trailing
/// fields must be detected by the caller from the remaining payload length.
impl<T: Sized + OkapiDeserialize> OkapiDeserialize for Option<T> {
    fn okapi_deserialize<R: io::Read>(reader: R) -> Result<Option<T>> {
        Ok(Some(T::okapi_deserialize(reader)?))
    }
}

impl<T, U> OkapiDeserialize for (T, U)
where
    T: OkapiDeserialize,
    U: OkapiDeserialize,
{
    fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<(T, U)> {
        Ok((
            T::okapi_deserialize(&mut reader)?,
            U::okapi_deserialize(&mut reader)?,
        ))
    }
}

impl<T> OkapiDeserialize for Arc<T>
where
    T: OkapiDeserialize,
{
    fn okapi_deserialize<R: io::Read>(reader: R) -> Result<Self> {
        Ok(Arc::new(T::okapi_deserialize(reader)?))
    }
}

macro_rules! impl_deserializable_byte_array {
    ($size:expr) => {
        impl OkapiDeserialize for [u8; $size] {
            fn okapi_deserialize<R: io::Read>(mut reader: R) -> Result<[u8; $size]> {
                let mut result = [0u8; $size];
                reader.read_exact(&mut result)?;
                Ok(result)
            }
        }
    };
}

impl_deserializable_byte_array!(4);
impl_deserializable_byte_array!(12);
impl_deserializable_byte_array!(20);
impl_deserializable_byte_array!(32);
