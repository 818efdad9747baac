use serde::{Deserialize, Serialize};

use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

/// A `Cached` value is an option that is never serialized.
///
/// It can be added to any struct without changing the struct's canonical
/// byte representation, which makes it safe for hash caches on
/// consensus-critical types.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
pub struct Cached<T: Clone + Copy>(Option<T>);

impl<T: Clone + Copy> Cached<T> {
    pub fn new() -> Cached<T> {
        Cached(None)
    }

    pub fn from(val: T) -> Cached<T> {
        Cached(Some(val))
    }

    pub fn value(&self) -> Option<T> {
        self.0
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}

impl<T: Clone + Copy> Default for Cached<T> {
    fn default() -> Self {
        Cached::new()
    }
}

/// Two caches are unequal only when both are populated with different values.
///
/// This lets locally-constructed values (with empty caches) compare equal to
/// their deserialized counterparts, whose caches are always populated.
impl<T: PartialEq + Copy> PartialEq for Cached<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => true,
        }
    }
}

impl<T: Clone + Copy + std::fmt::Debug> std::fmt::Debug for Cached<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Clone + Copy> OkapiSerialize for Cached<T> {
    fn okapi_serialize<W>(&self, _: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        Ok(())
    }
}

impl<T: Clone + Copy> OkapiDeserialize for Cached<T> {
    fn okapi_deserialize<R: std::io::Read>(_: R) -> Result<Self, SerializationError> {
        Ok(Cached(None))
    }
}
