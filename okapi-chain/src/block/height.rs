use serde::{Deserialize, Serialize};

use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

/// The height of a block on its chain: the genesis block is at height 0.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Height(pub u32);

impl Height {
    /// The height of the block after this one.
    pub fn next(self) -> Height {
        Height(self.0 + 1)
    }
}

impl OkapiSerialize for Height {
    fn okapi_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.okapi_serialize(writer)
    }
}

impl OkapiDeserialize for Height {
    fn okapi_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u32::okapi_deserialize(reader)?))
    }
}
