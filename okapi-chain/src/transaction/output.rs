use okapi_serde_derive::{OkDeserialize, OkSerialize};
use serde::{Deserialize, Serialize};

use crate::script::Script;
use crate::{OkapiDeserialize, OkapiSerialize, SerializationError};

/// A transaction output.
///
/// The coins a wallet "holds" are the unspent outputs paying its hash160
/// across the global UTXO set; outputs are indivisible and consumed in their
/// entirety by a later input.
#[derive(
    Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, OkSerialize, OkDeserialize,
)]
pub struct Output {
    /// The amount, in satoshis.
    pub value: i64,
    /// The locking script that must be satisfied to spend this output.
    pub script_pubkey: Script,
}

impl Output {
    pub fn new(value: i64, script_pubkey: Script) -> Output {
        Output {
            value,
            script_pubkey,
        }
    }

    /// A standard output paying `value` to the owner of `pub_key_hash`.
    pub fn pay_to(value: i64, pub_key_hash: [u8; 20]) -> Output {
        Output {
            value,
            script_pubkey: Script::p2pkh(pub_key_hash),
        }
    }

    /// The owner hash160, for standard P2PKH outputs.
    pub fn owner(&self) -> Option<[u8; 20]> {
        self.script_pubkey.p2pkh_owner()
    }

    /// The serialized length in bytes.
    pub fn serialized_size(&self) -> usize {
        8 + self.script_pubkey.serialized_size()
    }
}
