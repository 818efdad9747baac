//! Signature hashes, signing, and input verification.
//!
//! The digest for input `i` is the sha256d of a re-serialization of the
//! transaction in which every input's script_sig is blanked except input
//! `i`, whose script_sig is replaced by the claimed script_pubkey, followed
//! by the 4-byte little-endian sighash type. The serialization is rebuilt
//! from components; the transaction itself is never mutated to produce it.

use thiserror::Error;

use crate::keys::PrivateKey;
use crate::script::{Cmd, Script};
use crate::serialization::sha256d;
use crate::{Cached, CompactInt, OkapiSerialize};

use super::{Input, Transaction};

/// The only supported sighash type: sign all inputs and outputs.
pub const SIGHASH_ALL: u32 = 1;

/// An attempt to sign an input that cannot carry a signature.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum SignError {
    #[error("input index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("coinbase inputs are not signable")]
    Coinbase,
}

impl Transaction {
    /// The digest input `input_index` commits to, given the script_pubkey of
    /// the output it spends.
    pub fn sighash(&self, input_index: usize, script_pubkey: &Script) -> [u8; 32] {
        let mut writer = sha256d::Writer::default();
        self.version
            .okapi_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        CompactInt::from(self.inputs.len())
            .okapi_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        for (i, input) in self.inputs.iter().enumerate() {
            let script = if i == input_index {
                script_pubkey.clone()
            } else {
                Script::default()
            };
            let blanked = match input {
                Input::PrevOut {
                    outpoint, sequence, ..
                } => Input::PrevOut {
                    outpoint: *outpoint,
                    script_sig: script,
                    sequence: *sequence,
                },
                Input::Coinbase { sequence, .. } => Input::Coinbase {
                    data: script,
                    sequence: *sequence,
                },
            };
            blanked
                .okapi_serialize(&mut writer)
                .expect("sha256d::Writer is infallible");
        }
        self.outputs
            .okapi_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        self.lock_time
            .okapi_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        self.timestamp
            .okapi_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        SIGHASH_ALL
            .okapi_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        writer.finish()
    }

    /// Sign input `input_index` with `key`, claiming it spends an output
    /// locked by `script_pubkey`.
    ///
    /// The script_sig becomes `[<DER signature ++ sighash byte>, <SEC
    /// pubkey>]`.
    pub fn sign_input(
        &mut self,
        input_index: usize,
        key: &PrivateKey,
        script_pubkey: &Script,
    ) -> Result<(), SignError> {
        let digest = self.sighash(input_index, script_pubkey);
        let mut signature = key.sign(&digest).serialize_der();
        signature.push(SIGHASH_ALL as u8);
        let sec = key.public_key().serialize().to_vec();
        match self.inputs.get_mut(input_index) {
            Some(Input::PrevOut { script_sig, .. }) => {
                *script_sig = Script::new(vec![Cmd::Push(signature), Cmd::Push(sec)]);
            }
            Some(Input::Coinbase { .. }) => return Err(SignError::Coinbase),
            None => return Err(SignError::IndexOutOfRange(input_index)),
        }
        // The canonical bytes changed; any cached id is stale.
        self.hash = Cached::new();
        Ok(())
    }

    /// Check that input `input_index` correctly spends an output locked by
    /// `script_pubkey`.
    pub fn verify_input(&self, input_index: usize, script_pubkey: &Script) -> bool {
        let script_sig = match self.inputs.get(input_index) {
            Some(Input::PrevOut { script_sig, .. }) => script_sig.clone(),
            _ => return false,
        };
        let digest = self.sighash(input_index, script_pubkey);
        (script_sig + script_pubkey.clone()).evaluate(&digest)
    }
}
