use proptest::prelude::*;

use crate::keys::PrivateKey;
use crate::script::{Cmd, Script};
use crate::{OkapiDeserialize, OkapiSerialize};

use super::*;

fn spend_fixture() -> (Transaction, PrivateKey, Script) {
    let key = PrivateKey::from_slice(&[0x11; 32]).unwrap();
    let script_pubkey = Script::p2pkh(key.public_key().hash160());
    let tx = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: Hash([0xAB; 32]),
                index: 0,
            },
            script_sig: Script::default(),
            sequence: 0xFFFF_FFFF,
        }],
        vec![
            Output::pay_to(4_000_000_000, [0x22; 20]),
            Output::pay_to(999_000_000, key.public_key().hash160()),
        ],
        0,
        1_700_000_000,
    );
    (tx, key, script_pubkey)
}

#[test]
fn signed_input_verifies() {
    let (mut tx, key, script_pubkey) = spend_fixture();
    tx.sign_input(0, &key, &script_pubkey).unwrap();
    assert!(tx.verify_input(0, &script_pubkey));
}

#[test]
fn any_field_change_invalidates_signature() {
    let (signed, key, script_pubkey) = spend_fixture();
    let mut signed = signed;
    signed.sign_input(0, &key, &script_pubkey).unwrap();

    let mut version_changed = signed.clone();
    version_changed.version = 2;
    assert!(!version_changed.verify_input(0, &script_pubkey));

    let mut amount_changed = signed.clone();
    amount_changed.outputs[0].value += 1;
    assert!(!amount_changed.verify_input(0, &script_pubkey));

    let mut timestamp_changed = signed.clone();
    timestamp_changed.timestamp += 1;
    assert!(!timestamp_changed.verify_input(0, &script_pubkey));

    let mut lock_time_changed = signed.clone();
    lock_time_changed.lock_time = 99;
    assert!(!lock_time_changed.verify_input(0, &script_pubkey));

    let mut outpoint_changed = signed.clone();
    if let Input::PrevOut { outpoint, .. } = &mut outpoint_changed.inputs[0] {
        outpoint.index = 1;
    }
    assert!(!outpoint_changed.verify_input(0, &script_pubkey));

    // Re-signing a modified transaction makes it valid again.
    let mut resigned = signed;
    resigned.outputs[0].value -= 1;
    resigned.sign_input(0, &key, &script_pubkey).unwrap();
    assert!(resigned.verify_input(0, &script_pubkey));
}

#[test]
fn wrong_script_pubkey_fails() {
    let (mut tx, key, script_pubkey) = spend_fixture();
    tx.sign_input(0, &key, &script_pubkey).unwrap();
    assert!(!tx.verify_input(0, &Script::p2pkh([0x77; 20])));
}

#[test]
fn signing_clears_cached_hash() {
    let (tx, key, script_pubkey) = spend_fixture();
    let bytes = tx.okapi_serialize_to_vec().unwrap();
    let mut parsed = Transaction::okapi_deserialize(&bytes[..]).unwrap();
    let unsigned_hash = parsed.hash();
    parsed.sign_input(0, &key, &script_pubkey).unwrap();
    assert_ne!(parsed.hash(), unsigned_hash);
    assert_eq!(parsed.hash(), Hash::from(&parsed));
}

#[test]
fn coinbase_detection() {
    let coinbase = Transaction::new(
        1,
        vec![Input::coinbase(crate::block::Height(7))],
        vec![Output::pay_to(5_000_000_000, [0x01; 20])],
        0,
        1_700_000_000,
    );
    assert!(coinbase.is_coinbase());
    assert!(coinbase.contains_coinbase_input());

    let (spend, ..) = spend_fixture();
    assert!(!spend.is_coinbase());

    // A coinbase-style input among others is not a coinbase transaction.
    let mut mixed = spend;
    mixed.inputs.push(Input::coinbase(crate::block::Height(7)));
    assert!(!mixed.is_coinbase());
    assert!(mixed.contains_coinbase_input());
}

#[test]
fn serialized_size_matches_serialization() {
    let (mut tx, key, script_pubkey) = spend_fixture();
    tx.sign_input(0, &key, &script_pubkey).unwrap();
    let bytes = tx.okapi_serialize_to_vec().unwrap();
    assert_eq!(bytes.len(), tx.serialized_size());
}

pub(crate) fn arbitrary_transaction() -> impl Strategy<Value = Transaction> {
    // An empty push serializes as the 0x00 opcode, which does not parse
    // back as a push, so generated script_sigs carry at least one byte.
    let script_sig = prop::collection::vec(any::<u8>(), 1..80)
        .prop_map(|bytes| Script::new(vec![Cmd::Push(bytes)]));
    let input = (any::<OutPoint>(), script_sig, any::<u32>()).prop_map(
        |(outpoint, script_sig, sequence)| Input::PrevOut {
            outpoint,
            script_sig,
            sequence,
        },
    );
    let output =
        (0i64..5_000_000_000, any::<[u8; 20]>()).prop_map(|(value, owner)| Output::pay_to(value, owner));
    (
        any::<u32>(),
        prop::collection::vec(input, 1..4),
        prop::collection::vec(output, 1..4),
        any::<u32>(),
        any::<u32>(),
    )
        .prop_map(|(version, inputs, outputs, lock_time, timestamp)| {
            Transaction::new(version, inputs, outputs, lock_time, timestamp)
        })
}

proptest! {
    #[test]
    fn transaction_round_trip(tx in arbitrary_transaction()) {
        let bytes = tx.okapi_serialize_to_vec().expect("writing to a Vec never fails");
        prop_assert_eq!(bytes.len(), tx.serialized_size());

        let reparsed = Transaction::okapi_deserialize(&bytes[..]).expect("serialized transaction parses");
        prop_assert_eq!(&reparsed, &tx);

        // Byte-identical re-serialization.
        let rebytes = reparsed.okapi_serialize_to_vec().expect("writing to a Vec never fails");
        prop_assert_eq!(rebytes, bytes);
    }
}
