use std::sync::Arc;

use proptest::prelude::*;

use crate::transaction::tests::arbitrary_transaction;
use crate::transaction::{Input, Output, Transaction};
use crate::work::CompactBits;
use crate::{OkapiDeserialize, OkapiSerialize};

use super::*;

pub(crate) fn test_block(height: u32, transactions: Vec<Transaction>) -> Block {
    let mut txs: Vec<Arc<Transaction>> = vec![Arc::new(Transaction::new(
        1,
        vec![Input::coinbase(Height(height))],
        vec![Output::pay_to(5_000_000_000, [0x0C; 20])],
        0,
        1_700_000_000,
    ))];
    txs.extend(transactions.into_iter().map(Arc::new));

    let merkle_root = txs.iter().map(|tx| tx.hash()).collect();
    let size = txs.iter().map(|tx| tx.serialized_size()).sum::<usize>() + Header::len();
    let header = Header::new(
        crate::parameters::VERSION,
        Hash([height as u8; 32]),
        merkle_root,
        1_700_000_000 + height,
        CompactBits::initial(),
        0,
    );
    Block {
        height: Height(height),
        size: size as u32,
        header,
        transactions: txs,
    }
}

#[test]
fn header_is_eighty_bytes() {
    let block = test_block(3, Vec::new());
    let bytes = block.header.okapi_serialize_to_vec().unwrap();
    assert_eq!(bytes.len(), Header::len());
}

#[test]
fn header_deserialize_caches_hash() {
    let block = test_block(1, Vec::new());
    let bytes = block.header.okapi_serialize_to_vec().unwrap();
    let parsed = Header::okapi_deserialize(&bytes[..]).unwrap();
    assert_eq!(parsed.hash(), Hash::from(&block.header));
    assert_eq!(parsed, block.header);
}

#[test]
fn recompute_hash_tracks_nonce_changes() {
    let mut header = test_block(0, Vec::new()).header;
    let before = header.recompute_hash();
    header.nonce += 1;
    let after = header.recompute_hash();
    assert_ne!(before, after);
    assert_eq!(after, Hash::from(&header));
}

#[test]
fn hash_display_is_reversed_hex() {
    let hash = Hash::from_bytes_exact([
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E,
        0x1F, 0x20,
    ]);
    let displayed = hash.to_string();
    assert!(displayed.starts_with("201f1e1d"));
    assert!(displayed.ends_with("04030201"));
    assert_eq!(displayed.parse::<Hash>().unwrap(), hash);
}

#[test]
fn claimed_transaction_count_is_sanity_checked() {
    let block = test_block(2, Vec::new());
    let mut bytes = block.okapi_serialize_to_vec().unwrap();
    // The count sits right after height(4) + size(4) + header(80). Replace
    // the 1-byte varint with a huge 5-byte claim.
    let count_at = 4 + 4 + Header::len();
    bytes.splice(
        count_at..count_at + 1,
        vec![0xFE, 0xFF, 0xFF, 0xFF, 0x7F],
    );
    assert!(Block::okapi_deserialize(&bytes[..]).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn block_round_trip(txs in prop::collection::vec(arbitrary_transaction(), 0..3), height in 0u32..1_000_000) {
        let block = test_block(height, txs);
        let bytes = block.okapi_serialize_to_vec().expect("writing to a Vec never fails");
        let reparsed = Block::okapi_deserialize(&bytes[..]).expect("serialized block parses");
        prop_assert_eq!(&reparsed, &block);

        // Byte-identical re-serialization.
        let rebytes = reparsed.okapi_serialize_to_vec().expect("writing to a Vec never fails");
        prop_assert_eq!(rebytes, bytes);
    }
}
