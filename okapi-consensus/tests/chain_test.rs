//! End-to-end chain scenarios: genesis, spending, fork resolution, and
//! retargeting, on a temporary store with real proof of work at the easiest
//! target.

use std::iter::FromIterator;
use std::sync::Arc;

use okapi_chain::address::Address;
use okapi_chain::block::{merkle, Block, Header, Height};
use okapi_chain::keys::PrivateKey;
use okapi_chain::parameters::{GENESIS_PREVIOUS_BLOCK_HASH, VERSION};
use okapi_chain::script::Script;
use okapi_chain::transaction::{Input, OutPoint, Output, Transaction};
use okapi_chain::work::CompactBits;
use okapi_consensus::{miner, subsidy, ChainManager, NullNetwork};
use okapi_state::{ArrivalBuffer, FinalizedState, Mempool, SecondaryChain, UtxoSet};

struct Node {
    utxos: Arc<UtxoSet>,
    mempool: Arc<Mempool>,
    arrivals: Arc<ArrivalBuffer>,
    secondary: Arc<SecondaryChain>,
    store: Arc<FinalizedState>,
    manager: ChainManager,
    key: PrivateKey,
    address: Address,
}

fn node(key_byte: u8) -> Node {
    let key = PrivateKey::from_slice(&[key_byte; 32]).unwrap();
    let address = Address::from(&key.public_key());
    let utxos = Arc::new(UtxoSet::new());
    let mempool = Arc::new(Mempool::new(utxos.clone()));
    let arrivals = Arc::new(ArrivalBuffer::new());
    let secondary = Arc::new(SecondaryChain::new());
    let store = Arc::new(FinalizedState::temporary().unwrap());
    let manager = ChainManager::new(
        utxos.clone(),
        mempool.clone(),
        arrivals.clone(),
        secondary.clone(),
        store.clone(),
        Arc::new(NullNetwork),
        true,
    );
    Node {
        utxos,
        mempool,
        arrivals,
        secondary,
        store,
        manager,
        key,
        address,
    }
}

fn now() -> u32 {
    chrono::Utc::now().timestamp() as u32
}

/// Mine a block by hand (outside any chain manager), for competitor chains.
fn mine_competitor(
    height: u32,
    previous: okapi_chain::block::Hash,
    miner_address: &Address,
    extra: Vec<Arc<Transaction>>,
) -> Arc<Block> {
    let coinbase = subsidy::coinbase_transaction(Height(height), miner_address, 0, now());
    let mut transactions = vec![Arc::new(coinbase)];
    transactions.extend(extra);
    let merkle_root = merkle::Root::from_iter(transactions.iter().map(|tx| tx.hash()));
    let size: usize = 80 + transactions
        .iter()
        .map(|tx| tx.serialized_size())
        .sum::<usize>();
    let mut header = Header::new(
        VERSION,
        previous,
        merkle_root,
        now(),
        CompactBits::initial(),
        0,
    );
    let quiet = ArrivalBuffer::new();
    assert!(!miner::mine(
        &mut header,
        CompactBits::initial().expand(),
        &quiet
    ));
    Arc::new(Block {
        height: Height(height),
        size: size as u32,
        header,
        transactions,
    })
}

/// A signed transaction spending output 0 of `funding` (which must pay
/// `key`): `pay` satoshis to `to`, change back to the signer, 30M fee.
fn signed_spend(funding: &Transaction, key: &PrivateKey, pay: i64, to: [u8; 20]) -> Arc<Transaction> {
    let script_pubkey = Script::p2pkh(key.public_key().hash160());
    let funding_value = funding.outputs[0].value;
    let fee = 30_000_000;
    let mut tx = Transaction::new(
        VERSION,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                hash: funding.hash(),
                index: 0,
            },
            script_sig: Script::default(),
            sequence: 0xFFFF_FFFF,
        }],
        vec![
            Output::pay_to(pay, to),
            Output::pay_to(funding_value - pay - fee, key.public_key().hash160()),
        ],
        0,
        now() - 10,
    );
    tx.sign_input(0, key, &script_pubkey).unwrap();
    Arc::new(tx)
}

#[test]
fn genesis_block() {
    let mut node = node(0x31);
    node.manager.bootstrap(&node.address).unwrap();

    let tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(tip.height, Height(0));
    assert_eq!(
        tip.header.previous_block_hash,
        GENESIS_PREVIOUS_BLOCK_HASH
    );
    assert_eq!(node.store.block_count(), 1);

    let coinbase = &tip.transactions[0];
    assert!(coinbase.is_coinbase());
    assert_eq!(coinbase.outputs[0].value, 5_000_000_000);

    assert_eq!(node.utxos.len(), 1);
    assert_eq!(
        node.utxos.owned_by(&node.address.pub_key_hash),
        vec![coinbase.hash()]
    );
}

#[test]
fn simple_spend_confirms() {
    let mut node = node(0x32);
    node.manager.bootstrap(&node.address).unwrap();
    let genesis = node.store.last_block().unwrap().unwrap();
    let funding = &genesis.transactions[0];

    let recipient = [0x77; 20];
    let spend = signed_spend(funding, &node.key, 100_000_000, recipient);
    node.mempool.add(spend.clone()).unwrap();

    node.manager
        .add_block(Height(1), genesis.hash(), &node.address)
        .unwrap();

    assert!(node.mempool.is_empty());
    let tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(tip.height, Height(1));
    assert_eq!(tip.transactions.len(), 2);
    // The coinbase collects the fee on top of the subsidy.
    assert_eq!(
        tip.transactions[0].outputs[0].value,
        5_000_000_000 + 30_000_000
    );

    // The recipient and the change both appear in the UTXO index.
    assert_eq!(node.utxos.owned_by(&recipient), vec![spend.hash()]);
    assert!(node
        .utxos
        .owned_by(&node.address.pub_key_hash)
        .contains(&spend.hash()));
    // The spent coinbase is gone.
    assert!(!node.utxos.contains(&funding.hash()));

    // Confirmed and queryable by id.
    let (found, in_block) = node.store.find_transaction(&spend.hash()).unwrap().unwrap();
    assert_eq!(found.hash(), spend.hash());
    assert_eq!(in_block, tip.hash());
}

#[test]
fn competitor_extension_is_applied() {
    let mut node = node(0x33);
    node.manager.bootstrap(&node.address).unwrap();
    let genesis = node.store.last_block().unwrap().unwrap();

    let rival = Address::new([0x55; 20]);
    let competitor = mine_competitor(1, genesis.hash(), &rival, Vec::new());
    node.arrivals.push(competitor.clone());
    node.manager.lost_competition().unwrap();

    let tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(tip.hash(), competitor.hash());
    assert!(node.arrivals.is_empty());
    assert!(node.utxos.contains(&competitor.transactions[0].hash()));
}

#[test]
fn lone_equal_height_competitor_is_shelved() {
    let mut node = node(0x34);
    node.manager.bootstrap(&node.address).unwrap();
    let genesis = node.store.last_block().unwrap().unwrap();

    let rival = Address::new([0x56; 20]);
    let competitor = mine_competitor(0, GENESIS_PREVIOUS_BLOCK_HASH, &rival, Vec::new());
    node.arrivals.push(competitor.clone());
    node.manager.lost_competition().unwrap();

    // The incumbent keeps the tie; the competitor waits in the secondary
    // chain.
    let tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(tip.hash(), genesis.hash());
    assert!(node.secondary.contains(&competitor.hash()));
}

#[test]
fn depth_two_fork_switches_and_readmits_orphans() {
    let mut node = node(0x35);
    node.manager.bootstrap(&node.address).unwrap();
    let genesis = node.store.last_block().unwrap().unwrap();
    let funding = genesis.transactions[0].clone();

    // Local height 1 carries a spend of the genesis coinbase.
    let orphan_to_be = signed_spend(&funding, &node.key, 200_000_000, [0x66; 20]);
    node.mempool.add(orphan_to_be.clone()).unwrap();
    node.manager
        .add_block(Height(1), genesis.hash(), &node.address)
        .unwrap();
    let local_tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(local_tip.height, Height(1));

    // A rival mined heights 1 and 2 on the same genesis, without the spend.
    let rival = Address::new([0x88; 20]);
    let rival_1 = mine_competitor(1, genesis.hash(), &rival, Vec::new());
    let rival_2 = mine_competitor(2, rival_1.hash(), &rival, Vec::new());

    // The first rival block ties our tip: shelved.
    node.arrivals.push(rival_1.clone());
    node.manager.lost_competition().unwrap();
    assert_eq!(node.store.last_block().unwrap().unwrap().hash(), local_tip.hash());
    assert!(node.secondary.contains(&rival_1.hash()));

    // The second rival block completes a heavier chain: switch.
    node.arrivals.push(rival_2.clone());
    node.manager.lost_competition().unwrap();

    let tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(tip.height, Height(2));
    assert_eq!(tip.hash(), rival_2.hash());
    assert_eq!(
        node.store.block(Height(1)).unwrap().unwrap().hash(),
        rival_1.hash()
    );

    // The displaced block went to the secondary chain and its spend was
    // re-admitted to the mempool.
    assert!(node.secondary.contains(&local_tip.hash()));
    assert!(node.mempool.contains(&orphan_to_be.hash()));

    // The rival coinbases are spendable; the displaced one is not.
    assert!(node.utxos.contains(&rival_1.transactions[0].hash()));
    assert!(node.utxos.contains(&rival_2.transactions[0].hash()));
    assert!(!node.utxos.contains(&local_tip.transactions[0].hash()));
    // The genesis coinbase is live again, encumbered by the mempool spend.
    assert!(node.utxos.contains(&funding.hash()));
}

#[test]
fn retarget_after_fast_interval() {
    let mut node = node(0x36);

    // Hand the store ten blocks whose timestamps span sixty seconds: ten
    // times faster than the six-hundred-second schedule.
    let base_time = now() - 600;
    let mut previous = GENESIS_PREVIOUS_BLOCK_HASH;
    for height in 0..10u32 {
        let coinbase =
            subsidy::coinbase_transaction(Height(height), &node.address, 0, base_time);
        let coinbase = Arc::new(coinbase);
        let merkle_root = merkle::Root::from_iter(vec![coinbase.hash()]);
        let header = Header::new(
            VERSION,
            previous,
            merkle_root,
            base_time + height * 60 / 9,
            CompactBits::initial(),
            height,
        );
        let block = Block {
            height: Height(height),
            size: 80,
            header,
            transactions: vec![coinbase],
        };
        previous = block.hash();
        node.store.save_block(&block).unwrap();
    }

    node.manager.bootstrap(&node.address).unwrap();
    node.manager
        .add_block(Height(10), previous, &node.address)
        .unwrap();

    let tip = node.store.last_block().unwrap().unwrap();
    assert_eq!(tip.height, Height(10));
    // The new bits encode a harder (smaller) target, and the mined block
    // satisfies it.
    let new_target = tip.header.bits.expand();
    assert!(new_target < CompactBits::initial().expand());
    let proof = primitive_types::U256::from_little_endian(&tip.hash().0);
    assert!(proof < new_target);
}
