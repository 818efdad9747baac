//! The block subsidy and coinbase construction.

use okapi_chain::address::Address;
use okapi_chain::block::Height;
use okapi_chain::parameters::VERSION;
use okapi_chain::transaction::{Input, Output, Transaction};

/// The reward halves every `HALVING_INTERVAL` blocks (one year of one-minute
/// blocks).
pub const HALVING_INTERVAL: u32 = 525_600;

/// Heights from here on mint nothing.
pub const SUBSIDY_END_HEIGHT: u32 = 5_256_000;

/// The genesis-era reward: 50 coins.
const INITIAL_REWARD: i64 = 5_000_000_000;

/// The subsidy minted by the block at `height`, in satoshis.
pub fn block_reward(height: Height) -> i64 {
    if height.0 >= SUBSIDY_END_HEIGHT {
        return 0;
    }
    let halvings = height.0 / HALVING_INTERVAL;
    INITIAL_REWARD >> halvings
}

/// Build the coinbase for a block at `height`: one output paying the miner
/// the subsidy plus the fees collected from the block's transactions, and a
/// single sentinel input carrying the height.
pub fn coinbase_transaction(
    height: Height,
    miner_address: &Address,
    fees: i64,
    timestamp: u32,
) -> Transaction {
    Transaction::new(
        VERSION,
        vec![Input::coinbase(height)],
        vec![Output::pay_to(
            block_reward(height) + fees,
            miner_address.pub_key_hash,
        )],
        0,
        timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_schedule() {
        assert_eq!(block_reward(Height(0)), 5_000_000_000);
        assert_eq!(block_reward(Height(HALVING_INTERVAL - 1)), 5_000_000_000);
        assert_eq!(block_reward(Height(HALVING_INTERVAL)), 2_500_000_000);
        assert_eq!(block_reward(Height(HALVING_INTERVAL * 2)), 1_250_000_000);
        assert_eq!(block_reward(Height(HALVING_INTERVAL * 9)), 9_765_625);
        // The subsidy ends exactly at the tenth halving.
        assert_eq!(block_reward(Height(SUBSIDY_END_HEIGHT - 1)), 9_765_625);
        assert_eq!(block_reward(Height(SUBSIDY_END_HEIGHT)), 0);
        assert_eq!(block_reward(Height(u32::MAX)), 0);
    }

    #[test]
    fn coinbase_pays_reward_plus_fees() {
        let address = Address::new([0x0A; 20]);
        let coinbase = coinbase_transaction(Height(3), &address, 1_234, 1_700_000_000);
        assert!(coinbase.is_coinbase());
        assert_eq!(coinbase.outputs.len(), 1);
        assert_eq!(coinbase.outputs[0].value, 5_000_000_000 + 1_234);
        assert_eq!(coinbase.outputs[0].owner(), Some([0x0A; 20]));
        assert_eq!(
            coinbase.inputs[0].coinbase_height(),
            Some(Height(3))
        );
    }
}
