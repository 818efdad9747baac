//! Difficulty retargeting.
//!
//! Every [`RETARGET_INTERVAL`] blocks the target scales by the ratio of the
//! observed interval duration to the expected one, clamped to the chain's
//! easiest target. A faster network makes the next interval harder.

use primitive_types::{U256, U512};

use okapi_chain::block::Block;
use okapi_chain::work::MAX_TARGET;

/// How many blocks share one difficulty target.
pub const RETARGET_INTERVAL: u32 = 10;

/// The intended spacing between blocks, in seconds.
pub const TARGET_SPACING_SECS: u32 = 60;

/// The next target from the interval spanned by `oldest` (the previous
/// retarget boundary) and `newest` (the last block of the interval):
/// `target(oldest) · elapsed / (60 · 10)`, clamped to [`struct@MAX_TARGET`].
///
/// Returns `None` when the scaled target collapses to zero (a degenerate
/// elapsed time); callers keep the previous target in that case.
pub fn next_target(newest: &Block, oldest: &Block) -> Option<U256> {
    let last_target = oldest.header.bits.expand();
    let elapsed = newest.header.time.saturating_sub(oldest.header.time) as u64;
    let expected = (TARGET_SPACING_SECS * RETARGET_INTERVAL) as u64;

    let scaled = last_target.full_mul(U256::from(elapsed)) / U512::from(expected);
    let max = U512::from(*MAX_TARGET);
    let clamped = if scaled > max { max } else { scaled };
    let new_target = truncate(clamped);
    if new_target.is_zero() {
        None
    } else {
        Some(new_target)
    }
}

/// Drop the high 256 bits; callers clamp below `MAX_TARGET` first.
fn truncate(value: U512) -> U256 {
    let mut be = [0u8; 64];
    value.to_big_endian(&mut be);
    U256::from_big_endian(&be[32..])
}

#[cfg(test)]
mod tests {
    use std::iter::FromIterator;
    use std::sync::Arc;

    use okapi_chain::block::{self, merkle, Header, Height};
    use okapi_chain::work::CompactBits;

    use super::*;

    fn block_with(height: u32, time: u32, bits: CompactBits) -> Block {
        Block {
            height: Height(height),
            size: 80,
            header: Header::new(
                1,
                block::Hash([0; 32]),
                merkle::Root::from_iter(Vec::new()),
                time,
                bits,
                0,
            ),
            transactions: Vec::new(),
        }
    }

    #[test]
    fn on_schedule_interval_keeps_target() {
        let oldest = block_with(0, 1_700_000_000, CompactBits::initial());
        let newest = block_with(9, 1_700_000_000 + 540, CompactBits::initial());
        // Nine intervals of sixty seconds elapsed between the boundary block
        // and the last block of the window: 540/600 of the old target.
        let next = next_target(&newest, &oldest).unwrap();
        assert_eq!(next, CompactBits::initial().expand() * 540u64 / 600u64);
    }

    #[test]
    fn fast_interval_hardens_target() {
        let oldest = block_with(0, 1_700_000_000, CompactBits::initial());
        let newest = block_with(9, 1_700_000_001, CompactBits::initial());
        let next = next_target(&newest, &oldest).unwrap();
        assert!(next < CompactBits::initial().expand());
        // One second out of six hundred.
        assert_eq!(next, CompactBits::initial().expand() / 600u64);
    }

    #[test]
    fn slow_interval_clamps_to_max() {
        let hard = CompactBits::compress(*MAX_TARGET >> 8);
        let oldest = block_with(0, 1_700_000_000, hard);
        // A thousand times slower than intended.
        let newest = block_with(9, 1_700_000_000 + 600_000, hard);
        let next = next_target(&newest, &oldest).unwrap();
        assert_eq!(next, *MAX_TARGET);
    }

    #[test]
    fn zero_elapsed_yields_none() {
        let oldest = block_with(0, 1_700_000_000, CompactBits::initial());
        let newest = block_with(9, 1_700_000_000, CompactBits::initial());
        assert_eq!(next_target(&newest, &oldest), None);
    }

    #[test]
    fn arc_blocks_work_too() {
        // Callers mostly hold Arc<Block>; make sure derefs line up.
        let oldest = Arc::new(block_with(0, 1_700_000_000, CompactBits::initial()));
        let newest = Arc::new(block_with(9, 1_700_000_300, CompactBits::initial()));
        assert!(next_target(&newest, &oldest).is_some());
    }
}
