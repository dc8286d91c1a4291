// Copyright (c) 2024 Botho Foundation

//! Proof-of-work nonce search.
//!
//! A block is mined by incrementing its nonce until its hash starts with
//! `difficulty` `'0'` hex characters. The search is synchronous and
//! deterministic: the same starting block and difficulty always give the
//! same nonce and hash. Rebuilding from the transaction log relies on this.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::block::Block;
use crate::hashing::{hash_block_parts, meets_difficulty, HASH_HEX_LEN};
use crate::ledger::LedgerError;

/// Difficulty used by the land registry (leading zero hex characters)
pub const DEFAULT_DIFFICULTY: usize = 2;

/// How many nonces are tried between checks of the cancel flag
pub const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Mining statistics for one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningStats {
    /// Hashes computed, including the one at the starting nonce
    pub attempts: u64,
    pub elapsed: Duration,
}

impl MiningStats {
    pub fn hashrate(&self) -> f64 {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed > 0.0 {
            self.attempts as f64 / elapsed
        } else {
            0.0
        }
    }
}

/// A block whose hash satisfies the difficulty target
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub stats: MiningStats,
}

/// Mine `block` at `difficulty`, starting from its current nonce.
pub fn mine(block: Block, difficulty: usize) -> Result<MinedBlock, LedgerError> {
    mine_inner(block, difficulty, None)
}

/// Like [`mine`], but gives up with [`LedgerError::MiningCancelled`] once
/// `cancel` is set. The flag is polled every [`CANCEL_CHECK_INTERVAL`] nonces.
pub fn mine_cancellable(
    block: Block,
    difficulty: usize,
    cancel: &AtomicBool,
) -> Result<MinedBlock, LedgerError> {
    mine_inner(block, difficulty, Some(cancel))
}

fn mine_inner(
    mut block: Block,
    difficulty: usize,
    cancel: Option<&AtomicBool>,
) -> Result<MinedBlock, LedgerError> {
    if difficulty > HASH_HEX_LEN {
        return Err(LedgerError::InvalidDifficulty(difficulty));
    }

    let start = Instant::now();
    // The payload doesn't change between attempts, so canonicalize it once
    let canonical = block.canonical_data()?;
    let rehash = |b: &Block| {
        hash_block_parts(b.index, &b.timestamp, &canonical, &b.previous_hash, b.nonce)
    };

    block.hash = rehash(&block);
    let mut attempts: u64 = 1;

    while !meets_difficulty(&block.hash, difficulty) {
        if attempts % CANCEL_CHECK_INTERVAL == 0 {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    debug!(index = block.index, attempts, "Mining cancelled");
                    return Err(LedgerError::MiningCancelled {
                        index: block.index,
                        attempts,
                    });
                }
            }
        }
        block.nonce = block.nonce.wrapping_add(1);
        block.hash = rehash(&block);
        attempts += 1;
    }

    let stats = MiningStats {
        attempts,
        elapsed: start.elapsed(),
    };

    debug!(
        index = block.index,
        nonce = block.nonce,
        hash = %block.hash,
        attempts,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "Block mined"
    );

    Ok(MinedBlock { block, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockData, LandRecordTransaction, RecordSnapshot};

    fn test_block() -> Block {
        let tx = LandRecordTransaction::approve("LR-7", RecordSnapshot::new(), "a1", "Alice")
            .with_timestamp("2025-03-01T00:00:00.000Z");
        Block::new(
            1,
            "2025-03-01T00:00:00.000Z",
            BlockData::Transaction(tx),
            "00c0ffee",
        )
        .unwrap()
    }

    #[test]
    fn test_mine_meets_target_with_minimal_nonce() {
        for difficulty in 0..=3 {
            let start = test_block();
            let mined = mine(start.clone(), difficulty).unwrap();

            assert!(meets_difficulty(&mined.block.hash, difficulty));
            assert_eq!(mined.block.hash, mined.block.compute_hash().unwrap());
            assert_eq!(mined.stats.attempts, mined.block.nonce - start.nonce + 1);

            // No earlier nonce satisfies the target
            let mut attempt = start.clone();
            while attempt.nonce < mined.block.nonce {
                let hash = attempt.compute_hash().unwrap();
                assert!(!meets_difficulty(&hash, difficulty));
                attempt.nonce += 1;
            }
        }
    }

    #[test]
    fn test_mine_difficulty_zero_keeps_nonce() {
        let mined = mine(test_block(), 0).unwrap();
        assert_eq!(mined.block.nonce, 0);
        assert_eq!(mined.stats.attempts, 1);
    }

    #[test]
    fn test_mine_is_deterministic() {
        let a = mine(test_block(), 2).unwrap();
        let b = mine(test_block(), 2).unwrap();
        assert_eq!(a.block, b.block);
    }

    #[test]
    fn test_mine_rejects_impossible_difficulty() {
        let err = mine(test_block(), HASH_HEX_LEN + 1).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidDifficulty(65)));
    }

    #[test]
    fn test_mine_cancellable_stops() {
        let cancel = AtomicBool::new(true);
        // 64 leading zeros is unreachable in practice
        let err = mine_cancellable(test_block(), HASH_HEX_LEN, &cancel).unwrap_err();
        match err {
            LedgerError::MiningCancelled { index, attempts } => {
                assert_eq!(index, 1);
                assert_eq!(attempts, CANCEL_CHECK_INTERVAL);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mine_cancellable_unset_flag_completes() {
        let cancel = AtomicBool::new(false);
        let mined = mine_cancellable(test_block(), 1, &cancel).unwrap();
        assert!(meets_difficulty(&mined.block.hash, 1));
    }
}
