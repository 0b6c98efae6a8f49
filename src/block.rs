// src/block.rs - immutable record + PoW sealing (spec §4.2, component C2)
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::{genesis, INITIAL_DIFFICULTY, MINE_RATE_MS};
use crate::crypto;
use crate::crypto::now_ms;
use crate::transaction::Transaction;
use crate::types::Hash;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub timestamp: u64,
    pub last_hash: Hash,
    pub hash: Hash,
    pub data: Vec<Transaction>,
    pub nonce: u64,
    pub difficulty: u32,
}

impl Block {
    /// The constant genesis block, identical on every node (spec §3). Its
    /// hash is accepted by identity and is not required to satisfy the PoW
    /// predicate.
    pub fn genesis() -> Self {
        Block {
            timestamp: genesis::TIMESTAMP,
            last_hash: genesis::LAST_HASH.to_string(),
            hash: genesis::HASH.to_string(),
            data: Vec::new(),
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
        }
    }

    /// Seals a new block on top of `last_block` by searching for a nonce
    /// whose hash satisfies the PoW predicate for the (re-adjusted)
    /// difficulty. `cancel` is polled every iteration so a newly accepted,
    /// longer chain can preempt an in-flight mine (spec §5, §9's last
    /// redesign note); returns `None` if cancellation fires first.
    pub fn mine(last_block: &Block, data: Vec<Transaction>, cancel: &Arc<AtomicBool>) -> Option<Block> {
        let mut nonce: u64 = 0;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            nonce = nonce.wrapping_add(1);
            let timestamp = now_ms();
            let difficulty = adjust_difficulty(last_block, timestamp);
            let hash = Self::hash(timestamp, &last_block.hash, &data, nonce, difficulty);

            if meets_difficulty(&hash, difficulty) {
                return Some(Block {
                    timestamp,
                    last_hash: last_block.hash.clone(),
                    hash,
                    data,
                    nonce,
                    difficulty,
                });
            }
        }
    }

    /// Pure hash function: `SHA256(timestamp || lastHash || canonical(data)
    /// || nonce || difficulty)`, lowercase hex.
    pub fn hash(timestamp: u64, last_hash: &str, data: &[Transaction], nonce: u64, difficulty: u32) -> Hash {
        let mut buf = Vec::new();
        buf.extend_from_slice(timestamp.to_string().as_bytes());
        buf.extend_from_slice(last_hash.as_bytes());
        buf.extend_from_slice(&crypto::canonical_bytes(&data));
        buf.extend_from_slice(nonce.to_string().as_bytes());
        buf.extend_from_slice(difficulty.to_string().as_bytes());
        crypto::sha256_hex(&buf)
    }

    /// Recomputes this block's hash from its own fields and compares.
    pub fn hash_is_valid(&self) -> bool {
        Self::hash(
            self.timestamp,
            &self.last_hash,
            &self.data,
            self.nonce,
            self.difficulty,
        ) == self.hash
    }

    pub fn satisfies_proof_of_work(&self) -> bool {
        meets_difficulty(&self.hash, self.difficulty)
    }
}

/// Per-block difficulty adjustment (spec §4.2). Deliberately aggressive:
/// it oscillates by exactly 1 every block, converging around
/// `MINE_RATE_MS` on average rather than smoothing over a window (spec §9
/// open question 3 — kept as-is).
pub fn adjust_difficulty(last_block: &Block, timestamp: u64) -> u32 {
    let difficulty = last_block.difficulty;
    if difficulty < 1 {
        return 1;
    }
    if timestamp.saturating_sub(last_block.timestamp) > MINE_RATE_MS {
        difficulty.saturating_sub(1).max(1)
    } else {
        difficulty + 1
    }
}

/// The PoW predicate: the first `difficulty` hex characters of `hash` are `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let prefix: String = std::iter::repeat('0').take(difficulty as usize).collect();
    hash.starts_with(&prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_matches_the_literal_constant() {
        let genesis = Block::genesis();
        assert_eq!(genesis.timestamp, 1);
        assert_eq!(genesis.last_hash, "-----");
        assert_eq!(genesis.hash, "genesis-hash");
        assert!(genesis.data.is_empty());
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.difficulty, INITIAL_DIFFICULTY);
    }

    #[test]
    fn mined_block_satisfies_pow_and_links_to_parent() {
        let last_block = Block::genesis();
        let cancel = Arc::new(AtomicBool::new(false));
        let mined = Block::mine(&last_block, Vec::new(), &cancel).unwrap();

        assert_eq!(mined.last_hash, last_block.hash);
        assert!(mined.hash_is_valid());
        assert!(mined.satisfies_proof_of_work());
    }

    #[test]
    fn mine_returns_none_when_cancelled_up_front() {
        let last_block = Block::genesis();
        let cancel = Arc::new(AtomicBool::new(true));
        assert!(Block::mine(&last_block, Vec::new(), &cancel).is_none());
    }

    #[test]
    fn difficulty_rises_for_quickly_mined_blocks() {
        let last_block = Block {
            difficulty: 5,
            timestamp: 1000,
            ..Block::genesis()
        };
        assert_eq!(adjust_difficulty(&last_block, 1000 + MINE_RATE_MS - 1), 6);
    }

    #[test]
    fn difficulty_falls_for_slowly_mined_blocks() {
        let last_block = Block {
            difficulty: 5,
            timestamp: 1000,
            ..Block::genesis()
        };
        assert_eq!(adjust_difficulty(&last_block, 1000 + MINE_RATE_MS + 1), 4);
    }

    #[test]
    fn difficulty_never_drops_below_one() {
        let last_block = Block {
            difficulty: 1,
            timestamp: 1000,
            ..Block::genesis()
        };
        assert_eq!(adjust_difficulty(&last_block, 1000 + MINE_RATE_MS + 1), 1);

        let zero_difficulty_block = Block {
            difficulty: 0,
            ..last_block
        };
        assert_eq!(adjust_difficulty(&zero_difficulty_block, 2000), 1);
    }
}
