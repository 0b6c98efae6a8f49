// src/chain.rs - the replicated ledger and fork-choice rule (spec §4.3, component C3)
use log::{info, warn};

use crate::block::{adjust_difficulty, Block};
use crate::transaction::Transaction;

/// An append-only sequence of blocks, rooted at the constant genesis block.
/// Every node starts with an identical chain and grows it independently
/// until gossip (or a local mine) extends it further.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Chain {
            blocks: vec![Block::genesis()],
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn latest_block(&self) -> &Block {
        self.blocks.last().expect("chain is never empty")
    }

    /// Mines and appends a block carrying `data` directly on top of the
    /// current tip. Used by tests and by callers that don't need
    /// cancellation; the miner (component C5) calls `Block::mine` itself so
    /// it can thread a cancellation flag through.
    pub fn add_block(&mut self, data: Vec<Transaction>) -> Block {
        let cancel = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let block = Block::mine(self.latest_block(), data, &cancel)
            .expect("mining without cancellation always completes");
        self.blocks.push(block.clone());
        block
    }

    /// Appends a block that has already been sealed elsewhere (e.g. by the
    /// miner, or received over gossip as a single-block extension) without
    /// re-running proof of work.
    pub fn append(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Structural + proof-of-work validity of a candidate chain, independent
    /// of whether it is currently preferred (spec §4.3):
    /// - must start with the exact genesis block.
    /// - each block's `last_hash` must equal its predecessor's `hash`.
    /// - each block's own hash must be internally consistent
    ///   (`Block::hash_is_valid`) and satisfy its claimed difficulty.
    /// - difficulty must not jump by more than 1 from the previous block
    ///   (spec §9 open question 3 — kept permissive: this bounds the jump,
    ///   it does not re-derive the "correct" difficulty from scratch).
    /// Transaction-level validity is intentionally out of scope here (spec
    /// §9 open question 1) — a chain can be structurally valid yet carry
    /// transactions a stricter node would reject.
    pub fn is_valid_chain(candidate: &[Block]) -> bool {
        if candidate.is_empty() || candidate[0] != Block::genesis() {
            return false;
        }

        for i in 1..candidate.len() {
            let block = &candidate[i];
            let last_block = &candidate[i - 1];

            if block.last_hash != last_block.hash {
                return false;
            }
            if !block.hash_is_valid() {
                return false;
            }
            if !block.satisfies_proof_of_work() {
                return false;
            }

            let difficulty_delta = (block.difficulty as i64 - last_block.difficulty as i64).abs();
            if difficulty_delta > 1 {
                return false;
            }
        }

        true
    }

    /// Fork choice (spec §4.3): a candidate chain replaces the local one
    /// only if it is both valid and strictly longer. Equal length is never
    /// replaced, even when the candidate is otherwise valid (spec §8's
    /// "equal-length tie" property) — this keeps the rule a pure function
    /// of length, with no tie-breaking by difficulty, timestamp, or hash.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> bool {
        if candidate.len() <= self.blocks.len() {
            info!(
                "rejecting candidate chain: length {} does not exceed local length {}",
                candidate.len(),
                self.blocks.len()
            );
            return false;
        }
        if !Self::is_valid_chain(&candidate) {
            warn!("rejecting candidate chain: failed validity check");
            return false;
        }

        info!(
            "replacing chain: {} blocks -> {} blocks",
            self.blocks.len(),
            candidate.len()
        );
        self.blocks = candidate;
        true
    }

    /// The difficulty the next block mined on this chain's tip would use,
    /// given `timestamp` as its mining start time.
    pub fn next_difficulty(&self, timestamp: u64) -> u32 {
        adjust_difficulty(self.latest_block(), timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    #[test]
    fn new_chain_holds_only_genesis() {
        let chain = Chain::new();
        assert_eq!(chain.blocks().len(), 1);
        assert_eq!(chain.blocks()[0], Block::genesis());
    }

    #[test]
    fn add_block_extends_and_links() {
        let mut chain = Chain::new();
        let tx = Transaction::coinbase(&"miner".to_string());
        chain.add_block(vec![tx]);

        assert_eq!(chain.blocks().len(), 2);
        assert_eq!(chain.blocks()[1].last_hash, chain.blocks()[0].hash);
    }

    #[test]
    fn valid_chain_accepts_genesis_only() {
        let chain = Chain::new();
        assert!(Chain::is_valid_chain(chain.blocks()));
    }

    #[test]
    fn invalid_chain_rejects_wrong_genesis() {
        let bogus_genesis = Block {
            hash: "not-genesis".to_string(),
            ..Block::genesis()
        };
        assert!(!Chain::is_valid_chain(&[bogus_genesis]));
    }

    #[test]
    fn invalid_chain_rejects_broken_link() {
        let mut chain = Chain::new();
        chain.add_block(vec![Transaction::coinbase(&"miner".to_string())]);
        let mut blocks = chain.blocks().to_vec();
        blocks[1].last_hash = "tampered".to_string();

        assert!(!Chain::is_valid_chain(&blocks));
    }

    #[test]
    fn longer_valid_chain_replaces_shorter() {
        let mut local = Chain::new();

        let mut candidate = Chain::new();
        candidate.add_block(vec![Transaction::coinbase(&"miner".to_string())]);

        assert!(local.replace_chain(candidate.blocks().to_vec()));
        assert_eq!(local.blocks().len(), 2);
    }

    #[test]
    fn equal_length_chain_never_replaces() {
        let mut local = Chain::new();
        local.add_block(vec![Transaction::coinbase(&"a".to_string())]);

        let mut other = Chain::new();
        other.add_block(vec![Transaction::coinbase(&"b".to_string())]);

        let original_tip = local.latest_block().hash.clone();
        assert!(!local.replace_chain(other.blocks().to_vec()));
        assert_eq!(local.latest_block().hash, original_tip);
    }

    #[test]
    fn shorter_chain_never_replaces_even_if_valid() {
        let mut local = Chain::new();
        local.add_block(vec![Transaction::coinbase(&"a".to_string())]);
        local.add_block(vec![Transaction::coinbase(&"b".to_string())]);

        let candidate = Chain::new();
        assert!(!local.replace_chain(candidate.blocks().to_vec()));
        assert_eq!(local.blocks().len(), 3);
    }

    #[test]
    fn invalid_candidate_never_replaces_even_if_longer() {
        let mut local = Chain::new();

        let mut candidate = Chain::new();
        candidate.add_block(vec![Transaction::coinbase(&"miner".to_string())]);
        let mut tampered_blocks = candidate.blocks().to_vec();
        tampered_blocks[1].nonce += 1; // invalidates the hash without re-mining

        assert!(!local.replace_chain(tampered_blocks));
        assert_eq!(local.blocks().len(), 1);
    }
}
