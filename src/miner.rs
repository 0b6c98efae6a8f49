// src/miner.rs - assembles, seals, and publishes blocks (spec §4.5, component C5)
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;

use crate::block::Block;
use crate::chain::Chain;
use crate::mempool::Mempool;
use crate::p2p::Broadcaster;
use crate::transaction::Transaction;
use crate::wallet::Wallet;

/// The outcome of a mining attempt. Modeled as a plain struct rather than
/// `Result<Block, NodeError>` because a failed attempt (empty mempool, or
/// a race lost to a concurrent `replaceChain`) is routine, not exceptional
/// — spec §4.5 returns `{ ok, block?, message }` rather than throwing, and
/// §9's third redesign note asks for a tagged result throughout.
#[derive(Debug)]
pub struct MineOutcome {
    pub ok: bool,
    pub block: Option<Block>,
    pub message: String,
}

impl MineOutcome {
    fn failure<S: Into<String>>(message: S) -> Self {
        MineOutcome {
            ok: false,
            block: None,
            message: message.into(),
        }
    }

    fn success(block: Block) -> Self {
        MineOutcome {
            ok: true,
            message: format!("mined block at difficulty {}", block.difficulty),
            block: Some(block),
        }
    }
}

pub struct Miner {
    chain: Arc<RwLock<Chain>>,
    mempool: Arc<RwLock<Mempool>>,
    cancel: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(chain: Arc<RwLock<Chain>>, mempool: Arc<RwLock<Mempool>>) -> Self {
        Miner {
            chain,
            mempool,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clone of the cancellation flag, for the P2P layer to flip when a
    /// longer chain arrives mid-mine (spec §5, §9's last redesign note).
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Runs the mining algorithm of spec §4.5. `broadcaster` is a
    /// parameter, not a field captured at construction — this is what
    /// breaks the Miner→Chain→Miner reference cycle the source exhibits
    /// (spec §9's redesign notes 2 and 5): the `Chain` and `Mempool` this
    /// `Miner` holds never need to know a `Miner` exists.
    ///
    /// Holds no lock across the PoW search (spec §5 point 4): it reads the
    /// chain tail, releases the lock, mines, then re-takes an exclusive
    /// lock to append and re-verifies the tail hasn't moved underneath it.
    pub fn mine_transactions(
        &self,
        miner_wallet: &Wallet,
        broadcaster: Option<&dyn Broadcaster>,
    ) -> MineOutcome {
        self.cancel.store(false, std::sync::atomic::Ordering::Relaxed);

        let valid: Vec<Transaction> = self.mempool.read().valid_transactions();
        if valid.is_empty() {
            return MineOutcome::failure("No valid transactions to mine");
        }

        let mut data = valid;
        data.push(Transaction::coinbase(miner_wallet.address()));

        let last_block = self.chain.read().latest_block().clone();
        let sealed = match Block::mine(&last_block, data, &self.cancel) {
            Some(block) => block,
            None => return MineOutcome::failure("mining cancelled by a concurrent chain replacement"),
        };

        {
            let mut chain = self.chain.write();
            if chain.latest_block().hash != last_block.hash {
                warn!("discarding sealed block: chain tip moved during mining");
                return MineOutcome::failure(
                    "chain advanced while mining; discarding sealed block",
                );
            }
            chain.append(sealed.clone());
        }

        info!(
            "mined block with {} transaction(s) at difficulty {}; next block would start at difficulty {}",
            sealed.data.len(),
            sealed.difficulty,
            self.chain.read().next_difficulty(crate::crypto::now_ms()),
        );

        if let Some(broadcaster) = broadcaster {
            broadcaster.broadcast_new_block(&self.chain.read());
        }

        self.mempool.write().clear_confirmed(&self.chain.read());

        MineOutcome::success(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mining_with_empty_mempool_fails_with_message() {
        let chain = Arc::new(RwLock::new(Chain::new()));
        let mempool = Arc::new(RwLock::new(Mempool::new()));
        let miner_wallet = Wallet::new().unwrap();
        let miner = Miner::new(chain, mempool);

        let outcome = miner.mine_transactions(&miner_wallet, None);
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "No valid transactions to mine");
        assert!(outcome.block.is_none());
    }

    #[test]
    fn mining_appends_valid_txs_plus_coinbase_and_clears_mempool() {
        let chain = Arc::new(RwLock::new(Chain::new()));
        let mempool = Arc::new(RwLock::new(Mempool::new()));

        let sender = Wallet::new().unwrap();
        let tx = Transaction::create(&sender, &"recipient".to_string(), 50).unwrap();
        mempool.write().set(tx.clone());

        let miner_wallet = Wallet::new().unwrap();
        let miner = Miner::new(chain.clone(), mempool.clone());

        let outcome = miner.mine_transactions(&miner_wallet, None);
        assert!(outcome.ok);
        let block = outcome.block.unwrap();
        assert_eq!(block.data.len(), 2);
        assert!(block.data.iter().any(|t| t.id == tx.id));
        assert!(block.data.iter().any(|t| t.is_coinbase()));

        assert_eq!(chain.read().blocks().len(), 2);
        assert!(mempool.read().is_empty());
    }
}
