// src/mempool.rs - the pending-transaction pool (spec §4.4, component C4)
use std::collections::HashMap;

use crate::chain::Chain;
use crate::transaction::Transaction;
use crate::types::Address;

/// Mapping from transaction id to transaction. "At most one transaction
/// per sender" is a caller-maintained invariant (spec §4.4's note on
/// `existingForSender`) rather than one `Mempool` enforces internally —
/// `set` will happily upsert a second id for the same sender if a caller
/// doesn't check first.
#[derive(Debug, Clone, Default)]
pub struct Mempool {
    transactions: HashMap<String, Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool {
            transactions: HashMap::new(),
        }
    }

    pub fn set(&mut self, tx: Transaction) {
        self.transactions.insert(tx.id.clone(), tx);
    }

    /// The single pending transaction authored by `address`, if any. Used
    /// by wallet-facing callers to decide between `Transaction::create`
    /// and `Transaction::update`.
    pub fn existing_for_sender(&self, address: &Address) -> Option<Transaction> {
        self.transactions
            .values()
            .find(|tx| &tx.input.address == address)
            .cloned()
    }

    /// All transactions currently held, valid or not.
    pub fn all_transactions(&self) -> Vec<Transaction> {
        self.transactions.values().cloned().collect()
    }

    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.transactions
            .values()
            .filter(|tx| tx.validate())
            .cloned()
            .collect()
    }

    /// Drops every mempool entry whose id appears in any non-genesis block
    /// of `chain`, i.e. transactions that have since been confirmed.
    pub fn clear_confirmed(&mut self, chain: &Chain) {
        for block in chain.blocks().iter().skip(1) {
            for tx in &block.data {
                self.transactions.remove(&tx.id);
            }
        }
    }

    /// Wholesale replacement, used when syncing a peer's full pool
    /// (`TRANSACTION_POOL_SYNC`).
    pub fn replace(&mut self, transactions: HashMap<String, Transaction>) {
        self.transactions = transactions;
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn set_upserts_by_id() {
        let mut mempool = Mempool::new();
        let tx = Transaction::coinbase(&"miner".to_string());
        let id = tx.id.clone();
        mempool.set(tx.clone());
        assert_eq!(mempool.len(), 1);

        mempool.set(tx);
        assert_eq!(mempool.len(), 1);
        assert!(mempool.all_transactions().iter().any(|t| t.id == id));
    }

    #[test]
    fn existing_for_sender_finds_the_one_pending_tx() {
        let mut mempool = Mempool::new();
        let sender = Wallet::new().unwrap();
        let tx = Transaction::create(&sender, &"bob".to_string(), 10).unwrap();
        mempool.set(tx.clone());

        let found = mempool.existing_for_sender(&sender.keypair.address).unwrap();
        assert_eq!(found.id, tx.id);
        assert!(mempool.existing_for_sender(&"nobody".to_string()).is_none());
    }

    #[test]
    fn valid_transactions_excludes_tampered_entries() {
        let mut mempool = Mempool::new();
        let sender = Wallet::new().unwrap();
        let mut tx = Transaction::create(&sender, &"bob".to_string(), 10).unwrap();
        tx.output_map.insert(sender.keypair.address.clone(), 999_999);
        mempool.set(tx);

        assert!(mempool.valid_transactions().is_empty());
        assert_eq!(mempool.all_transactions().len(), 1);
    }

    #[test]
    fn clear_confirmed_removes_mined_transactions_only() {
        let mut mempool = Mempool::new();
        let sender = Wallet::new().unwrap();
        let mined_tx = Transaction::create(&sender, &"bob".to_string(), 10).unwrap();
        let pending_tx = Transaction::coinbase(&"someone-else".to_string());

        mempool.set(mined_tx.clone());
        mempool.set(pending_tx.clone());

        let mut chain = Chain::new();
        chain.add_block(vec![mined_tx]);
        mempool.clear_confirmed(&chain);

        assert_eq!(mempool.len(), 1);
        assert!(mempool.all_transactions().iter().any(|t| t.id == pending_tx.id));
    }

    #[test]
    fn replace_swaps_the_whole_pool() {
        let mut mempool = Mempool::new();
        mempool.set(Transaction::coinbase(&"a".to_string()));

        let mut incoming = HashMap::new();
        let tx = Transaction::coinbase(&"b".to_string());
        incoming.insert(tx.id.clone(), tx);
        mempool.replace(incoming);

        assert_eq!(mempool.len(), 1);
        assert!(mempool.all_transactions().iter().any(|t| t.input.address == "b"));
    }
}
