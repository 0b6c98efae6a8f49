// src/wallet.rs - wallet identity and the balance oracle (spec §4.1, §4.6)
use secp256k1::PublicKey;

use crate::chain::Chain;
use crate::constants::STARTING_BALANCE;
use crate::crypto::KeyPair;
use crate::error::Result;
use crate::types::Address;

/// A wallet pairs a `KeyPair` with a locally cached balance. The private
/// key never leaves the owning process (spec §3) — `Wallet` is not
/// `Serialize`, so it cannot accidentally be shipped over the wire.
pub struct Wallet {
    pub keypair: KeyPair,
    pub balance: u64,
}

impl Wallet {
    pub fn new() -> Result<Self> {
        Ok(Wallet {
            keypair: KeyPair::generate()?,
            balance: STARTING_BALANCE,
        })
    }

    pub fn address(&self) -> &Address {
        &self.keypair.address
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        self.keypair.public_key()
    }

    /// Refreshes the cached balance from the authoritative chain.
    pub fn update_balance(&mut self, chain: &Chain) {
        self.balance = calculate_balance(&self.keypair.address, chain);
    }

    /// The balance oracle (spec §4.6): scans blocks tail-to-head, stopping
    /// as soon as a block in which `address` appears as a sender is fully
    /// processed. Every time an address authors a transaction, that
    /// transaction's output map already encodes its then-current balance
    /// (the sender's change output is the full balance minus what it
    /// spent), so once the most recent send is found, earlier history is
    /// redundant.
    pub fn calculate_balance(&self, chain: &Chain) -> u64 {
        calculate_balance(&self.keypair.address, chain)
    }
}

/// Free function form of the balance oracle, usable without an owning
/// `Wallet` (e.g. to look up a peer's balance) — part of the core↔API
/// contract named in spec §6.
pub fn calculate_balance(address: &Address, chain: &Chain) -> u64 {
    let mut outputs_total: u64 = 0;
    let mut has_spent = false;

    // Walk from the tail backwards, skipping genesis (index 0).
    for block in chain.blocks().iter().skip(1).rev() {
        for tx in &block.data {
            if &tx.input.address == address {
                has_spent = true;
            }
            if let Some(amount) = tx.amount_to(address) {
                outputs_total += amount;
            }
        }
        if has_spent {
            break;
        }
    }

    if has_spent {
        outputs_total
    } else {
        STARTING_BALANCE + outputs_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    #[test]
    fn unseen_address_gets_starting_balance() {
        let chain = Chain::new();
        assert_eq!(calculate_balance(&"nobody".to_string(), &chain), STARTING_BALANCE);
    }

    #[test]
    fn balance_reflects_received_outputs() {
        let mut chain = Chain::new();
        let sender = Wallet::new().unwrap();
        let recipient = "bob".to_string();

        let tx = Transaction::create(&sender, &recipient, 50).unwrap();
        chain.add_block(vec![tx]);

        assert_eq!(calculate_balance(&recipient, &chain), STARTING_BALANCE + 50);
    }

    #[test]
    fn balance_scan_stops_at_most_recent_send() {
        let mut chain = Chain::new();
        let sender = Wallet::new().unwrap();

        let tx1 = Transaction::create(&sender, &"bob".to_string(), 50).unwrap();
        chain.add_block(vec![tx1]);

        let mut sender_after_first = Wallet::new().unwrap();
        sender_after_first.keypair = sender.keypair.clone();
        sender_after_first.update_balance(&chain);
        assert_eq!(sender_after_first.balance, 950);

        let tx2 = Transaction::create(&sender_after_first, &"carol".to_string(), 100).unwrap();
        chain.add_block(vec![tx2]);

        assert_eq!(calculate_balance(&sender.keypair.address, &chain), 850);
    }

    #[test]
    fn idempotent_across_repeated_calls() {
        let chain = Chain::new();
        let addr = "someone".to_string();
        assert_eq!(
            calculate_balance(&addr, &chain),
            calculate_balance(&addr, &chain)
        );
    }
}
