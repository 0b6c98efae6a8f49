// src/transaction.rs - signed transfers (spec §4.4, component C4)
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{COINBASE, COINBASE_SIG, MINING_REWARD};
use crate::crypto;
use crate::crypto::now_ms;
use crate::error::{NodeError, Result};
use crate::types::Address;
use crate::wallet::Wallet;

/// Unordered mapping from recipient address to amount. A `BTreeMap` is used
/// (not `HashMap`) so its serialization is deterministically key-ordered,
/// which `crypto::sign`/`crypto::verify` depend on for canonical form.
pub type TransactionOutputMap = BTreeMap<Address, u64>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionInput {
    pub timestamp: u64,
    pub amount: u64,
    pub address: Address,
    pub signature: String,
    /// The sender's PEM-encoded public key, carried alongside the address
    /// so any recipient can verify the signature without a side channel
    /// (spec §9 open question 2, variant (b)). Empty for coinbase inputs.
    pub public_key_pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub input: TransactionInput,
    pub output_map: TransactionOutputMap,
}

impl Transaction {
    /// Creates a transfer from `sender_wallet.address` to `recipient`,
    /// with the remainder returned to the sender as a change output.
    ///
    /// Fails if `amount` is zero or exceeds the sender's balance, per
    /// spec §4.4 — a tagged `Result` rather than a panic or exception,
    /// so callers pattern-match on the failure (spec §9 redesign note 3).
    pub fn create(sender_wallet: &Wallet, recipient: &Address, amount: u64) -> Result<Self> {
        if amount == 0 {
            return Err(NodeError::InvalidAmount("amount must be positive".into()));
        }
        if amount > sender_wallet.balance {
            return Err(NodeError::InsufficientFunds(format!(
                "amount {amount} exceeds balance {}",
                sender_wallet.balance
            )));
        }

        let mut output_map = TransactionOutputMap::new();
        output_map.insert(recipient.clone(), amount);
        output_map.insert(
            sender_wallet.keypair.address.clone(),
            sender_wallet.balance - amount,
        );

        Self::new_signed(sender_wallet, sender_wallet.balance, output_map)
    }

    /// Merges a further transfer into an existing pending transaction from
    /// the same sender: decrements the sender's change output, credits
    /// `recipient` (creating the entry if absent), re-signs, and refreshes
    /// the id/timestamp so peers treat it as a new record (spec §4.4).
    pub fn update(
        &mut self,
        sender_wallet: &Wallet,
        recipient: &Address,
        amount: u64,
    ) -> Result<()> {
        let sender_balance = *self
            .output_map
            .get(&sender_wallet.keypair.address)
            .ok_or_else(|| NodeError::transaction("sender has no change output on this transaction"))?;

        if amount > sender_balance {
            return Err(NodeError::InsufficientFunds(format!(
                "amount {amount} exceeds remaining balance {sender_balance}"
            )));
        }

        *self
            .output_map
            .get_mut(&sender_wallet.keypair.address)
            .unwrap() -= amount;
        *self.output_map.entry(recipient.clone()).or_insert(0) += amount;

        let declared_amount = sender_wallet.balance;
        let signature = crypto::sign(&sender_wallet.keypair.private_key, &self.output_map)?;

        self.id = Uuid::new_v4().to_string();
        self.input = TransactionInput {
            timestamp: now_ms(),
            amount: declared_amount,
            address: sender_wallet.keypair.address.clone(),
            signature,
            public_key_pem: sender_wallet.keypair.public_key_pem.clone(),
        };
        Ok(())
    }

    fn new_signed(
        sender_wallet: &Wallet,
        declared_amount: u64,
        output_map: TransactionOutputMap,
    ) -> Result<Self> {
        let signature = crypto::sign(&sender_wallet.keypair.private_key, &output_map)?;
        Ok(Transaction {
            id: Uuid::new_v4().to_string(),
            input: TransactionInput {
                timestamp: now_ms(),
                amount: declared_amount,
                address: sender_wallet.keypair.address.clone(),
                signature,
                public_key_pem: sender_wallet.keypair.public_key_pem.clone(),
            },
            output_map,
        })
    }

    /// The synthetic reward transaction a miner attaches to every block it
    /// seals: sender is the `COINBASE` sentinel, no signature is computed.
    pub fn coinbase(miner_address: &Address) -> Self {
        let mut output_map = TransactionOutputMap::new();
        output_map.insert(miner_address.clone(), MINING_REWARD);
        Transaction {
            id: Uuid::new_v4().to_string(),
            input: TransactionInput {
                timestamp: now_ms(),
                amount: MINING_REWARD,
                address: COINBASE.to_string(),
                signature: COINBASE_SIG.to_string(),
                public_key_pem: String::new(),
            },
            output_map,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        crypto::is_coinbase_address(&self.input.address)
    }

    /// Looks up the amount this transaction sends to `address`, if any.
    pub fn amount_to(&self, address: &Address) -> Option<u64> {
        self.output_map.get(address).copied()
    }

    /// Validates a transaction in isolation (spec §4.4):
    /// - the output sum must equal the declared input amount.
    /// - coinbase transactions must have exactly one output, equal to
    ///   `MINING_REWARD`, and the sentinel signature; no cryptographic
    ///   check is performed on them.
    /// - non-coinbase transactions must carry a signature that verifies
    ///   against the sender's PEM public key (carried on the input itself,
    ///   spec §9 open question 2, variant (b)) over the canonical output
    ///   map. A malformed or missing PEM key fails validation rather than
    ///   panicking.
    pub fn validate(&self) -> bool {
        let sum: u64 = self.output_map.values().sum();
        if sum != self.input.amount {
            return false;
        }

        if self.is_coinbase() {
            return self.output_map.len() == 1
                && self.output_map.values().next() == Some(&MINING_REWARD)
                && crypto::is_coinbase_signature(&self.input.signature);
        }

        if self.output_map.is_empty() {
            return false;
        }

        match crypto::decode_public_key_pem(&self.input.public_key_pem) {
            Ok(public_key) => crypto::verify(&public_key, &self.output_map, &self.input.signature),
            Err(_) => false,
        }
    }
}
