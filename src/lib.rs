// src/lib.rs - embercoin node library
//!
//! A small permissionless proof-of-work cryptocurrency node: a replicated,
//! append-only ledger secured by proof-of-work and gossiped over a
//! WebSocket peer-to-peer overlay. Each node validates independently,
//! mines on its own view of the chain, and converges with peers on the
//! longest valid chain.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod miner;
pub mod node;
pub mod p2p;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use block::Block;
pub use chain::Chain;
pub use config::NodeConfig;
pub use crypto::KeyPair;
pub use error::{NodeError, Result};
pub use mempool::Mempool;
pub use miner::{MineOutcome, Miner};
pub use node::Node;
pub use p2p::{Broadcaster, P2PService};
pub use transaction::{Transaction, TransactionInput, TransactionOutputMap};
pub use types::{Address, Hash};
pub use wallet::Wallet;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initializes structured logging at the info level from `RUST_LOG` (or
/// the default), matching the teacher's `init_logging` convention.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}

pub fn init_logging_with_level(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
