// src/node.rs - dependency-injection root (spec §9's first redesign note)
//
// Owns the one copy of each shared component and wires them together.
// Nothing here is a global: `main` builds exactly one `Node` and hands
// references into the miner, the P2P service, and (were it in scope) the
// user-facing API.
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;

use crate::chain::Chain;
use crate::config::NodeConfig;
use crate::error::Result;
use crate::mempool::Mempool;
use crate::miner::{MineOutcome, Miner};
use crate::p2p::P2PService;
use crate::transaction::Transaction;
use crate::types::Address;
use crate::wallet::{self, Wallet};

pub struct Node {
    pub config: NodeConfig,
    pub chain: Arc<RwLock<Chain>>,
    pub mempool: Arc<RwLock<Mempool>>,
    pub wallet: Wallet,
    pub miner: Miner,
    pub p2p: Option<Arc<P2PService>>,
}

impl Node {
    /// Builds the shared state and, if `config.enable_network`, the P2P
    /// service — still unstarted; call `Node::run` to bind the listener
    /// and begin dialing peers.
    pub fn new(config: NodeConfig) -> Result<Self> {
        warn_on_consensus_param_drift(&config);

        let chain = Arc::new(RwLock::new(Chain::new()));
        let mempool = Arc::new(RwLock::new(Mempool::new()));
        let wallet = Wallet::new()?;
        let miner = Miner::new(chain.clone(), mempool.clone());

        let p2p = if config.enable_network {
            Some(P2PService::start(
                chain.clone(),
                mempool.clone(),
                miner.cancellation_handle(),
            ))
        } else {
            None
        };

        Ok(Node {
            config,
            chain,
            mempool,
            wallet,
            miner,
            p2p,
        })
    }

    /// Binds the listener and dials configured peers. Runs until the
    /// process is shut down; only meaningful when networking is enabled.
    pub async fn run(&self) -> std::io::Result<()> {
        match &self.p2p {
            Some(p2p) => p2p.clone().run(self.config.socket_port, self.config.peer_nodes.clone()).await,
            None => std::future::pending().await,
        }
    }

    /// Core↔API contract methods named in spec §6, exposed for a future
    /// HTTP layer (out of this crate's scope) to call into.
    pub fn submit_transaction(&self, recipient: &Address, amount: u64) -> Result<Transaction> {
        let existing = self.mempool.read().existing_for_sender(self.wallet.address());
        let tx = match existing {
            Some(mut tx) => {
                tx.update(&self.wallet, recipient, amount)?;
                tx
            }
            None => crate::transaction::Transaction::create(&self.wallet, recipient, amount)?,
        };

        self.mempool.write().set(tx.clone());
        if let Some(p2p) = &self.p2p {
            crate::p2p::Broadcaster::broadcast_transaction(p2p.as_ref(), &tx);
        }
        Ok(tx)
    }

    pub fn mine(&mut self) -> MineOutcome {
        let broadcaster: Option<&dyn crate::p2p::Broadcaster> =
            self.p2p.as_ref().map(|p| p.as_ref() as &dyn crate::p2p::Broadcaster);
        let outcome = self.miner.mine_transactions(&self.wallet, broadcaster);
        self.wallet.update_balance(&self.chain.read());
        outcome
    }

    pub fn balance_of(&self, address: &Address) -> u64 {
        wallet::calculate_balance(address, &self.chain.read())
    }
}

/// `mining_reward`/`mine_rate_ms`/`mining_difficulty`/`starting_balance` are
/// consensus parameters: every node hashes and validates blocks against the
/// compiled-in constants in `constants`, not against its own local config
/// (two nodes that disagreed on, say, `MINING_REWARD` would each reject the
/// other's coinbase transactions and could never converge on one chain).
/// `NodeConfig` still parses and validates these fields — per spec §6 they
/// are documented environment variables — so an operator who sets one to a
/// non-default value is warned that it has no effect on the running node's
/// consensus behavior, rather than the override being silently ignored.
fn warn_on_consensus_param_drift(config: &NodeConfig) {
    if config.mining_reward != crate::constants::MINING_REWARD {
        warn!(
            "EMBERCOIN_MINING_REWARD={} differs from the compiled-in consensus constant {}; \
             the configured value is not applied to mining or validation",
            config.mining_reward,
            crate::constants::MINING_REWARD
        );
    }
    if config.mine_rate_ms != crate::constants::MINE_RATE_MS {
        warn!(
            "EMBERCOIN_MINE_RATE_MS={} differs from the compiled-in consensus constant {}; \
             the configured value is not applied to difficulty adjustment",
            config.mine_rate_ms,
            crate::constants::MINE_RATE_MS
        );
    }
    if config.mining_difficulty != crate::constants::INITIAL_DIFFICULTY {
        warn!(
            "EMBERCOIN_MINING_DIFFICULTY={} differs from the compiled-in genesis difficulty {}; \
             the configured value is not applied, since genesis must be identical on every node",
            config.mining_difficulty,
            crate::constants::INITIAL_DIFFICULTY
        );
    }
    if config.starting_balance != crate::constants::STARTING_BALANCE {
        warn!(
            "EMBERCOIN_STARTING_BALANCE={} differs from the compiled-in consensus constant {}; \
             the configured value is not applied to the balance oracle",
            config.starting_balance,
            crate::constants::STARTING_BALANCE
        );
    }
}
