// src/constants.rs - protocol constants for the embercoin node
//
// Defaults mirror spec §6's configuration table. Values here are the
// fallback when the corresponding environment variable is unset; see
// `config::NodeConfig` for the env-var layer.

/// Coinbase payout per mined block, in the smallest unit.
pub const MINING_REWARD: u64 = 50;

/// Target inter-block interval (ms) used by the per-block difficulty adjuster.
pub const MINE_RATE_MS: u64 = 1000;

/// Genesis (and floor) difficulty.
pub const INITIAL_DIFFICULTY: u32 = 4;

/// Implicit opening credit for any address never observed as a sender.
pub const STARTING_BALANCE: u64 = 1000;

/// Default P2P listener port.
pub const DEFAULT_SOCKET_PORT: u16 = 5001;

/// Sentinel sender address for coinbase transactions.
pub const COINBASE: &str = "*authorized-reward*";

/// Sentinel signature value for coinbase transactions.
pub const COINBASE_SIG: &str = "*reward-signature*";

/// Literal genesis block fields (identical on every node).
pub mod genesis {
    pub const TIMESTAMP: u64 = 1;
    pub const LAST_HASH: &str = "-----";
    pub const HASH: &str = "genesis-hash";
}

/// P2P connection-state machine tuning (spec §4.7).
pub mod p2p {
    use std::time::Duration;

    /// Base of the exponential reconnect backoff: `BASE_DELAY_MS * 2^attempts`.
    pub const BASE_DELAY_MS: u64 = 5000;

    /// Number of failed dial attempts before a peer is marked `GaveUp`.
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Dial timeout before a `Dialing` attempt is treated as failed.
    pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
}
