// src/config.rs - node configuration, layered over environment variables (spec §6)
use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Runtime configuration, one field per spec §6's table. Defaults match
/// the table; any `EMBERCOIN_*` environment variable overrides its field,
/// the way `pali-coin::config::PaliConfig` layers the `config` crate over
/// `std::env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub socket_port: u16,
    pub peer_nodes: Vec<String>,
    pub mining_reward: u64,
    pub mine_rate_ms: u64,
    pub mining_difficulty: u32,
    pub starting_balance: u64,
    pub enable_network: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            socket_port: crate::constants::DEFAULT_SOCKET_PORT,
            peer_nodes: Vec::new(),
            mining_reward: crate::constants::MINING_REWARD,
            mine_rate_ms: crate::constants::MINE_RATE_MS,
            mining_difficulty: crate::constants::INITIAL_DIFFICULTY,
            starting_balance: crate::constants::STARTING_BALANCE,
            enable_network: true,
        }
    }
}

impl NodeConfig {
    /// Loads configuration from `EMBERCOIN_*` environment variables,
    /// falling back to `NodeConfig::default()` for anything unset.
    /// `PEER_NODES` is comma-separated; empty or unset yields no peers.
    pub fn from_env() -> Result<Self> {
        let defaults = NodeConfig::default();

        let builder = Config::builder()
            .set_default("socket_port", defaults.socket_port as i64)
            .map_err(|e| NodeError::Config(e.to_string()))?
            .set_default("mining_reward", defaults.mining_reward as i64)
            .map_err(|e| NodeError::Config(e.to_string()))?
            .set_default("mine_rate_ms", defaults.mine_rate_ms as i64)
            .map_err(|e| NodeError::Config(e.to_string()))?
            .set_default("mining_difficulty", defaults.mining_difficulty as i64)
            .map_err(|e| NodeError::Config(e.to_string()))?
            .set_default("starting_balance", defaults.starting_balance as i64)
            .map_err(|e| NodeError::Config(e.to_string()))?
            .set_default("enable_network", defaults.enable_network)
            .map_err(|e| NodeError::Config(e.to_string()))?
            .add_source(
                Environment::with_prefix("EMBERCOIN")
                    .try_parsing(true)
                    .separator("__"),
            );

        let settings = builder
            .build()
            .map_err(|e| NodeError::Config(format!("failed to build configuration: {e}")))?;

        let socket_port: u16 = settings
            .get_int("socket_port")
            .map_err(|e| NodeError::Config(e.to_string()))? as u16;
        let mining_reward: u64 = settings
            .get_int("mining_reward")
            .map_err(|e| NodeError::Config(e.to_string()))? as u64;
        let mine_rate_ms: u64 = settings
            .get_int("mine_rate_ms")
            .map_err(|e| NodeError::Config(e.to_string()))? as u64;
        let mining_difficulty: u32 = settings
            .get_int("mining_difficulty")
            .map_err(|e| NodeError::Config(e.to_string()))? as u32;
        let starting_balance: u64 = settings
            .get_int("starting_balance")
            .map_err(|e| NodeError::Config(e.to_string()))? as u64;
        let enable_network: bool = settings
            .get_bool("enable_network")
            .unwrap_or(defaults.enable_network);

        let peer_nodes = std::env::var("EMBERCOIN_PEER_NODES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let config = NodeConfig {
            socket_port,
            peer_nodes,
            mining_reward,
            mine_rate_ms,
            mining_difficulty,
            starting_balance,
            enable_network,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.socket_port == 0 {
            return Err(NodeError::Config("socket_port must be nonzero".into()));
        }
        if self.mining_difficulty == 0 {
            return Err(NodeError::Config("mining_difficulty must be at least 1".into()));
        }
        for peer in &self.peer_nodes {
            let parsed = url::Url::parse(peer)
                .map_err(|e| NodeError::Config(format!("peer url '{peer}' is malformed: {e}")))?;
            if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
                return Err(NodeError::Config(format!(
                    "peer url '{peer}' must use the ws:// or wss:// scheme"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let config = NodeConfig::default();
        assert_eq!(config.socket_port, 5001);
        assert_eq!(config.mining_reward, 50);
        assert_eq!(config.mine_rate_ms, 1000);
        assert_eq!(config.mining_difficulty, 4);
        assert_eq!(config.starting_balance, 1000);
        assert!(config.enable_network);
        assert!(config.peer_nodes.is_empty());
    }

    #[test]
    fn validate_rejects_non_websocket_peer_urls() {
        let mut config = NodeConfig::default();
        config.peer_nodes.push("http://example.com".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut config = NodeConfig::default();
        config.socket_port = 0;
        assert!(config.validate().is_err());
    }
}
