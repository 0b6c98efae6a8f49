// src/error.rs - error handling for the embercoin node
use thiserror::Error;

/// Result type alias for embercoin operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors produced by the consensus engine and its P2P replication layer.
///
/// Per spec §7, consensus errors (invalid signature, invalid chain, stale
/// tx) are never fatal: callers log them and drop the offending message or
/// request. Only `Config`/`Io` errors at startup (e.g. failing to bind the
/// listener) are meant to abort the process, and that decision is made at
/// the `main()` boundary, not inside this library.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("blockchain error: {0}")]
    Blockchain(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("mining error: {0}")]
    Mining(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("block validation failed: {0}")]
    BlockValidation(String),

    #[error("transaction validation failed: {0}")]
    TransactionValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl NodeError {
    pub fn blockchain<S: Into<String>>(msg: S) -> Self {
        NodeError::Blockchain(msg.into())
    }

    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        NodeError::Transaction(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        NodeError::Network(msg.into())
    }

    pub fn mining<S: Into<String>>(msg: S) -> Self {
        NodeError::Mining(msg.into())
    }

    /// Whether this error should be dropped-and-logged rather than
    /// surfaced to the caller as a hard failure (spec §7's general
    /// principle: consensus errors are never fatal).
    pub fn is_consensus_error(&self) -> bool {
        matches!(
            self,
            NodeError::Blockchain(_)
                | NodeError::Transaction(_)
                | NodeError::BlockValidation(_)
                | NodeError::TransactionValidation(_)
        )
    }
}
