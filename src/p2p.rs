// src/p2p.rs - WebSocket gossip service: sync, dial/backoff, broadcast (spec §4.7, component C6)
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parking_lot::RwLock as PLRwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::block::Block;
use crate::chain::Chain;
use crate::constants::p2p::{BASE_DELAY_MS, DIAL_TIMEOUT, MAX_ATTEMPTS};
use crate::crypto::now_ms;
use crate::mempool::Mempool;
use crate::transaction::Transaction;

/// Narrow capability the Miner depends on instead of a whole `P2PService`
/// (spec §9 redesign note 2): broadcasting a new chain or transaction,
/// nothing else. `P2PService` implements this directly; tests can supply a
/// stub.
pub trait Broadcaster: Send + Sync {
    /// A chain replacement reached via sync, not freshly mined — wire type
    /// `BLOCKCHAIN_SYNC`.
    fn broadcast_blockchain(&self, chain: &Chain);
    /// A chain just extended by this node's own miner — wire type
    /// `NEW_BLOCK` (spec §4.7: "Sent by the Miner after sealing"),
    /// logged by recipients as a freshly mined block rather than a sync.
    fn broadcast_new_block(&self, chain: &Chain);
    fn broadcast_transaction(&self, tx: &Transaction);
}

/// Wire envelope. Every message carries `node_id`/`timestamp`; recipients
/// drop anything whose `node_id` matches their own (self-echo).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "SYNC_REQUEST")]
    SyncRequest { node_id: String, timestamp: u64 },
    #[serde(rename = "BLOCKCHAIN_SYNC")]
    BlockchainSync {
        node_id: String,
        timestamp: u64,
        chain: Vec<Block>,
    },
    #[serde(rename = "NEW_BLOCK")]
    NewBlock {
        node_id: String,
        timestamp: u64,
        chain: Vec<Block>,
    },
    #[serde(rename = "NEW_TRANSACTION")]
    NewTransaction {
        node_id: String,
        timestamp: u64,
        transaction: Transaction,
    },
    #[serde(rename = "TRANSACTION_POOL_SYNC")]
    TransactionPoolSync {
        node_id: String,
        timestamp: u64,
        pool: HashMap<String, Transaction>,
    },
    #[serde(rename = "PING")]
    Ping { node_id: String, timestamp: u64 },
    #[serde(rename = "PONG")]
    Pong { node_id: String, timestamp: u64 },
}

impl Message {
    fn node_id(&self) -> &str {
        match self {
            Message::SyncRequest { node_id, .. }
            | Message::BlockchainSync { node_id, .. }
            | Message::NewBlock { node_id, .. }
            | Message::NewTransaction { node_id, .. }
            | Message::TransactionPoolSync { node_id, .. }
            | Message::Ping { node_id, .. }
            | Message::Pong { node_id, .. } => node_id,
        }
    }
}

/// Exponential reconnect backoff (`BASE_DELAY_MS * 2^attempts`, spec
/// §4.7), with +/-25% jitter so that many peers that lost a connection
/// to the same node at once don't all redial in lockstep.
fn jittered_backoff_ms(attempts: u32) -> u64 {
    let base = BASE_DELAY_MS.saturating_mul(1u64 << attempts.min(16));
    let jitter = rand::thread_rng().gen_range(0.75..=1.25);
    (base as f64 * jitter) as u64
}

/// Per-outbound-peer dial state (spec §4.7's table). `GaveUp` is terminal:
/// this node stops retrying and waits for the peer to dial back in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    Idle,
    Dialing,
    Connected,
    Backoff { attempts: u32 },
    GaveUp,
}

impl std::fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerConnectionState::Idle => write!(f, "idle"),
            PeerConnectionState::Dialing => write!(f, "dialing"),
            PeerConnectionState::Connected => write!(f, "connected"),
            PeerConnectionState::Backoff { attempts } => write!(f, "backoff(attempt {attempts})"),
            PeerConnectionState::GaveUp => write!(f, "gave-up"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeerStat {
    pub peer: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct NetworkStats {
    pub node_id: String,
    pub active_sockets: usize,
    pub peers: Vec<PeerStat>,
}

/// A queued broadcast, drained by a background task so `Broadcaster`'s
/// methods stay synchronous and callable from the (non-async) Miner.
enum Outbound {
    Blockchain(Vec<Block>),
    NewBlock(Vec<Block>),
    Transaction(Transaction),
}

pub struct P2PService {
    node_id: String,
    chain: Arc<PLRwLock<Chain>>,
    mempool: Arc<PLRwLock<Mempool>>,
    mining_cancel: Arc<AtomicBool>,
    /// No socket write is ever performed while holding this lock (sends go
    /// through a per-socket mpsc channel drained by that socket's own
    /// writer task), so a plain sync `RwLock` suffices — spec §5.3's
    /// "never by the peers lock" discipline, applied to the map itself.
    sockets: Arc<PLRwLock<HashMap<String, mpsc::UnboundedSender<Message>>>>,
    peer_states: Arc<PLRwLock<HashMap<String, PeerConnectionState>>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl P2PService {
    /// Builds the service and spawns its background broadcast-drain task.
    /// Must be called from within a tokio runtime. `mining_cancel` is the
    /// flag the Miner's PoW loop polls; this service flips it whenever a
    /// longer chain is accepted mid-mine (spec §5, §9's last redesign
    /// note).
    pub fn start(
        chain: Arc<PLRwLock<Chain>>,
        mempool: Arc<PLRwLock<Mempool>>,
        mining_cancel: Arc<AtomicBool>,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let service = Arc::new(P2PService {
            node_id: Uuid::new_v4().to_string(),
            chain,
            mempool,
            mining_cancel,
            sockets: Arc::new(PLRwLock::new(HashMap::new())),
            peer_states: Arc::new(PLRwLock::new(HashMap::new())),
            outbound_tx,
        });
        tokio::spawn(service.clone().drain_broadcasts(outbound_rx));
        service
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn network_stats(&self) -> NetworkStats {
        let peers = self
            .peer_states
            .read()
            .iter()
            .map(|(peer, state)| PeerStat {
                peer: peer.clone(),
                state: state.to_string(),
            })
            .collect();
        NetworkStats {
            node_id: self.node_id.clone(),
            active_sockets: self.sockets.read().len(),
            peers,
        }
    }

    /// Binds the listener and launches a dial task per configured peer.
    /// Runs until the process shuts down; callers spawn this on its own task.
    pub async fn run(
        self: Arc<Self>,
        listen_port: u16,
        peer_urls: Vec<String>,
    ) -> std::io::Result<()> {
        for url in peer_urls {
            let service = self.clone();
            tokio::spawn(service.dial_loop(url));
        }

        let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
        info!("p2p listening on port {listen_port} (node {})", self.node_id);

        loop {
            let (stream, addr) = listener.accept().await?;
            let service = self.clone();
            tokio::spawn(async move {
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => {
                        let peer_key = format!("inbound-{addr}");
                        service.handle_connection(ws, peer_key, false).await;
                    }
                    Err(e) => warn!("inbound websocket handshake failed from {addr}: {e}"),
                }
            });
        }
    }

    /// Dials `url` and maintains it under the state machine of spec §4.7:
    /// `Idle -> Dialing -> Connected`, falling back to `Backoff` on
    /// failure with exponentially increasing delay, giving up entirely
    /// after `MAX_ATTEMPTS`.
    async fn dial_loop(self: Arc<Self>, url: String) {
        self.set_peer_state(&url, PeerConnectionState::Idle);
        let mut attempts: u32 = 0;

        loop {
            self.set_peer_state(&url, PeerConnectionState::Dialing);
            let dial = timeout(DIAL_TIMEOUT, tokio_tungstenite::connect_async(&url)).await;

            match dial {
                Ok(Ok((ws, _response))) => {
                    self.set_peer_state(&url, PeerConnectionState::Connected);
                    attempts = 0;
                    self.clone().handle_connection(ws, url.clone(), true).await;
                    // handle_connection returns once the socket closes.
                }
                Ok(Err(e)) => {
                    warn!("dial to {url} failed: {e}");
                }
                Err(_) => {
                    warn!("dial to {url} timed out after {DIAL_TIMEOUT:?}");
                }
            }

            attempts += 1;
            if attempts >= MAX_ATTEMPTS {
                warn!("giving up on {url} after {attempts} attempts");
                self.set_peer_state(&url, PeerConnectionState::GaveUp);
                return;
            }
            self.set_peer_state(&url, PeerConnectionState::Backoff { attempts });
            let delay_ms = jittered_backoff_ms(attempts);
            sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    fn set_peer_state(&self, peer: &str, state: PeerConnectionState) {
        self.peer_states.write().insert(peer.to_string(), state);
    }

    /// Runs the on-connect sync flow and the read loop for one socket
    /// (spec §4.7): the same handler serves dialed-out and accepted-in
    /// connections alike. Returns once the socket closes or errors.
    async fn handle_connection<S>(
        self: Arc<Self>,
        stream: WebSocketStream<S>,
        peer_key: String,
        is_dialer: bool,
    ) where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let (mut write, mut read) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        self.sockets.write().insert(peer_key.clone(), tx.clone());

        let writer_peer_key = peer_key.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("failed to serialize outgoing message to {writer_peer_key}: {e}");
                        continue;
                    }
                };
                if let Err(e) = write.send(WsMessage::Text(text)).await {
                    warn!("write to {writer_peer_key} failed: {e}");
                    break;
                }
            }
        });

        self.push_initial_sync(&tx);
        if is_dialer {
            let _ = tx.send(Message::SyncRequest {
                node_id: self.node_id.clone(),
                timestamp: now_ms(),
            });
        }

        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.on_frame(&text, &tx),
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("read from {peer_key} failed: {e}");
                    break;
                }
            }
        }

        self.sockets.write().remove(&peer_key);
        writer.abort();
        debug!("socket {peer_key} closed");
    }

    fn push_initial_sync(&self, tx: &mpsc::UnboundedSender<Message>) {
        let chain = self.chain.read().blocks().to_vec();
        let pool = self
            .mempool
            .read()
            .all_transactions()
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        let _ = tx.send(Message::BlockchainSync {
            node_id: self.node_id.clone(),
            timestamp: now_ms(),
            chain,
        });
        let _ = tx.send(Message::TransactionPoolSync {
            node_id: self.node_id.clone(),
            timestamp: now_ms(),
            pool,
        });
    }

    fn on_frame(&self, text: &str, reply: &mpsc::UnboundedSender<Message>) {
        let message: Message = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping malformed message: {e}");
                return;
            }
        };

        if message.node_id() == self.node_id {
            return; // self-echo
        }

        match message {
            Message::SyncRequest { .. } => self.push_initial_sync(reply),
            Message::BlockchainSync { chain, .. } => self.accept_chain(chain, false),
            Message::NewBlock { chain, .. } => self.accept_chain(chain, true),
            Message::NewTransaction { transaction, .. } => self.accept_transaction(transaction),
            Message::TransactionPoolSync { pool, .. } => {
                for (_, tx) in pool {
                    self.accept_transaction(tx);
                }
            }
            Message::Ping { .. } => {
                let _ = reply.send(Message::Pong {
                    node_id: self.node_id.clone(),
                    timestamp: now_ms(),
                });
            }
            Message::Pong { .. } => debug!("pong received"),
        }
    }

    fn accept_chain(&self, candidate: Vec<Block>, freshly_mined: bool) {
        let replaced = self.chain.write().replace_chain(candidate);
        if replaced {
            if freshly_mined {
                info!("adopted a freshly mined chain from a peer");
            } else {
                info!("adopted a longer chain via sync");
            }
            // Preempt any in-flight local mining: the chain just moved.
            self.mining_cancel.store(true, Ordering::Relaxed);
            self.mempool.write().clear_confirmed(&self.chain.read());
        } else {
            info!("ignored candidate chain: not longer or not valid");
        }
    }

    fn accept_transaction(&self, tx: Transaction) {
        if !tx.validate() {
            warn!("dropping invalid transaction {}", tx.id);
            return;
        }
        let mut mempool = self.mempool.write();
        if mempool.all_transactions().iter().any(|existing| existing.id == tx.id) {
            return;
        }
        mempool.set(tx);
    }

    async fn drain_broadcasts(self: Arc<Self>, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
        while let Some(item) = outbound_rx.recv().await {
            let message = match item {
                Outbound::Blockchain(chain) => Message::BlockchainSync {
                    node_id: self.node_id.clone(),
                    timestamp: now_ms(),
                    chain,
                },
                Outbound::NewBlock(chain) => Message::NewBlock {
                    node_id: self.node_id.clone(),
                    timestamp: now_ms(),
                    chain,
                },
                Outbound::Transaction(transaction) => Message::NewTransaction {
                    node_id: self.node_id.clone(),
                    timestamp: now_ms(),
                    transaction,
                },
            };
            let sockets = self.sockets.read();
            for (peer, tx) in sockets.iter() {
                if tx.send(message.clone()).is_err() {
                    debug!("dropping broadcast to {peer}: socket gone");
                }
            }
        }
    }
}

impl Broadcaster for P2PService {
    fn broadcast_blockchain(&self, chain: &Chain) {
        let _ = self.outbound_tx.send(Outbound::Blockchain(chain.blocks().to_vec()));
    }

    fn broadcast_new_block(&self, chain: &Chain) {
        let _ = self.outbound_tx.send(Outbound::NewBlock(chain.blocks().to_vec()));
    }

    fn broadcast_transaction(&self, tx: &Transaction) {
        let _ = self.outbound_tx.send(Outbound::Transaction(tx.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_backoff_stays_within_a_quarter_of_the_base_delay() {
        for attempts in 0..5 {
            let base = BASE_DELAY_MS * (1u64 << attempts);
            let delay = jittered_backoff_ms(attempts);
            assert!(delay >= base * 3 / 4 && delay <= base * 5 / 4);
        }
    }

    #[test]
    fn message_envelope_round_trips_through_json() {
        let msg = Message::Ping {
            node_id: "abc".to_string(),
            timestamp: 123,
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"type\":\"PING\""));
        let parsed: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.node_id(), "abc");
    }

    #[test]
    fn unknown_message_type_is_dropped_not_panicking() {
        let result: Result<Message, _> = serde_json::from_str(r#"{"type":"GET_ADDR","node_id":"x","timestamp":1}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn accept_chain_cancels_in_flight_mining_on_replacement() {
        let chain = Arc::new(PLRwLock::new(Chain::new()));
        let mempool = Arc::new(PLRwLock::new(Mempool::new()));
        let cancel = Arc::new(AtomicBool::new(false));
        let service = P2PService::start(chain.clone(), mempool, cancel.clone());

        let mut candidate = Chain::new();
        candidate.add_block(vec![Transaction::coinbase(&"miner".to_string())]);

        service.accept_chain(candidate.blocks().to_vec(), true);
        assert!(cancel.load(Ordering::Relaxed));
        assert_eq!(chain.read().blocks().len(), 2);
    }

    #[tokio::test]
    async fn accept_transaction_rejects_invalid_and_dedupes_by_id() {
        let chain = Arc::new(PLRwLock::new(Chain::new()));
        let mempool = Arc::new(PLRwLock::new(Mempool::new()));
        let cancel = Arc::new(AtomicBool::new(false));
        let service = P2PService::start(chain, mempool.clone(), cancel);

        let mut bad_tx = Transaction::coinbase(&"miner".to_string());
        bad_tx.output_map.insert("extra".to_string(), 1);
        service.accept_transaction(bad_tx);
        assert!(mempool.read().is_empty());

        let good_tx = Transaction::coinbase(&"miner".to_string());
        service.accept_transaction(good_tx.clone());
        service.accept_transaction(good_tx);
        assert_eq!(mempool.read().len(), 1);
    }
}
