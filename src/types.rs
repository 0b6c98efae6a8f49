// src/types.rs - shared type aliases (spec §3)
//
// Addresses and hashes are hex/Base58 strings rather than fixed-size byte
// arrays: spec's Block and Transaction fields are explicitly hex-encoded,
// and the genesis block's literal `hash: "genesis-hash"` isn't a valid
// 32-byte digest, so a `[u8; 32]` representation can't hold it.

/// A wallet identity: a Base58Check-encoded string, or one of the two
/// non-derivable sentinels (`COINBASE`, `COINBASE_SIG` — see `constants`).
pub type Address = String;

/// A lowercase-hex-encoded SHA-256 digest, or the literal genesis hash.
pub type Hash = String;
