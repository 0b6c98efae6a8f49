// src/crypto.rs - cryptographic primitives (spec §4.1, component C1)
//
// Everything the consensus layer signs or hashes flows through here, so
// the canonical serialization used by `sign`/`verify` must produce
// byte-for-byte identical output on every node (spec §4.1's rationale).
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ripemd::Ripemd160;
use secp256k1::rand::rngs::OsRng;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::constants::{COINBASE, COINBASE_SIG};
use crate::error::{NodeError, Result};

/// A wallet identity: the private key, its PEM-encoded public key (carried
/// alongside transactions so recipients can verify signatures — spec §9
/// open question 2, variant (b)), and the Base58Check address derived from
/// the public key.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: SecretKey,
    pub public_key_pem: String,
    pub address: String,
}

impl KeyPair {
    /// Generates a new secp256k1 keypair and derives its address.
    ///
    /// Fails only if the OS entropy source is unavailable, which spec §4.1
    /// calls a fatal condition; callers that cannot tolerate that should
    /// treat an `Err` here as unrecoverable.
    pub fn generate() -> Result<Self> {
        let secp = Secp256k1::new();
        let (private_key, public_key) = secp.generate_keypair(&mut OsRng);
        let public_key_pem = encode_public_key_pem(&public_key);
        let address = derive_address(&public_key);
        Ok(KeyPair {
            private_key,
            public_key_pem,
            address,
        })
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        decode_public_key_pem(&self.public_key_pem)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// PEM-wraps a compressed secp256k1 public key (33 bytes, SEC1 form).
///
/// Real PEM carries a DER-encoded SPKI structure; this node has no other
/// consumer for the public key than itself, so it skips the ASN.1 layer
/// and PEM-wraps the raw compressed point directly.
fn encode_public_key_pem(public_key: &PublicKey) -> String {
    let body = BASE64.encode(public_key.serialize());
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for chunk in body.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(chunk).unwrap());
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

pub fn decode_public_key_pem(pem: &str) -> Result<PublicKey> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let bytes = BASE64
        .decode(body)
        .map_err(|e| NodeError::Crypto(format!("malformed PEM public key: {e}")))?;
    Ok(PublicKey::from_slice(&bytes)?)
}

/// Derives a Base58Check-style address from a public key:
/// `version byte ∥ RIPEMD160(SHA256(pubkey))`, suffixed with the first
/// four bytes of `doubleSha256` of that payload, Base58-encoded.
pub fn derive_address(public_key: &PublicKey) -> String {
    let sha = Sha256::digest(public_key.serialize());
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha);
    let pubkey_hash = ripemd.finalize();

    let mut payload = Vec::with_capacity(1 + pubkey_hash.len());
    payload.push(0x00u8); // version byte
    payload.extend_from_slice(&pubkey_hash);

    let checksum = double_sha256(&payload);
    payload.extend_from_slice(&checksum[..4]);

    base58_encode(&payload)
}

/// Canonical serialization of a mapping: ordered-by-key JSON with no
/// whitespace. `BTreeMap`'s `Serialize` impl is already key-ordered, so
/// `serde_json::to_vec` (which emits no extraneous whitespace) is
/// sufficient as long as callers pass an ordered map.
pub fn canonical_bytes<T: Serialize>(data: &T) -> Vec<u8> {
    serde_json::to_vec(data).expect("canonical data must be JSON-serializable")
}

/// Signs `data`'s canonical serialization with `private_key`, returning a
/// lowercase-hex-encoded DER signature.
pub fn sign<T: Serialize>(private_key: &SecretKey, data: &T) -> Result<String> {
    let secp = Secp256k1::new();
    let digest = double_sha256(&canonical_bytes(data));
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| NodeError::Crypto(format!("invalid message digest: {e}")))?;
    let signature = secp.sign_ecdsa(&message, private_key);
    Ok(hex::encode(signature.serialize_der()))
}

/// Verifies `signature` over `data`'s canonical serialization under
/// `public_key`. Total function: any malformed input simply yields
/// `false`, per spec §4.1.
pub fn verify<T: Serialize>(public_key: &PublicKey, data: &T, signature: &str) -> bool {
    let secp = Secp256k1::new();
    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(sig) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    let digest = double_sha256(&canonical_bytes(data));
    let Ok(message) = Message::from_digest_slice(&digest) else {
        return false;
    };
    secp.verify_ecdsa(&message, &sig, public_key).is_ok()
}

/// SHA-256 applied twice, matching the hashing convention used throughout
/// this node (address derivation, signing digests).
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Single SHA-256, lowercase hex — used by `Block::hash`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Current wall-clock time in milliseconds since the epoch, the unit
/// every `timestamp` field in this crate (blocks, transactions, p2p
/// envelopes) uses.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// True for the two non-derivable sentinel identifiers (spec §3): the
/// coinbase sender address and its matching signature value.
pub fn is_coinbase_address(address: &str) -> bool {
    address == COINBASE
}

pub fn is_coinbase_signature(signature: &str) -> bool {
    signature == COINBASE_SIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn sign_and_verify_round_trip() {
        let keypair = KeyPair::generate().unwrap();
        let mut data: BTreeMap<String, u64> = BTreeMap::new();
        data.insert("alice".to_string(), 10);
        data.insert("bob".to_string(), 90);

        let signature = sign(&keypair.private_key, &data).unwrap();
        let public_key = keypair.public_key().unwrap();
        assert!(verify(&public_key, &data, &signature));
    }

    #[test]
    fn verify_rejects_tampered_data() {
        let keypair = KeyPair::generate().unwrap();
        let mut data: BTreeMap<String, u64> = BTreeMap::new();
        data.insert("alice".to_string(), 10);

        let signature = sign(&keypair.private_key, &data).unwrap();
        data.insert("alice".to_string(), 999);

        let public_key = keypair.public_key().unwrap();
        assert!(!verify(&public_key, &data, &signature));
    }

    #[test]
    fn verify_is_total_on_malformed_signature() {
        let keypair = KeyPair::generate().unwrap();
        let data: BTreeMap<String, u64> = BTreeMap::new();
        let public_key = keypair.public_key().unwrap();
        assert!(!verify(&public_key, &data, "not-hex-and-not-a-signature"));
    }

    #[test]
    fn canonical_bytes_are_key_ordered() {
        let mut a: BTreeMap<String, u64> = BTreeMap::new();
        a.insert("z".to_string(), 1);
        a.insert("a".to_string(), 2);

        let mut b: BTreeMap<String, u64> = BTreeMap::new();
        b.insert("a".to_string(), 2);
        b.insert("z".to_string(), 1);

        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
        assert_eq!(canonical_bytes(&a), br#"{"a":2,"z":1}"#.to_vec());
    }

    #[test]
    fn address_round_trips_through_base58() {
        let keypair = KeyPair::generate().unwrap();
        let decoded = bs58::decode(&keypair.address).into_vec().unwrap();
        assert_eq!(decoded.len(), 1 + 20 + 4); // version + hash160 + checksum
    }
}
