// Round-trip and gossip-message tests for the wire protocol (spec §4.7, §6, §8).
use embercoin::{Block, Transaction};

#[test]
fn block_serializes_and_parses_back_to_an_equal_value() {
    let genesis = Block::genesis();
    let json = serde_json::to_string(&genesis).unwrap();
    let parsed: Block = serde_json::from_str(&json).unwrap();
    assert_eq!(genesis, parsed);
}

#[test]
fn transaction_serializes_and_parses_back_to_an_equal_value() {
    let tx = Transaction::coinbase(&"miner".to_string());
    let json = serde_json::to_string(&tx).unwrap();
    let parsed: Transaction = serde_json::from_str(&json).unwrap();
    assert_eq!(tx, parsed);
}

#[test]
fn canonical_output_map_serialization_is_stable_regardless_of_insertion_order() {
    use std::collections::BTreeMap;
    let mut a: BTreeMap<String, u64> = BTreeMap::new();
    a.insert("z".to_string(), 10);
    a.insert("a".to_string(), 5);

    let mut b: BTreeMap<String, u64> = BTreeMap::new();
    b.insert("a".to_string(), 5);
    b.insert("z".to_string(), 10);

    assert_eq!(embercoin::crypto::canonical_bytes(&a), embercoin::crypto::canonical_bytes(&b));
}
