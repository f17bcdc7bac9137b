use bitcoin::hashes::Hash as _;
use bitcoin::{BlockHash, OutPoint, Txid};

use crate::router::graph::{ChannelAuthProof, GraphStore};
use crate::store::Store;
use crate::test_utils::{channel_info, channel_policy, generate_privkey, node_info};
use crate::types::{Hash256, ShortChannelId};

fn test_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::new(dir.path()).expect("open store");
    (dir, store)
}

fn block_hash(salt: u8) -> BlockHash {
    BlockHash::from_byte_array([salt; 32])
}

fn channel_outpoint(salt: u8) -> OutPoint {
    OutPoint::new(Txid::from_byte_array([salt; 32]), 0)
}

#[test]
fn test_channel_edge_round_trip() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();

    let id = ShortChannelId::new(10, 1, 0);
    let mut info = channel_info(id, key1, key2, 1_000_000);
    info.outpoint = channel_outpoint(9);
    store.add_channel_edge(info.clone()).unwrap();

    // Exact read-back of capacity, endpoints, outpoint and proof.
    let (stored, policy1, policy2) = store
        .fetch_channel_edges_by_id(id.to_u64())
        .unwrap()
        .expect("channel stored");
    assert_eq!(stored, info);
    assert!(policy1.is_none());
    assert!(policy2.is_none());

    // A second add of the same channel id is refused.
    assert!(store.add_channel_edge(info.clone()).is_err());

    // Attaching a proof survives a read-back bit-exactly.
    let sig = generate_privkey(2).sign(Hash256::default().into_inner());
    let proof = ChannelAuthProof {
        node_1_sig: sig,
        node_2_sig: sig,
        bitcoin_1_sig: sig,
        bitcoin_2_sig: sig,
    };
    let mut with_proof = info.clone();
    with_proof.auth_proof = Some(proof.clone());
    store.update_channel_edge(with_proof).unwrap();
    let (stored, _, _) = store
        .fetch_channel_edges_by_id(id.to_u64())
        .unwrap()
        .unwrap();
    assert_eq!(stored.auth_proof, Some(proof));

    // Both endpoints got shell node records.
    assert!(store.has_node(&key1).unwrap().1);
    assert!(store.has_node(&key2).unwrap().1);
}

#[test]
fn test_policy_storage_is_per_direction() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();

    let id = ShortChannelId::new(10, 1, 0);
    store
        .add_channel_edge(channel_info(id, key1, key2, 1_000_000))
        .unwrap();

    store
        .update_edge_policy(channel_policy(id, 0, 100, 1_000, 1))
        .unwrap();
    store
        .update_edge_policy(channel_policy(id, 1, 200, 2_000, 2))
        .unwrap();

    let status = store.has_channel_edge(id.to_u64()).unwrap();
    assert!(status.exists);
    assert!(!status.is_zombie);
    assert_eq!(status.edge1_last_update, Some(100));
    assert_eq!(status.edge2_last_update, Some(200));
}

#[test]
fn test_prune_graph_closes_spent_channels() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();
    let key3 = generate_privkey(4).pubkey();

    let id1 = ShortChannelId::new(5, 0, 0);
    let id2 = ShortChannelId::new(5, 1, 0);
    let mut info1 = channel_info(id1, key1, key2, 1_000_000);
    info1.outpoint = channel_outpoint(1);
    let mut info2 = channel_info(id2, key2, key3, 2_000_000);
    info2.outpoint = channel_outpoint(2);
    store.add_channel_edge(info1.clone()).unwrap();
    store.add_channel_edge(info2).unwrap();

    let closed = store
        .prune_graph(&[info1.outpoint], block_hash(10), 10)
        .unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].channel_id, id1.to_u64());
    assert_eq!(closed[0].closed_height, 10);

    // No channel whose funding outpoint was spent remains live.
    let live: Vec<u64> = store
        .get_channels()
        .unwrap()
        .into_iter()
        .map(|(info, _, _)| info.channel_id)
        .collect();
    assert_eq!(live, vec![id2.to_u64()]);

    assert_eq!(store.prune_tip().unwrap(), Some((block_hash(10), 10)));

    // An unrelated spend closes nothing but still advances the tip.
    let closed = store
        .prune_graph(&[channel_outpoint(99)], block_hash(11), 11)
        .unwrap();
    assert!(closed.is_empty());
    assert_eq!(store.prune_tip().unwrap(), Some((block_hash(11), 11)));
}

#[test]
fn test_disconnect_then_reapply_matches_direct_application() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();
    let key3 = generate_privkey(4).pubkey();

    let id1 = ShortChannelId::new(5, 0, 0);
    let id2 = ShortChannelId::new(5, 1, 0);
    let mut info1 = channel_info(id1, key1, key2, 1_000_000);
    info1.outpoint = channel_outpoint(1);
    let mut info2 = channel_info(id2, key2, key3, 2_000_000);
    info2.outpoint = channel_outpoint(2);
    store.add_channel_edge(info1.clone()).unwrap();
    store.add_channel_edge(info2.clone()).unwrap();

    store
        .prune_graph(&[info1.outpoint], block_hash(10), 10)
        .unwrap();
    store
        .prune_graph(&[info2.outpoint], block_hash(11), 11)
        .unwrap();

    let direct: Vec<u64> = store
        .get_channels()
        .unwrap()
        .into_iter()
        .map(|(info, _, _)| info.channel_id)
        .collect();
    let direct_tip = store.prune_tip().unwrap();

    // Disconnect block 11 and re-apply it: same channels, same tip.
    store.disconnect_block_at_height(11).unwrap();
    let restored: Vec<u64> = store
        .get_channels()
        .unwrap()
        .into_iter()
        .map(|(info, _, _)| info.channel_id)
        .collect();
    assert!(restored.contains(&id2.to_u64()));
    assert_eq!(store.prune_tip().unwrap(), Some((block_hash(10), 10)));

    store
        .prune_graph(&[info2.outpoint], block_hash(11), 11)
        .unwrap();
    let reapplied: Vec<u64> = store
        .get_channels()
        .unwrap()
        .into_iter()
        .map(|(info, _, _)| info.channel_id)
        .collect();
    assert_eq!(reapplied, direct);
    assert_eq!(store.prune_tip().unwrap(), direct_tip);
}

#[test]
fn test_disconnect_drops_channels_funded_in_stale_blocks() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();

    // Channel funded at height 20 ceases to exist once block 20 is
    // disconnected.
    let id = ShortChannelId::new(20, 0, 0);
    let mut info = channel_info(id, key1, key2, 1_000_000);
    info.outpoint = channel_outpoint(1);
    store.add_channel_edge(info).unwrap();
    store.prune_graph(&[], block_hash(20), 20).unwrap();

    let removed = store.disconnect_block_at_height(20).unwrap();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].channel_id, id.to_u64());
    assert!(store.get_channels().unwrap().is_empty());
}

#[test]
fn test_zombie_index_and_revival() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();

    let id = ShortChannelId::new(10, 1, 0);
    let mut info = channel_info(id, key1, key2, 1_000_000);
    info.outpoint = channel_outpoint(1);
    store.add_channel_edge(info).unwrap();
    store
        .update_edge_policy(channel_policy(id, 0, 100, 1_000, 1))
        .unwrap();

    store.delete_channel_edges(&[id.to_u64()]).unwrap();
    let status = store.has_channel_edge(id.to_u64()).unwrap();
    assert!(!status.exists);
    assert!(status.is_zombie);
    assert!(store.get_channels().unwrap().is_empty());

    // Marking live moves the full record back, policies included.
    store.mark_edge_live(id.to_u64()).unwrap();
    let status = store.has_channel_edge(id.to_u64()).unwrap();
    assert!(status.exists);
    assert!(!status.is_zombie);
    assert_eq!(status.edge1_last_update, Some(100));

    // Idempotent for unknown channels.
    store.mark_edge_live(424242).unwrap();
}

#[test]
fn test_prune_graph_nodes_keeps_source_and_referenced() {
    let (_dir, store) = test_store();
    let self_key = generate_privkey(1);
    let key2 = generate_privkey(2).pubkey();
    let key3 = generate_privkey(3).pubkey();

    store.set_source_node(node_info(&self_key, 1_000)).unwrap();
    store.add_node(node_info(&generate_privkey(2), 1_000)).unwrap();
    store.add_node(node_info(&generate_privkey(3), 1_000)).unwrap();
    store.add_node(node_info(&generate_privkey(4), 1_000)).unwrap();

    let id = ShortChannelId::new(10, 1, 0);
    let mut info = channel_info(id, key2, key3, 1_000_000);
    info.outpoint = channel_outpoint(1);
    store.add_channel_edge(info).unwrap();

    let pruned = store.prune_graph_nodes().unwrap();
    assert_eq!(pruned, 1);
    assert!(!store.has_node(&generate_privkey(4).pubkey()).unwrap().1);
    assert!(store.has_node(&key2).unwrap().1);
    assert!(store.has_node(&self_key.pubkey()).unwrap().1);
}

#[test]
fn test_is_public_node_requires_auth_proof() {
    let (_dir, store) = test_store();
    let key1 = generate_privkey(2).pubkey();
    let key2 = generate_privkey(3).pubkey();

    let id = ShortChannelId::new(10, 1, 0);
    let mut info = channel_info(id, key1, key2, 1_000_000);
    info.outpoint = channel_outpoint(1);
    store.add_channel_edge(info.clone()).unwrap();
    assert!(!store.is_public_node(&key1).unwrap());

    let sig = generate_privkey(2).sign(Hash256::default().into_inner());
    info.auth_proof = Some(ChannelAuthProof {
        node_1_sig: sig,
        node_2_sig: sig,
        bitcoin_1_sig: sig,
        bitcoin_2_sig: sig,
    });
    store.update_channel_edge(info).unwrap();
    assert!(store.is_public_node(&key1).unwrap());
    assert!(store.is_public_node(&key2).unwrap());
}
