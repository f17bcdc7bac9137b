use bitcoin::hashes::Hash as _;
use bitcoin::{OutPoint, Txid};

use crate::router::graph::{ChannelFlags, GraphStore};
use crate::router::path::{find_path, PathFindError, RestrictParams};
use crate::router::route::new_route;
use crate::store::Store;
use crate::test_utils::{channel_info, channel_policy, generate_privkey, node_info};
use crate::types::{Pubkey, ShortChannelId};

/// Small graph builder over the real store, nodes addressed by index.
struct MockNetworkGraph {
    keys: Vec<Pubkey>,
    store: Store,
    edges: Vec<ShortChannelId>,
    _dir: tempfile::TempDir,
}

impl MockNetworkGraph {
    fn new(node_num: u8) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(dir.path()).expect("open store");
        let mut keys = vec![];
        for i in 0..node_num {
            let key = generate_privkey(i + 1);
            store.add_node(node_info(&key, 1_000)).unwrap();
            keys.push(key.pubkey());
        }
        Self {
            keys,
            store,
            edges: vec![],
            _dir: dir,
        }
    }

    /// Add a channel and the directed policy for `from -> to`.
    fn add_edge_with(
        &mut self,
        from: usize,
        to: usize,
        capacity_sat: u64,
        fee_rate: u64,
        disabled: bool,
    ) -> ShortChannelId {
        let id = ShortChannelId::new(1, self.edges.len() as u32, 0);
        self.edges.push(id);

        let key_from = self.keys[from];
        let key_to = self.keys[to];

        if self
            .store
            .fetch_channel_edges_by_id(id.to_u64())
            .unwrap()
            .is_none()
        {
            let mut info = channel_info(id, key_from, key_to, capacity_sat);
            info.outpoint = OutPoint::new(
                Txid::from_byte_array([self.edges.len() as u8; 32]),
                0,
            );
            self.store.add_channel_edge(info).unwrap();
        }

        let direction = if key_from < key_to { 0 } else { 1 };
        let mut policy = channel_policy(id, direction, 1_000, 0, fee_rate);
        if disabled {
            policy.channel_flags |= ChannelFlags::DISABLED;
        }
        self.store.update_edge_policy(policy).unwrap();
        id
    }

    fn add_edge(&mut self, from: usize, to: usize, capacity_sat: u64, fee_rate: u64) -> ShortChannelId {
        self.add_edge_with(from, to, capacity_sat, fee_rate, false)
    }

    fn find_path(
        &self,
        source: usize,
        target: usize,
        amount_msat: u64,
    ) -> Result<Vec<crate::router::path::PathHop>, PathFindError> {
        find_path(
            &self.store,
            self.keys[source],
            self.keys[target],
            amount_msat,
            &RestrictParams::default(),
        )
    }
}

#[test]
fn test_find_path_basic() {
    let mut network = MockNetworkGraph::new(4);

    // Capacity too small for the payment.
    network.add_edge(0, 1, 1, 2);
    assert!(network.find_path(0, 1, 100_000).is_err());

    let id = network.add_edge(0, 1, 1_000, 2);
    let path = network.find_path(0, 1, 100_000).unwrap();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].channel_id, id.to_u64());
    assert_eq!(path[0].dest, network.keys[1]);

    // Unconnected target.
    assert!(network.find_path(0, 3, 10_000).is_err());
}

#[test]
fn test_find_path_three_nodes() {
    let mut network = MockNetworkGraph::new(3);
    let id1 = network.add_edge(0, 1, 1_000, 2);
    let id2 = network.add_edge(1, 2, 1_000, 2);

    let path = network.find_path(0, 2, 100_000).unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].channel_id, id1.to_u64());
    assert_eq!(path[1].channel_id, id2.to_u64());
    assert_eq!(path[1].dest, network.keys[2]);

    // Reverse direction has no policies.
    assert!(network.find_path(2, 0, 100_000).is_err());
}

#[test]
fn test_find_path_prefers_lower_fees() {
    let mut network = MockNetworkGraph::new(5);

    // The source pays no fee on its own channels, so the forwarding hops
    // are what discriminate the two paths.
    network.add_edge(0, 1, 1_000, 0);
    network.add_edge(1, 3, 1_000, 30_000);

    let id_cheap1 = network.add_edge(0, 2, 1_000, 0);
    let id_cheap2 = network.add_edge(2, 3, 1_000, 10_000);

    let path = network.find_path(0, 3, 100_000).unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].channel_id, id_cheap1.to_u64());
    assert_eq!(path[1].channel_id, id_cheap2.to_u64());
}

#[test]
fn test_find_path_skips_disabled_edges() {
    let mut network = MockNetworkGraph::new(3);
    network.add_edge_with(0, 1, 1_000, 2, true);
    assert!(network.find_path(0, 1, 100_000).is_err());

    let id_direct = network.add_edge(0, 2, 1_000, 100);
    network.add_edge(2, 1, 1_000, 100);
    let path = network.find_path(0, 1, 100_000).unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].channel_id, id_direct.to_u64());
}

#[test]
fn test_find_path_honors_ignored_sets() {
    let mut network = MockNetworkGraph::new(4);
    let id_direct = network.add_edge(0, 1, 1_000, 2);
    network.add_edge(1, 2, 1_000, 2);

    let id_alt1 = network.add_edge(0, 3, 1_000, 500);
    let id_alt2 = network.add_edge(3, 2, 1_000, 500);

    // Unrestricted: go through node 1 (cheaper).
    let path = network.find_path(0, 2, 100_000).unwrap();
    assert_eq!(path[0].channel_id, id_direct.to_u64());

    // Node 1 pruned: forced through node 3.
    let mut restrictions = RestrictParams::default();
    restrictions.ignored_nodes.insert(network.keys[1]);
    let path = find_path(
        &network.store,
        network.keys[0],
        network.keys[2],
        100_000,
        &restrictions,
    )
    .unwrap();
    assert_eq!(path.len(), 2);
    assert_eq!(path[0].channel_id, id_alt1.to_u64());
    assert_eq!(path[1].channel_id, id_alt2.to_u64());
}

#[test]
fn test_find_path_rejects_degenerate_queries() {
    let mut network = MockNetworkGraph::new(3);
    network.add_edge(0, 1, 1_000, 2);

    assert!(matches!(
        network.find_path(0, 0, 100_000),
        Err(PathFindError::NoPath(_))
    ));
    assert!(matches!(
        network.find_path(0, 1, 0),
        Err(PathFindError::Amount(_))
    ));
}

#[test]
fn test_new_route_amounts_and_lock_times() {
    let mut network = MockNetworkGraph::new(3);
    // 0 -> 1 free (source channel), 1 -> 2 charges 1% via proportional fee.
    network.add_edge(0, 1, 10_000, 0);
    network.add_edge(1, 2, 10_000, 10_000);

    let amount_msat = 1_000_000;
    let path = network.find_path(0, 2, amount_msat).unwrap();
    let route = new_route(amount_msat, network.keys[0], &path, 500_000, 40).unwrap();

    assert_eq!(route.hops.len(), 2);
    // Final hop receives exactly the payment amount.
    assert_eq!(route.final_amount_msat(), amount_msat);
    // Total minus fees equals the amount delivered.
    assert_eq!(
        route.total_amount_msat - route.total_fees_msat(),
        amount_msat
    );
    // The forwarding node charges its proportional fee.
    assert_eq!(route.total_fees_msat(), amount_msat / 100);

    // Final hop locks at height + final delta; the first hop adds the
    // forwarding channel's delta.
    assert_eq!(route.hops[1].outgoing_cltv, 500_000 + 40);
    assert_eq!(route.hops[0].outgoing_cltv, 500_000 + 40);
    assert_eq!(route.total_time_lock, 500_000 + 40 + 144);

    // First hop channel feeds the htlc dispatch.
    assert_eq!(
        route.first_hop_channel().unwrap().to_u64(),
        path[0].channel_id
    );
}
