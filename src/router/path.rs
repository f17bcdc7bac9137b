use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use crate::router::graph::{ChannelPolicy, GraphStore};
use crate::types::Pubkey;

/// Risk factor applied to the time lock penalty of an edge, in billionths
/// per amount-msat per block.
const RISK_FACTOR: u64 = 15;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathFindError {
    #[error("amount error: {0}")]
    Amount(String),
    #[error("no path found: {0}")]
    NoPath(String),
}

/// Constraints a candidate path must satisfy.
#[derive(Clone, Debug, Default)]
pub struct RestrictParams {
    /// Maximum total fee the payer accepts, in milli-satoshi.
    pub fee_limit_msat: Option<u64>,

    /// When set, the first hop must leave through this channel.
    pub outgoing_channel_id: Option<u64>,

    /// Maximum total time lock accepted for the route, in blocks on top of
    /// the current height.
    pub cltv_limit: Option<u32>,

    pub ignored_nodes: HashSet<Pubkey>,

    /// Directed edges to avoid, keyed by (channel id, direction bit).
    pub ignored_edges: HashSet<(u64, u8)>,
}

/// One traversed half-edge of a found path, in forward order.
#[derive(Clone, Debug, PartialEq)]
pub struct PathHop {
    pub channel_id: u64,
    pub src: Pubkey,
    pub dest: Pubkey,
    pub policy: ChannelPolicy,
    pub capacity_msat: u64,
}

#[derive(Clone, Debug)]
struct NodeHeapElement {
    node_id: Pubkey,

    // Accumulated cost from this node to the destination.
    distance: u64,

    // The amount this node must receive to satisfy downstream fees.
    amount_received: u64,

    // Time lock budget consumed between this node and the destination.
    incoming_cltv_delta: u32,

    // The edge this node forwards over, towards the destination.
    next_hop: Option<(Pubkey, u64, ChannelPolicy, u64)>,
}

impl Ord for NodeHeapElement {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; flip to pop the smallest distance first.
        other.distance.cmp(&self.distance)
    }
}

impl PartialOrd for NodeHeapElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NodeHeapElement {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id && self.distance == other.distance
    }
}

impl Eq for NodeHeapElement {}

struct NodeHeap {
    inner: BinaryHeap<NodeHeapElement>,
}

impl NodeHeap {
    fn new(num: usize) -> Self {
        Self {
            inner: BinaryHeap::with_capacity(num),
        }
    }

    fn push(&mut self, element: NodeHeapElement) {
        self.inner.push(element);
    }

    fn pop(&mut self) -> Option<NodeHeapElement> {
        self.inner.pop()
    }

    fn push_or_fix(&mut self, element: NodeHeapElement) {
        self.inner.retain(|e| e.node_id != element.node_id);
        self.inner.push(element);
    }
}

/// Search the graph for the cheapest path from `source` to `target` able to
/// carry `amount_msat`, walking target-to-source so fees accumulate
/// naturally. Treated as a black box by the rest of the router.
pub fn find_path<S: GraphStore>(
    store: &S,
    source: Pubkey,
    target: Pubkey,
    amount_msat: u64,
    restrictions: &RestrictParams,
) -> Result<Vec<PathHop>, PathFindError> {
    if amount_msat == 0 {
        return Err(PathFindError::Amount(
            "amount must be greater than 0".to_string(),
        ));
    }
    if source == target {
        return Err(PathFindError::NoPath(
            "source and target are the same".to_string(),
        ));
    }

    // Inbound adjacency: for every node, the half-edges that can forward
    // into it.
    let channels = store
        .get_channels()
        .map_err(|err| PathFindError::NoPath(format!("graph unavailable: {}", err)))?;
    let mut inbound: HashMap<Pubkey, Vec<(Pubkey, u64, ChannelPolicy, u64)>> = HashMap::new();
    for (info, policy1, policy2) in channels {
        let capacity_msat = info.capacity_sat * 1000;
        if let Some(policy) = policy1 {
            inbound.entry(info.node2).or_default().push((
                info.node1,
                info.channel_id,
                policy,
                capacity_msat,
            ));
        }
        if let Some(policy) = policy2 {
            inbound.entry(info.node1).or_default().push((
                info.node2,
                info.channel_id,
                policy,
                capacity_msat,
            ));
        }
    }

    let mut distances = HashMap::<Pubkey, NodeHeapElement>::new();
    let mut heap = NodeHeap::new(inbound.len());
    let mut nodes_visited = 0usize;
    let mut edges_expanded = 0usize;

    heap.push(NodeHeapElement {
        node_id: target,
        distance: 0,
        amount_received: amount_msat,
        incoming_cltv_delta: 0,
        next_hop: None,
    });

    while let Some(cur_hop) = heap.pop() {
        nodes_visited += 1;
        if cur_hop.node_id == source {
            break;
        }

        let Some(edges) = inbound.get(&cur_hop.node_id) else {
            continue;
        };

        for (from, channel_id, policy, capacity_msat) in edges {
            edges_expanded += 1;

            if policy.is_disabled() {
                continue;
            }
            if restrictions.ignored_nodes.contains(from) {
                continue;
            }
            if restrictions
                .ignored_edges
                .contains(&(*channel_id, policy.direction()))
            {
                continue;
            }
            if *from == source {
                if let Some(required) = restrictions.outgoing_channel_id {
                    if *channel_id != required {
                        continue;
                    }
                }
            }

            // The source pays no fee for its own channel and needs no
            // additional delta there.
            let amount_to_forward = cur_hop.amount_received;
            let (fee, delta) = if *from == source {
                (0, 0)
            } else {
                (
                    policy.fee_msat(amount_to_forward),
                    policy.time_lock_delta as u32,
                )
            };
            let amount_to_send = amount_to_forward + fee;

            if amount_to_send > *capacity_msat {
                continue;
            }
            if amount_to_send < policy.htlc_minimum_msat {
                continue;
            }
            if policy.htlc_maximum_msat > 0 && amount_to_send > policy.htlc_maximum_msat {
                continue;
            }
            if let Some(fee_limit) = restrictions.fee_limit_msat {
                if amount_to_send > amount_msat + fee_limit {
                    continue;
                }
            }

            let incoming_cltv_delta = cur_hop.incoming_cltv_delta + delta;
            if let Some(cltv_limit) = restrictions.cltv_limit {
                if incoming_cltv_delta > cltv_limit {
                    continue;
                }
            }

            let time_lock_penalty =
                amount_to_send * policy.time_lock_delta as u64 * RISK_FACTOR / 1_000_000_000;
            let distance = cur_hop.distance + fee + time_lock_penalty;

            let elem = NodeHeapElement {
                node_id: *from,
                distance,
                amount_received: amount_to_send,
                incoming_cltv_delta,
                next_hop: Some((
                    cur_hop.node_id,
                    *channel_id,
                    policy.clone(),
                    *capacity_msat,
                )),
            };

            let improved = distances
                .get(&elem.node_id)
                .map(|best| elem.distance < best.distance)
                .unwrap_or(true);
            if improved {
                distances.insert(elem.node_id, elem.clone());
                heap.push_or_fix(elem);
            }
        }
    }

    let mut path = vec![];
    let mut current = source;
    while current != target {
        let Some(elem) = distances.get(&current) else {
            break;
        };
        let (dest, channel_id, policy, capacity_msat) =
            elem.next_hop.clone().expect("relaxed node has next hop");
        path.push(PathHop {
            channel_id,
            src: current,
            dest,
            policy,
            capacity_msat,
        });
        current = dest;
    }

    debug!(
        nodes_visited,
        edges_expanded,
        hops = path.len(),
        "path finding finished"
    );

    if path.is_empty() || current != target {
        return Err(PathFindError::NoPath(
            "no route to destination".to_string(),
        ));
    }
    Ok(path)
}
