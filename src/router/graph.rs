use bitcoin::{BlockHash, OutPoint};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::chain::EdgePoint;
use crate::types::{ChannelUpdate, EcdsaSignature, Pubkey, ShortChannelId};
use crate::Result;

bitflags! {
    /// Even-bit feature flags of a channel update message. Serde impls come
    /// with the bitflags serde feature.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct MessageFlags: u8 {
        const OPTION_CHANNEL_HTLC_MAX = 1;
    }
}

bitflags! {
    /// Direction and liveness bits of a channel update message. Direction 0
    /// means the policy was published by the lexicographically smaller node
    /// key (node1).
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ChannelFlags: u8 {
        const DIRECTION = 1;
        const DISABLED = 2;
    }
}

/// Details about a node in the network, known from its announcement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: Pubkey,

    /// Unix seconds of the latest accepted announcement. Zero for shell
    /// records created as channel endpoints before any announcement arrived.
    pub last_update: u64,

    pub features: u64,
    pub alias: String,
    pub addresses: Vec<Vec<u8>>,
    pub signature: Option<EcdsaSignature>,
}

impl NodeInfo {
    /// Placeholder record for a channel endpoint we have not yet seen a node
    /// announcement for.
    pub fn shell(node_id: Pubkey) -> Self {
        Self {
            node_id,
            last_update: 0,
            features: 0,
            alias: String::new(),
            addresses: vec![],
            signature: None,
        }
    }

    pub fn is_shell(&self) -> bool {
        self.last_update == 0
    }
}

/// The four signatures proving a channel announcement was produced by both
/// endpoints and both funding keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelAuthProof {
    pub node_1_sig: EcdsaSignature,
    pub node_2_sig: EcdsaSignature,
    pub bitcoin_1_sig: EcdsaSignature,
    pub bitcoin_2_sig: EcdsaSignature,
}

/// An announced channel: the undirected half of the graph edge pair.
/// `node1` and `node2` are ordered by lexicographic key comparison.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: u64,
    pub node1: Pubkey,
    pub node2: Pubkey,
    pub bitcoin_key1: Pubkey,
    pub bitcoin_key2: Pubkey,
    pub features: u64,
    pub outpoint: OutPoint,
    pub capacity_sat: u64,
    pub auth_proof: Option<ChannelAuthProof>,
}

impl ChannelInfo {
    pub fn short_channel_id(&self) -> ShortChannelId {
        ShortChannelId::from_u64(self.channel_id)
    }

    /// The direction bit of the policy `from` would publish for this
    /// channel, or `None` when `from` is not an endpoint.
    pub fn direction_from(&self, from: &Pubkey) -> Option<u8> {
        if *from == self.node1 {
            Some(0)
        } else if *from == self.node2 {
            Some(1)
        } else {
            None
        }
    }

    pub fn other_node(&self, node: &Pubkey) -> Option<Pubkey> {
        if *node == self.node1 {
            Some(self.node2)
        } else if *node == self.node2 {
            Some(self.node1)
        } else {
            None
        }
    }
}

/// Directed forwarding policy: one half-edge, keyed by (channel id,
/// direction bit).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelPolicy {
    pub channel_id: u64,
    pub last_update: u64,
    pub message_flags: MessageFlags,
    pub channel_flags: ChannelFlags,
    pub time_lock_delta: u16,
    pub htlc_minimum_msat: u64,
    pub htlc_maximum_msat: u64,
    pub fee_base_msat: u64,
    pub fee_proportional_millionths: u64,
    pub signature: Option<EcdsaSignature>,
}

impl ChannelPolicy {
    pub fn direction(&self) -> u8 {
        if self.channel_flags.contains(ChannelFlags::DIRECTION) {
            1
        } else {
            0
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.channel_flags.contains(ChannelFlags::DISABLED)
    }

    /// Effective forwarding fee for an htlc of `amount_msat`.
    pub fn fee_msat(&self, amount_msat: u64) -> u64 {
        self.fee_base_msat + amount_msat * self.fee_proportional_millionths / 1_000_000
    }
}

impl From<&ChannelUpdate> for ChannelPolicy {
    fn from(update: &ChannelUpdate) -> Self {
        Self {
            channel_id: update.channel_id,
            last_update: update.timestamp,
            message_flags: MessageFlags::from_bits_truncate(update.message_flags),
            channel_flags: ChannelFlags::from_bits_truncate(update.channel_flags),
            time_lock_delta: update.time_lock_delta,
            htlc_minimum_msat: update.htlc_minimum_msat,
            htlc_maximum_msat: update.htlc_maximum_msat,
            fee_base_msat: update.fee_base_msat,
            fee_proportional_millionths: update.fee_proportional_millionths,
            signature: update.signature,
        }
    }
}

/// The polymorphic gossip record carried over the router's single update
/// channel.
#[derive(Clone, Debug)]
pub enum GossipRecord {
    Node(NodeInfo),
    Channel(ChannelInfo),
    Policy(ChannelPolicy),
}

/// Result of a zombie-aware edge existence check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelEdgeStatus {
    pub edge1_last_update: Option<u64>,
    pub edge2_last_update: Option<u64>,
    pub exists: bool,
    pub is_zombie: bool,
}

impl ChannelEdgeStatus {
    pub fn last_update_for(&self, direction: u8) -> Option<u64> {
        if direction == 0 {
            self.edge1_last_update
        } else {
            self.edge2_last_update
        }
    }
}

/// Summary of a channel closed by an on-chain spend of its funding output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClosedChannelSummary {
    pub channel_id: u64,
    pub capacity_sat: u64,
    pub outpoint: OutPoint,
    pub closed_height: u32,
}

/// Persistent channel graph. Implementations must make each operation
/// atomic; the router relies on the store for crash consistency.
pub trait GraphStore: Send + Sync {
    fn source_node(&self) -> Result<Option<NodeInfo>>;

    fn set_source_node(&self, node: NodeInfo) -> Result<()>;

    /// The chain point pruning is synchronized to, or `None` when the graph
    /// has never been pruned.
    fn prune_tip(&self) -> Result<Option<(BlockHash, u32)>>;

    /// Close every channel whose funding outpoint is spent in the given
    /// block and advance the prune tip. Returns summaries of the closed
    /// channels.
    fn prune_graph(
        &self,
        spent_outpoints: &[OutPoint],
        block_hash: BlockHash,
        height: u32,
    ) -> Result<Vec<ClosedChannelSummary>>;

    /// Remove nodes that no longer participate in any channel, the source
    /// node excepted. Returns the number of nodes removed.
    fn prune_graph_nodes(&self) -> Result<usize>;

    /// Unwind the graph for a stale block: restore channels pruned at
    /// heights >= `height`, drop channels funded at heights >= `height`, and
    /// rewind the prune tip. Returns the dropped channels.
    fn disconnect_block_at_height(&self, height: u32) -> Result<Vec<ChannelInfo>>;

    /// All funding outpoints currently backing live channels.
    fn channel_view(&self) -> Result<Vec<EdgePoint>>;

    /// Returns `(last_update, exists)` for the vertex.
    fn has_node(&self, node: &Pubkey) -> Result<(u64, bool)>;

    fn add_node(&self, node: NodeInfo) -> Result<()>;

    fn fetch_node(&self, node: &Pubkey) -> Result<Option<NodeInfo>>;

    fn get_nodes(&self) -> Result<Vec<NodeInfo>>;

    /// A node is public when at least one of its channels carries an
    /// authentication proof.
    fn is_public_node(&self, node: &Pubkey) -> Result<bool>;

    fn has_channel_edge(&self, channel_id: u64) -> Result<ChannelEdgeStatus>;

    fn add_channel_edge(&self, info: ChannelInfo) -> Result<()>;

    /// Replace the stored info of an existing channel (proof attachment).
    fn update_channel_edge(&self, info: ChannelInfo) -> Result<()>;

    fn update_edge_policy(&self, policy: ChannelPolicy) -> Result<()>;

    #[allow(clippy::type_complexity)]
    fn fetch_channel_edges_by_id(
        &self,
        channel_id: u64,
    ) -> Result<Option<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>>;

    #[allow(clippy::type_complexity)]
    fn get_channels(
        &self,
    ) -> Result<Vec<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>>;

    /// Channels that have `node` as either endpoint.
    #[allow(clippy::type_complexity)]
    fn node_channels(
        &self,
        node: &Pubkey,
    ) -> Result<Vec<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>>;

    /// Remove channels from the live graph and move them into the zombie
    /// index, from where they can be revived by `mark_edge_live`.
    fn delete_channel_edges(&self, channel_ids: &[u64]) -> Result<()>;

    /// Clear a channel from the zombie index, restoring it as live.
    /// Idempotent for unknown or already-live channels.
    fn mark_edge_live(&self, channel_id: u64) -> Result<()>;
}

/// Node entry of a topology change notification.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeUpdate {
    pub node_id: Pubkey,
    pub last_update: u64,
    pub alias: String,
    pub addresses: Vec<Vec<u8>>,
}

/// Directed edge entry of a topology change notification.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelEdgeUpdate {
    pub channel_id: u64,
    pub outpoint: OutPoint,
    pub capacity_sat: u64,
    pub advertising_node: Pubkey,
    pub connecting_node: Pubkey,
    pub time_lock_delta: u16,
    pub htlc_minimum_msat: u64,
    pub htlc_maximum_msat: u64,
    pub fee_base_msat: u64,
    pub fee_proportional_millionths: u64,
    pub disabled: bool,
}

/// Fanned out to topology subscribers after the graph mutated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyChange {
    pub node_updates: Vec<NodeUpdate>,
    pub channel_edge_updates: Vec<ChannelEdgeUpdate>,
    pub closed_channels: Vec<ClosedChannelSummary>,
}

impl TopologyChange {
    pub fn is_empty(&self) -> bool {
        self.node_updates.is_empty()
            && self.channel_edge_updates.is_empty()
            && self.closed_channels.is_empty()
    }
}

/// Handle held by a topology subscriber. Dropping the receiver cancels the
/// subscription lazily; `ChannelRouter::unsubscribe_topology` cancels it
/// eagerly.
#[derive(Debug)]
pub struct TopologyClient {
    pub client_id: u64,
    pub updates: tokio::sync::mpsc::UnboundedReceiver<TopologyChange>,
}
