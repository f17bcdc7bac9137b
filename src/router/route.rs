use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::router::path::{PathFindError, PathHop};
use crate::serde_utils::U64Hex;
use crate::types::{Pubkey, ShortChannelId};

/// One hop of a finished route: the channel to forward over, the node
/// reached through it, and what that node must receive.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteHop {
    /// The node this hop delivers to.
    pub pubkey: Pubkey,
    /// The channel the previous node forwards over.
    pub channel_id: u64,
    #[serde_as(as = "U64Hex")]
    pub amt_to_forward_msat: u64,
    pub outgoing_cltv: u32,
}

/// An ordered sequence of hops from the source to the payment target, with
/// absolute time lock values.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// The time lock of the htlc extended to the first hop.
    pub total_time_lock: u32,
    /// The amount sent into the first channel, fees included.
    #[serde_as(as = "U64Hex")]
    pub total_amount_msat: u64,
    pub source: Pubkey,
    pub hops: Vec<RouteHop>,
}

impl Route {
    pub fn total_fees_msat(&self) -> u64 {
        match self.hops.last() {
            Some(last) => self.total_amount_msat - last.amt_to_forward_msat,
            None => 0,
        }
    }

    /// The amount delivered to the final hop.
    pub fn final_amount_msat(&self) -> u64 {
        self.hops
            .last()
            .map(|hop| hop.amt_to_forward_msat)
            .unwrap_or(0)
    }

    pub fn first_hop_channel(&self) -> Option<ShortChannelId> {
        self.hops
            .first()
            .map(|hop| ShortChannelId::from_u64(hop.channel_id))
    }

    pub fn destination(&self) -> Option<Pubkey> {
        self.hops.last().map(|hop| hop.pubkey)
    }

    /// The node forwarding over hop `index`.
    pub fn hop_source(&self, index: usize) -> Pubkey {
        if index == 0 {
            self.source
        } else {
            self.hops[index - 1].pubkey
        }
    }
}

/// Turn a found path into a route with per-hop amounts and absolute lock
/// times. The final hop receives exactly `amount_msat` at
/// `current_height + final_cltv_delta`; walking backwards, each forwarding
/// node adds the fee and time lock delta of its outgoing channel's policy
/// onto the amount and lock of the preceding channel.
pub(crate) fn new_route(
    amount_msat: u64,
    source: Pubkey,
    path: &[PathHop],
    current_height: u32,
    final_cltv_delta: u16,
) -> Result<Route, PathFindError> {
    if path.is_empty() {
        return Err(PathFindError::NoPath("empty path".to_string()));
    }

    let hop_count = path.len();
    let final_cltv = current_height + final_cltv_delta as u32;

    // Amount and lock carried over each channel of the path. The last
    // channel carries the payment amount itself.
    let mut channel_amt = vec![amount_msat; hop_count];
    let mut channel_cltv = vec![final_cltv; hop_count];
    for i in (0..hop_count - 1).rev() {
        let next_policy = &path[i + 1].policy;
        channel_amt[i] = channel_amt[i + 1] + next_policy.fee_msat(channel_amt[i + 1]);
        channel_cltv[i] = channel_cltv[i + 1] + next_policy.time_lock_delta as u32;
    }

    let hops = path
        .iter()
        .enumerate()
        .map(|(i, hop)| RouteHop {
            pubkey: hop.dest,
            channel_id: hop.channel_id,
            // What the node reached by this hop sends onward; the final
            // node "forwards" the payment amount to its own invoice.
            amt_to_forward_msat: channel_amt.get(i + 1).copied().unwrap_or(amount_msat),
            outgoing_cltv: channel_cltv.get(i + 1).copied().unwrap_or(final_cltv),
        })
        .collect();

    Ok(Route {
        total_time_lock: channel_cltv[0],
        total_amount_msat: channel_amt[0],
        source,
        hops,
    })
}
