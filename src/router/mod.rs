pub mod graph;
pub mod path;
pub mod payment;
pub mod route;

pub(crate) mod barrier;

#[cfg(test)]
pub mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bitcoin::{OutPoint, TxOut};
use once_cell::sync::OnceCell;
use ractor::{call, Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::chain::{
    gen_multisig_script, with_io_timeout, witness_script_hash, ChainSource, EdgePoint,
    FilteredBlock, FilteredChainView,
};
use crate::config::RouterConfig;
use crate::now_timestamp_secs;
use crate::router::barrier::{ChannelLockMap, ValidationBarrier};
use crate::router::graph::{
    ChannelAuthProof, ChannelEdgeUpdate, ChannelFlags, ChannelInfo, ChannelPolicy, GossipRecord,
    GraphStore, NodeInfo, NodeUpdate, TopologyChange, TopologyClient,
};
use crate::router::path::{find_path, RestrictParams};
use crate::router::payment::{
    ControlTower, HtlcDispatcher, LightningPayment, MissionControl, OnionPacketer,
    PaymentCreationInfo, PaymentLifecycle, PaymentSessionSource, DEFAULT_FINAL_CLTV_DELTA,
};
use crate::router::route::{new_route, Route};
use crate::tasks::TaskTrackerWithCancellation;
use crate::types::{Hash256, Preimage, Pubkey, ShortChannelId};
use crate::{Error, Result};

/// Shared state of a running router: everything the event loop, the
/// validation workers and the payment lifecycles need to reach.
pub(crate) struct RouterCore<S> {
    pub(crate) cfg: RouterConfig,
    pub(crate) store: S,
    pub(crate) chain: Arc<dyn ChainSource>,
    pub(crate) chain_view: Arc<dyn FilteredChainView>,
    pub(crate) dispatcher: Arc<dyn HtlcDispatcher>,
    pub(crate) session_source: Arc<dyn PaymentSessionSource>,
    pub(crate) onion: Arc<dyn OnionPacketer>,

    /// The center of the star graph. Never pruned.
    pub(crate) self_node: NodeInfo,

    /// Height of the chain tip as seen by the router. Shared with payment
    /// lifecycles, hence atomic.
    pub(crate) best_height: AtomicU32,

    /// Set when a non-contiguous block notification was observed; the next
    /// block event re-runs the chain sync before processing.
    pub(crate) resync_required: AtomicBool,

    pub(crate) barrier: ValidationBarrier,
    pub(crate) channel_locks: ChannelLockMap,
    pub(crate) tasks: TaskTrackerWithCancellation,
    pub(crate) quit: CancellationToken,

    /// Backreference to the event loop, set during actor startup. Used by
    /// payment lifecycles to route policy updates through the loop.
    pub(crate) actor: OnceCell<ActorRef<RouterMessage>>,
}

impl<S> RouterCore<S>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    /// Submit a policy through the serialized update path, as any gossip
    /// update would travel.
    pub(crate) async fn apply_policy_update(&self, policy: ChannelPolicy) -> Result<()> {
        let Some(actor) = self.actor.get() else {
            return Err(Error::RouterShuttingDown);
        };
        call!(actor, |reply| RouterMessage::Command(
            RouterCommand::ProcessUpdate(GossipRecord::Policy(policy), reply)
        ))
        .map_err(|_| Error::RouterShuttingDown)?
    }
}

#[derive(Debug)]
pub enum RouterCommand {
    /// A gossip record to validate and apply; the outcome is delivered on
    /// the reply channel once validation dependencies are satisfied.
    ProcessUpdate(GossipRecord, RpcReplyPort<Result<()>>),
    /// Attach an authentication proof to an existing edge.
    AddProof(ShortChannelId, ChannelAuthProof, RpcReplyPort<Result<()>>),
    SubscribeTopology(RpcReplyPort<TopologyClient>),
    UnsubscribeTopology(u64),
}

#[derive(Debug)]
pub enum RouterEvent {
    BlockConnected(FilteredBlock),
    BlockDisconnected(FilteredBlock),
    TopologyChanged(TopologyChange),
    PruneTick,
}

#[derive(Debug)]
pub enum RouterMessage {
    Command(RouterCommand),
    Event(RouterEvent),
}

pub struct RouterActor<S> {
    core: Arc<RouterCore<S>>,
}

pub struct RouterState {
    topology_clients: HashMap<u64, mpsc::UnboundedSender<TopologyChange>>,
    next_client_id: u64,
}

#[ractor::async_trait]
impl<S> Actor for RouterActor<S>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    type Msg = RouterMessage;
    type State = RouterState;
    type Arguments = ();

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        let core = &self.core;
        let _ = core.actor.set(myself.clone());

        let (best_hash, best_height) =
            with_io_timeout(core.cfg.chain_io_timeout, core.chain.get_best_block()).await?;
        core.best_height.store(best_height, Ordering::Release);

        // A graph that has never been pruned starts its prune tip at the
        // current chain tip.
        if core.store.prune_tip()?.is_none() {
            core.store.prune_graph(&[], best_hash, best_height)?;
        }

        if core.cfg.assume_channel_valid {
            // Without spentness checks, zombie pruning is the only way
            // closed channels leave the graph.
            prune_zombie_channels(core)?;
        } else {
            core.chain_view.start().await?;

            // Install the filter before walking the chain so no on-chain
            // event is missed in between.
            let channel_view = core.store.channel_view()?;
            if !channel_view.is_empty() {
                info!(
                    channels = channel_view.len(),
                    "filtering chain with active channels"
                );
                core.chain_view
                    .update_filter(channel_view, best_height)
                    .await?;
            }

            sync_graph_with_chain(core).await?;

            core.store.prune_graph_nodes()?;

            // Pump chain view streams into the event loop. The streams close
            // on shutdown, ending the task.
            let mut filtered = core.chain_view.filtered_blocks();
            let mut disconnected = core.chain_view.disconnected_blocks();
            let pump_target = myself.clone();
            let quit = core.quit.clone();
            core.tasks.spawn(async move {
                loop {
                    tokio::select! {
                        block = filtered.recv() => match block {
                            Some(block) => {
                                if pump_target
                                    .send_message(RouterMessage::Event(
                                        RouterEvent::BlockConnected(block),
                                    ))
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            None => return,
                        },
                        block = disconnected.recv() => match block {
                            Some(block) => {
                                if pump_target
                                    .send_message(RouterMessage::Event(
                                        RouterEvent::BlockDisconnected(block),
                                    ))
                                    .is_err()
                                {
                                    return;
                                }
                            }
                            None => return,
                        },
                        _ = quit.cancelled() => return,
                    }
                }
            });
        }

        // Resume payments that were in flight when we went down, with empty
        // sessions so no new attempts are produced.
        let in_flight = core.store.fetch_in_flight_payments()?;
        for payment in in_flight {
            info!(payment_hash = %payment.info.payment_hash, "resuming in-flight payment");
            let session = core.session_source.new_payment_session_empty();
            let target = payment
                .attempt
                .as_ref()
                .and_then(|attempt| attempt.route.destination())
                .unwrap_or(core.self_node.node_id);
            let lightning_payment = LightningPayment {
                target,
                amount_msat: payment.info.value_msat,
                fee_limit_msat: None,
                payment_hash: payment.info.payment_hash,
                final_cltv_delta: None,
                pay_attempt_timeout: None,
                outgoing_channel_id: None,
                cltv_limit: None,
                payment_request: payment.info.payment_request.clone(),
            };
            let lifecycle = PaymentLifecycle::new(
                self.core.clone(),
                lightning_payment,
                session,
                best_height,
                payment.attempt,
            );
            let hash = payment.info.payment_hash;
            core.tasks.spawn(async move {
                match lifecycle.resume_payment().await {
                    Ok(_) => info!(payment_hash = %hash, "resumed payment completed"),
                    Err(err) => error!(payment_hash = %hash, %err, "resumed payment failed"),
                }
            });
        }

        myself.send_interval(core.cfg.graph_prune_interval, || {
            RouterMessage::Event(RouterEvent::PruneTick)
        });

        Ok(RouterState {
            topology_clients: HashMap::new(),
            next_client_id: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            RouterMessage::Command(command) => {
                self.handle_command(myself, command, state).await;
            }
            RouterMessage::Event(event) => {
                self.handle_event(event, state).await;
            }
        }
        Ok(())
    }
}

impl<S> RouterActor<S>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    async fn handle_command(
        &self,
        myself: ActorRef<RouterMessage>,
        command: RouterCommand,
        state: &mut RouterState,
    ) {
        match command {
            RouterCommand::ProcessUpdate(record, reply) => {
                // Validation is farmed out to the bounded worker pool; the
                // barrier orders dependent records and the reply fires once
                // the record committed (or was rejected).
                let core = self.core.clone();
                let notify = myself.clone();
                self.core.tasks.spawn(async move {
                    let permit = match core.barrier.init_job_dependencies(&record).await {
                        Ok(permit) => permit,
                        Err(err) => {
                            let _ = reply.send(Err(err));
                            return;
                        }
                    };

                    let result = match core.barrier.wait_for_dependants(&record).await {
                        Ok(()) => process_update(&core, &record).await,
                        Err(err) => {
                            if !matches!(err, Error::BarrierShuttingDown) {
                                warn!(%err, "unexpected error during barrier wait");
                            }
                            Err(err)
                        }
                    };

                    core.barrier.signal_dependants(&record, result.is_ok());
                    drop(permit);

                    let accepted = result.is_ok();
                    let _ = reply.send(result);

                    if accepted {
                        let change = topology_change_for(&core, &record);
                        if !change.is_empty() {
                            let _ = notify.send_message(RouterMessage::Event(
                                RouterEvent::TopologyChanged(change),
                            ));
                        }
                    }
                });
            }

            RouterCommand::AddProof(channel_id, proof, reply) => {
                let result = self.add_proof(channel_id, proof);
                let _ = reply.send(result);
            }

            RouterCommand::SubscribeTopology(reply) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let client_id = state.next_client_id;
                state.next_client_id += 1;
                state.topology_clients.insert(client_id, tx);
                debug!(client_id, "new topology client");
                let _ = reply.send(TopologyClient {
                    client_id,
                    updates: rx,
                });
            }

            RouterCommand::UnsubscribeTopology(client_id) => {
                state.topology_clients.remove(&client_id);
            }
        }
    }

    async fn handle_event(&self, event: RouterEvent, state: &mut RouterState) {
        match event {
            RouterEvent::BlockConnected(block) => {
                self.handle_block_connected(block, state).await;
            }

            RouterEvent::BlockDisconnected(block) => {
                // The block is stale: our best height moves to its parent
                // and the graph store unwinds it.
                let core = &self.core;
                core.best_height
                    .store(block.height.saturating_sub(1), Ordering::Release);
                if let Err(err) = core.store.disconnect_block_at_height(block.height) {
                    error!(%err, height = block.height, "unable to prune graph with stale block");
                }
            }

            RouterEvent::TopologyChanged(change) => {
                Self::notify_topology_change(state, change);
            }

            RouterEvent::PruneTick => {
                if let Err(err) = prune_zombie_channels(&self.core) {
                    error!(%err, "unable to prune zombies");
                }
            }
        }
    }

    async fn handle_block_connected(&self, block: FilteredBlock, state: &mut RouterState) {
        let core = &self.core;

        // A previously detected gap is repaired by re-running the chain
        // sync before looking at this block.
        if core.resync_required.swap(false, Ordering::AcqRel) {
            if let Err(err) = sync_graph_with_chain(core).await {
                error!(%err, "chain re-synchronization failed");
                core.resync_required.store(true, Ordering::Release);
                return;
            }
        }

        let current_height = core.best_height.load(Ordering::Acquire);
        if block.height != current_height + 1 {
            if block.height > current_height {
                error!(
                    expected = current_height + 1,
                    got = block.height,
                    "out of order block; scheduling resync"
                );
                core.resync_required.store(true, Ordering::Release);
            }
            return;
        }

        core.best_height.store(block.height, Ordering::Release);
        info!(hash = %block.hash, height = block.height, "pruning channel graph using block");

        let spent_outpoints = block.spent_outpoints();
        let closed = match core
            .store
            .prune_graph(&spent_outpoints, block.hash, block.height)
        {
            Ok(closed) => closed,
            Err(err) => {
                error!(%err, "unable to prune routing table");
                return;
            }
        };

        info!(
            height = block.height,
            closed = closed.len(),
            "block closed channels"
        );

        if !closed.is_empty() {
            Self::notify_topology_change(
                state,
                TopologyChange {
                    closed_channels: closed,
                    ..Default::default()
                },
            );
        }
    }

    fn notify_topology_change(state: &mut RouterState, change: TopologyChange) {
        state
            .topology_clients
            .retain(|_, client| client.send(change.clone()).is_ok());
    }

    fn add_proof(&self, channel_id: ShortChannelId, proof: ChannelAuthProof) -> Result<()> {
        let id = channel_id.to_u64();
        let Some((mut info, _, _)) = self.core.store.fetch_channel_edges_by_id(id)? else {
            return Err(Error::Ignored(format!(
                "no edge found for chan_id={}",
                channel_id
            )));
        };
        info.auth_proof = Some(proof);
        self.core.store.update_channel_edge(info)
    }
}

/// Process a new authenticated gossip record. Returns `Ignored`/`Outdated`
/// when the record does not affect state.
pub(crate) async fn process_update<S>(core: &Arc<RouterCore<S>>, record: &GossipRecord) -> Result<()>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    match record {
        GossipRecord::Node(node) => {
            assert_node_ann_freshness(core, &node.node_id, node.last_update)?;
            core.store.add_node(node.clone())?;
            info!(node = %node.node_id, "updated vertex data for node");
            Ok(())
        }

        GossipRecord::Channel(info) => {
            let status = core.store.has_channel_edge(info.channel_id)?;
            if status.is_zombie {
                return Err(Error::Ignored(format!(
                    "ignoring msg for zombie chan_id={}",
                    info.channel_id
                )));
            }
            if status.exists {
                return Err(Error::Ignored(format!(
                    "ignoring msg for known chan_id={}",
                    info.channel_id
                )));
            }

            if core.cfg.assume_channel_valid {
                core.store.add_channel_edge(info.clone())?;
                info!(
                    chan_id = info.channel_id,
                    node1 = %info.node1,
                    node2 = %info.node2,
                    "new channel discovered"
                );
                return Ok(());
            }

            // Reconstruct the funding output from the channel id and verify
            // the declared keys and capacity against the utxo set.
            let channel_id = info.short_channel_id();
            let (outpoint, _txout) = fetch_chan_point(core, &channel_id).await?;

            let witness_script = gen_multisig_script(&info.bitcoin_key1, &info.bitcoin_key2);
            let funding_pk_script = witness_script_hash(&witness_script);

            let utxo = core
                .chain
                .get_utxo(
                    &outpoint,
                    &funding_pk_script,
                    channel_id.block_height,
                    core.quit.clone(),
                )
                .await?;

            if utxo.script_pubkey != funding_pk_script {
                return Err(Error::FundingMismatch(format!(
                    "pkscript mismatch for chan_id={}: expected {:x}, got {:x}",
                    info.channel_id, funding_pk_script, utxo.script_pubkey
                )));
            }

            let mut info = info.clone();
            info.capacity_sat = utxo.value.to_sat();
            info.outpoint = outpoint;
            core.store.add_channel_edge(info.clone())?;

            info!(
                chan_id = info.channel_id,
                outpoint = %info.outpoint,
                capacity_sat = info.capacity_sat,
                "new channel discovered"
            );

            // Watch the funding outpoint so a future spend closes the
            // channel.
            core.chain_view
                .update_filter(
                    vec![EdgePoint {
                        outpoint,
                        funding_pk_script,
                    }],
                    core.best_height.load(Ordering::Acquire),
                )
                .await?;
            Ok(())
        }

        GossipRecord::Policy(policy) => {
            // Serialize policy writes per channel id; other validation
            // workers may race on the same channel.
            let _guard = core.channel_locks.lock(policy.channel_id).await;

            let mut status = core.store.has_channel_edge(policy.channel_id)?;

            if status.is_zombie {
                let age = now_timestamp_secs().saturating_sub(policy.last_update);
                if age > core.cfg.channel_prune_expiry.as_secs() {
                    return Err(Error::Ignored(format!(
                        "ignoring stale update for zombie chan_id={}",
                        policy.channel_id
                    )));
                }

                // A fresh update revives the channel before the policy is
                // applied.
                core.store.mark_edge_live(policy.channel_id)?;
                status = core.store.has_channel_edge(policy.channel_id)?;
                info!(chan_id = policy.channel_id, "zombie channel revived by fresh update");
            }

            if !status.exists {
                return Err(Error::Ignored(format!(
                    "ignoring update for unknown chan_id={}",
                    policy.channel_id
                )));
            }

            if let Some(stored) = status.last_update_for(policy.direction()) {
                if stored >= policy.last_update {
                    return Err(Error::Outdated(format!(
                        "ignoring outdated update for known chan_id={}",
                        policy.channel_id
                    )));
                }
            }

            core.store.update_edge_policy(policy.clone())?;
            trace!(chan_id = policy.channel_id, "new channel update applied");
            Ok(())
        }
    }
}

/// `Ignored` when the vertex participates in no known channel (DoS
/// defense), `Outdated` when the stored announcement is at least as new.
fn assert_node_ann_freshness<S>(
    core: &Arc<RouterCore<S>>,
    node: &Pubkey,
    msg_timestamp: u64,
) -> Result<()>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let (last_update, exists) = core.store.has_node(node)?;
    if !exists {
        return Err(Error::Ignored(format!(
            "ignoring node announcement for node not found in channel graph ({})",
            node
        )));
    }
    if last_update >= msg_timestamp {
        return Err(Error::Outdated(format!(
            "ignoring outdated announcement for {}",
            node
        )));
    }
    Ok(())
}

/// Retrieve the funding outpoint encoded within a short channel id.
async fn fetch_chan_point<S>(
    core: &Arc<RouterCore<S>>,
    channel_id: &ShortChannelId,
) -> Result<(OutPoint, TxOut)>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let timeout = core.cfg.chain_io_timeout;
    let block_hash =
        with_io_timeout(timeout, core.chain.get_block_hash(channel_id.block_height)).await?;
    let block = with_io_timeout(timeout, core.chain.get_block(&block_hash)).await?;

    let num_txns = block.txdata.len() as u32;
    if channel_id.tx_index >= num_txns {
        return Err(Error::FundingMismatch(format!(
            "tx_index={} out of range (max_index={}) for chan_id={}",
            channel_id.tx_index,
            num_txns.saturating_sub(1),
            channel_id
        )));
    }

    let funding_tx = &block.txdata[channel_id.tx_index as usize];
    let vout = channel_id.output_index as u32;
    let Some(txout) = funding_tx.output.get(vout as usize) else {
        return Err(Error::FundingMismatch(format!(
            "output_index={} out of range for chan_id={}",
            vout, channel_id
        )));
    };

    Ok((
        OutPoint::new(funding_tx.compute_txid(), vout),
        txout.clone(),
    ))
}

/// Synchronize the channel graph with the latest utxo set state: walk back
/// off a stale branch, then walk forward pruning each missed block.
pub(crate) async fn sync_graph_with_chain<S>(core: &Arc<RouterCore<S>>) -> Result<()>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let timeout = core.cfg.chain_io_timeout;
    let (best_hash, best_height) = with_io_timeout(timeout, core.chain.get_best_block()).await?;
    core.best_height.store(best_height, Ordering::Release);

    let Some((mut prune_hash, mut prune_height)) = core.store.prune_tip()? else {
        // Never pruned: the graph has seen no block and no created channel.
        return Ok(());
    };

    info!(height = prune_height, hash = %prune_hash, "prune tip for channel graph");

    if prune_hash == best_hash && prune_height == best_height {
        return Ok(());
    }

    // While on a stale branch, walk backwards to the first common block.
    let mut main_hash = with_io_timeout(timeout, core.chain.get_block_hash(prune_height)).await?;
    while prune_hash != main_hash {
        info!(
            height = prune_height,
            hash = %prune_hash,
            "channel graph is stale, disconnecting block"
        );
        core.store.disconnect_block_at_height(prune_height)?;

        match core.store.prune_tip()? {
            // Back to a graph that has seen nothing; nothing left to prune.
            None => return Ok(()),
            Some((hash, height)) => {
                prune_hash = hash;
                prune_height = height;
            }
        }
        main_hash = with_io_timeout(timeout, core.chain.get_block_hash(prune_height)).await?;
    }

    info!(
        from_height = prune_height,
        to_height = best_height,
        "syncing channel graph with chain"
    );

    let mut channels_closed = 0usize;
    for next_height in (prune_height + 1)..=best_height {
        // Long rescans must not block shutdown.
        if core.quit.is_cancelled() {
            return Err(Error::RouterShuttingDown);
        }

        let next_hash = with_io_timeout(timeout, core.chain.get_block_hash(next_height)).await?;
        let block = core.chain_view.filter_block(&next_hash).await?;
        let spent_outpoints = block.spent_outpoints();
        let closed = core
            .store
            .prune_graph(&spent_outpoints, next_hash, next_height)?;
        channels_closed += closed.len();
    }

    info!(
        channels_closed,
        since_height = prune_height,
        "graph pruning complete"
    );
    Ok(())
}

/// Collect and delete zombie channels: both half-edges stale beyond the
/// prune expiry (and, under assume-channel-valid, both disabled), excluding
/// any channel touching the self node. Unreferenced nodes go with them.
pub(crate) fn prune_zombie_channels<S>(core: &Arc<RouterCore<S>>) -> Result<()>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let expiry = core.cfg.channel_prune_expiry.as_secs();
    let now = now_timestamp_secs();
    let self_node = core.self_node.node_id;

    info!("examining channel graph for zombie channels");

    let mut channels_to_prune = vec![];
    for (info, edge1, edge2) in core.store.get_channels()? {
        // Our own channels are re-advertised by the subsystem above us.
        if info.node1 == self_node || info.node2 == self_node {
            continue;
        }

        let edge1_zombie = edge1
            .as_ref()
            .map(|policy| now.saturating_sub(policy.last_update) >= expiry)
            .unwrap_or(false);
        let edge2_zombie = edge2
            .as_ref()
            .map(|policy| now.saturating_sub(policy.last_update) >= expiry)
            .unwrap_or(false);
        let mut is_zombie = edge1_zombie && edge2_zombie;

        // Both directions disabled usually signals an on-chain close we
        // cannot observe directly.
        if core.cfg.assume_channel_valid && !is_zombie {
            let edge1_disabled = edge1.as_ref().map(|p| p.is_disabled()).unwrap_or(false);
            let edge2_disabled = edge2.as_ref().map(|p| p.is_disabled()).unwrap_or(false);
            is_zombie = edge1_disabled && edge2_disabled;
        }

        if !is_zombie {
            continue;
        }

        debug!(chan_id = info.channel_id, "channel is a zombie, collecting to prune");
        channels_to_prune.push(info.channel_id);
    }

    info!(count = channels_to_prune.len(), "pruning zombie channels");
    core.store.delete_channel_edges(&channels_to_prune)?;
    core.store.prune_graph_nodes()?;
    Ok(())
}

/// Fold an accepted update into the notification sent to topology clients.
fn topology_change_for<S>(core: &Arc<RouterCore<S>>, record: &GossipRecord) -> TopologyChange
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let mut change = TopologyChange::default();
    match record {
        GossipRecord::Node(node) => {
            change.node_updates.push(NodeUpdate {
                node_id: node.node_id,
                last_update: node.last_update,
                alias: node.alias.clone(),
                addresses: node.addresses.clone(),
            });
        }
        // A channel becomes interesting to clients once a policy arrives.
        GossipRecord::Channel(_) => {}
        GossipRecord::Policy(policy) => {
            if let Ok(Some((info, _, _))) =
                core.store.fetch_channel_edges_by_id(policy.channel_id)
            {
                let (advertising, connecting) = if policy.direction() == 0 {
                    (info.node1, info.node2)
                } else {
                    (info.node2, info.node1)
                };
                change.channel_edge_updates.push(ChannelEdgeUpdate {
                    channel_id: policy.channel_id,
                    outpoint: info.outpoint,
                    capacity_sat: info.capacity_sat,
                    advertising_node: advertising,
                    connecting_node: connecting,
                    time_lock_delta: policy.time_lock_delta,
                    htlc_minimum_msat: policy.htlc_minimum_msat,
                    htlc_maximum_msat: policy.htlc_maximum_msat,
                    fee_base_msat: policy.fee_base_msat,
                    fee_proportional_millionths: policy.fee_proportional_millionths,
                    disabled: policy.is_disabled(),
                });
            }
        }
    }
    change
}

/// Arguments wiring a [`ChannelRouter`] to its collaborators.
pub struct RouterArguments<S> {
    pub config: RouterConfig,
    pub store: S,
    pub chain: Arc<dyn ChainSource>,
    pub chain_view: Arc<dyn FilteredChainView>,
    pub dispatcher: Arc<dyn HtlcDispatcher>,
    pub onion: Arc<dyn OnionPacketer>,
    /// Defaults to [`MissionControl`] over the graph store.
    pub session_source: Option<Arc<dyn PaymentSessionSource>>,
}

/// The layer-3 router: responds to route queries, dispatches multi-hop
/// payments, and prunes the channel graph as new blocks spend known funding
/// outpoints.
pub struct ChannelRouter<S> {
    core: Arc<RouterCore<S>>,
    actor: ActorRef<RouterMessage>,
}

impl<S> ChannelRouter<S>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    /// Synchronize the graph with the chain, resume in-flight payments, and
    /// launch the event loop.
    pub async fn start(args: RouterArguments<S>) -> Result<Self> {
        let self_node = args
            .store
            .source_node()?
            .ok_or_else(|| Error::Store("graph has no source node".to_string()))?;

        let tasks = TaskTrackerWithCancellation::new();
        let quit = tasks.cancellation_token();

        let session_source = args.session_source.unwrap_or_else(|| {
            Arc::new(MissionControl::new(args.store.clone(), self_node.node_id))
        });

        let core = Arc::new(RouterCore {
            barrier: ValidationBarrier::new(args.config.validation_workers, quit.clone()),
            cfg: args.config,
            store: args.store,
            chain: args.chain,
            chain_view: args.chain_view,
            dispatcher: args.dispatcher,
            session_source,
            onion: args.onion,
            self_node,
            best_height: AtomicU32::new(0),
            resync_required: AtomicBool::new(false),
            channel_locks: ChannelLockMap::default(),
            tasks,
            quit,
            actor: OnceCell::new(),
        });

        let (actor, _handle) = Actor::spawn(None, RouterActor { core: core.clone() }, ()).await?;

        Ok(Self { core, actor })
    }

    /// Halt the event loop and every helper task. Pending calls fail with
    /// `RouterShuttingDown`.
    pub async fn stop(&self) {
        if !self.core.cfg.assume_channel_valid {
            self.core.chain_view.stop().await;
        }
        self.core.tasks.close().await;
        self.actor.stop(None);
    }

    async fn submit_update(&self, record: GossipRecord) -> Result<()> {
        call!(self.actor, |reply| RouterMessage::Command(
            RouterCommand::ProcessUpdate(record, reply)
        ))
        .map_err(|_| Error::RouterShuttingDown)?
    }

    /// Add information about a node. Ignored unless the vertex already
    /// participates in a known channel.
    pub async fn add_node(&self, node: NodeInfo) -> Result<()> {
        self.submit_update(GossipRecord::Node(node)).await
    }

    /// Add a channel to the topology, verifying its funding output against
    /// the chain unless assume-channel-valid is set.
    pub async fn add_edge(&self, info: ChannelInfo) -> Result<()> {
        self.submit_update(GossipRecord::Channel(info)).await
    }

    /// Apply a directed policy to an existing channel.
    pub async fn update_edge(&self, policy: ChannelPolicy) -> Result<()> {
        self.submit_update(GossipRecord::Policy(policy)).await
    }

    pub async fn add_proof(&self, channel_id: ShortChannelId, proof: ChannelAuthProof) -> Result<()> {
        call!(self.actor, |reply| RouterMessage::Command(
            RouterCommand::AddProof(channel_id, proof, reply)
        ))
        .map_err(|_| Error::RouterShuttingDown)?
    }

    pub async fn subscribe_topology(&self) -> Result<TopologyClient> {
        call!(self.actor, |reply| RouterMessage::Command(
            RouterCommand::SubscribeTopology(reply)
        ))
        .map_err(|_| Error::RouterShuttingDown)
    }

    pub fn unsubscribe_topology(&self, client_id: u64) {
        let _ = self
            .actor
            .send_message(RouterMessage::Command(RouterCommand::UnsubscribeTopology(
                client_id,
            )));
    }

    /// True if we have a newer announcement for the node, or none of its
    /// channels at all.
    pub fn is_stale_node(&self, node: &Pubkey, timestamp: u64) -> bool {
        assert_node_ann_freshness(&self.core, node, timestamp).is_err()
    }

    /// True if the channel id is known, live or zombie.
    pub fn is_known_edge(&self, channel_id: ShortChannelId) -> bool {
        self.core
            .store
            .has_channel_edge(channel_id.to_u64())
            .map(|status| status.exists || status.is_zombie)
            .unwrap_or(false)
    }

    /// True iff submitting a same-direction update with this timestamp
    /// would be rejected as outdated or stale.
    pub fn is_stale_edge_policy(
        &self,
        channel_id: ShortChannelId,
        timestamp: u64,
        flags: ChannelFlags,
    ) -> bool {
        let Ok(status) = self.core.store.has_channel_edge(channel_id.to_u64()) else {
            return false;
        };

        if status.is_zombie {
            // Under assume-channel-valid a still-disabled policy keeps the
            // channel dead regardless of freshness.
            if self.core.cfg.assume_channel_valid && flags.contains(ChannelFlags::DISABLED) {
                return true;
            }
            return now_timestamp_secs().saturating_sub(timestamp)
                > self.core.cfg.channel_prune_expiry.as_secs();
        }

        if !status.exists {
            return false;
        }

        let direction = if flags.contains(ChannelFlags::DIRECTION) {
            1
        } else {
            0
        };
        match status.last_update_for(direction) {
            Some(stored) => stored >= timestamp,
            None => false,
        }
    }

    pub fn is_public_node(&self, node: &Pubkey) -> Result<bool> {
        self.core.store.is_public_node(node)
    }

    #[allow(clippy::type_complexity)]
    pub fn get_channel_by_id(
        &self,
        channel_id: ShortChannelId,
    ) -> Result<Option<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>> {
        self.core.store.fetch_channel_edges_by_id(channel_id.to_u64())
    }

    pub fn fetch_node(&self, node: &Pubkey) -> Result<Option<NodeInfo>> {
        self.core.store.fetch_node(node)
    }

    pub fn for_each_node(&self, mut f: impl FnMut(&NodeInfo)) -> Result<()> {
        for node in self.core.store.get_nodes()? {
            f(&node);
        }
        Ok(())
    }

    pub fn for_each_channel(
        &self,
        mut f: impl FnMut(&ChannelInfo, Option<&ChannelPolicy>, Option<&ChannelPolicy>),
    ) -> Result<()> {
        for (info, edge1, edge2) in self.core.store.get_channels()? {
            f(&info, edge1.as_ref(), edge2.as_ref());
        }
        Ok(())
    }

    /// Iterate the channels emanating from the self node, with the policy
    /// we advertise for each.
    pub fn for_all_outgoing_channels(
        &self,
        mut f: impl FnMut(&ChannelInfo, &ChannelPolicy),
    ) -> Result<()> {
        let self_node = self.core.self_node.node_id;
        for (info, edge1, edge2) in self.core.store.node_channels(&self_node)? {
            let own_policy = match info.direction_from(&self_node) {
                Some(0) => edge1,
                Some(_) => edge2,
                None => None,
            };
            match own_policy {
                Some(policy) => f(&info, &policy),
                None => warn!(
                    chan_id = info.channel_id,
                    "channel from self node has no policy"
                ),
            }
        }
        Ok(())
    }

    pub fn current_block_height(&self) -> u32 {
        self.core.best_height.load(Ordering::Acquire)
    }

    pub fn mark_edge_live(&self, channel_id: ShortChannelId) -> Result<()> {
        self.core.store.mark_edge_live(channel_id.to_u64())
    }

    /// Query for the optimum route able to carry `amount_msat` to the
    /// target after fees.
    pub async fn find_route(
        &self,
        source: Pubkey,
        target: Pubkey,
        amount_msat: u64,
        restrictions: RestrictParams,
        final_cltv_delta: Option<u16>,
    ) -> Result<Route> {
        let (_, exists) = self.core.store.has_node(&target)?;
        if !exists {
            debug!(%target, "target is not in known graph");
            return Err(Error::TargetNotInNetwork);
        }

        let path = find_path(
            &self.core.store,
            source,
            target,
            amount_msat,
            &restrictions,
        )
        .map_err(|err| Error::NoPathFound(err.to_string()))?;

        let current_height = self.current_block_height();
        new_route(
            amount_msat,
            source,
            &path,
            current_height,
            final_cltv_delta.unwrap_or(DEFAULT_FINAL_CLTV_DELTA),
        )
        .map_err(|err| Error::NoPathFound(err.to_string()))
    }

    fn prepare_payment(&self, payment: &LightningPayment) -> Result<Box<dyn payment::PaymentSession>> {
        let session = self.core.session_source.new_payment_session(payment)?;

        self.core.store.init_payment(
            payment.payment_hash,
            PaymentCreationInfo {
                payment_hash: payment.payment_hash,
                value_msat: payment.amount_msat,
                creation_time: now_timestamp_secs(),
                payment_request: payment.payment_request.clone(),
            },
        )?;

        Ok(session)
    }

    /// Send a payment, blocking until it settles or terminally fails.
    /// Returns the preimage and the route that carried the payment.
    pub async fn send_payment(&self, payment: LightningPayment) -> Result<(Preimage, Route)> {
        let session = self.prepare_payment(&payment)?;
        let lifecycle = PaymentLifecycle::new(
            self.core.clone(),
            payment,
            session,
            self.current_block_height(),
            None,
        );
        lifecycle.resume_payment().await
    }

    /// Non-blocking [`Self::send_payment`]; the outcome is retrieved via
    /// the control tower.
    pub async fn send_payment_async(&self, payment: LightningPayment) -> Result<()> {
        let session = self.prepare_payment(&payment)?;
        let hash = payment.payment_hash;
        let lifecycle = PaymentLifecycle::new(
            self.core.clone(),
            payment,
            session,
            self.current_block_height(),
            None,
        );
        self.core.tasks.spawn(async move {
            if let Err(err) = lifecycle.resume_payment().await {
                error!(payment_hash = %hash, %err, "payment failed");
            }
        });
        Ok(())
    }

    /// Send a payment along the provided route only. A route failure
    /// surfaces the structured wire failure, never a generic error.
    pub async fn send_to_route(&self, hash: Hash256, route: Route) -> Result<Preimage> {
        let Some(target) = route.destination() else {
            return Err(Error::NoPathFound("route has no hops".to_string()));
        };
        let amount_msat = route.total_amount_msat - route.total_fees_msat();

        let session = self.core.session_source.new_payment_session_for_route(route);

        self.core.store.init_payment(
            hash,
            PaymentCreationInfo {
                payment_hash: hash,
                value_msat: amount_msat,
                creation_time: now_timestamp_secs(),
                payment_request: vec![],
            },
        )?;

        let payment = LightningPayment {
            target,
            amount_msat,
            fee_limit_msat: None,
            payment_hash: hash,
            final_cltv_delta: None,
            pay_attempt_timeout: None,
            outgoing_channel_id: None,
            cltv_limit: None,
            payment_request: vec![],
        };

        let lifecycle = PaymentLifecycle::new(
            self.core.clone(),
            payment,
            session,
            self.current_block_height(),
            None,
        );

        match lifecycle.resume_payment().await {
            Ok((preimage, _route)) => Ok(preimage),
            // The provided route failed: surface the failure that ended it.
            Err(Error::NoRoute {
                last_error: Some(error),
            }) => Err(Error::PaymentFailure(error)),
            Err(Error::NoRoute { last_error: None }) => {
                Err(Error::Store("failure message missing".to_string()))
            }
            Err(err) => Err(err),
        }
    }
}
