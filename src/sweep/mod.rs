pub mod store;
pub mod txbuild;

#[cfg(test)]
pub mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{OutPoint, ScriptBuf, Transaction};
use ractor::{call, Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error as ThisError;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::{
    determine_fee_per_kw, BlockEpoch, ChainNotifier, ChainSource, FeeEstimator, FeePreference,
    InputSigner, PublishError, SpendDetail, SweepScriptGen, TxPublisher,
};
use crate::config::SweeperConfig;
use crate::sweep::store::SweeperStore;
use crate::sweep::txbuild::{build_sweep_tx, generate_input_partitionings, SweepInputDescriptor};
use crate::tasks::TaskTrackerWithCancellation;
use crate::types::FeeRatePerKw;
use crate::{Error, Result};

/// Terminal failure of a sweep request.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SweepError {
    /// The input was spent by a transaction that is not ours.
    #[error("remote party swept utxo")]
    RemoteSpend,

    /// The input exceeded the configured number of publish attempts.
    #[error("sweep failed after max attempts")]
    TooManyAttempts,

    #[error("spend registration failed: {0}")]
    Registration(String),
}

/// The final outcome pushed to every listener of a swept input. `tx` is the
/// transaction that spent the input, ours on success, the remote one on
/// `RemoteSpend`.
#[derive(Clone, Debug)]
pub struct SweepResult {
    pub tx: Option<Transaction>,
    pub error: Option<SweepError>,
}

impl SweepResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Externally visible snapshot of one pending input.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingInputSummary {
    pub outpoint: OutPoint,
    pub value_sat: u64,
    pub witness_weight: u64,
    pub last_fee_rate: Option<FeeRatePerKw>,
    pub broadcast_attempts: u32,
    pub next_broadcast_height: u32,
}

#[derive(Debug)]
pub enum SweeperCommand {
    /// Register an input for eventual sweep; replies with the channel the
    /// final result is delivered on. Duplicate outpoints coalesce onto the
    /// existing pending input.
    SweepInput {
        input: SweepInputDescriptor,
        fee_preference: FeePreference,
        reply: RpcReplyPort<Result<oneshot::Receiver<SweepResult>>>,
    },
    PendingInputs(RpcReplyPort<HashMap<OutPoint, PendingInputSummary>>),
    /// Stateless helper: build a sweep tx without publishing it.
    CreateSweepTx {
        inputs: Vec<SweepInputDescriptor>,
        fee_preference: FeePreference,
        current_height: u32,
        reply: RpcReplyPort<Result<Transaction>>,
    },
}

#[derive(Debug)]
pub enum SweeperEvent {
    SpendDetected(SpendDetail),
    BlockEpoch(BlockEpoch),
    BatchTimerExpired,
}

#[derive(Debug)]
pub enum SweeperMessage {
    Command(SweeperCommand),
    Event(SweeperEvent),
}

struct PendingSweepInput {
    input: SweepInputDescriptor,

    /// Channels over which the final outcome of the sweep is broadcast.
    /// Never loses a listener: coalesced requests append here.
    listeners: Vec<oneshot::Sender<SweepResult>>,

    /// Cancels the chain notifier spend registration.
    ntfn_cancel: Option<CancellationToken>,

    /// Next earliest block at which this input may be (re)published.
    min_publish_height: u32,

    publish_attempts: u32,

    fee_preference: FeePreference,

    /// Most recent fee rate used for this input in a broadcast tx.
    last_fee_rate: Option<FeeRatePerKw>,
}

/// All state owned by the sweeper loop. Mutated only from the actor.
pub struct SweeperState {
    pending_inputs: HashMap<OutPoint, PendingSweepInput>,
    timer_armed: bool,
    current_output_script: Option<ScriptBuf>,
    relay_fee_rate: FeeRatePerKw,
    best_height: u32,
    rng: StdRng,
}

struct InputCluster {
    sweep_fee_rate: FeeRatePerKw,
    outpoints: Vec<OutPoint>,
}

pub struct SweeperArguments<S> {
    pub config: SweeperConfig,
    pub store: S,
    pub chain: Arc<dyn ChainSource>,
    pub notifier: Arc<dyn ChainNotifier>,
    pub fee_estimator: Arc<dyn FeeEstimator>,
    pub publisher: Arc<dyn TxPublisher>,
    pub script_gen: Arc<dyn SweepScriptGen>,
    pub signer: Arc<dyn InputSigner>,

    /// Seed for the retry jitter generator; injected so back-off is
    /// deterministic under test.
    pub rng_seed: u64,
}

pub struct SweeperActor<S> {
    cfg: SweeperConfig,
    store: S,
    chain: Arc<dyn ChainSource>,
    notifier: Arc<dyn ChainNotifier>,
    fee_estimator: Arc<dyn FeeEstimator>,
    publisher: Arc<dyn TxPublisher>,
    script_gen: Arc<dyn SweepScriptGen>,
    signer: Arc<dyn InputSigner>,
    tasks: TaskTrackerWithCancellation,
    quit: CancellationToken,
    rng_seed: u64,
}

#[ractor::async_trait]
impl<S> Actor for SweeperActor<S>
where
    S: SweeperStore + Clone + Send + Sync + 'static,
{
    type Msg = SweeperMessage;
    type State = SweeperState;
    type Arguments = ();

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _args: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        // Republish the last tx in case the previous run crashed between
        // publish and persist. The result does not matter: inputs will be
        // re-offered and retried anyway. Doing this before deriving any new
        // output script prevents a restart loop from exhausting addresses.
        if let Some(last_tx) = self.store.get_last_published_tx()? {
            debug!(txid = %last_tx.compute_txid(), "republishing last sweep tx");
            match self.publisher.publish_transaction(&last_tx).await {
                Ok(()) | Err(PublishError::DoubleSpend) => {}
                Err(err) => error!(%err, "last tx publish"),
            }
        }

        // Relay fee for dust limit and bucket calculations. Assumed not to
        // change from here on.
        let relay_fee_rate = self.fee_estimator.relay_fee_per_kw();

        let (best_hash, best_height) = self.chain.get_best_block().await?;
        debug!(best_height, "sweeper starting");

        let mut epochs = self
            .notifier
            .register_block_epoch_ntfn(Some(BlockEpoch {
                hash: best_hash,
                height: best_height,
            }))
            .await?;

        let pump_target = myself.clone();
        let quit = self.quit.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    epoch = epochs.epochs.recv() => match epoch {
                        Some(epoch) => {
                            if pump_target
                                .send_message(SweeperMessage::Event(SweeperEvent::BlockEpoch(
                                    epoch,
                                )))
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

        Ok(SweeperState {
            pending_inputs: HashMap::new(),
            timer_armed: false,
            current_output_script: None,
            relay_fee_rate,
            best_height,
            rng: StdRng::seed_from_u64(self.rng_seed),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            SweeperMessage::Command(command) => self.handle_command(myself, command, state).await,
            SweeperMessage::Event(event) => self.handle_event(myself, event, state).await,
        }
        Ok(())
    }
}

impl<S> SweeperActor<S>
where
    S: SweeperStore + Clone + Send + Sync + 'static,
{
    async fn handle_command(
        &self,
        myself: ActorRef<SweeperMessage>,
        command: SweeperCommand,
        state: &mut SweeperState,
    ) {
        match command {
            SweeperCommand::SweepInput {
                input,
                fee_preference,
                reply,
            } => {
                self.handle_sweep_input(myself, input, fee_preference, reply, state)
                    .await;
            }

            SweeperCommand::PendingInputs(reply) => {
                let summaries = state
                    .pending_inputs
                    .iter()
                    .map(|(outpoint, pending)| {
                        (
                            *outpoint,
                            PendingInputSummary {
                                outpoint: *outpoint,
                                value_sat: pending.input.value_sat,
                                witness_weight: pending.input.witness_weight,
                                last_fee_rate: pending.last_fee_rate,
                                broadcast_attempts: pending.publish_attempts,
                                next_broadcast_height: pending.min_publish_height,
                            },
                        )
                    })
                    .collect();
                let _ = reply.send(summaries);
            }

            SweeperCommand::CreateSweepTx {
                inputs,
                fee_preference,
                current_height,
                reply,
            } => {
                let result = determine_fee_per_kw(self.fee_estimator.as_ref(), fee_preference)
                    .map_err(Error::from)
                    .and_then(|fee_rate| {
                        let output_script = self.script_gen.gen_sweep_script()?;
                        build_sweep_tx(
                            &inputs,
                            output_script,
                            current_height,
                            fee_rate,
                            self.signer.as_ref(),
                        )
                    });
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_event(
        &self,
        myself: ActorRef<SweeperMessage>,
        event: SweeperEvent,
        state: &mut SweeperState,
    ) {
        match event {
            SweeperEvent::SpendDetected(spend) => {
                // Attribute the spend: ours means success, anything else is
                // a remote sweep.
                let is_ours = match self.store.is_our_tx(&spend.spender_txid) {
                    Ok(is_ours) => is_ours,
                    Err(err) => {
                        error!(
                            txid = %spend.spender_txid,
                            %err,
                            "cannot determine if spending tx is ours"
                        );
                        return;
                    }
                };
                debug!(
                    txid = %spend.spender_txid,
                    is_ours, "detected spend related to in flight inputs"
                );

                for txin in &spend.spending_tx.input {
                    let outpoint = txin.previous_output;

                    // Unknown inputs are possible when the registration was
                    // canceled with the notification already in flight, or
                    // when the tx also spends foreign outputs.
                    if !state.pending_inputs.contains_key(&outpoint) {
                        continue;
                    }

                    let error = if is_ours {
                        None
                    } else {
                        Some(SweepError::RemoteSpend)
                    };
                    self.signal_and_remove(
                        state,
                        &outpoint,
                        SweepResult {
                            tx: Some(spend.spending_tx.clone()),
                            error,
                        },
                    );
                }

                // With an input of ours spent, the remaining ones may form
                // new sets.
                self.schedule_sweep(&myself, state);
            }

            SweeperEvent::BlockEpoch(epoch) => {
                state.best_height = epoch.height;
                debug!(height = epoch.height, hash = %epoch.hash, "new block");
                self.schedule_sweep(&myself, state);
            }

            SweeperEvent::BatchTimerExpired => {
                debug!("sweep timer expired");
                // A new timer must be armed when the next input arrives.
                state.timer_armed = false;

                // Descending fee rate order, so bumped sweeps are broadcast
                // first and displace their predecessors under RBF.
                let mut clusters = self.cluster_by_sweep_fee_rate(state);
                clusters.sort_by(|a, b| b.sweep_fee_rate.cmp(&a.sweep_fee_rate));

                for cluster in clusters {
                    let input_lists = self.get_input_lists(state, &cluster);
                    for inputs in input_lists {
                        if let Err(err) =
                            self.sweep(state, inputs, cluster.sweep_fee_rate).await
                        {
                            error!(%err, "unable to sweep inputs");
                        }
                    }
                }
            }
        }
    }

    async fn handle_sweep_input(
        &self,
        myself: ActorRef<SweeperMessage>,
        input: SweepInputDescriptor,
        fee_preference: FeePreference,
        reply: RpcReplyPort<Result<oneshot::Receiver<SweepResult>>>,
        state: &mut SweeperState,
    ) {
        // A sane fee preference is required up front.
        if let Err(err) = self.fee_rate_for_preference(state.relay_fee_rate, fee_preference) {
            let _ = reply.send(Err(err));
            return;
        }

        info!(
            outpoint = %input.outpoint,
            value_sat = input.value_sat,
            %fee_preference,
            "sweep request received"
        );

        let (result_tx, result_rx) = oneshot::channel();
        let outpoint = input.outpoint;

        if let Some(pending) = state.pending_inputs.get_mut(&outpoint) {
            debug!(%outpoint, "already pending input received");
            pending.listeners.push(result_tx);
            let _ = reply.send(Ok(result_rx));
            return;
        }

        let pk_script = input.pk_script.clone();
        let height_hint = input.height_hint;
        state.pending_inputs.insert(
            outpoint,
            PendingSweepInput {
                input,
                listeners: vec![result_tx],
                ntfn_cancel: None,
                min_publish_height: state.best_height,
                publish_attempts: 0,
                fee_preference,
                last_fee_rate: None,
            },
        );
        let _ = reply.send(Ok(result_rx));

        // Watch for a spend of this input, by us or by the remote party.
        match self
            .notifier
            .register_spend_ntfn(outpoint, pk_script, height_hint)
            .await
        {
            Ok(mut spend_event) => {
                if let Some(pending) = state.pending_inputs.get_mut(&outpoint) {
                    pending.ntfn_cancel = Some(spend_event.cancel.clone());
                }
                let pump_target = myself.clone();
                let quit = self.quit.clone();
                let cancel = spend_event.cancel.clone();
                self.tasks.spawn(async move {
                    tokio::select! {
                        spend = spend_event.spend.recv() => {
                            if let Some(spend) = spend {
                                let _ = pump_target.send_message(SweeperMessage::Event(
                                    SweeperEvent::SpendDetected(spend),
                                ));
                            }
                        }
                        _ = cancel.cancelled() => {}
                        _ = quit.cancelled() => {}
                    }
                });
            }
            Err(err) => {
                self.signal_and_remove(
                    state,
                    &outpoint,
                    SweepResult {
                        tx: None,
                        error: Some(SweepError::Registration(err.to_string())),
                    },
                );
                return;
            }
        }

        // A sweep tx may now be formable.
        self.schedule_sweep(&myself, state);
    }

    /// Start the batch timer when at least one publishable input set
    /// exists. Never more than one timer outstanding.
    fn schedule_sweep(&self, myself: &ActorRef<SweeperMessage>, state: &mut SweeperState) {
        if state.timer_armed {
            debug!("timer still ticking");
            return;
        }

        let clusters = self.cluster_by_sweep_fee_rate(state);
        let start_timer = clusters
            .iter()
            .any(|cluster| !self.get_input_lists(state, cluster).is_empty());
        if !start_timer {
            return;
        }

        state.timer_armed = true;
        myself.send_after(self.cfg.batch_window, || {
            SweeperMessage::Event(SweeperEvent::BatchTimerExpired)
        });
        debug!("sweep timer started");
    }

    fn fee_rate_for_preference(
        &self,
        relay_fee_rate: FeeRatePerKw,
        preference: FeePreference,
    ) -> Result<FeeRatePerKw> {
        let fee_rate = determine_fee_per_kw(self.fee_estimator.as_ref(), preference)?;
        if fee_rate < relay_fee_rate {
            return Err(Error::InvalidFeePreference(format!(
                "fee rate {} below relay fee {}",
                fee_rate, relay_fee_rate
            )));
        }
        if fee_rate > self.cfg.max_fee_rate {
            return Err(Error::InvalidFeePreference(format!(
                "fee rate {} above maximum {}",
                fee_rate, self.cfg.max_fee_rate
            )));
        }
        Ok(fee_rate)
    }

    fn bucket_for_fee_rate(&self, relay_fee_rate: FeeRatePerKw, fee_rate: FeeRatePerKw) -> u64 {
        let min_bucket = relay_fee_rate.0 + self.cfg.fee_rate_bucket_size;
        fee_rate.0.div_ceil(min_bucket)
    }

    /// Group pending inputs into clusters of similar fee rates. Each
    /// cluster sweeps at the arithmetic mean of its inputs' fee rates.
    fn cluster_by_sweep_fee_rate(&self, state: &mut SweeperState) -> Vec<InputCluster> {
        let relay_fee_rate = state.relay_fee_rate;
        let mut bucket_inputs: HashMap<u64, Vec<OutPoint>> = HashMap::new();
        let mut input_fee_rates: HashMap<OutPoint, u64> = HashMap::new();

        for (outpoint, pending) in state.pending_inputs.iter_mut() {
            let fee_rate =
                match determine_fee_per_kw(self.fee_estimator.as_ref(), pending.fee_preference) {
                    Ok(fee_rate) => fee_rate,
                    Err(err) => {
                        warn!(%outpoint, %err, "skipping input");
                        continue;
                    }
                };
            let bucket = self.bucket_for_fee_rate(relay_fee_rate, fee_rate);

            pending.last_fee_rate = Some(fee_rate);
            bucket_inputs.entry(bucket).or_default().push(*outpoint);
            input_fee_rates.insert(*outpoint, fee_rate.0);
        }

        bucket_inputs
            .into_values()
            .map(|outpoints| {
                let sum: u64 = outpoints
                    .iter()
                    .map(|outpoint| input_fee_rates[outpoint])
                    .sum();
                InputCluster {
                    sweep_fee_rate: FeeRatePerKw(sum / outpoints.len() as u64),
                    outpoints,
                }
            })
            .collect()
    }

    /// Construct the publication sets for one cluster: sets drawn from
    /// retried-plus-new inputs first, then sets of only new inputs, so new
    /// inputs always get an isolated chance even when pooled with poisoned
    /// retries.
    fn get_input_lists(
        &self,
        state: &SweeperState,
        cluster: &InputCluster,
    ) -> Vec<Vec<SweepInputDescriptor>> {
        let mut new_inputs = vec![];
        let mut retry_inputs = vec![];
        for outpoint in &cluster.outpoints {
            let Some(pending) = state.pending_inputs.get(outpoint) else {
                continue;
            };
            if pending.min_publish_height > state.best_height {
                continue;
            }
            if pending.publish_attempts == 0 {
                new_inputs.push(pending.input.clone());
            } else {
                retry_inputs.push(pending.input.clone());
            }
        }

        let mut all_sets = vec![];
        if !retry_inputs.is_empty() {
            let mut combined = retry_inputs;
            combined.extend(new_inputs.iter().cloned());
            all_sets = generate_input_partitionings(
                combined,
                cluster.sweep_fee_rate,
                self.cfg.max_inputs_per_tx,
            );
        }

        let new_sets = generate_input_partitionings(
            new_inputs,
            cluster.sweep_fee_rate,
            self.cfg.max_inputs_per_tx,
        );

        all_sets.extend(new_sets);
        all_sets
    }

    /// Build, record, publish, and reschedule one input set.
    async fn sweep(
        &self,
        state: &mut SweeperState,
        inputs: Vec<SweepInputDescriptor>,
        fee_rate: FeeRatePerKw,
    ) -> Result<()> {
        // Reuse the cached output script until a publication succeeds, so
        // failed publishes cause no address inflation.
        let output_script = match &state.current_output_script {
            Some(script) => script.clone(),
            None => {
                let script = self.script_gen.gen_sweep_script()?;
                state.current_output_script = Some(script.clone());
                script
            }
        };

        let tx = build_sweep_tx(
            &inputs,
            output_script,
            state.best_height,
            fee_rate,
            self.signer.as_ref(),
        )?;

        // Record the tx before publication: a spend by this tx must stay
        // recognizable as ours even if the publish call never returns.
        self.store.notify_publish_tx(&tx)?;

        debug!(
            txid = %tx.compute_txid(),
            num_inputs = tx.input.len(),
            height = state.best_height,
            "publishing sweep tx"
        );

        let publish_result = self.publisher.publish_transaction(&tx).await;
        let publish_result = match publish_result {
            Ok(()) => Ok(()),
            // Treated as soft success; some conflicting version of this
            // sweep is already out there.
            Err(PublishError::DoubleSpend) => Ok(()),
            Err(err) => Err(err),
        };

        if publish_result.is_ok() {
            state.current_output_script = None;
        }

        // Retry accounting for every input of the built tx, whatever the
        // publish outcome: even a successful publish may need a retry.
        for txin in &tx.input {
            let outpoint = txin.previous_output;

            // The input can be gone already when a previous set exceeded
            // its maximum number of attempts.
            let mut exceeded = false;
            if let Some(pending) = state.pending_inputs.get_mut(&outpoint) {
                pending.publish_attempts += 1;
                let delta = next_attempt_delta(&mut state.rng, pending.publish_attempts);
                pending.min_publish_height = state.best_height + delta;
                debug!(
                    %outpoint,
                    attempts = pending.publish_attempts,
                    min_publish_height = pending.min_publish_height,
                    "rescheduling input"
                );
                exceeded = pending.publish_attempts >= self.cfg.max_sweep_attempts;
            }
            if exceeded {
                self.signal_and_remove(
                    state,
                    &outpoint,
                    SweepResult {
                        tx: None,
                        error: Some(SweepError::TooManyAttempts),
                    },
                );
            }
        }

        publish_result.map_err(Error::from)
    }

    /// Deliver the final result to every listener, cancel the pending spend
    /// notification, and forget the input entirely.
    fn signal_and_remove(
        &self,
        state: &mut SweeperState,
        outpoint: &OutPoint,
        result: SweepResult,
    ) {
        let Some(mut pending) = state.pending_inputs.remove(outpoint) else {
            return;
        };

        debug!(
            %outpoint,
            listeners = pending.listeners.len(),
            success = result.is_success(),
            "dispatching sweep result"
        );

        for listener in pending.listeners.drain(..) {
            let _ = listener.send(result.clone());
        }

        // Keep canceling even on success: a reorg could still revert the
        // spend.
        if let Some(cancel) = pending.ntfn_cancel.take() {
            debug!(%outpoint, "canceling spend ntfn");
            cancel.cancel();
        }
    }
}

/// Exponential back-off with jitter for the next sweep attempt, so a stuck
/// tx cannot block all other retried inputs in the same tx.
fn next_attempt_delta(rng: &mut StdRng, attempts: u32) -> u32 {
    let spread = 1u32 << (attempts - 1).min(24);
    1 + rng.gen_range(0..spread)
}

/// Sweeps outputs back into the wallet, batching them by fee rate and
/// retrying publication with back-off until spent or exhausted.
pub struct UtxoSweeper {
    actor: ActorRef<SweeperMessage>,
    tasks: TaskTrackerWithCancellation,
}

impl UtxoSweeper {
    /// Republish the last sweep, register for block epochs, and launch the
    /// event loop.
    pub async fn start<S>(args: SweeperArguments<S>) -> Result<Self>
    where
        S: SweeperStore + Clone + Send + Sync + 'static,
    {
        let tasks = TaskTrackerWithCancellation::new();
        let quit = tasks.cancellation_token();

        let actor_body = SweeperActor {
            cfg: args.config,
            store: args.store,
            chain: args.chain,
            notifier: args.notifier,
            fee_estimator: args.fee_estimator,
            publisher: args.publisher,
            script_gen: args.script_gen,
            signer: args.signer,
            tasks: tasks.clone(),
            quit,
            rng_seed: args.rng_seed,
        };

        let (actor, _handle) = Actor::spawn(None, actor_body, ()).await?;

        Ok(Self { actor, tasks })
    }

    pub async fn stop(&self) {
        self.tasks.close().await;
        self.actor.stop(None);
    }

    /// Register an input for sweeping. The returned channel delivers the
    /// final result; a duplicate outpoint gets a fresh channel attached to
    /// the same pending input.
    pub async fn sweep_input(
        &self,
        input: SweepInputDescriptor,
        fee_preference: FeePreference,
    ) -> Result<oneshot::Receiver<SweepResult>> {
        call!(self.actor, |reply| SweeperMessage::Command(
            SweeperCommand::SweepInput {
                input,
                fee_preference,
                reply,
            }
        ))
        .map_err(|_| Error::SweeperShuttingDown)?
    }

    /// Snapshot of the inputs currently being swept, owned by the caller.
    pub async fn pending_inputs(&self) -> Result<HashMap<OutPoint, PendingInputSummary>> {
        call!(self.actor, |reply| SweeperMessage::Command(
            SweeperCommand::PendingInputs(reply)
        ))
        .map_err(|_| Error::SweeperShuttingDown)
    }

    /// Build a sweep tx for the given inputs without publishing it.
    pub async fn create_sweep_tx(
        &self,
        inputs: Vec<SweepInputDescriptor>,
        fee_preference: FeePreference,
        current_height: u32,
    ) -> Result<Transaction> {
        call!(self.actor, |reply| SweeperMessage::Command(
            SweeperCommand::CreateSweepTx {
                inputs,
                fee_preference,
                current_height,
                reply,
            }
        ))
        .map_err(|_| Error::SweeperShuttingDown)?
    }
}
