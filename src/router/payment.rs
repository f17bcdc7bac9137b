use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::router::graph::GraphStore;
use crate::router::path::{find_path, RestrictParams};
use crate::router::route::{new_route, Route};
use crate::router::RouterCore;
use crate::types::{
    ChannelUpdate, FailureMessage, ForwardingError, Hash256, OnionPacket, Preimage, Privkey,
    Pubkey, ShortChannelId,
};
use crate::{Error, Result};

/// CLTV delta for the final hop when the payment does not specify one.
pub const DEFAULT_FINAL_CLTV_DELTA: u16 = 40;

/// A payment to be sent through the network to the final destination.
#[derive(Clone, Debug)]
pub struct LightningPayment {
    pub target: Pubkey,
    pub amount_msat: u64,

    /// The payment fails if there is no route cheaper than this.
    pub fee_limit_msat: Option<u64>,

    pub payment_hash: Hash256,
    pub final_cltv_delta: Option<u16>,

    /// Duration after which no further attempts are sent. `None` means the
    /// payment never times out.
    pub pay_attempt_timeout: Option<Duration>,

    /// The channel the first hop must be taken over, if restricted.
    pub outgoing_channel_id: Option<u64>,

    pub cltv_limit: Option<u32>,

    /// The serialized payment request being fulfilled, if any.
    pub payment_request: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentCreationInfo {
    pub payment_hash: Hash256,
    pub value_msat: u64,
    pub creation_time: u64,
    pub payment_request: Vec<u8>,
}

/// Everything needed to await and resume a single outstanding htlc.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttemptInfo {
    pub payment_id: u64,
    pub session_key: Privkey,
    pub route: Route,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFailureReason {
    Timeout,
    NoRoute,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InFlightPayment {
    pub info: PaymentCreationInfo,
    pub attempt: Option<PaymentAttemptInfo>,
}

/// Crash-safe persistence of payment state. Guarantees at most one
/// outstanding attempt per payment hash across restarts.
pub trait ControlTower: Send + Sync {
    /// Record the intent to pay. Fails with `PaymentInFlight` when an
    /// attempt for this hash is outstanding and `PaymentAlreadySucceeded`
    /// when a preimage is already stored.
    fn init_payment(&self, hash: Hash256, info: PaymentCreationInfo) -> Result<()>;

    fn register_attempt(&self, hash: Hash256, attempt: PaymentAttemptInfo) -> Result<()>;

    fn mark_success(&self, hash: Hash256, preimage: Preimage) -> Result<()>;

    fn mark_failed(&self, hash: Hash256, reason: PaymentFailureReason) -> Result<()>;

    fn fetch_in_flight_payments(&self) -> Result<Vec<InFlightPayment>>;

    /// Monotonic dispenser of attempt ids, unique across restarts.
    fn next_payment_id(&self) -> Result<u64>;
}

/// The htlc handed to the dispatcher for the first hop.
#[derive(Clone, Debug, PartialEq)]
pub struct HtlcAdd {
    pub payment_hash: Hash256,
    pub amount_msat: u64,
    pub expiry: u32,
    pub onion: OnionPacket,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PaymentResult {
    Settled { preimage: Preimage },
    Failed { error: ForwardingError },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The dispatcher has no record of the attempt id.
    #[error("payment id not found")]
    PaymentIdNotFound,
    /// The dispatcher is shutting down.
    #[error("dispatcher shutting down")]
    Shutdown,
    /// The htlc failed before or at the first hop; classified like any
    /// other forwarding failure.
    #[error("forwarding failure: {0}")]
    Forwarding(ForwardingError),
}

/// Link-layer sender that transmits encrypted payment packets and reports
/// per-attempt outcomes. A received result guarantees the htlc is no longer
/// in flight; a dropped result channel signals dispatcher shutdown.
#[ractor::async_trait]
pub trait HtlcDispatcher: Send + Sync {
    async fn send_htlc(
        &self,
        first_hop: ShortChannelId,
        payment_id: u64,
        htlc: HtlcAdd,
    ) -> std::result::Result<(), DispatchError>;

    async fn get_payment_result(
        &self,
        payment_id: u64,
        payment_hash: Hash256,
        decrypter: Arc<dyn ErrorDecrypter>,
    ) -> std::result::Result<oneshot::Receiver<PaymentResult>, DispatchError>;
}

/// Decrypts an onion failure blob into the reporting vertex and failure
/// message. One per attempt, derived from its ephemeral session key.
pub trait ErrorDecrypter: Send + Sync {
    fn decrypt(&self, encrypted: &[u8]) -> Result<ForwardingError>;
}

/// Narrow interface to sphinx packet construction. Assumed correct.
pub trait OnionPacketer: Send + Sync {
    /// A fresh ephemeral session key, never reused across attempts.
    fn generate_session_key(&self) -> Privkey;

    fn generate_onion(
        &self,
        route: &Route,
        payment_hash: &Hash256,
        session_key: &Privkey,
    ) -> Result<OnionPacket>;

    fn error_decrypter(&self, session_key: &Privkey, route: &Route) -> Arc<dyn ErrorDecrypter>;
}

/// A directed channel between two route vertices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirectedEdge {
    pub from: Pubkey,
    pub to: Pubkey,
    pub channel_id: u64,
}

impl DirectedEdge {
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
            channel_id: self.channel_id,
        }
    }

    /// Direction bit of the half-edge `from` forwards over.
    pub fn direction(&self) -> u8 {
        if self.from < self.to {
            0
        } else {
            1
        }
    }
}

/// Produces candidate routes for one payment and absorbs failure reports to
/// steer later candidates away from bad vertices and edges.
pub trait PaymentSession: Send {
    fn request_route(
        &mut self,
        payment: &LightningPayment,
        current_height: u32,
        final_cltv_delta: u16,
    ) -> Option<Route>;

    fn report_vertex_failure(&mut self, vertex: Pubkey);

    fn report_edge_failure(&mut self, edge: DirectedEdge, amt_msat: u64);

    fn report_edge_policy_failure(&mut self, edge: DirectedEdge);
}

pub trait PaymentSessionSource: Send + Sync {
    fn new_payment_session(&self, payment: &LightningPayment) -> Result<Box<dyn PaymentSession>>;

    /// Session that will only attempt the given pre-built route, once.
    fn new_payment_session_for_route(&self, route: Route) -> Box<dyn PaymentSession>;

    /// Session that is exhausted immediately. Used for resumed payments that
    /// must not make additional attempts.
    fn new_payment_session_empty(&self) -> Box<dyn PaymentSession>;
}

#[derive(Default)]
struct MissionControlInner {
    pruned_vertices: HashSet<Pubkey>,
    pruned_edges: HashSet<(u64, u8)>,
    policy_failures: HashMap<(u64, u8), u32>,
}

/// Shared memory of pruned vertices and edges across payment executions.
/// Errors reported by nodes are mapped into prunes so the next path-finding
/// run avoids them.
pub struct MissionControl<S> {
    store: S,
    self_node: Pubkey,
    inner: Arc<Mutex<MissionControlInner>>,
}

impl<S: GraphStore + Clone + Send + Sync + 'static> MissionControl<S> {
    pub fn new(store: S, self_node: Pubkey) -> Self {
        Self {
            store,
            self_node,
            inner: Arc::new(Mutex::new(MissionControlInner::default())),
        }
    }
}

impl<S: GraphStore + Clone + Send + Sync + 'static> PaymentSessionSource for MissionControl<S> {
    fn new_payment_session(&self, _payment: &LightningPayment) -> Result<Box<dyn PaymentSession>> {
        Ok(Box::new(MissionControlSession {
            store: self.store.clone(),
            self_node: self.self_node,
            inner: self.inner.clone(),
        }))
    }

    fn new_payment_session_for_route(&self, route: Route) -> Box<dyn PaymentSession> {
        Box::new(PreBuiltRouteSession {
            route: Some(route),
            inner: self.inner.clone(),
        })
    }

    fn new_payment_session_empty(&self) -> Box<dyn PaymentSession> {
        Box::new(EmptySession)
    }
}

struct MissionControlSession<S> {
    store: S,
    self_node: Pubkey,
    inner: Arc<Mutex<MissionControlInner>>,
}

fn report_vertex(inner: &Mutex<MissionControlInner>, vertex: Pubkey) {
    debug!(%vertex, "reporting vertex failure to mission control");
    inner
        .lock()
        .expect("mission control lock")
        .pruned_vertices
        .insert(vertex);
}

fn report_edge(inner: &Mutex<MissionControlInner>, edge: DirectedEdge, amt_msat: u64) {
    debug!(
        channel_id = edge.channel_id,
        direction = edge.direction(),
        amt_msat,
        "reporting edge failure to mission control"
    );
    inner
        .lock()
        .expect("mission control lock")
        .pruned_edges
        .insert((edge.channel_id, edge.direction()));
}

fn report_edge_policy(inner: &Mutex<MissionControlInner>, edge: DirectedEdge) {
    let mut inner = inner.lock().expect("mission control lock");
    let failures = inner
        .policy_failures
        .entry((edge.channel_id, edge.direction()))
        .or_insert(0);
    *failures += 1;

    // First policy failure gets a second chance with the corrected policy
    // applied; repeated failures prune the edge.
    if *failures > 1 {
        inner.pruned_edges.insert((edge.channel_id, edge.direction()));
    }
}

impl<S: GraphStore + Clone + Send + Sync + 'static> PaymentSession for MissionControlSession<S> {
    fn request_route(
        &mut self,
        payment: &LightningPayment,
        current_height: u32,
        final_cltv_delta: u16,
    ) -> Option<Route> {
        let restrictions = {
            let inner = self.inner.lock().expect("mission control lock");
            RestrictParams {
                fee_limit_msat: payment.fee_limit_msat,
                outgoing_channel_id: payment.outgoing_channel_id,
                cltv_limit: payment.cltv_limit,
                ignored_nodes: inner.pruned_vertices.clone(),
                ignored_edges: inner.pruned_edges.clone(),
            }
        };

        let path = match find_path(
            &self.store,
            self.self_node,
            payment.target,
            payment.amount_msat,
            &restrictions,
        ) {
            Ok(path) => path,
            Err(err) => {
                debug!(%err, "payment session out of routes");
                return None;
            }
        };

        new_route(
            payment.amount_msat,
            self.self_node,
            &path,
            current_height,
            final_cltv_delta,
        )
        .ok()
    }

    fn report_vertex_failure(&mut self, vertex: Pubkey) {
        report_vertex(&self.inner, vertex);
    }

    fn report_edge_failure(&mut self, edge: DirectedEdge, amt_msat: u64) {
        report_edge(&self.inner, edge, amt_msat);
    }

    fn report_edge_policy_failure(&mut self, edge: DirectedEdge) {
        report_edge_policy(&self.inner, edge);
    }
}

struct PreBuiltRouteSession {
    route: Option<Route>,
    inner: Arc<Mutex<MissionControlInner>>,
}

impl PaymentSession for PreBuiltRouteSession {
    fn request_route(
        &mut self,
        _payment: &LightningPayment,
        _current_height: u32,
        _final_cltv_delta: u16,
    ) -> Option<Route> {
        self.route.take()
    }

    fn report_vertex_failure(&mut self, vertex: Pubkey) {
        report_vertex(&self.inner, vertex);
    }

    fn report_edge_failure(&mut self, edge: DirectedEdge, amt_msat: u64) {
        report_edge(&self.inner, edge, amt_msat);
    }

    fn report_edge_policy_failure(&mut self, edge: DirectedEdge) {
        report_edge_policy(&self.inner, edge);
    }
}

struct EmptySession;

impl PaymentSession for EmptySession {
    fn request_route(
        &mut self,
        _payment: &LightningPayment,
        _current_height: u32,
        _final_cltv_delta: u16,
    ) -> Option<Route> {
        None
    }

    fn report_vertex_failure(&mut self, _vertex: Pubkey) {}

    fn report_edge_failure(&mut self, _edge: DirectedEdge, _amt_msat: u64) {}

    fn report_edge_policy_failure(&mut self, _edge: DirectedEdge) {}
}

/// Per-payment state machine. One instance per `send_payment*` call; after a
/// restart one instance per in-flight attempt, constructed with an empty
/// session so no new routes are produced.
pub(crate) struct PaymentLifecycle<S> {
    pub core: Arc<RouterCore<S>>,
    pub payment: LightningPayment,
    pub session: Box<dyn PaymentSession>,
    pub current_height: u32,
    pub final_cltv_delta: u16,
    pub attempt: Option<PaymentAttemptInfo>,
    pub last_error: Option<ForwardingError>,
    pub deadline: Option<tokio::time::Instant>,
}

enum LifecycleState {
    NeedRoute,
    AwaitingResult(PaymentAttemptInfo),
}

impl<S> PaymentLifecycle<S>
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        core: Arc<RouterCore<S>>,
        payment: LightningPayment,
        session: Box<dyn PaymentSession>,
        current_height: u32,
        attempt: Option<PaymentAttemptInfo>,
    ) -> Self {
        let final_cltv_delta = payment.final_cltv_delta.unwrap_or(DEFAULT_FINAL_CLTV_DELTA);
        let deadline = payment
            .pay_attempt_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);
        Self {
            core,
            payment,
            session,
            current_height,
            final_cltv_delta,
            attempt,
            last_error: None,
            deadline,
        }
    }

    /// Drive the payment to a terminal state: a preimage and the route that
    /// produced it, or the classified error that ended it.
    pub(crate) async fn resume_payment(mut self) -> Result<(Preimage, Route)> {
        let hash = self.payment.payment_hash;

        loop {
            let state = match self.attempt.take() {
                Some(attempt) => LifecycleState::AwaitingResult(attempt),
                None => LifecycleState::NeedRoute,
            };

            let attempt = match state {
                LifecycleState::NeedRoute => match self.send_next_attempt(hash).await? {
                    Some(attempt) => attempt,
                    // Classified non-terminal failure at send time; try the
                    // next candidate route.
                    None => continue,
                },
                LifecycleState::AwaitingResult(attempt) => attempt,
            };

            match self.await_result(hash, attempt).await? {
                None => continue,
                Some(done) => return Ok(done),
            }
        }
    }

    /// Pull the next route from the session and hand an htlc to the
    /// dispatcher. Returns the registered attempt, or `None` when the send
    /// failed with a non-terminal failure and the loop should retry.
    async fn send_next_attempt(&mut self, hash: Hash256) -> Result<Option<PaymentAttemptInfo>> {
        let Some(route) =
            self.session
                .request_route(&self.payment, self.current_height, self.final_cltv_delta)
        else {
            self.core
                .store
                .mark_failed(hash, PaymentFailureReason::NoRoute)?;
            return Err(Error::NoRoute {
                last_error: self.last_error.clone(),
            });
        };
        let Some(first_hop) = route.first_hop_channel() else {
            self.core
                .store
                .mark_failed(hash, PaymentFailureReason::NoRoute)?;
            return Err(Error::NoRoute {
                last_error: self.last_error.clone(),
            });
        };

        let session_key = self.core.onion.generate_session_key();
        let onion = self.core.onion.generate_onion(&route, &hash, &session_key)?;
        let payment_id = self.core.store.next_payment_id()?;

        let attempt = PaymentAttemptInfo {
            payment_id,
            session_key,
            route,
        };
        self.core.store.register_attempt(hash, attempt.clone())?;

        let htlc = HtlcAdd {
            payment_hash: hash,
            amount_msat: attempt.route.total_amount_msat,
            expiry: attempt.route.total_time_lock,
            onion,
        };

        debug!(
            payment_hash = %hash,
            payment_id,
            hops = attempt.route.hops.len(),
            total_amount_msat = attempt.route.total_amount_msat,
            "dispatching htlc for payment attempt"
        );

        match self
            .core
            .dispatcher
            .send_htlc(first_hop, payment_id, htlc)
            .await
        {
            Ok(()) => Ok(Some(attempt)),
            Err(DispatchError::Forwarding(fwd_err)) => {
                self.classify_failure(hash, &attempt.route, fwd_err).await?;
                Ok(None)
            }
            Err(DispatchError::Shutdown) => Err(Error::RouterShuttingDown),
            Err(DispatchError::PaymentIdNotFound) => Err(Error::PaymentIdNotFound),
        }
    }

    /// Await the dispatcher's verdict for an outstanding attempt. Returns
    /// `Some` on settlement, `None` when the loop should pick another route.
    async fn await_result(
        &mut self,
        hash: Hash256,
        attempt: PaymentAttemptInfo,
    ) -> Result<Option<(Preimage, Route)>> {
        let decrypter = self
            .core
            .onion
            .error_decrypter(&attempt.session_key, &attempt.route);

        let result_rx = match self
            .core
            .dispatcher
            .get_payment_result(attempt.payment_id, hash, decrypter)
            .await
        {
            Ok(result_rx) => result_rx,
            Err(DispatchError::PaymentIdNotFound) => {
                // The dispatcher lost the attempt; it is no longer in
                // flight. Fatal to the attempt, and the session decides
                // whether another one is made.
                warn!(
                    payment_hash = %hash,
                    payment_id = attempt.payment_id,
                    "dispatcher has no result for attempt"
                );
                return Ok(None);
            }
            Err(DispatchError::Shutdown) => return Err(Error::RouterShuttingDown),
            Err(DispatchError::Forwarding(fwd_err)) => {
                return Err(Error::PaymentFailure(fwd_err))
            }
        };

        let deadline = self.deadline;
        let timeout = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = result_rx => match result {
                Ok(PaymentResult::Settled { preimage }) => {
                    self.core.store.mark_success(hash, preimage)?;
                    info!(payment_hash = %hash, "payment settled");
                    Ok(Some((preimage, attempt.route)))
                }
                Ok(PaymentResult::Failed { error }) => {
                    self.classify_failure(hash, &attempt.route, error).await?;
                    Ok(None)
                }
                // Dispatcher closed the channel: it is shutting down.
                Err(_) => Err(Error::RouterShuttingDown),
            },
            _ = timeout => {
                self.core
                    .store
                    .mark_failed(hash, PaymentFailureReason::Timeout)?;
                Err(Error::PaymentAttemptTimeout {
                    last_error: self.last_error.clone(),
                })
            }
            _ = self.core.quit.cancelled() => Err(Error::RouterShuttingDown),
        }
    }

    /// Run the send-error classifier. Terminal failures mark the payment
    /// failed and surface as errors; non-terminal ones record the last error
    /// and return so the caller loops.
    async fn classify_failure(
        &mut self,
        hash: Hash256,
        route: &Route,
        fwd_err: ForwardingError,
    ) -> Result<()> {
        let terminal =
            process_send_error(&self.core, self.session.as_mut(), route, &fwd_err).await;
        self.last_error = Some(fwd_err.clone());

        if terminal {
            self.core
                .store
                .mark_failed(hash, PaymentFailureReason::Error)?;
            return Err(Error::PaymentFailure(fwd_err));
        }
        Ok(())
    }
}

/// Analyze a forwarding failure, update mission control and channel
/// policies, and decide whether the payment is terminally failed. Returns
/// true when no further routes should be attempted.
pub(crate) async fn process_send_error<S>(
    core: &Arc<RouterCore<S>>,
    session: &mut dyn PaymentSession,
    route: &Route,
    fwd_err: &ForwardingError,
) -> bool
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let error_vertex = fwd_err.error_source;
    debug!(source = %error_vertex, failure = %fwd_err.failure, "classifying htlc failure");

    // Always determine the channel ourselves; a channel update inside the
    // failure may be absent or lying.
    let Some((failed_edge, failed_amt)) = get_failed_edge(route, &error_vertex) else {
        error!(source = %error_vertex, "error source not found in route");
        return true;
    };

    match &fwd_err.failure {
        // Failures of the payment details at the destination terminate the
        // payment immediately.
        FailureMessage::UnknownPaymentHash
        | FailureMessage::IncorrectPaymentAmount
        | FailureMessage::FinalIncorrectCltvExpiry
        | FailureMessage::FinalIncorrectHtlcAmount
        | FailureMessage::FinalExpiryTooSoon
        | FailureMessage::InvalidRealm
        | FailureMessage::InvalidOnionVersion
        | FailureMessage::InvalidOnionHmac
        | FailureMessage::InvalidOnionKey => true,

        // The reporting node does not know the correct block height; prune
        // it and move on.
        FailureMessage::ExpiryTooSoon { update } => {
            apply_channel_update(core, update, &error_vertex).await;
            session.report_vertex_failure(error_vertex);
            false
        }

        // Policy disagreements: apply the corrected policy and retry. An
        // update that cannot be applied prunes the edge outright.
        FailureMessage::AmountBelowMinimum { update, .. }
        | FailureMessage::FeeInsufficient { update, .. }
        | FailureMessage::IncorrectCltvExpiry { update, .. } => {
            let update_ok = apply_channel_update(core, update, &error_vertex).await;
            if !update_ok {
                session.report_edge_failure(failed_edge, 0);
            }
            session.report_edge_policy_failure(failed_edge);
            false
        }

        FailureMessage::ChannelDisabled { update } => {
            apply_channel_update(core, update, &error_vertex).await;
            session.report_edge_failure(failed_edge, 0);
            false
        }

        FailureMessage::TemporaryChannelFailure { update } => {
            if let Some(update) = update {
                apply_channel_update(core, update, &error_vertex).await;
            }
            session.report_edge_failure(failed_edge, failed_amt);
            false
        }

        // Conservatively prune only the channel we attempted; this handles
        // faulty channels and guards against nodes blacklisting others.
        FailureMessage::UnknownNextPeer => {
            session.report_edge_failure(failed_edge, 0);
            false
        }

        FailureMessage::TemporaryNodeFailure
        | FailureMessage::PermanentNodeFailure
        | FailureMessage::RequiredNodeFeatureMissing
        | FailureMessage::RequiredChannelFeatureMissing
        | FailureMessage::ExpiryTooFar => {
            session.report_vertex_failure(error_vertex);
            false
        }

        FailureMessage::PermanentChannelFailure => {
            session.report_edge_failure(failed_edge, 0);
            session.report_edge_failure(failed_edge.reversed(), 0);
            false
        }
    }
}

/// Validate a channel update attached to a failure and feed it through the
/// regular update path. `Ignored`/`Outdated` responses count as success.
pub(crate) async fn apply_channel_update<S>(
    core: &Arc<RouterCore<S>>,
    update: &ChannelUpdate,
    pubkey: &Pubkey,
) -> bool
where
    S: GraphStore + ControlTower + Clone + Send + Sync + 'static,
{
    let channel = match core.store.fetch_channel_edges_by_id(update.channel_id) {
        Ok(Some((info, _, _))) => info,
        Ok(None) => {
            error!(channel_id = update.channel_id, "unable to retrieve channel by id");
            return false;
        }
        Err(err) => {
            error!(%err, "unable to retrieve channel by id");
            return false;
        }
    };

    if !update.verify(pubkey) {
        error!(
            channel_id = update.channel_id,
            "channel update signature does not verify against error source"
        );
        return false;
    }
    if update.htlc_maximum_msat > channel.capacity_sat * 1000 {
        error!(
            channel_id = update.channel_id,
            "channel update htlc maximum exceeds channel capacity"
        );
        return false;
    }

    match core
        .apply_policy_update(crate::router::graph::ChannelPolicy::from(update))
        .await
    {
        Ok(()) => true,
        Err(err) if err.is_benign_update_result() => true,
        Err(err) => {
            error!(%err, "unable to apply channel update");
            false
        }
    }
}

/// Locate the failing channel in a route given the reporting vertex,
/// walking hops left to right. The final hop failing blames its incoming
/// channel; any other error source blames its outgoing channel. Also
/// returns the amount sent into that channel.
pub(crate) fn get_failed_edge(
    route: &Route,
    error_source: &Pubkey,
) -> Option<(DirectedEdge, u64)> {
    let hop_count = route.hops.len();
    let mut from_node = route.source;
    let mut amt = route.total_amount_msat;

    for (i, hop) in route.hops.iter().enumerate() {
        let to_node = hop.pubkey;
        let final_hop_failing = i == hop_count - 1 && *error_source == to_node;

        if *error_source == from_node || final_hop_failing {
            return Some((
                DirectedEdge {
                    from: from_node,
                    to: to_node,
                    channel_id: hop.channel_id,
                },
                amt,
            ));
        }

        from_node = to_node;
        amt = hop.amt_to_forward_msat;
    }

    None
}
