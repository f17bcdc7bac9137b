use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::Hash as _;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, Transaction, TxIn,
    TxMerkleNode, TxOut, Txid, WPubkeyHash, Witness,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::chain::{
    gen_multisig_script, witness_script_hash, BlockEpoch, BlockEpochStream, ChainError,
    ChainNotifier, ChainSource, EdgePoint, FeeEstimator, FilteredBlock, FilteredChainView,
    InputSigner, PublishError, SignDescriptor, SpendDetail, SpendEvent, SweepScriptGen,
    TxPublisher,
};
use crate::config::RouterConfig;
use crate::now_timestamp_secs;
use crate::router::graph::{ChannelFlags, ChannelInfo, ChannelPolicy, MessageFlags, NodeInfo};
use crate::router::payment::{
    DirectedEdge, DispatchError, ErrorDecrypter, HtlcAdd, HtlcDispatcher, LightningPayment,
    OnionPacketer, PaymentResult, PaymentSession, PaymentSessionSource,
};
use crate::router::route::Route;
use crate::router::{ChannelRouter, RouterArguments};
use crate::store::Store;
use crate::sweep::txbuild::SweepInputDescriptor;
use crate::types::{FeeRatePerKw, Hash256, OnionPacket, Privkey, Pubkey, ShortChannelId};
use crate::{Error, Result};

pub fn generate_privkey(seed: u8) -> Privkey {
    Privkey::from_slice(&[seed.max(1); 32])
}

pub fn generate_pubkey(seed: u8) -> Pubkey {
    generate_privkey(seed).pubkey()
}

/// Poll until `cond` holds, failing the test after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub fn node_info(key: &Privkey, last_update: u64) -> NodeInfo {
    NodeInfo {
        node_id: key.pubkey(),
        last_update,
        features: 0,
        alias: String::new(),
        addresses: vec![],
        signature: None,
    }
}

/// A channel between the two keys, endpoints ordered lexicographically and
/// funding keys equal to the node keys.
pub fn channel_info(
    channel_id: ShortChannelId,
    key_a: Pubkey,
    key_b: Pubkey,
    capacity_sat: u64,
) -> ChannelInfo {
    let (node1, node2) = if key_a < key_b {
        (key_a, key_b)
    } else {
        (key_b, key_a)
    };
    let mut txid_bytes = [0u8; 32];
    txid_bytes[..8].copy_from_slice(&channel_id.to_u64().to_be_bytes());
    ChannelInfo {
        channel_id: channel_id.to_u64(),
        node1,
        node2,
        bitcoin_key1: node1,
        bitcoin_key2: node2,
        features: 0,
        outpoint: OutPoint::new(
            Txid::from_byte_array(txid_bytes),
            channel_id.output_index as u32,
        ),
        capacity_sat,
        auth_proof: None,
    }
}

pub fn channel_policy(
    channel_id: ShortChannelId,
    direction: u8,
    last_update: u64,
    fee_base_msat: u64,
    fee_proportional_millionths: u64,
) -> ChannelPolicy {
    let mut channel_flags = ChannelFlags::empty();
    if direction == 1 {
        channel_flags |= ChannelFlags::DIRECTION;
    }
    ChannelPolicy {
        channel_id: channel_id.to_u64(),
        last_update,
        message_flags: MessageFlags::OPTION_CHANNEL_HTLC_MAX,
        channel_flags,
        time_lock_delta: 144,
        htlc_minimum_msat: 0,
        htlc_maximum_msat: 100_000_000_000,
        fee_base_msat,
        fee_proportional_millionths,
        signature: None,
    }
}

/// A funding transaction paying `value_sat` into the 2-of-2 multisig of the
/// two keys at output 0. Returns the tx and the funding pk script.
pub fn funding_tx(key1: &Pubkey, key2: &Pubkey, value_sat: u64, salt: u8) -> (Transaction, ScriptBuf) {
    let witness_script = gen_multisig_script(key1, key2);
    let pk_script = witness_script_hash(&witness_script);
    let tx = Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([salt; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value_sat),
            script_pubkey: pk_script.clone(),
        }],
    };
    (tx, pk_script)
}

/// A minimal transaction spending the given outpoint.
pub fn spend_tx(outpoint: OutPoint, salt: u8) -> Transaction {
    Transaction {
        version: bitcoin::transaction::Version::TWO,
        lock_time: bitcoin::absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([salt; 20])),
        }],
    }
}

fn make_block(prev: BlockHash, height: u32, txs: Vec<Transaction>) -> Block {
    // Commit to the first transaction so sibling blocks with different
    // contents get different hashes.
    let merkle_root = txs
        .first()
        .map(|tx| TxMerkleNode::from_byte_array(tx.compute_txid().to_byte_array()))
        .unwrap_or_else(TxMerkleNode::all_zeros);
    Block {
        header: Header {
            version: BlockVersion::TWO,
            prev_blockhash: prev,
            merkle_root,
            time: height,
            bits: CompactTarget::from_consensus(0x207fffff),
            nonce: 0,
        },
        txdata: txs,
    }
}

#[derive(Default)]
struct MockChainInner {
    blocks: Vec<Block>,
    utxos: HashMap<OutPoint, TxOut>,
}

/// In-memory chain oracle. Heights are indices into the block list; the
/// genesis block sits at height 0.
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<Mutex<MockChainInner>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        let genesis = make_block(BlockHash::all_zeros(), 0, vec![]);
        Self {
            inner: Arc::new(Mutex::new(MockChainInner {
                blocks: vec![genesis],
                utxos: HashMap::new(),
            })),
        }
    }

    /// Extend the chain by one block containing `txs`.
    pub fn add_block(&self, txs: Vec<Transaction>) -> FilteredBlock {
        let mut inner = self.inner.lock().unwrap();
        let height = inner.blocks.len() as u32;
        let prev = inner.blocks.last().unwrap().block_hash();
        let block = make_block(prev, height, txs.clone());
        let hash = block.block_hash();
        inner.blocks.push(block);
        FilteredBlock {
            hash,
            height,
            transactions: txs,
        }
    }

    /// Drop all blocks above `height`, returning the dropped ones tip-first
    /// as filtered blocks.
    pub fn truncate_to(&self, height: u32) -> Vec<FilteredBlock> {
        let mut inner = self.inner.lock().unwrap();
        let mut dropped = vec![];
        while inner.blocks.len() as u32 > height + 1 {
            let block = inner.blocks.pop().unwrap();
            dropped.push(FilteredBlock {
                hash: block.block_hash(),
                height: inner.blocks.len() as u32,
                transactions: block.txdata,
            });
        }
        dropped
    }

    pub fn tip(&self) -> (BlockHash, u32) {
        let inner = self.inner.lock().unwrap();
        let height = inner.blocks.len() as u32 - 1;
        (inner.blocks.last().unwrap().block_hash(), height)
    }

    pub fn set_utxo(&self, outpoint: OutPoint, txout: TxOut) {
        self.inner.lock().unwrap().utxos.insert(outpoint, txout);
    }

    pub fn remove_utxo(&self, outpoint: &OutPoint) {
        self.inner.lock().unwrap().utxos.remove(outpoint);
    }
}

#[ractor::async_trait]
impl ChainSource for MockChain {
    async fn get_best_block(&self) -> std::result::Result<(BlockHash, u32), ChainError> {
        Ok(self.tip())
    }

    async fn get_block_hash(&self, height: u32) -> std::result::Result<BlockHash, ChainError> {
        let inner = self.inner.lock().unwrap();
        inner
            .blocks
            .get(height as usize)
            .map(|block| block.block_hash())
            .ok_or_else(|| ChainError::NotFound(format!("no block at height {}", height)))
    }

    async fn get_block(&self, hash: &BlockHash) -> std::result::Result<Block, ChainError> {
        let inner = self.inner.lock().unwrap();
        inner
            .blocks
            .iter()
            .find(|block| block.block_hash() == *hash)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("no block {}", hash)))
    }

    async fn get_utxo(
        &self,
        outpoint: &OutPoint,
        _pk_script: &ScriptBuf,
        _start_height: u32,
        _cancel: CancellationToken,
    ) -> std::result::Result<TxOut, ChainError> {
        let inner = self.inner.lock().unwrap();
        inner
            .utxos
            .get(outpoint)
            .cloned()
            .ok_or_else(|| ChainError::NotFound(format!("utxo {} not found", outpoint)))
    }
}

/// Chain view over [`MockChain`], with manually driven block streams.
pub struct MockChainView {
    chain: MockChain,
    filtered_tx: mpsc::Sender<FilteredBlock>,
    filtered_rx: Mutex<Option<mpsc::Receiver<FilteredBlock>>>,
    disconnected_tx: mpsc::Sender<FilteredBlock>,
    disconnected_rx: Mutex<Option<mpsc::Receiver<FilteredBlock>>>,
    filter: Mutex<Vec<EdgePoint>>,
}

impl MockChainView {
    pub fn new(chain: MockChain) -> Arc<Self> {
        let (filtered_tx, filtered_rx) = mpsc::channel(64);
        let (disconnected_tx, disconnected_rx) = mpsc::channel(64);
        Arc::new(Self {
            chain,
            filtered_tx,
            filtered_rx: Mutex::new(Some(filtered_rx)),
            disconnected_tx,
            disconnected_rx: Mutex::new(Some(disconnected_rx)),
            filter: Mutex::new(vec![]),
        })
    }

    pub async fn notify_block_connected(&self, block: FilteredBlock) {
        self.filtered_tx.send(block).await.expect("chain view open");
    }

    pub async fn notify_block_disconnected(&self, block: FilteredBlock) {
        self.disconnected_tx
            .send(block)
            .await
            .expect("chain view open");
    }

    pub fn watched_outpoints(&self) -> Vec<OutPoint> {
        self.filter
            .lock()
            .unwrap()
            .iter()
            .map(|point| point.outpoint)
            .collect()
    }
}

#[ractor::async_trait]
impl FilteredChainView for MockChainView {
    async fn start(&self) -> std::result::Result<(), ChainError> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn update_filter(
        &self,
        ops: Vec<EdgePoint>,
        _best_height: u32,
    ) -> std::result::Result<(), ChainError> {
        self.filter.lock().unwrap().extend(ops);
        Ok(())
    }

    async fn filter_block(
        &self,
        hash: &BlockHash,
    ) -> std::result::Result<FilteredBlock, ChainError> {
        let block = self.chain.get_block(hash).await?;
        let inner = self.chain.inner.lock().unwrap();
        let height = inner
            .blocks
            .iter()
            .position(|candidate| candidate.block_hash() == *hash)
            .expect("block just fetched") as u32;
        Ok(FilteredBlock {
            hash: *hash,
            height,
            transactions: block.txdata,
        })
    }

    fn filtered_blocks(&self) -> mpsc::Receiver<FilteredBlock> {
        self.filtered_rx
            .lock()
            .unwrap()
            .take()
            .expect("filtered_blocks taken once")
    }

    fn disconnected_blocks(&self) -> mpsc::Receiver<FilteredBlock> {
        self.disconnected_rx
            .lock()
            .unwrap()
            .take()
            .expect("disconnected_blocks taken once")
    }
}

#[derive(Default)]
struct MockNotifierInner {
    epoch_senders: Vec<mpsc::Sender<BlockEpoch>>,
    spend_senders: HashMap<OutPoint, Vec<mpsc::Sender<SpendDetail>>>,
    registered: HashSet<OutPoint>,
}

#[derive(Default)]
pub struct MockNotifier {
    inner: Mutex<MockNotifierInner>,
}

impl MockNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn notify_epoch(&self, epoch: BlockEpoch) {
        let senders = self.inner.lock().unwrap().epoch_senders.clone();
        for sender in senders {
            let _ = sender.send(epoch).await;
        }
    }

    /// Deliver a spend of `outpoint` by `spending_tx` to its registrants.
    pub async fn notify_spend(&self, outpoint: OutPoint, spending_tx: Transaction, height: u32) {
        let senders = self
            .inner
            .lock()
            .unwrap()
            .spend_senders
            .get(&outpoint)
            .cloned()
            .unwrap_or_default();
        let detail = SpendDetail {
            spent_outpoint: outpoint,
            spender_txid: spending_tx.compute_txid(),
            spending_tx,
            spending_height: height,
        };
        for sender in senders {
            let _ = sender.send(detail.clone()).await;
        }
    }

    pub fn registered_spends(&self) -> Vec<OutPoint> {
        self.inner
            .lock()
            .unwrap()
            .registered
            .iter()
            .copied()
            .collect()
    }
}

#[ractor::async_trait]
impl ChainNotifier for MockNotifier {
    async fn register_block_epoch_ntfn(
        &self,
        _start: Option<BlockEpoch>,
    ) -> std::result::Result<BlockEpochStream, ChainError> {
        let (tx, rx) = mpsc::channel(64);
        self.inner.lock().unwrap().epoch_senders.push(tx);
        Ok(BlockEpochStream {
            epochs: rx,
            cancel: CancellationToken::new(),
        })
    }

    async fn register_spend_ntfn(
        &self,
        outpoint: OutPoint,
        _pk_script: ScriptBuf,
        _height_hint: u32,
    ) -> std::result::Result<SpendEvent, ChainError> {
        let (tx, rx) = mpsc::channel(4);
        let mut inner = self.inner.lock().unwrap();
        inner.spend_senders.entry(outpoint).or_default().push(tx);
        inner.registered.insert(outpoint);
        Ok(SpendEvent {
            spend: rx,
            cancel: CancellationToken::new(),
        })
    }
}

pub struct MockFeeEstimator {
    pub relay_rate: FeeRatePerKw,
    pub default_rate: FeeRatePerKw,
    pub rates: Mutex<HashMap<u32, FeeRatePerKw>>,
}

impl MockFeeEstimator {
    pub fn new(relay_rate: FeeRatePerKw, default_rate: FeeRatePerKw) -> Arc<Self> {
        Arc::new(Self {
            relay_rate,
            default_rate,
            rates: Mutex::new(HashMap::new()),
        })
    }
}

impl FeeEstimator for MockFeeEstimator {
    fn estimate_fee_per_kw(&self, conf_target: u32) -> std::result::Result<FeeRatePerKw, ChainError> {
        Ok(self
            .rates
            .lock()
            .unwrap()
            .get(&conf_target)
            .copied()
            .unwrap_or(self.default_rate))
    }

    fn relay_fee_per_kw(&self) -> FeeRatePerKw {
        self.relay_rate
    }
}

#[derive(Default)]
pub struct MockPublisher {
    pub published: Mutex<Vec<Transaction>>,
    pub responses: Mutex<VecDeque<std::result::Result<(), PublishError>>>,
}

impl MockPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the outcome of the next publish call. Defaults to success.
    pub fn push_response(&self, response: std::result::Result<(), PublishError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn published_txs(&self) -> Vec<Transaction> {
        self.published.lock().unwrap().clone()
    }
}

#[ractor::async_trait]
impl TxPublisher for MockPublisher {
    async fn publish_transaction(&self, tx: &Transaction) -> std::result::Result<(), PublishError> {
        self.published.lock().unwrap().push(tx.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

#[derive(Default)]
pub struct MockScriptGen {
    counter: Mutex<u8>,
}

impl MockScriptGen {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripts_derived(&self) -> u8 {
        *self.counter.lock().unwrap()
    }
}

impl SweepScriptGen for MockScriptGen {
    fn gen_sweep_script(&self) -> std::result::Result<ScriptBuf, ChainError> {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        Ok(ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(
            [*counter; 20],
        )))
    }
}

pub struct MockSigner;

impl InputSigner for MockSigner {
    fn sign_input(
        &self,
        _tx: &Transaction,
        _input_index: usize,
        _desc: &SignDescriptor,
    ) -> std::result::Result<Witness, ChainError> {
        Ok(Witness::from_slice(&[[0u8; 72]]))
    }
}

pub fn sweep_input(salt: u8, value_sat: u64) -> SweepInputDescriptor {
    let pk_script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([salt; 20]));
    SweepInputDescriptor {
        outpoint: OutPoint::new(Txid::from_byte_array([salt; 32]), 0),
        value_sat,
        pk_script: pk_script.clone(),
        witness_weight: 109,
        height_hint: 1,
        sign_desc: SignDescriptor {
            output: TxOut {
                value: Amount::from_sat(value_sat),
                script_pubkey: pk_script,
            },
            witness_script: None,
        },
    }
}

/// What the mock dispatcher should do with the next attempt.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// `send_htlc` fails immediately.
    SendError(DispatchError),
    /// `send_htlc` succeeds; `get_payment_result` resolves with this.
    Result(PaymentResult),
    /// `send_htlc` succeeds; the result channel never resolves.
    Pending,
}

#[derive(Default)]
struct MockDispatcherInner {
    sent: Vec<(ShortChannelId, u64, HtlcAdd)>,
    script: VecDeque<ScriptedOutcome>,
    outcomes: HashMap<u64, ScriptedOutcome>,
    held_senders: Vec<oneshot::Sender<PaymentResult>>,
}

/// Scripted htlc dispatcher: each `send_htlc` consumes the next scripted
/// outcome; `get_payment_result` for an unknown id fails with
/// `PaymentIdNotFound`.
#[derive(Default)]
pub struct MockDispatcher {
    inner: Mutex<MockDispatcherInner>,
}

impl MockDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_attempt(&self, outcome: ScriptedOutcome) {
        self.inner.lock().unwrap().script.push_back(outcome);
    }

    /// Preload the result of an attempt that was never sent this run, as a
    /// resumed payment's would be.
    pub fn expect_result(&self, payment_id: u64, outcome: ScriptedOutcome) {
        self.inner.lock().unwrap().outcomes.insert(payment_id, outcome);
    }

    pub fn sent(&self) -> Vec<(ShortChannelId, u64, HtlcAdd)> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().unwrap().sent.len()
    }
}

#[ractor::async_trait]
impl HtlcDispatcher for MockDispatcher {
    async fn send_htlc(
        &self,
        first_hop: ShortChannelId,
        payment_id: u64,
        htlc: HtlcAdd,
    ) -> std::result::Result<(), DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.push((first_hop, payment_id, htlc));
        let outcome = inner
            .script
            .pop_front()
            .expect("unscripted htlc dispatched");
        match outcome {
            ScriptedOutcome::SendError(err) => Err(err),
            outcome => {
                inner.outcomes.insert(payment_id, outcome);
                Ok(())
            }
        }
    }

    async fn get_payment_result(
        &self,
        payment_id: u64,
        _payment_hash: Hash256,
        _decrypter: Arc<dyn ErrorDecrypter>,
    ) -> std::result::Result<oneshot::Receiver<PaymentResult>, DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(outcome) = inner.outcomes.remove(&payment_id) else {
            return Err(DispatchError::PaymentIdNotFound);
        };
        let (tx, rx) = oneshot::channel();
        match outcome {
            ScriptedOutcome::Result(result) => {
                let _ = tx.send(result);
            }
            ScriptedOutcome::Pending => {
                inner.held_senders.push(tx);
            }
            ScriptedOutcome::SendError(_) => panic!("send error scripted as result"),
        }
        Ok(rx)
    }
}

struct MockDecrypter;

impl ErrorDecrypter for MockDecrypter {
    fn decrypt(&self, _encrypted: &[u8]) -> Result<crate::types::ForwardingError> {
        Err(Error::Store("mock decrypter".to_string()))
    }
}

/// Deterministic onion construction: opaque blobs, session keys from a
/// counter.
#[derive(Default)]
pub struct MockOnion {
    counter: Mutex<u8>,
}

impl MockOnion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl OnionPacketer for MockOnion {
    fn generate_session_key(&self) -> Privkey {
        let mut counter = self.counter.lock().unwrap();
        *counter = counter.wrapping_add(1).max(1);
        Privkey::from_slice(&[*counter; 32])
    }

    fn generate_onion(
        &self,
        _route: &Route,
        payment_hash: &Hash256,
        _session_key: &Privkey,
    ) -> Result<OnionPacket> {
        let mut blob = vec![0u8; 32];
        blob.copy_from_slice(payment_hash.as_ref());
        Ok(OnionPacket(blob))
    }

    fn error_decrypter(&self, _session_key: &Privkey, _route: &Route) -> Arc<dyn ErrorDecrypter> {
        Arc::new(MockDecrypter)
    }
}

/// Shared tallies of one recording session source, inspected by tests.
#[derive(Default)]
pub struct SessionRecorder {
    pub routes: Mutex<VecDeque<Route>>,
    pub vertex_failures: Mutex<Vec<Pubkey>>,
    pub edge_failures: Mutex<Vec<(DirectedEdge, u64)>>,
    pub policy_failures: Mutex<Vec<DirectedEdge>>,
}

impl SessionRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_route(&self, route: Route) {
        self.routes.lock().unwrap().push_back(route);
    }

    pub fn vertex_failure_count(&self) -> usize {
        self.vertex_failures.lock().unwrap().len()
    }

    pub fn edge_failure_count(&self) -> usize {
        self.edge_failures.lock().unwrap().len()
    }

    pub fn policy_failure_count(&self) -> usize {
        self.policy_failures.lock().unwrap().len()
    }
}

pub struct RecordingSessionSource {
    pub recorder: Arc<SessionRecorder>,
}

impl RecordingSessionSource {
    pub fn new(recorder: Arc<SessionRecorder>) -> Arc<Self> {
        Arc::new(Self { recorder })
    }
}

struct RecordingSession {
    recorder: Arc<SessionRecorder>,
    exhausted: bool,
}

impl PaymentSession for RecordingSession {
    fn request_route(
        &mut self,
        _payment: &LightningPayment,
        _current_height: u32,
        _final_cltv_delta: u16,
    ) -> Option<Route> {
        if self.exhausted {
            return None;
        }
        self.recorder.routes.lock().unwrap().pop_front()
    }

    fn report_vertex_failure(&mut self, vertex: Pubkey) {
        self.recorder.vertex_failures.lock().unwrap().push(vertex);
    }

    fn report_edge_failure(&mut self, edge: DirectedEdge, amt_msat: u64) {
        self.recorder
            .edge_failures
            .lock()
            .unwrap()
            .push((edge, amt_msat));
    }

    fn report_edge_policy_failure(&mut self, edge: DirectedEdge) {
        self.recorder.policy_failures.lock().unwrap().push(edge);
    }
}

impl PaymentSessionSource for RecordingSessionSource {
    fn new_payment_session(
        &self,
        _payment: &LightningPayment,
    ) -> Result<Box<dyn PaymentSession>> {
        Ok(Box::new(RecordingSession {
            recorder: self.recorder.clone(),
            exhausted: false,
        }))
    }

    fn new_payment_session_for_route(&self, route: Route) -> Box<dyn PaymentSession> {
        let mut routes = VecDeque::new();
        routes.push_back(route);
        let recorder = self.recorder.clone();
        *recorder.routes.lock().unwrap() = routes;
        Box::new(RecordingSession {
            recorder: self.recorder.clone(),
            exhausted: false,
        })
    }

    fn new_payment_session_empty(&self) -> Box<dyn PaymentSession> {
        Box::new(RecordingSession {
            recorder: self.recorder.clone(),
            exhausted: true,
        })
    }
}

/// A fully mocked router over a rocksdb store in a tempdir.
pub struct RouterHarness {
    pub router: ChannelRouter<Store>,
    pub store: Store,
    pub chain: MockChain,
    pub chain_view: Arc<MockChainView>,
    pub dispatcher: Arc<MockDispatcher>,
    pub onion: Arc<MockOnion>,
    pub self_key: Privkey,
    pub _dir: tempfile::TempDir,
}

impl RouterHarness {
    pub async fn connect_block(&self, txs: Vec<Transaction>) -> FilteredBlock {
        let block = self.chain.add_block(txs);
        self.chain_view.notify_block_connected(block.clone()).await;
        block
    }

    pub async fn disconnect_tip(&self) -> FilteredBlock {
        let (_, height) = self.chain.tip();
        let mut dropped = self.chain.truncate_to(height - 1);
        let block = dropped.remove(0);
        self.chain_view
            .notify_block_disconnected(block.clone())
            .await;
        block
    }
}

pub async fn start_router_harness(
    config: RouterConfig,
    session_source: Option<Arc<dyn PaymentSessionSource>>,
) -> RouterHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::new(dir.path()).expect("open store");

    let self_key = generate_privkey(1);
    crate::router::graph::GraphStore::set_source_node(
        &store,
        node_info(&self_key, now_timestamp_secs()),
    )
    .expect("set source node");

    let chain = MockChain::new();
    let chain_view = MockChainView::new(chain.clone());
    let dispatcher = MockDispatcher::new();
    let onion = MockOnion::new();

    let router = ChannelRouter::start(RouterArguments {
        config,
        store: store.clone(),
        chain: Arc::new(chain.clone()),
        chain_view: chain_view.clone(),
        dispatcher: dispatcher.clone(),
        onion: onion.clone(),
        session_source,
    })
    .await
    .expect("start router");

    RouterHarness {
        router,
        store,
        chain,
        chain_view,
        dispatcher,
        onion,
        self_key,
        _dir: dir,
    }
}
