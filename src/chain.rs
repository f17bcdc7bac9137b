use std::fmt;
use std::time::Duration;

use bitcoin::blockdata::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2};
use bitcoin::blockdata::script::Builder;
use bitcoin::{Block, BlockHash, OutPoint, ScriptBuf, Transaction, TxOut, Txid, Witness};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{FeeRatePerKw, Pubkey};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("chain IO error: {0}")]
    Io(String),
    #[error("chain IO timed out")]
    Timeout,
    #[error("chain IO canceled")]
    Canceled,
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    /// The transaction (or a conflicting one) is already known to the
    /// network. Treated as soft success by publishers that retry.
    #[error("transaction double spends known inputs")]
    DoubleSpend,
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// A block reduced to the transactions matching the installed watch filter.
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredBlock {
    pub hash: BlockHash,
    pub height: u32,
    pub transactions: Vec<Transaction>,
}

impl FilteredBlock {
    /// All previous outpoints consumed by transactions in this block.
    pub fn spent_outpoints(&self) -> Vec<OutPoint> {
        self.transactions
            .iter()
            .flat_map(|tx| tx.input.iter().map(|txin| txin.previous_output))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockEpoch {
    pub hash: BlockHash,
    pub height: u32,
}

/// A confirmed spend of a watched outpoint.
#[derive(Clone, Debug)]
pub struct SpendDetail {
    pub spent_outpoint: OutPoint,
    pub spender_txid: Txid,
    pub spending_tx: Transaction,
    pub spending_height: u32,
}

/// Registration handle for a spend notification. Dropping the stream or
/// triggering `cancel` ends the registration.
pub struct SpendEvent {
    pub spend: mpsc::Receiver<SpendDetail>,
    pub cancel: CancellationToken,
}

pub struct BlockEpochStream {
    pub epochs: mpsc::Receiver<BlockEpoch>,
    pub cancel: CancellationToken,
}

/// A funding outpoint together with the script it pays to, as installed into
/// the chain view filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgePoint {
    pub outpoint: OutPoint,
    pub funding_pk_script: ScriptBuf,
}

/// Oracle for the most up-to-date blockchain data. Advertised channels are
/// checked against it to ensure they are still open.
#[ractor::async_trait]
pub trait ChainSource: Send + Sync {
    async fn get_best_block(&self) -> Result<(BlockHash, u32), ChainError>;

    async fn get_block_hash(&self, height: u32) -> Result<BlockHash, ChainError>;

    async fn get_block(&self, hash: &BlockHash) -> Result<Block, ChainError>;

    /// Look up an unspent output. May involve a long rescan from
    /// `start_height`, so it takes the shutdown token and must return
    /// `ChainError::Canceled` promptly once it fires.
    async fn get_utxo(
        &self,
        outpoint: &OutPoint,
        pk_script: &ScriptBuf,
        start_height: u32,
        cancel: CancellationToken,
    ) -> Result<TxOut, ChainError>;
}

/// Watches the subset of the utxo set backing known channels, emitting
/// filtered connected and disconnected blocks. Both streams close on
/// shutdown.
#[ractor::async_trait]
pub trait FilteredChainView: Send + Sync {
    async fn start(&self) -> Result<(), ChainError>;

    async fn stop(&self);

    /// Extend the watch filter with additional funding outpoints, rescanning
    /// from `best_height` if necessary.
    async fn update_filter(&self, ops: Vec<EdgePoint>, best_height: u32)
        -> Result<(), ChainError>;

    /// Filter a specific block on demand (used during the initial graph
    /// sync walk).
    async fn filter_block(&self, hash: &BlockHash) -> Result<FilteredBlock, ChainError>;

    /// Stream of blocks connected to the main chain. Callable once.
    fn filtered_blocks(&self) -> mpsc::Receiver<FilteredBlock>;

    /// Stream of blocks disconnected from the main chain. Callable once.
    fn disconnected_blocks(&self) -> mpsc::Receiver<FilteredBlock>;
}

/// Chain notifier used by the sweeper for block epochs and spend
/// notifications.
#[ractor::async_trait]
pub trait ChainNotifier: Send + Sync {
    async fn register_block_epoch_ntfn(
        &self,
        start: Option<BlockEpoch>,
    ) -> Result<BlockEpochStream, ChainError>;

    async fn register_spend_ntfn(
        &self,
        outpoint: OutPoint,
        pk_script: ScriptBuf,
        height_hint: u32,
    ) -> Result<SpendEvent, ChainError>;
}

/// Caller supplied fee preference for a sweep: either an absolute fee rate
/// or a confirmation target resolved through the fee estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePreference {
    ConfTarget(u32),
    FeeRate(FeeRatePerKw),
}

impl fmt::Display for FeePreference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FeePreference::ConfTarget(target) => write!(f, "conf_target={}", target),
            FeePreference::FeeRate(rate) => write!(f, "fee_rate={}", rate),
        }
    }
}

pub trait FeeEstimator: Send + Sync {
    fn estimate_fee_per_kw(&self, conf_target: u32) -> Result<FeeRatePerKw, ChainError>;

    /// The minimum relay fee rate of the backend. Assumed stable for the
    /// lifetime of the process.
    fn relay_fee_per_kw(&self) -> FeeRatePerKw;
}

pub fn determine_fee_per_kw(
    estimator: &dyn FeeEstimator,
    preference: FeePreference,
) -> Result<FeeRatePerKw, ChainError> {
    match preference {
        FeePreference::ConfTarget(target) => estimator.estimate_fee_per_kw(target),
        FeePreference::FeeRate(rate) => Ok(rate),
    }
}

#[ractor::async_trait]
pub trait TxPublisher: Send + Sync {
    async fn publish_transaction(&self, tx: &Transaction) -> Result<(), PublishError>;
}

/// Generates a fresh wallet script that swept funds are paid to.
pub trait SweepScriptGen: Send + Sync {
    fn gen_sweep_script(&self) -> Result<ScriptBuf, ChainError>;
}

/// Everything a signer needs to produce a witness for one spent output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignDescriptor {
    pub output: TxOut,
    pub witness_script: Option<ScriptBuf>,
}

pub trait InputSigner: Send + Sync {
    fn sign_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        desc: &SignDescriptor,
    ) -> Result<Witness, ChainError>;
}

/// Recreate the 2-of-2 multisig witness script committed to by a channel
/// funding output, from the two declared funding keys in wire order.
pub fn gen_multisig_script(key1: &Pubkey, key2: &Pubkey) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_PUSHNUM_2)
        .push_slice(key1.serialize())
        .push_slice(key2.serialize())
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// The P2WSH output script for a witness script.
pub fn witness_script_hash(witness_script: &ScriptBuf) -> ScriptBuf {
    ScriptBuf::new_p2wsh(&witness_script.wscript_hash())
}

/// Wrap a chain oracle call that has no cancellation hook so a wedged
/// backend cannot block the event loop past the configured bound.
pub(crate) async fn with_io_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, ChainError>
where
    F: std::future::Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(ChainError::Timeout),
    }
}
