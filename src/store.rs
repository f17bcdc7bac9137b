use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use rocksdb::{DBCompressionType, Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};

use crate::chain::{gen_multisig_script, witness_script_hash, EdgePoint};
use crate::router::graph::{
    ChannelEdgeStatus, ChannelInfo, ChannelPolicy, ClosedChannelSummary, GraphStore, NodeInfo,
};
use crate::router::payment::{
    ControlTower, InFlightPayment, PaymentAttemptInfo, PaymentCreationInfo, PaymentFailureReason,
};
use crate::sweep::store::SweeperStore;
use crate::types::{Hash256, Preimage, Pubkey, ShortChannelId};
use crate::{Error, Result};

const NODE_PREFIX: u8 = 0x10;
const CHANNEL_PREFIX: u8 = 0x20;
const CHANNEL_OUTPOINT_INDEX_PREFIX: u8 = 0x21;
const ZOMBIE_PREFIX: u8 = 0x22;
const PRUNE_LOG_PREFIX: u8 = 0x23;
const SOURCE_NODE_KEY: [u8; 1] = [0x24];
const PAYMENT_PREFIX: u8 = 0x40;
const PAYMENT_SEQ_KEY: [u8; 1] = [0x41];
const SWEEP_TX_PREFIX: u8 = 0x50;
const LAST_SWEEP_TX_KEY: [u8; 1] = [0x51];

/// A channel and its two directed policies, as stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ChannelRecord {
    info: ChannelInfo,
    policy1: Option<ChannelPolicy>,
    policy2: Option<ChannelPolicy>,
}

/// Everything pruned at one height, kept so a disconnected block can
/// restore the channels it closed.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct PruneLogEntry {
    block_hash: BlockHash,
    channels: Vec<ChannelRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum PaymentStatus {
    Created,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct PaymentRecord {
    info: PaymentCreationInfo,
    attempt: Option<PaymentAttemptInfo>,
    status: PaymentStatus,
    preimage: Option<Preimage>,
    failure: Option<PaymentFailureReason>,
}

fn serialize_to_vec<T: ?Sized + Serialize>(value: &T, field_name: &str) -> Vec<u8> {
    bincode::serialize(value)
        .unwrap_or_else(|err| panic!("serialization of {} failed: {}", field_name, err))
}

fn deserialize_from<'a, T>(slice: &'a [u8], field_name: &str) -> T
where
    T: serde::Deserialize<'a>,
{
    bincode::deserialize(slice)
        .unwrap_or_else(|err| panic!("deserialization of {} failed: {}", field_name, err))
}

fn node_key(node: &Pubkey) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.push(NODE_PREFIX);
    key.extend_from_slice(&node.serialize());
    key
}

fn channel_key(channel_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(CHANNEL_PREFIX);
    key.extend_from_slice(&channel_id.to_be_bytes());
    key
}

fn zombie_key(channel_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(ZOMBIE_PREFIX);
    key.extend_from_slice(&channel_id.to_be_bytes());
    key
}

fn outpoint_key(outpoint: &OutPoint) -> Vec<u8> {
    use bitcoin::hashes::Hash;
    let mut key = Vec::with_capacity(37);
    key.push(CHANNEL_OUTPOINT_INDEX_PREFIX);
    key.extend_from_slice(&outpoint.txid.to_byte_array());
    key.extend_from_slice(&outpoint.vout.to_be_bytes());
    key
}

fn prune_log_key(height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(PRUNE_LOG_PREFIX);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn payment_key(hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(PAYMENT_PREFIX);
    key.extend_from_slice(hash.as_ref());
    key
}

fn sweep_tx_key(txid: &Txid) -> Vec<u8> {
    use bitcoin::hashes::Hash;
    let mut key = Vec::with_capacity(33);
    key.push(SWEEP_TX_PREFIX);
    key.extend_from_slice(&txid.to_byte_array());
    key
}

/// Rocksdb-backed store implementing the graph store, the payment control
/// tower and the sweeper store. Single-byte key prefixes, bincode values,
/// write batches for multi-key atomicity.
#[derive(Clone)]
pub struct Store {
    db: Arc<DB>,
    payment_seq: Arc<AtomicU64>,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.set_compression_type(DBCompressionType::Lz4);
        let db = DB::open(&options, path).map_err(|err| Error::Store(err.to_string()))?;
        let db = Arc::new(db);

        let payment_seq = db
            .get(PAYMENT_SEQ_KEY)
            .map_err(|err| Error::Store(err.to_string()))?
            .map(|bytes| deserialize_from::<u64>(&bytes, "payment sequence"))
            .unwrap_or(0);

        Ok(Self {
            db,
            payment_seq: Arc::new(AtomicU64::new(payment_seq)),
        })
    }

    fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.db
            .get(key.as_ref())
            .map_err(|err| Error::Store(err.to_string()))
    }

    fn batch(&self) -> Batch {
        Batch {
            db: Arc::clone(&self.db),
            wb: WriteBatch::default(),
        }
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Vec<(Box<[u8]>, Box<[u8]>)> {
        self.db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .map(|item| item.expect("iterator should be OK"))
            .take_while(|(key, _)| key.starts_with(prefix))
            .collect()
    }

    fn get_channel_record(&self, channel_id: u64) -> Result<Option<ChannelRecord>> {
        Ok(self
            .get(channel_key(channel_id))?
            .map(|bytes| deserialize_from(&bytes, "channel record")))
    }

    fn get_zombie_record(&self, channel_id: u64) -> Result<Option<ChannelRecord>> {
        Ok(self
            .get(zombie_key(channel_id))?
            .map(|bytes| deserialize_from(&bytes, "zombie channel record")))
    }

    fn put_channel_record(&self, batch: &mut Batch, record: &ChannelRecord) {
        batch.put(
            channel_key(record.info.channel_id),
            serialize_to_vec(record, "channel record"),
        );
        batch.put(
            outpoint_key(&record.info.outpoint),
            record.info.channel_id.to_be_bytes(),
        );
    }
}

struct Batch {
    db: Arc<DB>,
    wb: WriteBatch,
}

impl Batch {
    fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.wb.put(key, value);
    }

    fn delete(&mut self, key: impl AsRef<[u8]>) {
        self.wb.delete(key);
    }

    fn commit(self) -> Result<()> {
        self.db
            .write(self.wb)
            .map_err(|err| Error::Store(err.to_string()))
    }
}

impl GraphStore for Store {
    fn source_node(&self) -> Result<Option<NodeInfo>> {
        Ok(self
            .get(SOURCE_NODE_KEY)?
            .map(|bytes| deserialize_from(&bytes, "source node")))
    }

    fn set_source_node(&self, node: NodeInfo) -> Result<()> {
        let mut batch = self.batch();
        batch.put(SOURCE_NODE_KEY, serialize_to_vec(&node, "source node"));
        batch.put(node_key(&node.node_id), serialize_to_vec(&node, "node"));
        batch.commit()
    }

    fn prune_tip(&self) -> Result<Option<(BlockHash, u32)>> {
        let entries = self.prefix_scan(&[PRUNE_LOG_PREFIX]);
        let Some((key, value)) = entries.last() else {
            return Ok(None);
        };
        let height = u32::from_be_bytes(key[1..5].try_into().expect("prune log key width"));
        let entry: PruneLogEntry = deserialize_from(value, "prune log entry");
        Ok(Some((entry.block_hash, height)))
    }

    fn prune_graph(
        &self,
        spent_outpoints: &[OutPoint],
        block_hash: BlockHash,
        height: u32,
    ) -> Result<Vec<ClosedChannelSummary>> {
        let mut batch = self.batch();
        let mut closed = vec![];
        let mut pruned_records = vec![];

        for outpoint in spent_outpoints {
            let Some(id_bytes) = self.get(outpoint_key(outpoint))? else {
                continue;
            };
            let channel_id =
                u64::from_be_bytes(id_bytes.as_slice().try_into().expect("channel id width"));
            let Some(record) = self.get_channel_record(channel_id)? else {
                continue;
            };

            batch.delete(channel_key(channel_id));
            batch.delete(outpoint_key(outpoint));
            closed.push(ClosedChannelSummary {
                channel_id,
                capacity_sat: record.info.capacity_sat,
                outpoint: record.info.outpoint,
                closed_height: height,
            });
            pruned_records.push(record);
        }

        let entry = PruneLogEntry {
            block_hash,
            channels: pruned_records,
        };
        batch.put(
            prune_log_key(height),
            serialize_to_vec(&entry, "prune log entry"),
        );
        batch.commit()?;
        Ok(closed)
    }

    fn prune_graph_nodes(&self) -> Result<usize> {
        let mut referenced = std::collections::HashSet::new();
        for (info, _, _) in self.get_channels()? {
            referenced.insert(info.node1);
            referenced.insert(info.node2);
        }
        let source = self.source_node()?.map(|node| node.node_id);

        let mut batch = self.batch();
        let mut pruned = 0usize;
        for node in self.get_nodes()? {
            if referenced.contains(&node.node_id) || Some(node.node_id) == source {
                continue;
            }
            batch.delete(node_key(&node.node_id));
            pruned += 1;
        }
        batch.commit()?;
        Ok(pruned)
    }

    fn disconnect_block_at_height(&self, height: u32) -> Result<Vec<ChannelInfo>> {
        let mut batch = self.batch();

        // Resurrect the channels closed in the blocks being disconnected.
        // Channels funded in those same blocks stay gone.
        for (key, value) in self.prefix_scan(&[PRUNE_LOG_PREFIX]) {
            let entry_height = u32::from_be_bytes(key[1..5].try_into().expect("prune log key"));
            if entry_height < height {
                continue;
            }
            let entry: PruneLogEntry = deserialize_from(&value, "prune log entry");
            for record in entry.channels {
                if record.info.short_channel_id().block_height >= height {
                    continue;
                }
                self.put_channel_record(&mut batch, &record);
            }
            batch.delete(key);
        }

        // Drop channels whose funding confirmed at a disconnected height.
        let mut removed = vec![];
        let start_key = channel_key(ShortChannelId::new(height, 0, 0).to_u64());
        for (key, value) in self
            .db
            .iterator(IteratorMode::From(&start_key, Direction::Forward))
            .map(|item| item.expect("iterator should be OK"))
            .take_while(|(key, _)| key.starts_with(&[CHANNEL_PREFIX]))
        {
            let record: ChannelRecord = deserialize_from(&value, "channel record");
            batch.delete(key);
            batch.delete(outpoint_key(&record.info.outpoint));
            removed.push(record.info);
        }

        batch.commit()?;
        Ok(removed)
    }

    fn channel_view(&self) -> Result<Vec<EdgePoint>> {
        Ok(self
            .get_channels()?
            .into_iter()
            .map(|(info, _, _)| {
                let witness_script =
                    gen_multisig_script(&info.bitcoin_key1, &info.bitcoin_key2);
                EdgePoint {
                    outpoint: info.outpoint,
                    funding_pk_script: witness_script_hash(&witness_script),
                }
            })
            .collect())
    }

    fn has_node(&self, node: &Pubkey) -> Result<(u64, bool)> {
        match self.get(node_key(node))? {
            Some(bytes) => {
                let node: NodeInfo = deserialize_from(&bytes, "node");
                Ok((node.last_update, true))
            }
            None => Ok((0, false)),
        }
    }

    fn add_node(&self, node: NodeInfo) -> Result<()> {
        let mut batch = self.batch();
        batch.put(node_key(&node.node_id), serialize_to_vec(&node, "node"));
        batch.commit()
    }

    fn fetch_node(&self, node: &Pubkey) -> Result<Option<NodeInfo>> {
        Ok(self
            .get(node_key(node))?
            .map(|bytes| deserialize_from(&bytes, "node")))
    }

    fn get_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self
            .prefix_scan(&[NODE_PREFIX])
            .into_iter()
            .map(|(_, value)| deserialize_from(&value, "node"))
            .collect())
    }

    fn is_public_node(&self, node: &Pubkey) -> Result<bool> {
        Ok(self
            .node_channels(node)?
            .iter()
            .any(|(info, _, _)| info.auth_proof.is_some()))
    }

    fn has_channel_edge(&self, channel_id: u64) -> Result<ChannelEdgeStatus> {
        if let Some(record) = self.get_channel_record(channel_id)? {
            return Ok(ChannelEdgeStatus {
                edge1_last_update: record.policy1.map(|policy| policy.last_update),
                edge2_last_update: record.policy2.map(|policy| policy.last_update),
                exists: true,
                is_zombie: false,
            });
        }
        if let Some(record) = self.get_zombie_record(channel_id)? {
            return Ok(ChannelEdgeStatus {
                edge1_last_update: record.policy1.map(|policy| policy.last_update),
                edge2_last_update: record.policy2.map(|policy| policy.last_update),
                exists: false,
                is_zombie: true,
            });
        }
        Ok(ChannelEdgeStatus::default())
    }

    fn add_channel_edge(&self, info: ChannelInfo) -> Result<()> {
        if self.get_channel_record(info.channel_id)?.is_some() {
            return Err(Error::Store(format!(
                "channel edge {} already exists",
                info.channel_id
            )));
        }

        let mut batch = self.batch();

        // Shell records keep the endpoints resolvable before their own
        // announcements arrive.
        for endpoint in [info.node1, info.node2] {
            if self.get(node_key(&endpoint))?.is_none() {
                let shell = NodeInfo::shell(endpoint);
                batch.put(node_key(&endpoint), serialize_to_vec(&shell, "node"));
            }
        }

        let record = ChannelRecord {
            info,
            policy1: None,
            policy2: None,
        };
        self.put_channel_record(&mut batch, &record);
        batch.commit()
    }

    fn update_channel_edge(&self, info: ChannelInfo) -> Result<()> {
        let Some(mut record) = self.get_channel_record(info.channel_id)? else {
            return Err(Error::Store(format!(
                "channel edge {} not found",
                info.channel_id
            )));
        };
        record.info = info;
        let mut batch = self.batch();
        self.put_channel_record(&mut batch, &record);
        batch.commit()
    }

    fn update_edge_policy(&self, policy: ChannelPolicy) -> Result<()> {
        let Some(mut record) = self.get_channel_record(policy.channel_id)? else {
            return Err(Error::Store(format!(
                "channel edge {} not found",
                policy.channel_id
            )));
        };
        if policy.direction() == 0 {
            record.policy1 = Some(policy);
        } else {
            record.policy2 = Some(policy);
        }
        let mut batch = self.batch();
        self.put_channel_record(&mut batch, &record);
        batch.commit()
    }

    fn fetch_channel_edges_by_id(
        &self,
        channel_id: u64,
    ) -> Result<Option<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>> {
        Ok(self
            .get_channel_record(channel_id)?
            .map(|record| (record.info, record.policy1, record.policy2)))
    }

    fn get_channels(
        &self,
    ) -> Result<Vec<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>> {
        Ok(self
            .prefix_scan(&[CHANNEL_PREFIX])
            .into_iter()
            .map(|(_, value)| {
                let record: ChannelRecord = deserialize_from(&value, "channel record");
                (record.info, record.policy1, record.policy2)
            })
            .collect())
    }

    fn node_channels(
        &self,
        node: &Pubkey,
    ) -> Result<Vec<(ChannelInfo, Option<ChannelPolicy>, Option<ChannelPolicy>)>> {
        Ok(self
            .get_channels()?
            .into_iter()
            .filter(|(info, _, _)| info.node1 == *node || info.node2 == *node)
            .collect())
    }

    fn delete_channel_edges(&self, channel_ids: &[u64]) -> Result<()> {
        let mut batch = self.batch();
        for channel_id in channel_ids {
            let Some(record) = self.get_channel_record(*channel_id)? else {
                continue;
            };
            batch.delete(channel_key(*channel_id));
            batch.delete(outpoint_key(&record.info.outpoint));
            batch.put(
                zombie_key(*channel_id),
                serialize_to_vec(&record, "zombie channel record"),
            );
        }
        batch.commit()
    }

    fn mark_edge_live(&self, channel_id: u64) -> Result<()> {
        let Some(record) = self.get_zombie_record(channel_id)? else {
            return Ok(());
        };
        let mut batch = self.batch();
        batch.delete(zombie_key(channel_id));
        self.put_channel_record(&mut batch, &record);
        batch.commit()
    }
}

impl Store {
    fn get_payment_record(&self, hash: &Hash256) -> Result<Option<PaymentRecord>> {
        Ok(self
            .get(payment_key(hash))?
            .map(|bytes| deserialize_from(&bytes, "payment record")))
    }

    fn put_payment_record(&self, hash: &Hash256, record: &PaymentRecord) -> Result<()> {
        let mut batch = self.batch();
        batch.put(payment_key(hash), serialize_to_vec(record, "payment record"));
        batch.commit()
    }
}

impl ControlTower for Store {
    fn init_payment(&self, hash: Hash256, info: PaymentCreationInfo) -> Result<()> {
        if let Some(existing) = self.get_payment_record(&hash)? {
            match existing.status {
                PaymentStatus::InFlight | PaymentStatus::Created => {
                    return Err(Error::PaymentInFlight)
                }
                PaymentStatus::Succeeded => return Err(Error::PaymentAlreadySucceeded),
                // A failed payment may be retried with a fresh record.
                PaymentStatus::Failed => {}
            }
        }

        self.put_payment_record(
            &hash,
            &PaymentRecord {
                info,
                attempt: None,
                status: PaymentStatus::Created,
                preimage: None,
                failure: None,
            },
        )
    }

    fn register_attempt(&self, hash: Hash256, attempt: PaymentAttemptInfo) -> Result<()> {
        let Some(mut record) = self.get_payment_record(&hash)? else {
            return Err(Error::Store(format!("payment {} not initialized", hash)));
        };
        record.attempt = Some(attempt);
        record.status = PaymentStatus::InFlight;
        self.put_payment_record(&hash, &record)
    }

    fn mark_success(&self, hash: Hash256, preimage: Preimage) -> Result<()> {
        let Some(mut record) = self.get_payment_record(&hash)? else {
            return Err(Error::Store(format!("payment {} not initialized", hash)));
        };
        record.status = PaymentStatus::Succeeded;
        record.preimage = Some(preimage);
        self.put_payment_record(&hash, &record)
    }

    fn mark_failed(&self, hash: Hash256, reason: PaymentFailureReason) -> Result<()> {
        let Some(mut record) = self.get_payment_record(&hash)? else {
            return Err(Error::Store(format!("payment {} not initialized", hash)));
        };
        record.status = PaymentStatus::Failed;
        record.failure = Some(reason);
        self.put_payment_record(&hash, &record)
    }

    fn fetch_in_flight_payments(&self) -> Result<Vec<InFlightPayment>> {
        Ok(self
            .prefix_scan(&[PAYMENT_PREFIX])
            .into_iter()
            .map(|(_, value)| deserialize_from::<PaymentRecord>(&value, "payment record"))
            .filter(|record| record.status == PaymentStatus::InFlight)
            .map(|record| InFlightPayment {
                info: record.info,
                attempt: record.attempt,
            })
            .collect())
    }

    fn next_payment_id(&self) -> Result<u64> {
        let id = self.payment_seq.fetch_add(1, Ordering::AcqRel);
        let mut batch = self.batch();
        batch.put(
            PAYMENT_SEQ_KEY,
            serialize_to_vec(&(id + 1), "payment sequence"),
        );
        batch.commit()?;
        Ok(id)
    }
}

impl SweeperStore for Store {
    fn notify_publish_tx(&self, tx: &Transaction) -> Result<()> {
        let mut batch = self.batch();
        batch.put(sweep_tx_key(&tx.compute_txid()), b"");
        batch.put(LAST_SWEEP_TX_KEY, serialize_to_vec(tx, "sweep tx"));
        batch.commit()
    }

    fn get_last_published_tx(&self) -> Result<Option<Transaction>> {
        Ok(self
            .get(LAST_SWEEP_TX_KEY)?
            .map(|bytes| deserialize_from(&bytes, "sweep tx")))
    }

    fn is_our_tx(&self, txid: &Txid) -> Result<bool> {
        Ok(self.get(sweep_tx_key(txid))?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::route::Route;
    use crate::types::Privkey;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::new(dir.path()).expect("open store");
        (dir, store)
    }

    fn payment_info(hash: Hash256) -> PaymentCreationInfo {
        PaymentCreationInfo {
            payment_hash: hash,
            value_msat: 10_000,
            creation_time: 1_700_000_000,
            payment_request: vec![],
        }
    }

    fn attempt(payment_id: u64) -> PaymentAttemptInfo {
        PaymentAttemptInfo {
            payment_id,
            session_key: Privkey::from_slice(&[0xcd; 32]),
            route: Route {
                total_time_lock: 100,
                total_amount_msat: 10_000,
                source: Privkey::from_slice(&[0xab; 32]).pubkey(),
                hops: vec![],
            },
        }
    }

    #[test]
    fn test_payment_in_flight_rejects_second_init() {
        let (_dir, store) = test_store();
        let hash = Hash256::from([1u8; 32]);

        store.init_payment(hash, payment_info(hash)).unwrap();
        assert!(matches!(
            store.init_payment(hash, payment_info(hash)),
            Err(Error::PaymentInFlight)
        ));

        store.register_attempt(hash, attempt(7)).unwrap();
        assert!(matches!(
            store.init_payment(hash, payment_info(hash)),
            Err(Error::PaymentInFlight)
        ));

        let in_flight = store.fetch_in_flight_payments().unwrap();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].attempt.as_ref().unwrap().payment_id, 7);

        // A failed payment may be re-initialized, a settled one may not.
        store
            .mark_failed(hash, PaymentFailureReason::NoRoute)
            .unwrap();
        store.init_payment(hash, payment_info(hash)).unwrap();

        store.register_attempt(hash, attempt(8)).unwrap();
        let preimage = Preimage::from([9u8; 32]);
        store.mark_success(hash, preimage).unwrap();
        assert!(matches!(
            store.init_payment(hash, payment_info(hash)),
            Err(Error::PaymentAlreadySucceeded)
        ));
        assert!(store.fetch_in_flight_payments().unwrap().is_empty());
    }

    #[test]
    fn test_payment_id_sequence_is_monotonic_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let store = Store::new(dir.path()).unwrap();
            assert_eq!(store.next_payment_id().unwrap(), 0);
            assert_eq!(store.next_payment_id().unwrap(), 1);
        }
        let store = Store::new(dir.path()).unwrap();
        assert_eq!(store.next_payment_id().unwrap(), 2);
    }

    #[test]
    fn test_sweeper_store_tracks_published_txids() {
        let (_dir, store) = test_store();
        assert!(store.get_last_published_tx().unwrap().is_none());

        let tx = bitcoin::Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        store.notify_publish_tx(&tx).unwrap();

        assert!(store.is_our_tx(&tx.compute_txid()).unwrap());
        assert_eq!(store.get_last_published_tx().unwrap(), Some(tx.clone()));

        let other = <bitcoin::Txid as bitcoin::hashes::Hash>::all_zeros();
        assert!(!store.is_our_tx(&other).unwrap());
    }
}
