use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::router::graph::GossipRecord;
use crate::types::Pubkey;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JobOutcome {
    Allow,
    Deny,
}

type Signal = watch::Sender<Option<JobOutcome>>;
type SignalWaiter = watch::Receiver<Option<JobOutcome>>;

#[derive(Default)]
struct BarrierInner {
    /// Broadcast signal owned by each in-flight channel-info job, keyed by
    /// channel id.
    chan_ann_signals: HashMap<u64, Signal>,

    /// Waiter entries: a channel policy waits on its channel id, a node
    /// record waits on its vertex. Both point at the signal of the
    /// channel-info job they depend on.
    chan_edge_dependencies: HashMap<u64, SignalWaiter>,
    node_ann_dependencies: HashMap<Pubkey, SignalWaiter>,
}

/// Orders dependent gossip jobs during parallel validation: a channel policy
/// cannot commit before its channel info, and a node record cannot commit
/// before a channel info that introduces the vertex. Worker slots are
/// bounded by a semaphore; shutdown releases every waiter with
/// `BarrierShuttingDown`.
pub(crate) struct ValidationBarrier {
    semaphore: Arc<Semaphore>,
    inner: Mutex<BarrierInner>,
    quit: CancellationToken,
}

/// Held for the lifetime of one validation job; dropping it frees the worker
/// slot.
pub(crate) struct JobPermit {
    _permit: OwnedSemaphorePermit,
}

impl ValidationBarrier {
    pub fn new(workers: usize, quit: CancellationToken) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            inner: Mutex::new(BarrierInner::default()),
            quit,
        }
    }

    /// Wait for a free worker slot and register the dependency entries this
    /// record provides for later jobs.
    pub async fn init_job_dependencies(&self, record: &GossipRecord) -> Result<JobPermit> {
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => {
                permit.map_err(|_| Error::BarrierShuttingDown)?
            }
            _ = self.quit.cancelled() => return Err(Error::BarrierShuttingDown),
        };

        if let GossipRecord::Channel(info) = record {
            let mut inner = self.inner.lock().expect("barrier lock");
            if !inner.chan_ann_signals.contains_key(&info.channel_id) {
                let (tx, rx) = watch::channel(None);
                inner.chan_ann_signals.insert(info.channel_id, tx);
                inner
                    .chan_edge_dependencies
                    .insert(info.channel_id, rx.clone());
                inner.node_ann_dependencies.insert(info.node1, rx.clone());
                inner.node_ann_dependencies.insert(info.node2, rx);
            }
        }

        Ok(JobPermit { _permit: permit })
    }

    /// Block until the job this record depends on has been fully validated,
    /// or until shutdown.
    pub async fn wait_for_dependants(&self, record: &GossipRecord) -> Result<()> {
        let waiter = {
            let inner = self.inner.lock().expect("barrier lock");
            match record {
                GossipRecord::Policy(policy) => {
                    inner.chan_edge_dependencies.get(&policy.channel_id).cloned()
                }
                GossipRecord::Node(node) => {
                    inner.node_ann_dependencies.get(&node.node_id).cloned()
                }
                GossipRecord::Channel(_) => None,
            }
        };

        let Some(mut waiter) = waiter else {
            return Ok(());
        };

        tokio::select! {
            outcome = waiter.wait_for(|outcome| outcome.is_some()) => match outcome {
                Ok(outcome) => match outcome.expect("signal fired") {
                    JobOutcome::Allow => Ok(()),
                    JobOutcome::Deny => Err(Error::Ignored(
                        "dependent job failed validation".to_string(),
                    )),
                },
                // The signalling job vanished without a verdict; let the
                // regular processing path classify this record.
                Err(_) => Ok(()),
            },
            _ = self.quit.cancelled() => Err(Error::BarrierShuttingDown),
        }
    }

    /// Wake every job waiting on this record, carrying whether it validated.
    pub fn signal_dependants(&self, record: &GossipRecord, allow: bool) {
        let GossipRecord::Channel(info) = record else {
            return;
        };

        let outcome = if allow {
            JobOutcome::Allow
        } else {
            JobOutcome::Deny
        };

        let mut inner = self.inner.lock().expect("barrier lock");
        if let Some(signal) = inner.chan_ann_signals.remove(&info.channel_id) {
            let _ = signal.send(Some(outcome));
        }
        inner.chan_edge_dependencies.remove(&info.channel_id);
        inner.node_ann_dependencies.remove(&info.node1);
        inner.node_ann_dependencies.remove(&info.node2);
    }
}

struct LockEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    refs: usize,
}

/// Lock-striped map serializing policy writes per channel id even when
/// multiple updates pass validation concurrently.
#[derive(Clone, Default)]
pub(crate) struct ChannelLockMap {
    locks: Arc<Mutex<HashMap<u64, LockEntry>>>,
}

pub(crate) struct ChannelLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    channel_id: u64,
    locks: Arc<Mutex<HashMap<u64, LockEntry>>>,
}

impl ChannelLockMap {
    pub async fn lock(&self, channel_id: u64) -> ChannelLockGuard {
        let lock = {
            let mut locks = self.locks.lock().expect("channel lock map");
            let entry = locks.entry(channel_id).or_insert_with(|| LockEntry {
                lock: Arc::new(tokio::sync::Mutex::new(())),
                refs: 0,
            });
            entry.refs += 1;
            entry.lock.clone()
        };

        let guard = lock.lock_owned().await;
        ChannelLockGuard {
            guard: Some(guard),
            channel_id,
            locks: self.locks.clone(),
        }
    }
}

impl Drop for ChannelLockGuard {
    fn drop(&mut self) {
        // Release the mutex before dropping the map entry.
        self.guard.take();

        let mut locks = self.locks.lock().expect("channel lock map");
        if let Some(entry) = locks.get_mut(&self.channel_id) {
            entry.refs -= 1;
            if entry.refs == 0 {
                locks.remove(&self.channel_id);
            }
        }
    }
}
