use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::router::barrier::ValidationBarrier;
use crate::router::graph::GossipRecord;
use crate::test_utils::{channel_info, channel_policy, generate_privkey, node_info};
use crate::types::ShortChannelId;
use crate::Error;

fn records() -> (GossipRecord, GossipRecord, GossipRecord) {
    let key1 = generate_privkey(2);
    let key2 = generate_privkey(3);
    let id = ShortChannelId::new(10, 1, 0);
    let channel = GossipRecord::Channel(channel_info(
        id,
        key1.pubkey(),
        key2.pubkey(),
        1_000_000,
    ));
    let policy = GossipRecord::Policy(channel_policy(id, 0, 100, 1_000, 1));
    let node = GossipRecord::Node(node_info(&key1, 100));
    (channel, policy, node)
}

#[tokio::test]
async fn test_policy_waits_for_channel_info() {
    let barrier = Arc::new(ValidationBarrier::new(4, CancellationToken::new()));
    let (channel, policy, _) = records();

    let _chan_permit = barrier.init_job_dependencies(&channel).await.unwrap();
    let _policy_permit = barrier.init_job_dependencies(&policy).await.unwrap();

    let waiter = {
        let barrier = barrier.clone();
        let policy = policy.clone();
        tokio::spawn(async move { barrier.wait_for_dependants(&policy).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "policy committed before channel info");

    barrier.signal_dependants(&channel, true);
    waiter.await.unwrap().unwrap();

    // With the entry cleared, later policies pass straight through.
    barrier.wait_for_dependants(&policy).await.unwrap();
}

#[tokio::test]
async fn test_node_record_waits_for_channel_info() {
    let barrier = Arc::new(ValidationBarrier::new(4, CancellationToken::new()));
    let (channel, _, node) = records();

    let _chan_permit = barrier.init_job_dependencies(&channel).await.unwrap();
    let _node_permit = barrier.init_job_dependencies(&node).await.unwrap();

    let waiter = {
        let barrier = barrier.clone();
        let node = node.clone();
        tokio::spawn(async move { barrier.wait_for_dependants(&node).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    barrier.signal_dependants(&channel, true);
    waiter.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_denied_dependency_aborts_waiters() {
    let barrier = Arc::new(ValidationBarrier::new(4, CancellationToken::new()));
    let (channel, policy, _) = records();

    let _chan_permit = barrier.init_job_dependencies(&channel).await.unwrap();
    let _policy_permit = barrier.init_job_dependencies(&policy).await.unwrap();

    let waiter = {
        let barrier = barrier.clone();
        let policy = policy.clone();
        tokio::spawn(async move { barrier.wait_for_dependants(&policy).await })
    };

    barrier.signal_dependants(&channel, false);
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::Ignored(_))));
}

#[tokio::test]
async fn test_shutdown_releases_all_waiters() {
    let quit = CancellationToken::new();
    let barrier = Arc::new(ValidationBarrier::new(4, quit.clone()));
    let (channel, policy, _) = records();

    let _chan_permit = barrier.init_job_dependencies(&channel).await.unwrap();
    let _policy_permit = barrier.init_job_dependencies(&policy).await.unwrap();

    let waiter = {
        let barrier = barrier.clone();
        let policy = policy.clone();
        tokio::spawn(async move { barrier.wait_for_dependants(&policy).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    quit.cancel();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::BarrierShuttingDown)));
}

#[tokio::test]
async fn test_worker_slots_are_bounded() {
    let barrier = Arc::new(ValidationBarrier::new(1, CancellationToken::new()));
    let (channel, _, node) = records();

    let first_permit = barrier.init_job_dependencies(&channel).await.unwrap();

    let second = {
        let barrier = barrier.clone();
        let node = node.clone();
        tokio::spawn(async move { barrier.init_job_dependencies(&node).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished(), "second job got a slot too early");

    drop(first_permit);
    second.await.unwrap().unwrap();
}
