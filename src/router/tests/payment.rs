use std::sync::Arc;
use std::time::Duration;

use crate::config::RouterConfig;
use crate::router::graph::GraphStore;
use crate::router::payment::{
    ControlTower, LightningPayment, PaymentAttemptInfo, PaymentCreationInfo,
};
use crate::router::route::{Route, RouteHop};
use crate::router::{ChannelRouter, RouterArguments};
use crate::store::Store;
use crate::test_utils::{
    channel_info, channel_policy, generate_privkey, node_info, start_router_harness, wait_until,
    MockChain, MockChainView, MockDispatcher, MockOnion, ScriptedOutcome, SessionRecorder,
    RecordingSessionSource,
};
use crate::types::{
    ChannelUpdate, FailureMessage, ForwardingError, Hash256, Preimage, Privkey, Pubkey,
    ShortChannelId,
};
use crate::{now_timestamp_secs, Error};

fn assume_valid_config() -> RouterConfig {
    RouterConfig {
        assume_channel_valid: true,
        chain_io_timeout: Duration::from_secs(5),
        validation_workers: 4,
        ..Default::default()
    }
}

fn payment_for(target: Pubkey, hash: Hash256, amount_msat: u64) -> LightningPayment {
    LightningPayment {
        target,
        amount_msat,
        fee_limit_msat: None,
        payment_hash: hash,
        final_cltv_delta: None,
        pay_attempt_timeout: None,
        outgoing_channel_id: None,
        cltv_limit: None,
        payment_request: vec![],
    }
}

fn one_hop_route(source: Pubkey, dest: Pubkey, amount_msat: u64) -> Route {
    Route {
        total_time_lock: 140,
        total_amount_msat: amount_msat,
        source,
        hops: vec![RouteHop {
            pubkey: dest,
            channel_id: ShortChannelId::new(1, 0, 0).to_u64(),
            amt_to_forward_msat: amount_msat,
            outgoing_cltv: 140,
        }],
    }
}

fn two_hop_route(
    source: Pubkey,
    mid: Pubkey,
    dest: Pubkey,
    amount_msat: u64,
    fee_msat: u64,
) -> Route {
    Route {
        total_time_lock: 300,
        total_amount_msat: amount_msat + fee_msat,
        source,
        hops: vec![
            RouteHop {
                pubkey: mid,
                channel_id: ShortChannelId::new(1, 0, 0).to_u64(),
                amt_to_forward_msat: amount_msat,
                outgoing_cltv: 160,
            },
            RouteHop {
                pubkey: dest,
                channel_id: ShortChannelId::new(1, 1, 0).to_u64(),
                amt_to_forward_msat: amount_msat,
                outgoing_cltv: 160,
            },
        ],
    }
}

#[tokio::test]
async fn test_payment_settles_with_matching_preimage() {
    let recorder = SessionRecorder::new();
    let source = RecordingSessionSource::new(recorder.clone());
    let harness = start_router_harness(assume_valid_config(), Some(source)).await;

    let dest = generate_privkey(2).pubkey();
    let preimage = Preimage::from([7u8; 32]);
    let hash = preimage.hash();

    recorder.queue_route(one_hop_route(harness.self_key.pubkey(), dest, 10_000));
    harness.dispatcher.script_attempt(ScriptedOutcome::Result(
        crate::router::payment::PaymentResult::Settled { preimage },
    ));

    let (settled_preimage, route) = harness
        .router
        .send_payment(payment_for(dest, hash, 10_000))
        .await
        .unwrap();

    // The stored preimage satisfies sha256(preimage) == payment_hash.
    assert_eq!(settled_preimage.hash(), hash);
    assert_eq!(route.total_amount_msat - route.total_fees_msat(), 10_000);
    assert_eq!(harness.dispatcher.sent_count(), 1);

    // Settled payments refuse a re-init.
    assert!(matches!(
        harness.store.init_payment(
            hash,
            PaymentCreationInfo {
                payment_hash: hash,
                value_msat: 10_000,
                creation_time: now_timestamp_secs(),
                payment_request: vec![],
            }
        ),
        Err(Error::PaymentAlreadySucceeded)
    ));

    harness.router.stop().await;
}

#[tokio::test]
async fn test_permanent_failure_is_terminal_after_one_attempt() {
    let recorder = SessionRecorder::new();
    let source = RecordingSessionSource::new(recorder.clone());
    let harness = start_router_harness(assume_valid_config(), Some(source)).await;

    let dest = generate_privkey(2).pubkey();
    let hash = Preimage::from([1u8; 32]).hash();

    // A second route is available but must never be tried.
    recorder.queue_route(one_hop_route(harness.self_key.pubkey(), dest, 10_000));
    recorder.queue_route(one_hop_route(harness.self_key.pubkey(), dest, 10_000));
    harness.dispatcher.script_attempt(ScriptedOutcome::Result(
        crate::router::payment::PaymentResult::Failed {
            error: ForwardingError {
                error_source: dest,
                failure: FailureMessage::UnknownPaymentHash,
            },
        },
    ));

    let channels_before = harness.store.get_channels().unwrap();

    let result = harness
        .router
        .send_payment(payment_for(dest, hash, 10_000))
        .await;
    match result {
        Err(Error::PaymentFailure(fwd_err)) => {
            assert_eq!(fwd_err.failure, FailureMessage::UnknownPaymentHash);
        }
        other => panic!("expected terminal payment failure, got {:?}", other.err()),
    }

    // Exactly one htlc was issued and no graph state was touched.
    assert_eq!(harness.dispatcher.sent_count(), 1);
    assert_eq!(harness.store.get_channels().unwrap(), channels_before);
    assert_eq!(recorder.vertex_failure_count(), 0);
    assert_eq!(recorder.edge_failure_count(), 0);
    assert_eq!(recorder.policy_failure_count(), 0);

    harness.router.stop().await;
}

#[tokio::test]
async fn test_fee_insufficient_applies_update_and_retries() {
    let recorder = SessionRecorder::new();
    let source = RecordingSessionSource::new(recorder.clone());
    let harness = start_router_harness(assume_valid_config(), Some(source)).await;

    let key_b = generate_privkey(2);
    let key_c = generate_privkey(3);
    let node_b = key_b.pubkey();
    let node_c = key_c.pubkey();

    // The graph knows both channels of the route, so the attached update
    // can be validated against the failing channel's capacity.
    let chan1 = ShortChannelId::new(1, 0, 0);
    let chan2 = ShortChannelId::new(1, 1, 0);
    harness
        .router
        .add_edge(channel_info(chan1, harness.self_key.pubkey(), node_b, 1_000_000))
        .await
        .unwrap();
    harness
        .router
        .add_edge(channel_info(chan2, node_b, node_c, 1_000_000))
        .await
        .unwrap();
    harness
        .router
        .update_edge(channel_policy(chan2, direction_between(node_b, node_c), 100, 1_000, 0))
        .await
        .unwrap();

    let preimage = Preimage::from([9u8; 32]);
    let hash = preimage.hash();
    let route = two_hop_route(harness.self_key.pubkey(), node_b, node_c, 1_000_000, 1_000);
    recorder.queue_route(route.clone());
    recorder.queue_route(route);

    // Node b rejects the fee and attaches a signed update doubling it.
    let mut update = ChannelUpdate {
        signature: None,
        chain_hash: Hash256::default(),
        channel_id: chan2.to_u64(),
        timestamp: 200,
        message_flags: 1,
        channel_flags: direction_between(node_b, node_c),
        time_lock_delta: 144,
        htlc_minimum_msat: 0,
        htlc_maximum_msat: 100_000_000,
        fee_base_msat: 2_000,
        fee_proportional_millionths: 0,
    };
    update.sign(&key_b);

    harness.dispatcher.script_attempt(ScriptedOutcome::Result(
        crate::router::payment::PaymentResult::Failed {
            error: ForwardingError {
                error_source: node_b,
                failure: FailureMessage::FeeInsufficient {
                    htlc_msat: 1_000_000,
                    update,
                },
            },
        },
    ));
    harness.dispatcher.script_attempt(ScriptedOutcome::Result(
        crate::router::payment::PaymentResult::Settled { preimage },
    ));

    let (settled, _route) = harness
        .router
        .send_payment(payment_for(node_c, hash, 1_000_000))
        .await
        .unwrap();
    assert_eq!(settled, preimage);

    // Two attempts went out, the corrected policy landed in the graph, and
    // mission control got exactly one edge policy failure report.
    assert_eq!(harness.dispatcher.sent_count(), 2);
    assert_eq!(recorder.policy_failure_count(), 1);
    assert_eq!(recorder.edge_failure_count(), 0);
    assert_eq!(recorder.vertex_failure_count(), 0);

    let (_, policy1, policy2) = harness.router.get_channel_by_id(chan2).unwrap().unwrap();
    let applied = if direction_between(node_b, node_c) == 0 {
        policy1
    } else {
        policy2
    }
    .expect("policy stored");
    assert_eq!(applied.fee_base_msat, 2_000);
    assert_eq!(applied.last_update, 200);

    harness.router.stop().await;
}

fn direction_between(from: Pubkey, to: Pubkey) -> u8 {
    if from < to {
        0
    } else {
        1
    }
}

#[tokio::test]
async fn test_non_terminal_failure_reports_vertex_and_exhausts() {
    let recorder = SessionRecorder::new();
    let source = RecordingSessionSource::new(recorder.clone());
    let harness = start_router_harness(assume_valid_config(), Some(source)).await;

    let dest = generate_privkey(2).pubkey();
    let hash = Preimage::from([2u8; 32]).hash();
    let route = one_hop_route(harness.self_key.pubkey(), dest, 10_000);

    harness.dispatcher.script_attempt(ScriptedOutcome::Result(
        crate::router::payment::PaymentResult::Failed {
            error: ForwardingError {
                error_source: dest,
                failure: FailureMessage::TemporaryNodeFailure,
            },
        },
    ));

    // send_to_route must surface the structured wire failure verbatim once
    // the single route is exhausted.
    let result = harness.router.send_to_route(hash, route).await;
    match result {
        Err(Error::PaymentFailure(fwd_err)) => {
            assert_eq!(fwd_err.failure, FailureMessage::TemporaryNodeFailure);
            assert_eq!(fwd_err.error_source, dest);
        }
        other => panic!("expected structured failure, got {:?}", other.err()),
    }
    assert_eq!(recorder.vertex_failure_count(), 1);

    harness.router.stop().await;
}

#[tokio::test]
async fn test_at_most_one_attempt_in_flight_per_hash() {
    let recorder = SessionRecorder::new();
    let source = RecordingSessionSource::new(recorder.clone());
    let harness = start_router_harness(assume_valid_config(), Some(source)).await;

    let dest = generate_privkey(2).pubkey();
    let hash = Preimage::from([3u8; 32]).hash();

    recorder.queue_route(one_hop_route(harness.self_key.pubkey(), dest, 10_000));
    harness
        .dispatcher
        .script_attempt(ScriptedOutcome::Pending);

    harness
        .router
        .send_payment_async(payment_for(dest, hash, 10_000))
        .await
        .unwrap();
    wait_until(|| harness.dispatcher.sent_count() == 1).await;

    // The same hash cannot be initiated again while in flight.
    let result = harness
        .router
        .send_payment(payment_for(dest, hash, 10_000))
        .await;
    assert!(matches!(result, Err(Error::PaymentInFlight)));

    harness.router.stop().await;
}

#[tokio::test]
async fn test_pay_attempt_timeout_returns_last_error() {
    let recorder = SessionRecorder::new();
    let source = RecordingSessionSource::new(recorder.clone());
    let harness = start_router_harness(assume_valid_config(), Some(source)).await;

    let dest = generate_privkey(2).pubkey();
    let hash = Preimage::from([4u8; 32]).hash();

    recorder.queue_route(one_hop_route(harness.self_key.pubkey(), dest, 10_000));
    harness.dispatcher.script_attempt(ScriptedOutcome::Pending);

    let mut payment = payment_for(dest, hash, 10_000);
    payment.pay_attempt_timeout = Some(Duration::from_millis(100));

    let result = harness.router.send_payment(payment).await;
    assert!(matches!(
        result,
        Err(Error::PaymentAttemptTimeout { .. })
    ));
    // The timer is armed once across attempts; only one htlc went out.
    assert_eq!(harness.dispatcher.sent_count(), 1);

    harness.router.stop().await;
}

#[tokio::test]
async fn test_resumed_payment_awaits_result_without_new_attempts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::new(dir.path()).expect("open store");
    let self_key = generate_privkey(1);
    store
        .set_source_node(node_info(&self_key, now_timestamp_secs()))
        .unwrap();

    let dest = generate_privkey(2).pubkey();
    let preimage = Preimage::from([5u8; 32]);
    let hash = preimage.hash();

    // One attempt with payment id 42 was outstanding when we went down.
    store
        .init_payment(
            hash,
            PaymentCreationInfo {
                payment_hash: hash,
                value_msat: 10_000,
                creation_time: now_timestamp_secs(),
                payment_request: vec![],
            },
        )
        .unwrap();
    store
        .register_attempt(
            hash,
            PaymentAttemptInfo {
                payment_id: 42,
                session_key: Privkey::from_slice(&[0xcd; 32]),
                route: one_hop_route(self_key.pubkey(), dest, 10_000),
            },
        )
        .unwrap();

    let chain = MockChain::new();
    let chain_view = MockChainView::new(chain.clone());
    let dispatcher = MockDispatcher::new();
    dispatcher.expect_result(
        42,
        ScriptedOutcome::Result(crate::router::payment::PaymentResult::Settled { preimage }),
    );

    let router = ChannelRouter::start(RouterArguments {
        config: assume_valid_config(),
        store: store.clone(),
        chain: Arc::new(chain),
        chain_view,
        dispatcher: dispatcher.clone(),
        onion: MockOnion::new(),
        session_source: None,
    })
    .await
    .expect("start router");

    // The router must call get_payment_result(42) and finalize the payment
    // without dispatching anything new.
    wait_until(|| store.fetch_in_flight_payments().unwrap().is_empty()).await;
    assert_eq!(dispatcher.sent_count(), 0);
    assert!(matches!(
        store.init_payment(
            hash,
            PaymentCreationInfo {
                payment_hash: hash,
                value_msat: 10_000,
                creation_time: now_timestamp_secs(),
                payment_request: vec![],
            }
        ),
        Err(Error::PaymentAlreadySucceeded)
    ));

    router.stop().await;
}

#[tokio::test]
async fn test_resumed_payment_with_lost_attempt_fails_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::new(dir.path()).expect("open store");
    let self_key = generate_privkey(1);
    store
        .set_source_node(node_info(&self_key, now_timestamp_secs()))
        .unwrap();

    let dest = generate_privkey(2).pubkey();
    let hash = Preimage::from([6u8; 32]).hash();

    store
        .init_payment(
            hash,
            PaymentCreationInfo {
                payment_hash: hash,
                value_msat: 10_000,
                creation_time: now_timestamp_secs(),
                payment_request: vec![],
            },
        )
        .unwrap();
    store
        .register_attempt(
            hash,
            PaymentAttemptInfo {
                payment_id: 43,
                session_key: Privkey::from_slice(&[0xcd; 32]),
                route: one_hop_route(self_key.pubkey(), dest, 10_000),
            },
        )
        .unwrap();

    let chain = MockChain::new();
    let chain_view = MockChainView::new(chain.clone());
    // The dispatcher has no trace of id 43: the attempt is failed and,
    // with an empty session, so is the payment.
    let dispatcher = MockDispatcher::new();

    let router = ChannelRouter::start(RouterArguments {
        config: assume_valid_config(),
        store: store.clone(),
        chain: Arc::new(chain),
        chain_view,
        dispatcher: dispatcher.clone(),
        onion: MockOnion::new(),
        session_source: None,
    })
    .await
    .expect("start router");

    wait_until(|| store.fetch_in_flight_payments().unwrap().is_empty()).await;
    assert_eq!(dispatcher.sent_count(), 0);

    // The hash is re-initializable after the clean failure.
    store
        .init_payment(
            hash,
            PaymentCreationInfo {
                payment_hash: hash,
                value_msat: 10_000,
                creation_time: now_timestamp_secs(),
                payment_request: vec![],
            },
        )
        .unwrap();

    router.stop().await;
}
