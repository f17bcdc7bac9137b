use bitcoin::hashes::Hash as _;
use bitcoin::{ScriptBuf, WPubkeyHash};

use crate::sweep::txbuild::{
    build_sweep_tx, estimate_sweep_tx_weight, generate_input_partitionings,
    DUST_OUTPUT_LIMIT_SAT,
};
use crate::test_utils::{sweep_input, MockSigner};
use crate::types::FeeRatePerKw;
use crate::Error;

fn sweep_script() -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0xaa; 20]))
}

#[test]
fn test_partitioning_drops_negative_yield_inputs() {
    // At 1000 sat/kw an input costs roughly 273 sat to spend; 100 sat of
    // value yields nothing.
    let inputs = vec![sweep_input(1, 100), sweep_input(2, 100_000)];
    let sets = generate_input_partitionings(inputs, FeeRatePerKw(1_000), 10);

    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 1);
    assert_eq!(sets[0][0].outpoint, sweep_input(2, 100_000).outpoint);
}

#[test]
fn test_partitioning_caps_inputs_per_tx() {
    let inputs: Vec<_> = (1..=5u8).map(|i| sweep_input(i, 100_000)).collect();
    let sets = generate_input_partitionings(inputs, FeeRatePerKw(10), 2);

    assert_eq!(sets.len(), 3);
    assert_eq!(sets[0].len(), 2);
    assert_eq!(sets[1].len(), 2);
    assert_eq!(sets[2].len(), 1);
}

#[test]
fn test_partitioning_orders_by_yield() {
    let small = sweep_input(1, 10_000);
    let large = sweep_input(2, 500_000);
    let sets = generate_input_partitionings(vec![small, large.clone()], FeeRatePerKw(10), 1);

    // Largest yield is swept first.
    assert_eq!(sets[0][0].outpoint, large.outpoint);
}

#[test]
fn test_partitioning_withholds_dust_sets() {
    // Positive yield per input, but the set output lands under dust.
    let inputs = vec![sweep_input(1, 300)];
    let sets = generate_input_partitionings(inputs, FeeRatePerKw(100), 10);
    assert!(sets.is_empty());
}

#[test]
fn test_build_sweep_tx_pays_single_output_minus_fee() {
    let inputs = vec![sweep_input(1, 100_000), sweep_input(2, 50_000)];
    let script = sweep_script();
    let fee_rate = FeeRatePerKw(250);

    let tx = build_sweep_tx(&inputs, script.clone(), 600_000, fee_rate, &MockSigner).unwrap();

    assert_eq!(tx.input.len(), 2);
    assert_eq!(tx.output.len(), 1);
    assert_eq!(tx.output[0].script_pubkey, script);
    assert_eq!(tx.lock_time.to_consensus_u32(), 600_000);

    let fee = fee_rate.fee_for_weight(estimate_sweep_tx_weight(&inputs, &script));
    assert_eq!(tx.output[0].value.to_sat(), 150_000 - fee);
    assert!(tx.output[0].value.to_sat() >= DUST_OUTPUT_LIMIT_SAT);

    // Inputs opt into RBF and carry the mock witness.
    for txin in &tx.input {
        assert!(txin.sequence.is_rbf());
        assert!(!txin.witness.is_empty());
    }
}

#[test]
fn test_build_sweep_tx_rejects_dust_output() {
    let inputs = vec![sweep_input(1, 300)];
    let result = build_sweep_tx(
        &inputs,
        sweep_script(),
        600_000,
        FeeRatePerKw(100),
        &MockSigner,
    );
    assert!(matches!(result, Err(Error::DustOutput)));

    let result = build_sweep_tx(&[], sweep_script(), 600_000, FeeRatePerKw(1), &MockSigner);
    assert!(matches!(result, Err(Error::DustOutput)));
}
