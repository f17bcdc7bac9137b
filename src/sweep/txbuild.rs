use bitcoin::absolute::LockTime;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::{InputSigner, SignDescriptor};
use crate::types::FeeRatePerKw;
use crate::{Error, Result};

/// An output offered to the sweeper, with everything needed to watch,
/// weigh and sign its spend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepInputDescriptor {
    pub outpoint: OutPoint,
    pub value_sat: u64,
    pub pk_script: ScriptBuf,

    /// Upper bound of the witness weight needed to spend this output.
    pub witness_weight: u64,

    /// Height the output confirmed at, bounding the spend rescan.
    pub height_hint: u32,

    pub sign_desc: SignDescriptor,
}

// Weight units of the non-witness tx shell: version, input/output counts,
// locktime, plus the segwit marker and flag bytes.
const BASE_TX_WEIGHT: u64 = 4 * (4 + 1 + 1 + 4) + 2;

// Weight units of one input without its witness: previous outpoint, empty
// script length, sequence.
const PER_INPUT_WEIGHT: u64 = 4 * (32 + 4 + 1 + 4);

// Weight estimate for the single sweep output, assuming a P2WPKH wallet
// script: value, script length, 22 script bytes.
const SWEEP_OUTPUT_WEIGHT: u64 = 4 * (8 + 1 + 22);

/// Smallest sweep output we are willing to create, the P2WPKH dust
/// threshold at the standard 3 sat/vbyte relay rate.
pub const DUST_OUTPUT_LIMIT_SAT: u64 = 294;

fn output_weight(script: &ScriptBuf) -> u64 {
    4 * (8 + 1 + script.len() as u64)
}

/// Estimated weight of a sweep tx spending `inputs` into `output_script`.
pub fn estimate_sweep_tx_weight(inputs: &[SweepInputDescriptor], output_script: &ScriptBuf) -> u64 {
    let input_weight: u64 = inputs
        .iter()
        .map(|input| PER_INPUT_WEIGHT + input.witness_weight)
        .sum();
    BASE_TX_WEIGHT + input_weight + output_weight(output_script)
}

/// Split sweepable inputs into distinct publication sets of at most
/// `max_inputs_per_tx` inputs each. Inputs whose own fee share exceeds
/// their value are dropped; a set whose total output would fall below dust
/// is withheld so its inputs stay pending for a future batch.
pub fn generate_input_partitionings(
    mut inputs: Vec<SweepInputDescriptor>,
    sweep_fee_rate: FeeRatePerKw,
    max_inputs_per_tx: usize,
) -> Vec<Vec<SweepInputDescriptor>> {
    // Keep only positive-yield inputs, largest yield first, so the most
    // valuable inputs get swept soonest.
    inputs.retain(|input| {
        let input_fee =
            sweep_fee_rate.fee_for_weight(PER_INPUT_WEIGHT + input.witness_weight);
        if input.value_sat <= input_fee {
            debug!(
                outpoint = %input.outpoint,
                value_sat = input.value_sat,
                input_fee,
                "skipping negative yield input"
            );
            return false;
        }
        true
    });
    inputs.sort_by_key(|input| {
        let input_fee =
            sweep_fee_rate.fee_for_weight(PER_INPUT_WEIGHT + input.witness_weight);
        std::cmp::Reverse(input.value_sat - input_fee)
    });

    let mut sets = vec![];
    for chunk in inputs.chunks(max_inputs_per_tx.max(1)) {
        let total_value: u64 = chunk.iter().map(|input| input.value_sat).sum();
        let weight = BASE_TX_WEIGHT
            + chunk
                .iter()
                .map(|input| PER_INPUT_WEIGHT + input.witness_weight)
                .sum::<u64>()
            + SWEEP_OUTPUT_WEIGHT;
        let fee = sweep_fee_rate.fee_for_weight(weight);

        if total_value <= fee || total_value - fee < DUST_OUTPUT_LIMIT_SAT {
            debug!(
                inputs = chunk.len(),
                total_value, fee, "withholding input set with dust output"
            );
            continue;
        }

        sets.push(chunk.to_vec());
    }
    sets
}

/// Build and sign a sweep tx spending `inputs` into a single output paying
/// `output_script`. The locktime is set to the current height: it eases
/// reorg handling, thwarts fee sniping, and blends in with wallet
/// transactions.
pub fn build_sweep_tx(
    inputs: &[SweepInputDescriptor],
    output_script: ScriptBuf,
    current_height: u32,
    fee_rate: FeeRatePerKw,
    signer: &dyn InputSigner,
) -> Result<Transaction> {
    if inputs.is_empty() {
        return Err(Error::DustOutput);
    }

    let weight = estimate_sweep_tx_weight(inputs, &output_script);
    let fee = fee_rate.fee_for_weight(weight);
    let total_value: u64 = inputs.iter().map(|input| input.value_sat).sum();

    if total_value <= fee || total_value - fee < DUST_OUTPUT_LIMIT_SAT {
        return Err(Error::DustOutput);
    }

    let lock_time = LockTime::from_height(current_height)
        .map_err(|err| Error::Store(format!("invalid locktime height: {}", err)))?;

    let mut tx = Transaction {
        version: Version::TWO,
        lock_time,
        input: inputs
            .iter()
            .map(|input| TxIn {
                previous_output: input.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(total_value - fee),
            script_pubkey: output_script,
        }],
    };

    let witnesses: Vec<Witness> = inputs
        .iter()
        .enumerate()
        .map(|(index, input)| signer.sign_input(&tx, index, &input.sign_desc))
        .collect::<std::result::Result<_, _>>()?;
    for (txin, witness) in tx.input.iter_mut().zip(witnesses) {
        txin.witness = witness;
    }

    Ok(tx)
}
