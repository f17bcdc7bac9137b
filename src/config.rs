use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::FeeRatePerKw;

/// The duration after which we stop trying more routes for a payment.
pub const DEFAULT_PAY_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// If the delta between now and when a channel was last updated is greater
/// than this on both half-edges, the channel is a zombie eligible for
/// pruning. 14 days.
pub const DEFAULT_CHANNEL_PRUNE_EXPIRY: Duration = Duration::from_secs(14 * 24 * 3600);

/// How often the graph is examined to garbage collect zombie channels.
pub const DEFAULT_GRAPH_PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

/// Upper bound for a single chain oracle call made from the router loop.
pub const DEFAULT_CHAIN_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Time window during which new inputs can still join the sweep tx about to
/// be generated.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_secs(30);

/// Maximum number of times an input is included in a publish attempt before
/// giving up and returning an error to the caller.
pub const DEFAULT_MAX_SWEEP_ATTEMPTS: u32 = 10;

/// Maximum number of inputs in a single sweep tx. If more need to be swept,
/// multiple txes are created and published.
pub const DEFAULT_MAX_INPUTS_PER_TX: usize = 100;

/// The maximum fee rate allowed within the sweeper, equivalent to
/// 10,000 sat/vbyte.
pub const DEFAULT_MAX_FEE_RATE: FeeRatePerKw = FeeRatePerKw(250 * 10_000);

/// Size of the fee rate buckets used when clustering inputs with similar fee
/// rates. Given a relay fee rate of 1 sat/vbyte, a multiplier of 10 results
/// in buckets 1-10, 11-20, ... sat/vbyte up to the maximum fee rate.
pub const DEFAULT_FEE_RATE_BUCKET_SIZE: u64 = 10;

fn default_validation_workers() -> usize {
    4 * std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Duration used to determine if a channel should be pruned or not.
    #[serde(default, with = "duration_secs")]
    pub channel_prune_expiry: Duration,

    /// Interval between zombie channel garbage collections.
    #[serde(default, with = "duration_secs")]
    pub graph_prune_interval: Duration,

    /// When set, skip spentness verification of advertised channels and rely
    /// on the disabled bits for zombie pruning instead. Saves long rescans
    /// for light chain backends.
    pub assume_channel_valid: bool,

    /// Bound of the gossip validation worker pool.
    #[serde(default = "default_validation_workers")]
    pub validation_workers: usize,

    /// Timeout applied to non-cancelable chain oracle calls.
    #[serde(default, with = "duration_secs")]
    pub chain_io_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            channel_prune_expiry: DEFAULT_CHANNEL_PRUNE_EXPIRY,
            graph_prune_interval: DEFAULT_GRAPH_PRUNE_INTERVAL,
            assume_channel_valid: false,
            validation_workers: default_validation_workers(),
            chain_io_timeout: DEFAULT_CHAIN_IO_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Batch window between the first schedulable input and publication.
    #[serde(default, with = "duration_secs")]
    pub batch_window: Duration,

    pub max_inputs_per_tx: usize,

    pub max_sweep_attempts: u32,

    pub max_fee_rate: FeeRatePerKw,

    pub fee_rate_bucket_size: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            batch_window: DEFAULT_BATCH_WINDOW,
            max_inputs_per_tx: DEFAULT_MAX_INPUTS_PER_TX,
            max_sweep_attempts: DEFAULT_MAX_SWEEP_ATTEMPTS,
            max_fee_rate: DEFAULT_MAX_FEE_RATE,
            fee_rate_bucket_size: DEFAULT_FEE_RATE_BUCKET_SIZE,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
