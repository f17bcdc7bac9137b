use thiserror::Error;

use crate::chain::{ChainError, PublishError};
use crate::types::ForwardingError;

#[derive(Error, Debug)]
pub enum Error {
    /// The router event loop has exited. Pending and future calls all fail
    /// with this; callers must not retry.
    #[error("router shutting down")]
    RouterShuttingDown,

    /// The sweeper event loop has exited.
    #[error("sweeper shutting down")]
    SweeperShuttingDown,

    /// The validation barrier released a waiter during teardown.
    #[error("validation barrier shutting down")]
    BarrierShuttingDown,

    /// The input is already known or affects no state. Swallowed after
    /// logging, never surfaced to users.
    #[error("ignored: {0}")]
    Ignored(String),

    /// The supplied gossip record has a timestamp not strictly newer than the
    /// stored one.
    #[error("outdated: {0}")]
    Outdated(String),

    /// Path finding target is not a known vertex.
    #[error("target not in network")]
    TargetNotInNetwork,

    /// All candidate routes have been exhausted. Carries the last classified
    /// wire failure so `send_to_route` can surface it verbatim.
    #[error("unable to route payment to destination")]
    NoRoute { last_error: Option<ForwardingError> },

    /// The payment attempt timer fired before the payment completed.
    #[error("payment attempt not completed before timeout")]
    PaymentAttemptTimeout { last_error: Option<ForwardingError> },

    /// A payment attempt failed with a terminal wire failure.
    #[error("payment failed: {0}")]
    PaymentFailure(ForwardingError),

    /// The dispatcher no longer knows the attempt id. Fatal to that attempt.
    #[error("payment id not found")]
    PaymentIdNotFound,

    /// `init_payment` was called for a hash that already has an outstanding
    /// attempt.
    #[error("payment already in flight")]
    PaymentInFlight,

    /// `init_payment` was called for a hash that already settled.
    #[error("payment already succeeded")]
    PaymentAlreadySucceeded,

    /// A fee preference resolved outside the `[relay, max]` fee-rate bounds.
    #[error("invalid fee preference: {0}")]
    InvalidFeePreference(String),

    /// The sweep output after fees would fall below the dust limit.
    #[error("sweep tx output below dust limit")]
    DustOutput,

    #[error("no path found: {0}")]
    NoPathFound(String),

    /// An advertised channel's funding output does not match its declared
    /// keys or does not exist unspent.
    #[error("funding output mismatch: {0}")]
    FundingMismatch(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("failed to spawn actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),
}

impl Error {
    /// Recoverable gossip conditions are logged and swallowed; they never
    /// abort a batch or a payment.
    pub fn is_ignored(&self) -> bool {
        matches!(self, Error::Ignored(_))
    }

    pub fn is_outdated(&self) -> bool {
        matches!(self, Error::Outdated(_))
    }

    /// Whether applying a channel update with this outcome still counts as
    /// success: the update was a no-op or superseded.
    pub fn is_benign_update_result(&self) -> bool {
        self.is_ignored() || self.is_outdated()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
