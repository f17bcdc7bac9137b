use bitcoin::{Transaction, Txid};

use crate::Result;

/// Persists every sweep tx we ever published, so a spend notification can
/// be attributed to us after a restart, plus the last published tx for
/// startup republication.
pub trait SweeperStore: Send + Sync {
    /// Record a sweep tx. Must be called before the publication attempt so
    /// the spend stays recognizable as ours even when the publish call
    /// never returns.
    fn notify_publish_tx(&self, tx: &Transaction) -> Result<()>;

    fn get_last_published_tx(&self) -> Result<Option<Transaction>>;

    fn is_our_tx(&self, txid: &Txid) -> Result<bool>;
}
