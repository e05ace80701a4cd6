use crate::model::ledger::Ledger;
use anyhow::Result;

/// Durable store for the ledger. A flush calls `load`, merges, then `save`;
/// the caller serializes those steps against other flushes.
pub trait LedgerRepository: Send + Sync {
    fn load(&self) -> Result<Ledger>;
    fn save(&self, ledger: &Ledger) -> Result<()>;
}
