use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::model::ledger::Ledger;
use crate::repository::traits::LedgerRepository;

/// Ledger kept in memory only. Used by tests.
#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    ledger: Mutex<Ledger>,
}

impl InMemoryLedgerRepository {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    pub fn snapshot(&self) -> Ledger {
        self.load().unwrap_or_default()
    }
}

impl LedgerRepository for InMemoryLedgerRepository {
    fn load(&self) -> Result<Ledger> {
        let guard = self
            .ledger
            .lock()
            .map_err(|_| anyhow!("In-memory ledger lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        let mut guard = self
            .ledger
            .lock()
            .map_err(|_| anyhow!("In-memory ledger lock poisoned"))?;
        *guard = ledger.clone();
        Ok(())
    }
}
