pub mod ledger;
pub mod memory;
pub mod traits;

// Re-export
pub use ledger::{default_data_dir, FileLedgerRepository};
pub use memory::InMemoryLedgerRepository;
pub use traits::LedgerRepository;
