//! `pillcount-ledger` — the inventory ledger component.
//!
//! The ledger is the sole owner and mutator of the medication collection
//! and the count history. Every mutation flows through the medication
//! aggregate's decide/evolve cycle, so a rejected operation leaves the
//! books untouched.

pub mod history;
pub mod ledger;
pub mod store;

pub use history::HistoryEntry;
pub use ledger::InventoryLedger;
pub use store::{InMemoryLedgerStore, LedgerSnapshot, LedgerStore, StoreError};
