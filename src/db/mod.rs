//! Storage seams for the scheduling core. The in-memory implementations back
//! the binary and the tests; a persistence layer implements the same traits.

pub mod item_store;
pub mod ledger;

pub use item_store::{InMemoryItemStore, ItemStateStore, StoreError, VersionedState};
pub use ledger::{InMemoryLedger, LedgerError, ReviewLedger};
