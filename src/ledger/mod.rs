//! Append-only activity ledger.

pub mod store;
pub mod types;

pub use store::{EntryFilter, LedgerError, LedgerStore};
pub use types::{ActivityEntry, TaskCompletion, TrackableType, XpMode, XpScope, XpTier};
