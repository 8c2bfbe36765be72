//! progression - Rank ladder and XP allocation engine
//!
//! Library backing the gamification side of a self-hosted creator dashboard:
//! user-defined trackable activities feed an append-only XP ledger, ranks
//! carry condition lists evaluated against the ledger and externally-synced
//! channel metrics, and total-XP conditions can be split into exclusive
//! buckets with per-entry attribution.

pub mod allocation;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod ranks;
pub mod storage;

// Re-export commonly used types
pub use allocation::{AllocationCandidate, AllocationOutcome, AllocationResolver, BucketMigration};
pub use engine::{EngineError, LogOutcome, ProgressionEngine, RankPair, UserStats};
pub use ledger::{LedgerStore, TrackableType, XpMode};
pub use metrics::{MetricSnapshotProvider, NoSnapshots, StaticSnapshots};
pub use ranks::{Condition, ConditionKind, Rank, RankLadder, RankStore};
pub use storage::Database;
