//! Caller-facing engine API.
//!
//! The web layer talks to the engine through this facade: logging activity
//! and task completions (with bucket resolution), reading rank standing and
//! condition progress, and running the one-shot bucket migration.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::allocation::{
    AllocationCandidate, AllocationError, AllocationOutcome, AllocationResolver, BucketMigration,
    MigrationReport,
};
use crate::ledger::{ActivityEntry, LedgerError, LedgerStore, TaskCompletion, XpScope};
use crate::metrics::MetricSnapshotProvider;
use crate::ranks::{Rank, RankError, RankLadder, RankProgress, RankStore};
use crate::storage::{Database, DatabaseError, SystemSettings};

/// Current and next rank for a user.
#[derive(Debug, Clone)]
pub struct RankPair {
    pub current: Option<Rank>,
    pub next: Option<Rank>,
}

/// Result of logging an entry or completion.
#[derive(Debug, Clone)]
pub enum LogOutcome<T> {
    /// The row was written.
    Recorded(T),
    /// Allocation is ambiguous; nothing was written. The caller must pick a
    /// candidate and re-invoke with an explicit allocation.
    NeedsChoice(Vec<AllocationCandidate>),
}

impl<T> LogOutcome<T> {
    /// The recorded row, if one was written.
    pub fn recorded(self) -> Option<T> {
        match self {
            LogOutcome::Recorded(row) => Some(row),
            LogOutcome::NeedsChoice(_) => None,
        }
    }
}

/// Lifetime XP rolled up per trackable type.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackableSummary {
    pub trackable_type_id: i64,
    pub name: String,
    pub total_count: i64,
    pub total_xp: f64,
}

/// Dashboard-level snapshot of a user's progression.
#[derive(Debug, Clone)]
pub struct UserStats {
    pub lifetime_xp: f64,
    pub points_name: String,
    pub daily_xp_goal: i64,
    pub current_rank: Option<Rank>,
    pub next_rank: Option<Rank>,
    pub next_rank_progress: Option<RankProgress>,
    pub trackables: Vec<TrackableSummary>,
}

/// The progression engine.
pub struct ProgressionEngine {
    db: Database,
    metrics: Arc<dyn MetricSnapshotProvider>,
}

impl ProgressionEngine {
    /// Create an engine over a database and a metric snapshot provider.
    pub fn new(db: Database, metrics: Arc<dyn MetricSnapshotProvider>) -> Self {
        Self { db, metrics }
    }

    /// Access the underlying database (for store-level callers).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Current and next rank for a user.
    pub fn current_and_next_rank(&self, user_id: Uuid) -> Result<RankPair, EngineError> {
        let ladder = RankLadder::new(self.db.connection(), self.metrics.as_ref());
        let (current, next) = ladder.current_and_next(user_id)?;
        Ok(RankPair { current, next })
    }

    /// Per-condition progress toward one of the user's ranks.
    pub fn condition_progress(
        &self,
        user_id: Uuid,
        rank_id: i64,
    ) -> Result<RankProgress, EngineError> {
        let conn = self.db.connection();
        let rank = RankStore::new(conn)
            .rank(rank_id)?
            .filter(|r| r.user_id == user_id)
            .ok_or(RankError::RankNotFound(rank_id))?;

        let ladder = RankLadder::new(conn, self.metrics.as_ref());
        Ok(ladder.progress(user_id, &rank)?)
    }

    /// Log an activity entry, resolving its bucket allocation.
    ///
    /// Returns `NeedsChoice` without writing anything when two or more
    /// total-XP conditions on the next rank compete for the entry.
    pub fn log_activity(
        &self,
        user_id: Uuid,
        trackable_type_id: i64,
        entry_date: NaiveDate,
        count: i64,
        value: f64,
        explicit_allocation: Option<i64>,
    ) -> Result<LogOutcome<ActivityEntry>, EngineError> {
        let conn = self.db.connection();
        let ledger = LedgerStore::new(conn);

        let trackable = ledger
            .trackable_type(trackable_type_id)?
            .filter(|t| t.user_id == user_id)
            .ok_or(LedgerError::TrackableTypeNotFound(trackable_type_id))?;

        // Entries that contribute no XP never need attribution
        let xp = trackable.xp_for(count, value);
        let allocation = if xp == 0.0 {
            None
        } else {
            match self.resolve_allocation(user_id, explicit_allocation)? {
                AllocationOutcome::Allocated(condition_id) => Some(condition_id),
                AllocationOutcome::NoneNeeded => None,
                AllocationOutcome::Ambiguous(candidates) => {
                    return Ok(LogOutcome::NeedsChoice(candidates));
                }
            }
        };

        let entry =
            ledger.append_activity(user_id, trackable_type_id, entry_date, count, value, allocation)?;
        tracing::debug!(
            entry_id = entry.id,
            trackable = %trackable.name,
            xp,
            allocated = ?entry.allocated_condition_id,
            "logged activity entry"
        );
        Ok(LogOutcome::Recorded(entry))
    }

    /// Log a task completion, resolving its bucket allocation.
    pub fn log_task_completion(
        &self,
        user_id: Uuid,
        task_key: &str,
        completion_date: NaiveDate,
        count: i64,
        earned_xp: f64,
        explicit_allocation: Option<i64>,
    ) -> Result<LogOutcome<TaskCompletion>, EngineError> {
        let allocation = if earned_xp == 0.0 {
            None
        } else {
            match self.resolve_allocation(user_id, explicit_allocation)? {
                AllocationOutcome::Allocated(condition_id) => Some(condition_id),
                AllocationOutcome::NoneNeeded => None,
                AllocationOutcome::Ambiguous(candidates) => {
                    return Ok(LogOutcome::NeedsChoice(candidates));
                }
            }
        };

        let ledger = LedgerStore::new(self.db.connection());
        let completion = ledger.append_task_completion(
            user_id,
            task_key,
            completion_date,
            count,
            earned_xp,
            allocation,
        )?;
        Ok(LogOutcome::Recorded(completion))
    }

    /// Remove the most recent entry for a trackable type (undo).
    pub fn undo_last_activity(
        &self,
        user_id: Uuid,
        trackable_type_id: i64,
    ) -> Result<Option<ActivityEntry>, EngineError> {
        let ledger = LedgerStore::new(self.db.connection());
        Ok(ledger.remove_last_entry(user_id, trackable_type_id)?)
    }

    /// Convert a rank's total-XP conditions to buckets and backfill history.
    pub fn migrate_rank_to_buckets(&self, rank_id: i64) -> Result<MigrationReport, EngineError> {
        let migration = BucketMigration::new(self.db.connection());
        Ok(migration.migrate_rank_to_buckets(rank_id)?)
    }

    /// Promote legacy single-threshold ranks to condition rows.
    pub fn migrate_legacy_thresholds(&self, user_id: Uuid) -> Result<usize, EngineError> {
        let migration = BucketMigration::new(self.db.connection());
        Ok(migration.migrate_legacy_thresholds(user_id)?)
    }

    /// Flag total-XP conditions that should have been buckets.
    pub fn audit_buckets(&self, user_id: Uuid) -> Result<usize, EngineError> {
        let migration = BucketMigration::new(self.db.connection());
        Ok(migration.audit_buckets(user_id)?)
    }

    /// Dashboard snapshot: lifetime XP, per-trackable rollup, rank standing.
    pub fn user_stats(&self, user_id: Uuid) -> Result<UserStats, EngineError> {
        let conn = self.db.connection();
        let ledger = LedgerStore::new(conn);
        let settings = SystemSettings::new(conn);
        let ladder = RankLadder::new(conn, self.metrics.as_ref());

        let mut trackables = Vec::new();
        for trackable in ledger.trackable_types_for_user(user_id)? {
            trackables.push(TrackableSummary {
                total_count: ledger.entry_count_total(user_id, XpScope::Global, trackable.id)?,
                total_xp: ledger.entry_xp_total(user_id, XpScope::Global, Some(trackable.id))?,
                trackable_type_id: trackable.id,
                name: trackable.name,
            });
        }

        let (current_rank, next_rank) = ladder.current_and_next(user_id)?;
        let next_rank_progress = match &next_rank {
            Some(rank) => Some(ladder.progress(user_id, rank)?),
            None => None,
        };

        Ok(UserStats {
            lifetime_xp: ledger.lifetime_xp(user_id)?,
            points_name: settings.points_name()?,
            daily_xp_goal: settings.daily_xp_goal()?,
            current_rank,
            next_rank,
            next_rank_progress,
            trackables,
        })
    }

    fn resolve_allocation(
        &self,
        user_id: Uuid,
        explicit_allocation: Option<i64>,
    ) -> Result<AllocationOutcome, EngineError> {
        let resolver = AllocationResolver::new(self.db.connection(), self.metrics.as_ref());
        Ok(resolver.resolve(user_id, explicit_allocation)?)
    }
}

/// Engine-level errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}
