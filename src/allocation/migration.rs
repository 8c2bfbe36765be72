//! Historical reallocation fixups.
//!
//! One-shot data repairs run when a rank's total-XP conditions change shape:
//! converting global conditions to buckets (with backfill of previously
//! unattributed rows), promoting legacy single-threshold ranks to condition
//! rows, and flagging conditions that should have been buckets all along.
//! All of them are safe to run repeatedly.

use rusqlite::Connection;
use uuid::Uuid;

use crate::ledger::LedgerStore;
use crate::ranks::{ConditionKind, NewCondition, RankError, RankStore};
use super::resolver::AllocationError;

/// Outcome of a bucket migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MigrationReport {
    /// Conditions flipped from global to bucketed.
    pub conditions_converted: usize,
    /// Ledger rows (entries + completions) that received the default tag.
    pub entries_allocated: usize,
}

/// Runs historical reallocation against the ledger.
pub struct BucketMigration<'a> {
    ranks: RankStore<'a>,
    ledger: LedgerStore<'a>,
}

impl<'a> BucketMigration<'a> {
    /// Create a new migration runner over a database connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self {
            ranks: RankStore::new(conn),
            ledger: LedgerStore::new(conn),
        }
    }

    /// Whether a rank still needs bucket conversion.
    ///
    /// Required whenever two or more total-XP conditions share a rank,
    /// otherwise one logged entry satisfies all of them at once.
    pub fn needs_bucket_migration(&self, rank_id: i64) -> Result<bool, AllocationError> {
        let xp_conditions = self
            .ranks
            .conditions_of_kind(rank_id, ConditionKind::TotalXp)?;
        Ok(xp_conditions.len() >= 2 && xp_conditions.iter().any(|c| !c.is_bucket))
    }

    /// Convert a rank's total-XP conditions to buckets and backfill history.
    ///
    /// Every total-XP condition on the rank becomes a bucket. The lowest-id
    /// condition is the default recipient: all of the user's previously
    /// unattributed entries and completions are tagged with it, and rows
    /// that already carry a tag are left untouched. Running again after all
    /// nulls are resolved converts and allocates nothing further.
    pub fn migrate_rank_to_buckets(&self, rank_id: i64) -> Result<MigrationReport, AllocationError> {
        let rank = self
            .ranks
            .rank(rank_id)?
            .ok_or(RankError::RankNotFound(rank_id))?;

        let xp_conditions = self
            .ranks
            .conditions_of_kind(rank_id, ConditionKind::TotalXp)?;
        if xp_conditions.is_empty() {
            return Ok(MigrationReport {
                conditions_converted: 0,
                entries_allocated: 0,
            });
        }

        let mut conditions_converted = 0;
        for condition in &xp_conditions {
            if !condition.is_bucket {
                self.ranks.set_bucket(condition.id, true)?;
                conditions_converted += 1;
            }
        }

        // conditions_of_kind orders by id, so the first one is the
        // committed lowest-id default recipient
        let default_recipient = &xp_conditions[0];
        let entries = self
            .ledger
            .allocate_unassigned_entries(rank.user_id, default_recipient.id)
            .map_err(RankError::from)?;
        let completions = self
            .ledger
            .allocate_unassigned_completions(rank.user_id, default_recipient.id)
            .map_err(RankError::from)?;

        let report = MigrationReport {
            conditions_converted,
            entries_allocated: entries + completions,
        };
        tracing::info!(
            rank = %rank.name,
            conditions_converted = report.conditions_converted,
            entries_allocated = report.entries_allocated,
            default_condition_id = default_recipient.id,
            "migrated rank to XP buckets"
        );

        Ok(report)
    }

    /// Promote legacy single-threshold ranks to condition rows.
    ///
    /// Ranks carrying a positive `min_xp` and no conditions get one total-XP
    /// condition with that threshold. Returns the number of ranks promoted.
    pub fn migrate_legacy_thresholds(&self, user_id: Uuid) -> Result<usize, AllocationError> {
        let mut promoted = 0;
        for rank in self.ranks.ranks_for_user(user_id)? {
            let has_conditions = !self.ranks.conditions_for_rank(rank.id)?.is_empty();
            match rank.min_xp {
                Some(min_xp) if min_xp > 0.0 && !has_conditions => {
                    self.ranks.add_condition(
                        rank.id,
                        NewCondition::of_kind(ConditionKind::TotalXp, min_xp),
                    )?;
                    promoted += 1;
                    tracing::info!(rank = %rank.name, min_xp, "promoted legacy threshold to condition");
                }
                _ => {}
            }
        }
        Ok(promoted)
    }

    /// Flag total-XP conditions that should have been buckets.
    ///
    /// A condition is misconfigured when it carries a custom name other than
    /// a plain total-XP label, or shares its rank with another total-XP
    /// condition, yet still counts globally. Returns the number fixed.
    pub fn audit_buckets(&self, user_id: Uuid) -> Result<usize, AllocationError> {
        let mut fixed = 0;
        for rank in self.ranks.ranks_for_user(user_id)? {
            let xp_conditions = self
                .ranks
                .conditions_of_kind(rank.id, ConditionKind::TotalXp)?;
            let has_siblings = xp_conditions.len() > 1;

            for condition in &xp_conditions {
                if condition.is_bucket {
                    continue;
                }
                let named_bucket = condition
                    .custom_name
                    .as_deref()
                    .map(|n| !matches!(n.trim(), "Total XP" | "total_xp" | "XP"))
                    .unwrap_or(false);
                if named_bucket || has_siblings {
                    self.ranks.set_bucket(condition.id, true)?;
                    fixed += 1;
                    tracing::info!(
                        condition_id = condition.id,
                        rank = %rank.name,
                        "flagged misconfigured global condition as bucket"
                    );
                }
            }
        }
        Ok(fixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{XpMode, XpScope};
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_migration_converts_and_backfills() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let ranks = RankStore::new(conn);
        let ledger = LedgerStore::new(conn);
        let user_id = Uuid::new_v4();

        let gold = ranks.create_rank(user_id, 3, "Gold", None, false).unwrap();
        let sales_bucket = ranks
            .add_condition(
                gold.id,
                NewCondition::of_kind(ConditionKind::TotalXp, 500.0).named("Sales Bucket"),
            )
            .unwrap();
        let content_bucket = ranks
            .add_condition(
                gold.id,
                NewCondition::of_kind(ConditionKind::TotalXp, 300.0).named("Content Bucket"),
            )
            .unwrap();

        let sales = ledger
            .create_trackable_type(user_id, "Sale", XpMode::ValueBased, 0.0, 0.1, vec![])
            .unwrap();
        ledger
            .append_activity(user_id, sales.id, date("2026-01-05"), 1, 1000.0, None)
            .unwrap();

        let migration = BucketMigration::new(conn);
        assert!(migration.needs_bucket_migration(gold.id).unwrap());

        let report = migration.migrate_rank_to_buckets(gold.id).unwrap();
        assert_eq!(report.conditions_converted, 2);
        assert_eq!(report.entries_allocated, 1);
        assert!(!migration.needs_bucket_migration(gold.id).unwrap());

        // The $1000 sale's 100 XP lands in the lowest-id bucket only
        let in_sales = ledger
            .entry_xp_total(user_id, XpScope::Bucket(sales_bucket.id), None)
            .unwrap();
        assert!((in_sales - 100.0).abs() < 1e-9);

        let in_content = ledger
            .entry_xp_total(user_id, XpScope::Bucket(content_bucket.id), None)
            .unwrap();
        assert_eq!(in_content, 0.0);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let ranks = RankStore::new(conn);
        let ledger = LedgerStore::new(conn);
        let user_id = Uuid::new_v4();

        let gold = ranks.create_rank(user_id, 3, "Gold", None, false).unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 500.0))
            .unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 300.0))
            .unwrap();

        let posts = ledger
            .create_trackable_type(user_id, "Blog Post", XpMode::FixedPerUnit, 25.0, 1.0, vec![])
            .unwrap();
        ledger
            .append_activity(user_id, posts.id, date("2026-01-05"), 1, 0.0, None)
            .unwrap();

        let migration = BucketMigration::new(conn);
        let first = migration.migrate_rank_to_buckets(gold.id).unwrap();
        assert_eq!(first.entries_allocated, 1);

        let second = migration.migrate_rank_to_buckets(gold.id).unwrap();
        assert_eq!(second.conditions_converted, 0);
        assert_eq!(second.entries_allocated, 0);
    }

    #[test]
    fn test_migration_leaves_tagged_rows_alone() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let ranks = RankStore::new(conn);
        let ledger = LedgerStore::new(conn);
        let user_id = Uuid::new_v4();

        let gold = ranks.create_rank(user_id, 3, "Gold", None, false).unwrap();
        let first = ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 500.0))
            .unwrap();
        let second = ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 300.0))
            .unwrap();

        let posts = ledger
            .create_trackable_type(user_id, "Blog Post", XpMode::FixedPerUnit, 25.0, 1.0, vec![])
            .unwrap();
        ledger
            .append_activity(user_id, posts.id, date("2026-01-05"), 1, 0.0, Some(second.id))
            .unwrap();
        ledger
            .append_activity(user_id, posts.id, date("2026-01-06"), 1, 0.0, None)
            .unwrap();

        let migration = BucketMigration::new(conn);
        let report = migration.migrate_rank_to_buckets(gold.id).unwrap();
        assert_eq!(report.entries_allocated, 1);

        let entries = ledger.entries_for_user(user_id).unwrap();
        assert_eq!(entries[0].allocated_condition_id, Some(second.id));
        assert_eq!(entries[1].allocated_condition_id, Some(first.id));
    }

    #[test]
    fn test_migration_without_xp_conditions_is_a_noop() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let ranks = RankStore::new(conn);
        let user_id = Uuid::new_v4();

        let rank = ranks.create_rank(user_id, 1, "Bronze", None, false).unwrap();
        ranks
            .add_condition(
                rank.id,
                NewCondition::of_kind(ConditionKind::Subscribers, 1000.0),
            )
            .unwrap();

        let migration = BucketMigration::new(conn);
        let report = migration.migrate_rank_to_buckets(rank.id).unwrap();
        assert_eq!(report.conditions_converted, 0);
        assert_eq!(report.entries_allocated, 0);
    }

    #[test]
    fn test_legacy_threshold_promotion() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let ranks = RankStore::new(conn);
        let user_id = Uuid::new_v4();

        let legacy = ranks
            .create_rank(user_id, 1, "Bronze", Some(250.0), false)
            .unwrap();
        ranks.create_rank(user_id, 2, "Silver", None, false).unwrap();

        let migration = BucketMigration::new(conn);
        assert_eq!(migration.migrate_legacy_thresholds(user_id).unwrap(), 1);

        let conditions = ranks.conditions_for_rank(legacy.id).unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].kind, ConditionKind::TotalXp);
        assert_eq!(conditions[0].threshold, 250.0);

        // Already promoted, nothing further to do
        assert_eq!(migration.migrate_legacy_thresholds(user_id).unwrap(), 0);
    }

    #[test]
    fn test_audit_flags_named_and_sibling_conditions() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection();
        let ranks = RankStore::new(conn);
        let user_id = Uuid::new_v4();

        // A lone, plainly-named global condition is fine
        let bronze = ranks.create_rank(user_id, 1, "Bronze", None, false).unwrap();
        ranks
            .add_condition(bronze.id, NewCondition::of_kind(ConditionKind::TotalXp, 100.0))
            .unwrap();

        // A custom-named condition implies a specific bucket goal
        let silver = ranks.create_rank(user_id, 2, "Silver", None, false).unwrap();
        ranks
            .add_condition(
                silver.id,
                NewCondition::of_kind(ConditionKind::TotalXp, 200.0).named("Outreach XP"),
            )
            .unwrap();

        // Siblings must be separated
        let gold = ranks.create_rank(user_id, 3, "Gold", None, false).unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 500.0))
            .unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 300.0))
            .unwrap();

        let migration = BucketMigration::new(conn);
        assert_eq!(migration.audit_buckets(user_id).unwrap(), 3);

        let bronze_conditions = ranks.conditions_for_rank(bronze.id).unwrap();
        assert!(!bronze_conditions[0].is_bucket);

        // Second pass finds nothing left to fix
        assert_eq!(migration.audit_buckets(user_id).unwrap(), 0);
    }
}
