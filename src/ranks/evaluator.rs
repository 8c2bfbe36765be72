//! Condition evaluation.
//!
//! Computes the current value of one condition and whether its threshold is
//! met. Ledger-scoped kinds honor the bucket flag: a bucket only counts rows
//! allocated to it, while a global condition sums the full ledger no matter
//! what tags individual rows carry. Synced kinds read the latest snapshot
//! and treat a missing snapshot as zero.

use rusqlite::Connection;
use uuid::Uuid;

use crate::ledger::{LedgerStore, XpScope};
use crate::metrics::MetricSnapshotProvider;
use super::store::RankError;
use super::types::{Condition, ConditionKind, ConditionStatus};

/// Evaluates conditions against the ledger and metric snapshots.
pub struct ConditionEvaluator<'a> {
    ledger: LedgerStore<'a>,
    metrics: &'a dyn MetricSnapshotProvider,
}

impl<'a> ConditionEvaluator<'a> {
    /// Create a new evaluator over a connection and snapshot provider.
    pub fn new(conn: &'a Connection, metrics: &'a dyn MetricSnapshotProvider) -> Self {
        Self {
            ledger: LedgerStore::new(conn),
            metrics,
        }
    }

    /// Evaluate one condition for a user.
    ///
    /// Threshold comparison is inclusive; the current value never comes out
    /// negative.
    pub fn evaluate(
        &self,
        condition: &Condition,
        user_id: Uuid,
    ) -> Result<ConditionStatus, RankError> {
        let scope = if condition.is_bucket {
            XpScope::Bucket(condition.id)
        } else {
            XpScope::Global
        };

        let current_value = match condition.kind {
            ConditionKind::TotalXp => {
                self.ledger.entry_xp_total(user_id, scope, None)?
                    + self.ledger.task_xp_total(user_id, scope)?
            }
            ConditionKind::TrackableXp => {
                let trackable = self.trackable_ref(condition)?;
                self.ledger.entry_xp_total(user_id, scope, Some(trackable))?
            }
            ConditionKind::TrackableCount => {
                let trackable = self.trackable_ref(condition)?;
                self.ledger.entry_count_total(user_id, scope, trackable)? as f64
            }
            ConditionKind::Subscribers => {
                self.metrics.subscriber_count(user_id).unwrap_or(0) as f64
            }
            ConditionKind::TotalViews => self.metrics.aggregate_views(user_id).unwrap_or(0) as f64,
            ConditionKind::CategoryVideoCount => {
                let category = self.category_ref(condition)?;
                self.metrics
                    .category_video_count(user_id, category)
                    .unwrap_or(0) as f64
            }
            ConditionKind::CategoryViews => {
                let category = self.category_ref(condition)?;
                self.metrics.category_views(user_id, category).unwrap_or(0) as f64
            }
            ConditionKind::StreakCurrent => {
                let streak_type = self.streak_ref(condition)?;
                self.metrics
                    .streak(user_id, streak_type)
                    .map(|s| s.current)
                    .unwrap_or(0) as f64
            }
            ConditionKind::StreakLongest => {
                let streak_type = self.streak_ref(condition)?;
                self.metrics
                    .streak(user_id, streak_type)
                    .map(|s| s.longest)
                    .unwrap_or(0) as f64
            }
            ConditionKind::TasksCompleted => {
                self.ledger.task_completion_total(user_id)? as f64
            }
            ConditionKind::PerfectWeeks => self.metrics.perfect_weeks(user_id).unwrap_or(0) as f64,
            ConditionKind::AchievementsUnlocked => {
                self.metrics.achievements_unlocked(user_id).unwrap_or(0) as f64
            }
        };

        let current_value = current_value.max(0.0);
        Ok(ConditionStatus {
            current_value,
            is_met: current_value >= condition.threshold,
        })
    }

    fn trackable_ref(&self, condition: &Condition) -> Result<i64, RankError> {
        condition.trackable_type_id.ok_or_else(|| {
            RankError::ValidationError(format!(
                "condition {} is missing its trackable reference",
                condition.id
            ))
        })
    }

    fn category_ref<'c>(&self, condition: &'c Condition) -> Result<&'c str, RankError> {
        condition.category.as_deref().ok_or_else(|| {
            RankError::ValidationError(format!(
                "condition {} is missing its content category",
                condition.id
            ))
        })
    }

    fn streak_ref(&self, condition: &Condition) -> Result<crate::metrics::StreakType, RankError> {
        condition.streak_type.ok_or_else(|| {
            RankError::ValidationError(format!(
                "condition {} is missing its streak type",
                condition.id
            ))
        })
    }
}
