//! Rank ladder evaluation.
//!
//! The current rank is the highest-level rank whose conditions are all met,
//! not the last rank sequentially cleared: a user who jumps straight to the
//! requirements of level 5 without ever satisfying level 2 holds level 5.

use rusqlite::Connection;
use uuid::Uuid;

use crate::ledger::LedgerStore;
use crate::metrics::MetricSnapshotProvider;
use super::evaluator::ConditionEvaluator;
use super::store::{RankError, RankStore};
use super::types::{
    progress_percent, ConditionProgress, Rank, RankProgress, RankRequirement,
};

/// Evaluates a user's position on their rank ladder.
pub struct RankLadder<'a> {
    store: RankStore<'a>,
    ledger: LedgerStore<'a>,
    evaluator: ConditionEvaluator<'a>,
}

impl<'a> RankLadder<'a> {
    /// Create a new ladder over a connection and snapshot provider.
    pub fn new(conn: &'a Connection, metrics: &'a dyn MetricSnapshotProvider) -> Self {
        Self {
            store: RankStore::new(conn),
            ledger: LedgerStore::new(conn),
            evaluator: ConditionEvaluator::new(conn, metrics),
        }
    }

    /// The highest-level rank whose conditions are all met, if any.
    pub fn current_rank(&self, user_id: Uuid) -> Result<Option<Rank>, RankError> {
        Ok(self.current_and_next(user_id)?.0)
    }

    /// The lowest-level rank strictly above the current one, if any.
    pub fn next_rank(&self, user_id: Uuid) -> Result<Option<Rank>, RankError> {
        Ok(self.current_and_next(user_id)?.1)
    }

    /// Current and next rank in one ladder scan.
    ///
    /// With no rank held, the next rank is the bottom of the ladder. A
    /// max-rank-flagged current rank has no next rank.
    pub fn current_and_next(
        &self,
        user_id: Uuid,
    ) -> Result<(Option<Rank>, Option<Rank>), RankError> {
        let ranks = self.store.ranks_for_user(user_id)?;

        let mut current = None;
        for rank in ranks.iter().rev() {
            if self.all_conditions_met(rank, user_id)? {
                current = Some(rank.clone());
                break;
            }
        }

        let next = match &current {
            Some(rank) if rank.is_max_rank => None,
            Some(rank) => ranks.iter().find(|r| r.level > rank.level).cloned(),
            None => ranks.first().cloned(),
        };

        Ok((current, next))
    }

    /// Whether every requirement on a rank is satisfied.
    pub fn all_conditions_met(&self, rank: &Rank, user_id: Uuid) -> Result<bool, RankError> {
        let conditions = self.store.conditions_for_rank(rank.id)?;
        match rank.requirement(&conditions) {
            RankRequirement::ConditionList(conditions) => {
                for condition in conditions {
                    if !self.evaluator.evaluate(condition, user_id)?.is_met {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RankRequirement::LegacyThreshold(min_xp) => {
                Ok(self.ledger.lifetime_xp(user_id)? >= min_xp)
            }
            RankRequirement::Vacuous => Ok(true),
        }
    }

    /// Per-condition progress toward a rank, with the aggregate percentage.
    ///
    /// The aggregate is the arithmetic mean of the clamped per-condition
    /// percentages, so one nearly-met and one barely-met condition read as
    /// meaningfully partial rather than near-zero.
    pub fn progress(&self, user_id: Uuid, rank: &Rank) -> Result<RankProgress, RankError> {
        let conditions = self.store.conditions_for_rank(rank.id)?;

        let progress = match rank.requirement(&conditions) {
            RankRequirement::ConditionList(conditions) => {
                let mut rows = Vec::with_capacity(conditions.len());
                for condition in conditions {
                    let status = self.evaluator.evaluate(condition, user_id)?;
                    rows.push(ConditionProgress {
                        condition_id: Some(condition.id),
                        label: condition.display_label(),
                        current_value: status.current_value,
                        threshold: condition.threshold,
                        percent: progress_percent(status.current_value, condition.threshold),
                        is_met: status.is_met,
                        is_bucket: condition.is_bucket,
                    });
                }
                rows
            }
            RankRequirement::LegacyThreshold(min_xp) => {
                let lifetime = self.ledger.lifetime_xp(user_id)?;
                vec![ConditionProgress {
                    condition_id: None,
                    label: "Total XP".to_string(),
                    current_value: lifetime,
                    threshold: min_xp,
                    percent: progress_percent(lifetime, min_xp),
                    is_met: lifetime >= min_xp,
                    is_bucket: false,
                }]
            }
            RankRequirement::Vacuous => Vec::new(),
        };

        let percent = if progress.is_empty() {
            100.0
        } else {
            progress.iter().map(|p| p.percent).sum::<f64>() / progress.len() as f64
        };

        Ok(RankProgress {
            rank_id: rank.id,
            conditions: progress,
            percent,
        })
    }
}
