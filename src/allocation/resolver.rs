//! Allocation resolution for newly-logged XP.
//!
//! When an entry is about to be recorded, the resolver decides which
//! condition bucket (if any) it should be attributed to. Only total-XP
//! conditions on the user's next rank ever compete for an entry; category
//! and synced conditions are intrinsically scoped and never need
//! disambiguation.

use rusqlite::Connection;
use uuid::Uuid;

use crate::metrics::MetricSnapshotProvider;
use crate::ranks::{ConditionKind, RankError, RankLadder, RankStore};

/// A bucket the caller may attribute an entry to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AllocationCandidate {
    pub condition_id: i64,
    pub label: String,
}

/// How a new entry's allocation was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Record the entry tagged with this condition id.
    Allocated(i64),
    /// Two or more buckets compete; the caller must pick one and re-invoke.
    /// No entry may be written while ambiguous.
    Ambiguous(Vec<AllocationCandidate>),
    /// No bucket applies; record the entry untagged.
    NoneNeeded,
}

/// Decides bucket attribution for new ledger rows.
pub struct AllocationResolver<'a> {
    ranks: RankStore<'a>,
    ladder: RankLadder<'a>,
}

impl<'a> AllocationResolver<'a> {
    /// Create a new resolver over a connection and snapshot provider.
    pub fn new(conn: &'a Connection, metrics: &'a dyn MetricSnapshotProvider) -> Self {
        Self {
            ranks: RankStore::new(conn),
            ladder: RankLadder::new(conn, metrics),
        }
    }

    /// Resolve the allocation for an entry the user is about to log.
    ///
    /// An explicit choice is honored verbatim (after an ownership check)
    /// without re-deriving candidates; the caller has already seen the
    /// candidate list. Without one, a single total-XP condition on the next
    /// rank auto-allocates, and two or more return `Ambiguous`.
    pub fn resolve(
        &self,
        user_id: Uuid,
        explicit_choice: Option<i64>,
    ) -> Result<AllocationOutcome, AllocationError> {
        if let Some(condition_id) = explicit_choice {
            let owner = self
                .ranks
                .condition_owner(condition_id)?
                .ok_or(AllocationError::ConditionNotFound(condition_id))?;
            if owner != user_id {
                return Err(AllocationError::ForeignCondition(condition_id));
            }
            return Ok(AllocationOutcome::Allocated(condition_id));
        }

        let Some(next_rank) = self.ladder.next_rank(user_id)? else {
            return Ok(AllocationOutcome::NoneNeeded);
        };

        let candidates = self
            .ranks
            .conditions_of_kind(next_rank.id, ConditionKind::TotalXp)?;

        match candidates.len() {
            0 => Ok(AllocationOutcome::NoneNeeded),
            1 => {
                tracing::debug!(
                    condition_id = candidates[0].id,
                    rank = %next_rank.name,
                    "auto-allocating entry to the only total-XP condition"
                );
                Ok(AllocationOutcome::Allocated(candidates[0].id))
            }
            _ => Ok(AllocationOutcome::Ambiguous(
                candidates
                    .iter()
                    .map(|c| AllocationCandidate {
                        condition_id: c.id,
                        label: c.display_label(),
                    })
                    .collect(),
            )),
        }
    }
}

/// Allocation errors.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error(transparent)]
    Rank(#[from] RankError),

    #[error("Condition not found: {0}")]
    ConditionNotFound(i64),

    #[error("Condition {0} belongs to a different user")]
    ForeignCondition(i64),
}
