//! Rank ladder, conditions, and evaluation.

pub mod evaluator;
pub mod ladder;
pub mod store;
pub mod types;

pub use evaluator::ConditionEvaluator;
pub use ladder::RankLadder;
pub use store::{NewCondition, RankError, RankStore};
pub use types::{
    progress_percent, Condition, ConditionKind, ConditionProgress, ConditionStatus, Rank,
    RankProgress, RankRequirement,
};
