//! Rank ladder type definitions.
//!
//! A rank is one level in a user's progression ladder. Each rank owns zero
//! or more conditions; a rank with no conditions may instead carry a legacy
//! single XP threshold. Conditions of ledger-scoped kinds can be flagged as
//! buckets, in which case they only count ledger rows allocated to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::StreakType;

/// What a condition measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Lifetime XP (entries + task completions).
    TotalXp,
    /// XP from one trackable type.
    TrackableXp,
    /// Logged count of one trackable type.
    TrackableCount,
    /// Synced subscriber count.
    Subscribers,
    /// Synced aggregate view total.
    TotalViews,
    /// Synced video count for one content category.
    CategoryVideoCount,
    /// Synced view total for one content category.
    CategoryViews,
    /// Running streak length.
    StreakCurrent,
    /// Longest streak ever recorded.
    StreakLongest,
    /// Task completions logged in the ledger.
    TasksCompleted,
    /// Perfect weeks on record.
    PerfectWeeks,
    /// Achievements unlocked.
    AchievementsUnlocked,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::TotalXp => "total_xp",
            ConditionKind::TrackableXp => "trackable_xp",
            ConditionKind::TrackableCount => "trackable_count",
            ConditionKind::Subscribers => "subscribers",
            ConditionKind::TotalViews => "total_views",
            ConditionKind::CategoryVideoCount => "category_video_count",
            ConditionKind::CategoryViews => "category_views",
            ConditionKind::StreakCurrent => "streak_current",
            ConditionKind::StreakLongest => "streak_longest",
            ConditionKind::TasksCompleted => "tasks_completed",
            ConditionKind::PerfectWeeks => "perfect_weeks",
            ConditionKind::AchievementsUnlocked => "achievements_unlocked",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "total_xp" => Some(ConditionKind::TotalXp),
            "trackable_xp" => Some(ConditionKind::TrackableXp),
            "trackable_count" => Some(ConditionKind::TrackableCount),
            "subscribers" => Some(ConditionKind::Subscribers),
            "total_views" => Some(ConditionKind::TotalViews),
            "category_video_count" => Some(ConditionKind::CategoryVideoCount),
            "category_views" => Some(ConditionKind::CategoryViews),
            "streak_current" => Some(ConditionKind::StreakCurrent),
            "streak_longest" => Some(ConditionKind::StreakLongest),
            "tasks_completed" => Some(ConditionKind::TasksCompleted),
            "perfect_weeks" => Some(ConditionKind::PerfectWeeks),
            "achievements_unlocked" => Some(ConditionKind::AchievementsUnlocked),
            _ => None,
        }
    }

    /// Get display name for the condition kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            ConditionKind::TotalXp => "Total XP",
            ConditionKind::TrackableXp => "Trackable XP",
            ConditionKind::TrackableCount => "Trackable Count",
            ConditionKind::Subscribers => "Subscribers",
            ConditionKind::TotalViews => "Total Views",
            ConditionKind::CategoryVideoCount => "Category Videos",
            ConditionKind::CategoryViews => "Category Views",
            ConditionKind::StreakCurrent => "Current Streak",
            ConditionKind::StreakLongest => "Longest Streak",
            ConditionKind::TasksCompleted => "Tasks Completed",
            ConditionKind::PerfectWeeks => "Perfect Weeks",
            ConditionKind::AchievementsUnlocked => "Achievements",
        }
    }

    /// Whether the kind is computed from the activity ledger.
    ///
    /// Only ledger-scoped kinds can be flagged as buckets; synced kinds are
    /// always a direct snapshot read.
    pub fn is_ledger_scoped(&self) -> bool {
        matches!(
            self,
            ConditionKind::TotalXp | ConditionKind::TrackableXp | ConditionKind::TrackableCount
        )
    }

    /// Whether the kind needs a trackable type reference.
    pub fn requires_trackable(&self) -> bool {
        matches!(
            self,
            ConditionKind::TrackableXp | ConditionKind::TrackableCount
        )
    }

    /// Whether the kind needs a content category.
    pub fn requires_category(&self) -> bool {
        matches!(
            self,
            ConditionKind::CategoryVideoCount | ConditionKind::CategoryViews
        )
    }

    /// Whether the kind needs a streak type.
    pub fn requires_streak_type(&self) -> bool {
        matches!(
            self,
            ConditionKind::StreakCurrent | ConditionKind::StreakLongest
        )
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One requirement attached to a rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: i64,
    pub rank_id: i64,
    pub kind: ConditionKind,
    pub threshold: f64,
    pub custom_name: Option<String>,
    pub trackable_type_id: Option<i64>,
    pub category: Option<String>,
    pub streak_type: Option<StreakType>,
    /// When true, only ledger rows allocated to this condition count toward
    /// its value; when false, the full ledger counts regardless of tags.
    pub is_bucket: bool,
    pub created_at: DateTime<Utc>,
}

impl Condition {
    /// Label shown when a caller must pick between candidate buckets.
    pub fn display_label(&self) -> String {
        self.custom_name
            .clone()
            .unwrap_or_else(|| self.kind.display_name().to_string())
    }
}

/// One level in a user's progression ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rank {
    pub id: i64,
    pub user_id: Uuid,
    /// Position in the ladder, unique per user.
    pub level: i64,
    pub name: String,
    /// Legacy single-threshold requirement, only effective while the rank
    /// has no condition rows.
    pub min_xp: Option<f64>,
    pub is_max_rank: bool,
    pub created_at: DateTime<Utc>,
}

/// How a rank's satisfaction is decided.
#[derive(Debug, Clone, Copy)]
pub enum RankRequirement<'a> {
    /// AND across every attached condition.
    ConditionList(&'a [Condition]),
    /// Global lifetime XP compared against a single threshold.
    LegacyThreshold(f64),
    /// No conditions and no legacy threshold; always satisfied.
    Vacuous,
}

impl Rank {
    /// Resolve which requirement variant applies given the rank's conditions.
    pub fn requirement<'a>(&self, conditions: &'a [Condition]) -> RankRequirement<'a> {
        if !conditions.is_empty() {
            RankRequirement::ConditionList(conditions)
        } else if let Some(min_xp) = self.min_xp {
            RankRequirement::LegacyThreshold(min_xp)
        } else {
            RankRequirement::Vacuous
        }
    }
}

/// Result of evaluating one condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConditionStatus {
    pub current_value: f64,
    pub is_met: bool,
}

/// Progress toward one condition, for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionProgress {
    /// None for a legacy single-threshold pseudo-condition.
    pub condition_id: Option<i64>,
    pub label: String,
    pub current_value: f64,
    pub threshold: f64,
    /// Clamped to 0..=100.
    pub percent: f64,
    pub is_met: bool,
    pub is_bucket: bool,
}

/// Progress toward one rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankProgress {
    pub rank_id: i64,
    pub conditions: Vec<ConditionProgress>,
    /// Arithmetic mean of the per-condition percentages.
    pub percent: f64,
}

/// Percentage of a threshold reached, clamped to 100.
///
/// A threshold of zero or less reads as already complete.
pub fn progress_percent(current_value: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        100.0
    } else {
        (current_value / threshold * 100.0).min(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rank(min_xp: Option<f64>) -> Rank {
        Rank {
            id: 1,
            user_id: Uuid::new_v4(),
            level: 1,
            name: "Bronze".to_string(),
            min_xp,
            is_max_rank: false,
            created_at: Utc::now(),
        }
    }

    fn condition(kind: ConditionKind) -> Condition {
        Condition {
            id: 1,
            rank_id: 1,
            kind,
            threshold: 100.0,
            custom_name: None,
            trackable_type_id: None,
            category: None,
            streak_type: None,
            is_bucket: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ConditionKind::TotalXp,
            ConditionKind::TrackableXp,
            ConditionKind::TrackableCount,
            ConditionKind::Subscribers,
            ConditionKind::TotalViews,
            ConditionKind::CategoryVideoCount,
            ConditionKind::CategoryViews,
            ConditionKind::StreakCurrent,
            ConditionKind::StreakLongest,
            ConditionKind::TasksCompleted,
            ConditionKind::PerfectWeeks,
            ConditionKind::AchievementsUnlocked,
        ] {
            assert_eq!(ConditionKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(ConditionKind::from_str("unknown"), None);
    }

    #[test]
    fn test_requirement_selection() {
        let conditions = vec![condition(ConditionKind::TotalXp)];

        // Condition rows take precedence over the legacy threshold
        let r = rank(Some(500.0));
        assert!(matches!(
            r.requirement(&conditions),
            RankRequirement::ConditionList(_)
        ));
        assert!(matches!(
            r.requirement(&[]),
            RankRequirement::LegacyThreshold(t) if t == 500.0
        ));

        let r = rank(None);
        assert!(matches!(r.requirement(&[]), RankRequirement::Vacuous));
    }

    #[test]
    fn test_display_label_prefers_custom_name() {
        let mut c = condition(ConditionKind::TotalXp);
        assert_eq!(c.display_label(), "Total XP");

        c.custom_name = Some("Sales Bucket".to_string());
        assert_eq!(c.display_label(), "Sales Bucket");
    }

    #[test]
    fn test_progress_percent_clamps() {
        assert_eq!(progress_percent(50.0, 100.0), 50.0);
        assert_eq!(progress_percent(250.0, 100.0), 100.0);
        assert_eq!(progress_percent(0.0, 100.0), 0.0);
        // Non-positive thresholds read as complete
        assert_eq!(progress_percent(0.0, 0.0), 100.0);
        assert_eq!(progress_percent(10.0, -5.0), 100.0);
    }
}
