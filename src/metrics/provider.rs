//! Snapshot provider interface for externally-synced metrics.
//!
//! Channel statistics (subscribers, views, per-category video counts),
//! streak counters, perfect weeks, and achievement counts are maintained by
//! an external rate-limited sync process. The engine only reads point-in-time
//! values and must tolerate stale or missing snapshots; a `None` from any
//! getter evaluates as zero and never blocks rank evaluation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A streak counter pair as maintained by the external streak tracker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StreakSnapshot {
    /// Length of the streak that is currently running.
    pub current: u64,
    /// Longest streak ever recorded.
    pub longest: u64,
}

/// Which streak counter a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakType {
    /// Consecutive days with logged activity.
    Daily,
    /// Consecutive perfect weeks.
    Weekly,
}

impl StreakType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakType::Daily => "daily",
            StreakType::Weekly => "weekly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(StreakType::Daily),
            "weekly" => Some(StreakType::Weekly),
            _ => None,
        }
    }
}

/// Read-only access to externally-synced counters.
///
/// All getters are synchronous and may serve cached values; implementations
/// must never block waiting for a fresh sync.
pub trait MetricSnapshotProvider: Send + Sync {
    /// Subscriber count for the user's channel.
    fn subscriber_count(&self, user_id: Uuid) -> Option<u64>;

    /// Aggregate view total across all content.
    fn aggregate_views(&self, user_id: Uuid) -> Option<u64>;

    /// Number of published videos in a content category.
    fn category_video_count(&self, user_id: Uuid, category: &str) -> Option<u64>;

    /// View total for one content category.
    fn category_views(&self, user_id: Uuid, category: &str) -> Option<u64>;

    /// Streak counters for the given streak type.
    fn streak(&self, user_id: Uuid, streak_type: StreakType) -> Option<StreakSnapshot>;

    /// Number of perfect weeks on record.
    fn perfect_weeks(&self, user_id: Uuid) -> Option<u64>;

    /// Number of achievements the user has unlocked.
    fn achievements_unlocked(&self, user_id: Uuid) -> Option<u64>;
}

/// Provider that has no snapshots at all.
///
/// Stands in when the sync process has never run; every synced condition
/// evaluates at zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSnapshots;

impl MetricSnapshotProvider for NoSnapshots {
    fn subscriber_count(&self, _user_id: Uuid) -> Option<u64> {
        None
    }

    fn aggregate_views(&self, _user_id: Uuid) -> Option<u64> {
        None
    }

    fn category_video_count(&self, _user_id: Uuid, _category: &str) -> Option<u64> {
        None
    }

    fn category_views(&self, _user_id: Uuid, _category: &str) -> Option<u64> {
        None
    }

    fn streak(&self, _user_id: Uuid, _streak_type: StreakType) -> Option<StreakSnapshot> {
        None
    }

    fn perfect_weeks(&self, _user_id: Uuid) -> Option<u64> {
        None
    }

    fn achievements_unlocked(&self, _user_id: Uuid) -> Option<u64> {
        None
    }
}

/// Fixed in-memory snapshots, useful for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct StaticSnapshots {
    pub subscribers: Option<u64>,
    pub views: Option<u64>,
    pub video_counts: std::collections::HashMap<String, u64>,
    pub category_views: std::collections::HashMap<String, u64>,
    pub daily_streak: Option<StreakSnapshot>,
    pub weekly_streak: Option<StreakSnapshot>,
    pub perfect_weeks: Option<u64>,
    pub achievements: Option<u64>,
}

impl MetricSnapshotProvider for StaticSnapshots {
    fn subscriber_count(&self, _user_id: Uuid) -> Option<u64> {
        self.subscribers
    }

    fn aggregate_views(&self, _user_id: Uuid) -> Option<u64> {
        self.views
    }

    fn category_video_count(&self, _user_id: Uuid, category: &str) -> Option<u64> {
        self.video_counts.get(category).copied()
    }

    fn category_views(&self, _user_id: Uuid, category: &str) -> Option<u64> {
        self.category_views.get(category).copied()
    }

    fn streak(&self, _user_id: Uuid, streak_type: StreakType) -> Option<StreakSnapshot> {
        match streak_type {
            StreakType::Daily => self.daily_streak,
            StreakType::Weekly => self.weekly_streak,
        }
    }

    fn perfect_weeks(&self, _user_id: Uuid) -> Option<u64> {
        self.perfect_weeks
    }

    fn achievements_unlocked(&self, _user_id: Uuid) -> Option<u64> {
        self.achievements
    }
}
