//! External metric snapshots consumed by condition evaluation.

pub mod provider;

pub use provider::{
    MetricSnapshotProvider, NoSnapshots, StaticSnapshots, StreakSnapshot, StreakType,
};
