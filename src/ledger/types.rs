//! Activity ledger type definitions.
//!
//! Trackable types are user-defined categories of loggable activity
//! ("Blog Post", "Sale"). Each logged occurrence becomes an append-only
//! ledger entry carrying an optional allocation tag that attributes its XP
//! to one rank condition bucket.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a trackable type converts logged activity into XP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpMode {
    /// Fixed XP per logged unit.
    FixedPerUnit,
    /// XP proportional to the entry's value (e.g. a currency amount).
    ValueBased,
    /// XP looked up from a value-threshold tier table.
    TieredByValue,
}

impl XpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            XpMode::FixedPerUnit => "fixed_per_unit",
            XpMode::ValueBased => "value_based",
            XpMode::TieredByValue => "tiered_by_value",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fixed_per_unit" => Some(XpMode::FixedPerUnit),
            "value_based" => Some(XpMode::ValueBased),
            "tiered_by_value" => Some(XpMode::TieredByValue),
            _ => None,
        }
    }
}

/// One row of a tiered-by-value XP table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XpTier {
    /// Minimum entry value for this tier to apply.
    pub min_value: f64,
    /// XP awarded per logged unit at this tier.
    pub xp: f64,
}

/// A user-defined category of loggable activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackableType {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
    pub xp_mode: XpMode,
    pub base_xp: f64,
    pub multiplier: f64,
    /// Tier table, ascending by `min_value`. Empty unless tiered mode.
    pub tiers: Vec<XpTier>,
    pub created_at: DateTime<Utc>,
}

impl TrackableType {
    /// XP contributed by one ledger entry of this type.
    ///
    /// Value-based XP may come out negative for negative values (refunds,
    /// expenses); aggregate sums are clamped at evaluation time instead.
    pub fn xp_for(&self, count: i64, value: f64) -> f64 {
        match self.xp_mode {
            XpMode::FixedPerUnit => count as f64 * self.base_xp * self.multiplier,
            XpMode::ValueBased => value * self.multiplier,
            XpMode::TieredByValue => {
                // Highest tier whose min_value the entry value reaches
                let tier_xp = self
                    .tiers
                    .iter()
                    .rev()
                    .find(|t| value >= t.min_value)
                    .map(|t| t.xp)
                    .unwrap_or(0.0);
                count as f64 * tier_xp * self.multiplier
            }
        }
    }

    /// Check internal consistency of the XP mode and its parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_xp.is_finite() || self.base_xp < 0.0 {
            return Err("base_xp must be a non-negative number".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err("multiplier must be a non-negative number".to_string());
        }

        match self.xp_mode {
            XpMode::TieredByValue => {
                if self.tiers.is_empty() {
                    return Err("tiered mode requires a non-empty tier table".to_string());
                }
                for pair in self.tiers.windows(2) {
                    if pair[1].min_value <= pair[0].min_value {
                        return Err("tier table must ascend by min_value".to_string());
                    }
                }
                if self.tiers.iter().any(|t| !t.xp.is_finite() || t.xp < 0.0) {
                    return Err("tier XP values must be non-negative numbers".to_string());
                }
            }
            XpMode::FixedPerUnit | XpMode::ValueBased => {
                if !self.tiers.is_empty() {
                    return Err("tier table only applies to tiered mode".to_string());
                }
            }
        }

        Ok(())
    }
}

/// One logged occurrence of a trackable action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: Uuid,
    pub trackable_type_id: i64,
    pub entry_date: NaiveDate,
    pub count: i64,
    /// Meaning depends on the trackable type (e.g. currency amount).
    pub value: f64,
    /// Condition bucket this entry is attributed to, if any.
    pub allocated_condition_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// One completion record of a recurring or one-off task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub id: i64,
    pub user_id: Uuid,
    pub task_key: String,
    pub completion_date: NaiveDate,
    pub count: i64,
    pub earned_xp: f64,
    pub allocated_condition_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Which ledger rows an XP aggregate includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XpScope {
    /// Every row for the user, allocation tags ignored.
    Global,
    /// Only rows whose allocation tag equals the given condition id.
    Bucket(i64),
}

impl XpScope {
    /// Whether a row with the given allocation tag falls inside this scope.
    pub fn includes(&self, allocated_condition_id: Option<i64>) -> bool {
        match self {
            XpScope::Global => true,
            XpScope::Bucket(id) => allocated_condition_id == Some(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trackable(mode: XpMode, base_xp: f64, multiplier: f64, tiers: Vec<XpTier>) -> TrackableType {
        TrackableType {
            id: 1,
            user_id: Uuid::new_v4(),
            name: "Test".to_string(),
            xp_mode: mode,
            base_xp,
            multiplier,
            tiers,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fixed_per_unit_xp() {
        let t = trackable(XpMode::FixedPerUnit, 10.0, 1.0, vec![]);
        assert_eq!(t.xp_for(3, 0.0), 30.0);
        assert_eq!(t.xp_for(0, 0.0), 0.0);
    }

    #[test]
    fn test_value_based_xp() {
        // $1000 sale at multiplier 0.1 earns 100 XP
        let t = trackable(XpMode::ValueBased, 0.0, 0.1, vec![]);
        assert_eq!(t.xp_for(1, 1000.0), 100.0);
    }

    #[test]
    fn test_value_based_xp_can_be_negative() {
        let t = trackable(XpMode::ValueBased, 0.0, 0.1, vec![]);
        assert_eq!(t.xp_for(1, -200.0), -20.0);
    }

    #[test]
    fn test_tiered_xp_picks_highest_reached_tier() {
        let tiers = vec![
            XpTier { min_value: 10.0, xp: 5.0 },
            XpTier { min_value: 100.0, xp: 20.0 },
            XpTier { min_value: 1000.0, xp: 100.0 },
        ];
        let t = trackable(XpMode::TieredByValue, 0.0, 1.0, tiers);

        assert_eq!(t.xp_for(1, 5.0), 0.0); // below lowest tier
        assert_eq!(t.xp_for(1, 10.0), 5.0); // inclusive threshold
        assert_eq!(t.xp_for(1, 500.0), 20.0);
        assert_eq!(t.xp_for(2, 2000.0), 200.0); // per-unit
    }

    #[test]
    fn test_validate_tiered_requires_ascending_table() {
        let t = trackable(XpMode::TieredByValue, 0.0, 1.0, vec![]);
        assert!(t.validate().is_err());

        let unordered = vec![
            XpTier { min_value: 100.0, xp: 20.0 },
            XpTier { min_value: 10.0, xp: 5.0 },
        ];
        let t = trackable(XpMode::TieredByValue, 0.0, 1.0, unordered);
        assert!(t.validate().is_err());

        let ordered = vec![
            XpTier { min_value: 10.0, xp: 5.0 },
            XpTier { min_value: 100.0, xp: 20.0 },
        ];
        let t = trackable(XpMode::TieredByValue, 0.0, 1.0, ordered);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_negative_rates() {
        let t = trackable(XpMode::FixedPerUnit, -1.0, 1.0, vec![]);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_scope_includes() {
        assert!(XpScope::Global.includes(None));
        assert!(XpScope::Global.includes(Some(7)));
        assert!(XpScope::Bucket(7).includes(Some(7)));
        assert!(!XpScope::Bucket(7).includes(Some(8)));
        assert!(!XpScope::Bucket(7).includes(None));
    }
}
