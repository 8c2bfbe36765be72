//! Rank and condition persistence.
//!
//! Conditions are validated at write time; evaluation assumes previously
//! validated rows and fails fast on anything it cannot decode.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::ledger::store::{parse_timestamp, parse_uuid};
use crate::metrics::StreakType;
use super::types::{Condition, ConditionKind, Rank};

/// Fields for a new condition.
#[derive(Debug, Clone)]
pub struct NewCondition {
    pub kind: ConditionKind,
    pub threshold: f64,
    pub custom_name: Option<String>,
    pub trackable_type_id: Option<i64>,
    pub category: Option<String>,
    pub streak_type: Option<StreakType>,
    pub is_bucket: bool,
}

impl NewCondition {
    /// A plain condition of the given kind and threshold.
    pub fn of_kind(kind: ConditionKind, threshold: f64) -> Self {
        Self {
            kind,
            threshold,
            custom_name: None,
            trackable_type_id: None,
            category: None,
            streak_type: None,
            is_bucket: false,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.custom_name = Some(name.to_string());
        self
    }

    pub fn for_trackable(mut self, trackable_type_id: i64) -> Self {
        self.trackable_type_id = Some(trackable_type_id);
        self
    }

    pub fn for_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn for_streak(mut self, streak_type: StreakType) -> Self {
        self.streak_type = Some(streak_type);
        self
    }

    pub fn as_bucket(mut self) -> Self {
        self.is_bucket = true;
        self
    }

    fn validate(&self) -> Result<(), RankError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(RankError::ValidationError(
                "threshold must be a non-negative number".to_string(),
            ));
        }
        if self.kind.requires_trackable() && self.trackable_type_id.is_none() {
            return Err(RankError::ValidationError(format!(
                "{} conditions require a trackable type",
                self.kind
            )));
        }
        if self.kind.requires_category() && self.category.is_none() {
            return Err(RankError::ValidationError(format!(
                "{} conditions require a content category",
                self.kind
            )));
        }
        if self.kind.requires_streak_type() && self.streak_type.is_none() {
            return Err(RankError::ValidationError(format!(
                "{} conditions require a streak type",
                self.kind
            )));
        }
        if self.is_bucket && !self.kind.is_ledger_scoped() {
            return Err(RankError::ValidationError(format!(
                "{} conditions cannot be buckets",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Manager for rank and condition rows.
pub struct RankStore<'a> {
    conn: &'a Connection,
}

impl<'a> RankStore<'a> {
    /// Create a new rank store over a database connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new rank at the given ladder level.
    pub fn create_rank(
        &self,
        user_id: Uuid,
        level: i64,
        name: &str,
        min_xp: Option<f64>,
        is_max_rank: bool,
    ) -> Result<Rank, RankError> {
        if let Some(xp) = min_xp {
            if !xp.is_finite() || xp < 0.0 {
                return Err(RankError::ValidationError(
                    "min_xp must be a non-negative number".to_string(),
                ));
            }
        }

        let taken: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ranks WHERE user_id = ?1 AND level = ?2)",
            params![user_id.to_string(), level],
            |row| row.get(0),
        )?;
        if taken {
            return Err(RankError::ValidationError(format!(
                "level {level} is already taken"
            )));
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO ranks (user_id, level, name, min_xp, is_max_rank, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id.to_string(),
                level,
                name,
                min_xp,
                is_max_rank,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Rank {
            id: self.conn.last_insert_rowid(),
            user_id,
            level,
            name: name.to_string(),
            min_xp,
            is_max_rank,
            created_at: now,
        })
    }

    /// Get a rank by ID.
    pub fn rank(&self, id: i64) -> Result<Option<Rank>, RankError> {
        self.conn
            .query_row(
                "SELECT id, user_id, level, name, min_xp, is_max_rank, created_at
                 FROM ranks WHERE id = ?1",
                params![id],
                parse_rank_row,
            )
            .optional()
            .map_err(RankError::from)
    }

    /// Get all ranks for a user, ordered by level ascending.
    pub fn ranks_for_user(&self, user_id: Uuid) -> Result<Vec<Rank>, RankError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, level, name, min_xp, is_max_rank, created_at
             FROM ranks WHERE user_id = ?1 ORDER BY level ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], parse_rank_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RankError::from)
    }

    /// Delete a rank and its conditions.
    ///
    /// Ledger rows allocated to the deleted conditions keep their dangling
    /// tags; they read as unallocated from then on.
    pub fn delete_rank(&self, id: i64) -> Result<bool, RankError> {
        self.conn
            .execute("DELETE FROM rank_conditions WHERE rank_id = ?1", params![id])?;
        let deleted = self
            .conn
            .execute("DELETE FROM ranks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Attach a validated condition to a rank.
    pub fn add_condition(
        &self,
        rank_id: i64,
        condition: NewCondition,
    ) -> Result<Condition, RankError> {
        condition.validate()?;
        if self.rank(rank_id)?.is_none() {
            return Err(RankError::RankNotFound(rank_id));
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO rank_conditions
             (rank_id, condition_type, threshold, custom_name, trackable_type_id,
              category, streak_type, is_bucket, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rank_id,
                condition.kind.as_str(),
                condition.threshold,
                condition.custom_name,
                condition.trackable_type_id,
                condition.category,
                condition.streak_type.map(|s| s.as_str()),
                condition.is_bucket,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Condition {
            id: self.conn.last_insert_rowid(),
            rank_id,
            kind: condition.kind,
            threshold: condition.threshold,
            custom_name: condition.custom_name,
            trackable_type_id: condition.trackable_type_id,
            category: condition.category,
            streak_type: condition.streak_type,
            is_bucket: condition.is_bucket,
            created_at: now,
        })
    }

    /// Get a condition by ID.
    pub fn condition(&self, id: i64) -> Result<Option<Condition>, RankError> {
        self.conn
            .query_row(
                "SELECT id, rank_id, condition_type, threshold, custom_name,
                        trackable_type_id, category, streak_type, is_bucket, created_at
                 FROM rank_conditions WHERE id = ?1",
                params![id],
                parse_condition_row,
            )
            .optional()
            .map_err(RankError::from)
    }

    /// Get all conditions on a rank, ordered by id ascending.
    ///
    /// The id ordering is a committed contract: the bucket migration picks
    /// the lowest-id condition as its default recipient.
    pub fn conditions_for_rank(&self, rank_id: i64) -> Result<Vec<Condition>, RankError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, rank_id, condition_type, threshold, custom_name,
                    trackable_type_id, category, streak_type, is_bucket, created_at
             FROM rank_conditions WHERE rank_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![rank_id], parse_condition_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(RankError::from)
    }

    /// Get the conditions of one kind on a rank, ordered by id ascending.
    pub fn conditions_of_kind(
        &self,
        rank_id: i64,
        kind: ConditionKind,
    ) -> Result<Vec<Condition>, RankError> {
        Ok(self
            .conditions_for_rank(rank_id)?
            .into_iter()
            .filter(|c| c.kind == kind)
            .collect())
    }

    /// Flip the bucket flag on a condition.
    pub fn set_bucket(&self, condition_id: i64, is_bucket: bool) -> Result<(), RankError> {
        let updated = self.conn.execute(
            "UPDATE rank_conditions SET is_bucket = ?2 WHERE id = ?1",
            params![condition_id, is_bucket],
        )?;
        if updated == 0 {
            return Err(RankError::ConditionNotFound(condition_id));
        }
        Ok(())
    }

    /// Delete a condition.
    ///
    /// Ledger rows pointing at it keep their dangling tags and read as
    /// unallocated from then on.
    pub fn delete_condition(&self, id: i64) -> Result<bool, RankError> {
        let deleted = self
            .conn
            .execute("DELETE FROM rank_conditions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Owner of the rank a condition belongs to, if the condition exists.
    pub fn condition_owner(&self, condition_id: i64) -> Result<Option<Uuid>, RankError> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT r.user_id FROM rank_conditions c
                 JOIN ranks r ON r.id = c.rank_id
                 WHERE c.id = ?1",
                params![condition_id],
                |row| row.get(0),
            )
            .optional()?;

        match owner {
            Some(s) => Ok(Some(parse_uuid(0, &s)?)),
            None => Ok(None),
        }
    }
}

/// Parse a database row into a Rank.
fn parse_rank_row(row: &rusqlite::Row) -> rusqlite::Result<Rank> {
    let user_id_str: String = row.get(1)?;
    let created_at_str: String = row.get(6)?;

    Ok(Rank {
        id: row.get(0)?,
        user_id: parse_uuid(1, &user_id_str)?,
        level: row.get(2)?,
        name: row.get(3)?,
        min_xp: row.get(4)?,
        is_max_rank: row.get(5)?,
        created_at: parse_timestamp(6, &created_at_str)?,
    })
}

/// Parse a database row into a Condition.
///
/// An unrecognized kind is a corrupt row and surfaces as a decode error
/// rather than a silent default.
fn parse_condition_row(row: &rusqlite::Row) -> rusqlite::Result<Condition> {
    let kind_str: String = row.get(2)?;
    let streak_str: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(9)?;

    let kind = ConditionKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unrecognized condition kind '{kind_str}'").into(),
        )
    })?;

    let streak_type = match streak_str {
        Some(s) => Some(StreakType::from_str(&s).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("unrecognized streak type '{s}'").into(),
            )
        })?),
        None => None,
    };

    Ok(Condition {
        id: row.get(0)?,
        rank_id: row.get(1)?,
        kind,
        threshold: row.get(3)?,
        custom_name: row.get(4)?,
        trackable_type_id: row.get(5)?,
        category: row.get(6)?,
        streak_type,
        is_bucket: row.get(8)?,
        created_at: parse_timestamp(9, &created_at_str)?,
    })
}

/// Rank and condition errors.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Rank not found: {0}")]
    RankNotFound(i64),

    #[error("Condition not found: {0}")]
    ConditionNotFound(i64),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
