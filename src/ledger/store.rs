//! Activity ledger persistence.
//!
//! Append-only store for trackable entries and task completions, plus the
//! XP aggregates condition evaluation is built on. Allocation tags are only
//! ever written at append time or backfilled by the bucket migration.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{ActivityEntry, TaskCompletion, TrackableType, XpMode, XpScope, XpTier};

/// Row filters for ledger queries.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub trackable_type_id: Option<i64>,
    pub scope: Option<XpScope>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Manager for ledger rows.
pub struct LedgerStore<'a> {
    conn: &'a Connection,
}

impl<'a> LedgerStore<'a> {
    /// Create a new ledger store over a database connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new trackable type after validating its XP configuration.
    pub fn create_trackable_type(
        &self,
        user_id: Uuid,
        name: &str,
        xp_mode: XpMode,
        base_xp: f64,
        multiplier: f64,
        tiers: Vec<XpTier>,
    ) -> Result<TrackableType, LedgerError> {
        let now = Utc::now();
        let trackable = TrackableType {
            id: 0,
            user_id,
            name: name.to_string(),
            xp_mode,
            base_xp,
            multiplier,
            tiers,
            created_at: now,
        };
        trackable
            .validate()
            .map_err(LedgerError::ValidationError)?;

        self.conn.execute(
            "INSERT INTO trackable_types (user_id, name, xp_mode, base_xp, multiplier, tiers_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id.to_string(),
                trackable.name,
                xp_mode.as_str(),
                base_xp,
                multiplier,
                serde_json::to_string(&trackable.tiers)?,
                now.to_rfc3339(),
            ],
        )?;

        Ok(TrackableType {
            id: self.conn.last_insert_rowid(),
            ..trackable
        })
    }

    /// Get a trackable type by ID.
    pub fn trackable_type(&self, id: i64) -> Result<Option<TrackableType>, LedgerError> {
        self.conn
            .query_row(
                "SELECT id, user_id, name, xp_mode, base_xp, multiplier, tiers_json, created_at
                 FROM trackable_types WHERE id = ?1",
                params![id],
                parse_trackable_row,
            )
            .optional()
            .map_err(LedgerError::from)
    }

    /// Get all trackable types for a user.
    pub fn trackable_types_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<TrackableType>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, name, xp_mode, base_xp, multiplier, tiers_json, created_at
             FROM trackable_types WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], parse_trackable_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(LedgerError::from)
    }

    /// Append one activity entry to the ledger.
    pub fn append_activity(
        &self,
        user_id: Uuid,
        trackable_type_id: i64,
        entry_date: NaiveDate,
        count: i64,
        value: f64,
        allocated_condition_id: Option<i64>,
    ) -> Result<ActivityEntry, LedgerError> {
        if count < 0 {
            return Err(LedgerError::ValidationError(
                "entry count must not be negative".to_string(),
            ));
        }
        if !value.is_finite() {
            return Err(LedgerError::ValidationError(
                "entry value must be a finite number".to_string(),
            ));
        }

        let trackable = self
            .trackable_type(trackable_type_id)?
            .ok_or(LedgerError::TrackableTypeNotFound(trackable_type_id))?;
        if trackable.user_id != user_id {
            return Err(LedgerError::ValidationError(
                "trackable type belongs to a different user".to_string(),
            ));
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO trackable_entries
             (user_id, trackable_type_id, entry_date, count, value, allocated_condition_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id.to_string(),
                trackable_type_id,
                entry_date.to_string(),
                count,
                value,
                allocated_condition_id,
                now.to_rfc3339(),
            ],
        )?;

        Ok(ActivityEntry {
            id: self.conn.last_insert_rowid(),
            user_id,
            trackable_type_id,
            entry_date,
            count,
            value,
            allocated_condition_id,
            created_at: now,
        })
    }

    /// Append one task completion to the ledger.
    pub fn append_task_completion(
        &self,
        user_id: Uuid,
        task_key: &str,
        completion_date: NaiveDate,
        count: i64,
        earned_xp: f64,
        allocated_condition_id: Option<i64>,
    ) -> Result<TaskCompletion, LedgerError> {
        if count < 0 {
            return Err(LedgerError::ValidationError(
                "completion count must not be negative".to_string(),
            ));
        }
        if !earned_xp.is_finite() {
            return Err(LedgerError::ValidationError(
                "earned XP must be a finite number".to_string(),
            ));
        }

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO task_completions
             (user_id, task_key, completion_date, count, earned_xp, allocated_condition_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id.to_string(),
                task_key,
                completion_date.to_string(),
                count,
                earned_xp,
                allocated_condition_id,
                now.to_rfc3339(),
            ],
        )?;

        Ok(TaskCompletion {
            id: self.conn.last_insert_rowid(),
            user_id,
            task_key: task_key.to_string(),
            completion_date,
            count,
            earned_xp,
            allocated_condition_id,
            created_at: now,
        })
    }

    /// Get all activity entries for a user in insertion order.
    pub fn entries_for_user(&self, user_id: Uuid) -> Result<Vec<ActivityEntry>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, trackable_type_id, entry_date, count, value,
                    allocated_condition_id, created_at
             FROM trackable_entries WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], parse_entry_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(LedgerError::from)
    }

    /// Get activity entries for a user matching the given filter.
    pub fn query_entries(
        &self,
        user_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<ActivityEntry>, LedgerError> {
        let entries = self.entries_for_user(user_id)?;
        Ok(entries
            .into_iter()
            .filter(|e| {
                filter
                    .trackable_type_id
                    .map_or(true, |t| e.trackable_type_id == t)
            })
            .filter(|e| {
                filter
                    .scope
                    .map_or(true, |s| s.includes(e.allocated_condition_id))
            })
            .filter(|e| filter.from.map_or(true, |d| e.entry_date >= d))
            .filter(|e| filter.to.map_or(true, |d| e.entry_date <= d))
            .collect())
    }

    /// Get all task completions for a user in insertion order.
    pub fn completions_for_user(&self, user_id: Uuid) -> Result<Vec<TaskCompletion>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, task_key, completion_date, count, earned_xp,
                    allocated_condition_id, created_at
             FROM task_completions WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], parse_completion_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(LedgerError::from)
    }

    /// Remove the most recent entry for a trackable type (undo).
    ///
    /// Returns the removed entry, or `None` if there was nothing to remove.
    pub fn remove_last_entry(
        &self,
        user_id: Uuid,
        trackable_type_id: i64,
    ) -> Result<Option<ActivityEntry>, LedgerError> {
        let last = self
            .conn
            .query_row(
                "SELECT id, user_id, trackable_type_id, entry_date, count, value,
                        allocated_condition_id, created_at
                 FROM trackable_entries
                 WHERE user_id = ?1 AND trackable_type_id = ?2
                 ORDER BY id DESC LIMIT 1",
                params![user_id.to_string(), trackable_type_id],
                parse_entry_row,
            )
            .optional()?;

        if let Some(ref entry) = last {
            self.conn.execute(
                "DELETE FROM trackable_entries WHERE id = ?1",
                params![entry.id],
            )?;
        }

        Ok(last)
    }

    /// Backfill the allocation tag on every untagged activity entry.
    ///
    /// Used only by the bucket migration. Returns the number of rows updated.
    pub fn allocate_unassigned_entries(
        &self,
        user_id: Uuid,
        target_condition_id: i64,
    ) -> Result<usize, LedgerError> {
        let updated = self.conn.execute(
            "UPDATE trackable_entries SET allocated_condition_id = ?2
             WHERE user_id = ?1 AND allocated_condition_id IS NULL",
            params![user_id.to_string(), target_condition_id],
        )?;
        Ok(updated)
    }

    /// Backfill the allocation tag on every untagged task completion.
    pub fn allocate_unassigned_completions(
        &self,
        user_id: Uuid,
        target_condition_id: i64,
    ) -> Result<usize, LedgerError> {
        let updated = self.conn.execute(
            "UPDATE task_completions SET allocated_condition_id = ?2
             WHERE user_id = ?1 AND allocated_condition_id IS NULL",
            params![user_id.to_string(), target_condition_id],
        )?;
        Ok(updated)
    }

    /// Sum entry XP for a user within the given scope.
    ///
    /// Optionally restricted to one trackable type. The sum is clamped at
    /// zero; signed value-based entries can drag a bucket negative otherwise.
    pub fn entry_xp_total(
        &self,
        user_id: Uuid,
        scope: XpScope,
        trackable_type_id: Option<i64>,
    ) -> Result<f64, LedgerError> {
        let types: HashMap<i64, TrackableType> = self
            .trackable_types_for_user(user_id)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut total = 0.0;
        for entry in self.entries_for_user(user_id)? {
            if !scope.includes(entry.allocated_condition_id) {
                continue;
            }
            if let Some(t) = trackable_type_id {
                if entry.trackable_type_id != t {
                    continue;
                }
            }
            match types.get(&entry.trackable_type_id) {
                Some(ttype) => total += ttype.xp_for(entry.count, entry.value),
                None => {
                    tracing::warn!(
                        entry_id = entry.id,
                        trackable_type_id = entry.trackable_type_id,
                        "entry references a missing trackable type, counting 0 XP"
                    );
                }
            }
        }

        Ok(total.max(0.0))
    }

    /// Sum task completion XP for a user within the given scope.
    pub fn task_xp_total(&self, user_id: Uuid, scope: XpScope) -> Result<f64, LedgerError> {
        let total: f64 = self
            .completions_for_user(user_id)?
            .iter()
            .filter(|c| scope.includes(c.allocated_condition_id))
            .map(|c| c.earned_xp)
            .sum();
        Ok(total.max(0.0))
    }

    /// Sum entry counts for one trackable type within the given scope.
    pub fn entry_count_total(
        &self,
        user_id: Uuid,
        scope: XpScope,
        trackable_type_id: i64,
    ) -> Result<i64, LedgerError> {
        let total = self
            .entries_for_user(user_id)?
            .iter()
            .filter(|e| e.trackable_type_id == trackable_type_id)
            .filter(|e| scope.includes(e.allocated_condition_id))
            .map(|e| e.count)
            .sum::<i64>();
        Ok(total.max(0))
    }

    /// Total task completions logged by the user.
    pub fn task_completion_total(&self, user_id: Uuid) -> Result<i64, LedgerError> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(count), 0) FROM task_completions WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(total.max(0))
    }

    /// Lifetime XP across the whole ledger, allocation tags ignored.
    pub fn lifetime_xp(&self, user_id: Uuid) -> Result<f64, LedgerError> {
        Ok(self.entry_xp_total(user_id, XpScope::Global, None)?
            + self.task_xp_total(user_id, XpScope::Global)?)
    }

    /// Delete every ledger row belonging to a user (account deletion).
    pub fn purge_user(&self, user_id: Uuid) -> Result<(), LedgerError> {
        let uid = user_id.to_string();
        self.conn.execute(
            "DELETE FROM trackable_entries WHERE user_id = ?1",
            params![uid],
        )?;
        self.conn.execute(
            "DELETE FROM task_completions WHERE user_id = ?1",
            params![uid],
        )?;
        self.conn.execute(
            "DELETE FROM trackable_types WHERE user_id = ?1",
            params![uid],
        )?;
        Ok(())
    }
}

/// Parse a database row into a TrackableType.
fn parse_trackable_row(row: &rusqlite::Row) -> rusqlite::Result<TrackableType> {
    let user_id_str: String = row.get(1)?;
    let xp_mode_str: String = row.get(3)?;
    let tiers_json: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    let xp_mode = XpMode::from_str(&xp_mode_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unrecognized xp mode '{xp_mode_str}'").into(),
        )
    })?;

    let tiers: Vec<XpTier> = tiers_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?
        .unwrap_or_default();

    Ok(TrackableType {
        id: row.get(0)?,
        user_id: parse_uuid(1, &user_id_str)?,
        name: row.get(2)?,
        xp_mode,
        base_xp: row.get(4)?,
        multiplier: row.get(5)?,
        tiers,
        created_at: parse_timestamp(7, &created_at_str)?,
    })
}

/// Parse a database row into an ActivityEntry.
fn parse_entry_row(row: &rusqlite::Row) -> rusqlite::Result<ActivityEntry> {
    let user_id_str: String = row.get(1)?;
    let date_str: String = row.get(3)?;
    let created_at_str: String = row.get(7)?;

    Ok(ActivityEntry {
        id: row.get(0)?,
        user_id: parse_uuid(1, &user_id_str)?,
        trackable_type_id: row.get(2)?,
        entry_date: parse_date(3, &date_str)?,
        count: row.get(4)?,
        value: row.get(5)?,
        allocated_condition_id: row.get(6)?,
        created_at: parse_timestamp(7, &created_at_str)?,
    })
}

/// Parse a database row into a TaskCompletion.
fn parse_completion_row(row: &rusqlite::Row) -> rusqlite::Result<TaskCompletion> {
    let user_id_str: String = row.get(1)?;
    let date_str: String = row.get(3)?;
    let created_at_str: String = row.get(7)?;

    Ok(TaskCompletion {
        id: row.get(0)?,
        user_id: parse_uuid(1, &user_id_str)?,
        task_key: row.get(2)?,
        completion_date: parse_date(3, &date_str)?,
        count: row.get(4)?,
        earned_xp: row.get(5)?,
        allocated_condition_id: row.get(6)?,
        created_at: parse_timestamp(7, &created_at_str)?,
    })
}

pub(crate) fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_date(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Trackable type not found: {0}")]
    TrackableTypeNotFound(i64),
}
