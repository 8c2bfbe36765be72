//! Key-value engine settings.
//!
//! Small tunables the presentation layer reads alongside rank results:
//! the daily XP goal, the perfect-week bonus, and the display name for
//! points ("XP", "PT", ...).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::storage::DatabaseError;

/// Accessor for the system_settings table.
pub struct SystemSettings<'a> {
    conn: &'a Connection,
}

impl<'a> SystemSettings<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Get a raw setting value.
    pub fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        self.conn
            .query_row(
                "SELECT value FROM system_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }

    /// Set a setting value, inserting or updating as needed.
    pub fn set(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO system_settings (key, value, description, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     description = COALESCE(excluded.description, description),
                     updated_at = excluded.updated_at",
                params![key, value, description, Utc::now().to_rfc3339()],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        Ok(())
    }

    /// Daily XP goal used by the dashboard.
    pub fn daily_xp_goal(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .get("daily_xp_goal")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(50))
    }

    /// Bonus XP awarded for a perfect week.
    pub fn perfect_week_bonus(&self) -> Result<i64, DatabaseError> {
        Ok(self
            .get("perfect_week_bonus")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(500))
    }

    /// Display name for points ("XP" by default).
    pub fn points_name(&self) -> Result<String, DatabaseError> {
        Ok(self.get("points_name")?.unwrap_or_else(|| "XP".to_string()))
    }
}
