//! Database schema definitions for the progression engine.

/// SQL schema for creating all engine tables.
pub const SCHEMA: &str = r#"
-- User-defined activity categories
CREATE TABLE IF NOT EXISTS trackable_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    xp_mode TEXT NOT NULL DEFAULT 'fixed_per_unit',
    base_xp REAL NOT NULL DEFAULT 0,
    multiplier REAL NOT NULL DEFAULT 1,
    tiers_json TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, name)
);

CREATE INDEX IF NOT EXISTS idx_trackable_types_user_id ON trackable_types(user_id);

-- Logged activity entries (append-only ledger).
-- allocated_condition_id carries no REFERENCES clause: deleting a condition
-- leaves the tag dangling, and dangling tags read as unallocated.
CREATE TABLE IF NOT EXISTS trackable_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    trackable_type_id INTEGER NOT NULL REFERENCES trackable_types(id),
    entry_date TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    value REAL NOT NULL DEFAULT 0,
    allocated_condition_id INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_trackable_entries_user_id ON trackable_entries(user_id);
CREATE INDEX IF NOT EXISTS idx_trackable_entries_type ON trackable_entries(user_id, trackable_type_id);
CREATE INDEX IF NOT EXISTS idx_trackable_entries_allocation ON trackable_entries(allocated_condition_id);

-- Task completion records, structurally parallel to trackable_entries
CREATE TABLE IF NOT EXISTS task_completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    task_key TEXT NOT NULL,
    completion_date TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 1,
    earned_xp REAL NOT NULL DEFAULT 0,
    allocated_condition_id INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_completions_user_id ON task_completions(user_id);
CREATE INDEX IF NOT EXISTS idx_task_completions_allocation ON task_completions(allocated_condition_id);

-- Rank ladder definitions
CREATE TABLE IF NOT EXISTS ranks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    level INTEGER NOT NULL,
    name TEXT NOT NULL,
    min_xp REAL,
    is_max_rank INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(user_id, level)
);

CREATE INDEX IF NOT EXISTS idx_ranks_user_id ON ranks(user_id);

-- Requirements attached to ranks
CREATE TABLE IF NOT EXISTS rank_conditions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rank_id INTEGER NOT NULL REFERENCES ranks(id) ON DELETE CASCADE,
    condition_type TEXT NOT NULL,
    threshold REAL NOT NULL DEFAULT 0,
    custom_name TEXT,
    trackable_type_id INTEGER,
    category TEXT,
    streak_type TEXT,
    is_bucket INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rank_conditions_rank_id ON rank_conditions(rank_id);

-- Key-value engine settings
CREATE TABLE IF NOT EXISTS system_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    description TEXT,
    updated_at TEXT NOT NULL
);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;
