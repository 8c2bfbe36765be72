//! Integration tests for the bucket migration.

use std::sync::Arc;

use chrono::NaiveDate;
use progression::ledger::{LedgerStore, XpMode};
use progression::metrics::NoSnapshots;
use progression::ranks::{ConditionKind, NewCondition, RankStore};
use progression::storage::Database;
use progression::ProgressionEngine;
use uuid::Uuid;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn engine() -> ProgressionEngine {
    let db = Database::open_in_memory().unwrap();
    ProgressionEngine::new(db, Arc::new(NoSnapshots))
}

/// The Gold-rank scenario: two global total-XP conditions both credited by
/// one sale, then separated into exclusive buckets by the migration.
#[test]
fn test_gold_rank_bucket_migration_scenario() {
    let engine = engine();
    let user_id = Uuid::new_v4();

    let (gold_id, sales_cond, content_cond, sales_id) = {
        let conn = engine.database().connection();
        let ranks = RankStore::new(conn);
        let ledger = LedgerStore::new(conn);

        let gold = ranks.create_rank(user_id, 3, "Gold", None, false).unwrap();
        let sales_cond = ranks
            .add_condition(
                gold.id,
                NewCondition::of_kind(ConditionKind::TotalXp, 500.0).named("Sales Bucket"),
            )
            .unwrap();
        let content_cond = ranks
            .add_condition(
                gold.id,
                NewCondition::of_kind(ConditionKind::TotalXp, 300.0).named("Content Bucket"),
            )
            .unwrap();

        let sales = ledger
            .create_trackable_type(user_id, "Sale", XpMode::ValueBased, 0.0, 0.1, vec![])
            .unwrap();
        // Logged before any bucketing existed: no allocation tag
        ledger
            .append_activity(user_id, sales.id, date("2026-01-15"), 1, 1000.0, None)
            .unwrap();

        (gold.id, sales_cond.id, content_cond.id, sales.id)
    };

    // While both conditions are global, the same 100 XP credits both
    let before = engine.condition_progress(user_id, gold_id).unwrap();
    for condition in &before.conditions {
        assert!((condition.current_value - 100.0).abs() < 1e-9);
    }

    let report = engine.migrate_rank_to_buckets(gold_id).unwrap();
    assert_eq!(report.conditions_converted, 2);
    assert_eq!(report.entries_allocated, 1);

    // The sale's 100 XP now sits only in the first (lowest-id) condition
    let after = engine.condition_progress(user_id, gold_id).unwrap();
    let sales_progress = after
        .conditions
        .iter()
        .find(|c| c.condition_id == Some(sales_cond))
        .unwrap();
    let content_progress = after
        .conditions
        .iter()
        .find(|c| c.condition_id == Some(content_cond))
        .unwrap();

    assert!(sales_progress.is_bucket);
    assert!((sales_progress.current_value - 100.0).abs() < 1e-9);
    assert!(content_progress.is_bucket);
    assert_eq!(content_progress.current_value, 0.0);

    // Running again allocates nothing further
    let second = engine.migrate_rank_to_buckets(gold_id).unwrap();
    assert_eq!(second.conditions_converted, 0);
    assert_eq!(second.entries_allocated, 0);

    // New entries explicitly allocated to the content bucket move only it
    engine
        .log_activity(user_id, sales_id, date("2026-01-20"), 1, 2000.0, Some(content_cond))
        .unwrap();

    let final_progress = engine.condition_progress(user_id, gold_id).unwrap();
    let content_progress = final_progress
        .conditions
        .iter()
        .find(|c| c.condition_id == Some(content_cond))
        .unwrap();
    assert!((content_progress.current_value - 200.0).abs() < 1e-9);
}

/// Migration backfills task completions alongside activity entries.
#[test]
fn test_migration_covers_task_completions() {
    let engine = engine();
    let user_id = Uuid::new_v4();

    let (gold_id, first_cond) = {
        let conn = engine.database().connection();
        let ranks = RankStore::new(conn);
        let ledger = LedgerStore::new(conn);

        let gold = ranks.create_rank(user_id, 1, "Gold", None, false).unwrap();
        let first = ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 100.0))
            .unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 100.0))
            .unwrap();

        ledger
            .append_task_completion(user_id, "daily_writing", date("2026-01-10"), 1, 10.0, None)
            .unwrap();
        ledger
            .append_task_completion(user_id, "daily_reading", date("2026-01-11"), 1, 5.0, None)
            .unwrap();

        (gold.id, first.id)
    };

    let report = engine.migrate_rank_to_buckets(gold_id).unwrap();
    assert_eq!(report.entries_allocated, 2);

    let ledger = LedgerStore::new(engine.database().connection());
    for completion in ledger.completions_for_user(user_id).unwrap() {
        assert_eq!(completion.allocated_condition_id, Some(first_cond));
    }
}

/// After migration, logging against the now-bucketed next rank prompts for
/// a choice between the two buckets.
#[test]
fn test_post_migration_logging_prompts() {
    let engine = engine();
    let user_id = Uuid::new_v4();

    let (gold_id, sales_id) = {
        let conn = engine.database().connection();
        let ranks = RankStore::new(conn);
        let ledger = LedgerStore::new(conn);

        let gold = ranks.create_rank(user_id, 1, "Gold", None, false).unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 500.0))
            .unwrap();
        ranks
            .add_condition(gold.id, NewCondition::of_kind(ConditionKind::TotalXp, 300.0))
            .unwrap();

        let sales = ledger
            .create_trackable_type(user_id, "Sale", XpMode::ValueBased, 0.0, 0.1, vec![])
            .unwrap();
        (gold.id, sales.id)
    };

    engine.migrate_rank_to_buckets(gold_id).unwrap();

    let outcome = engine
        .log_activity(user_id, sales_id, date("2026-01-20"), 1, 1000.0, None)
        .unwrap();
    assert!(outcome.recorded().is_none());
}

/// Legacy promotion followed by auditing leaves single plain conditions
/// global and separates siblings.
#[test]
fn test_legacy_promotion_then_audit() {
    let engine = engine();
    let user_id = Uuid::new_v4();

    let bronze_id = {
        let ranks = RankStore::new(engine.database().connection());
        ranks
            .create_rank(user_id, 1, "Bronze", Some(100.0), false)
            .unwrap()
            .id
    };

    assert_eq!(engine.migrate_legacy_thresholds(user_id).unwrap(), 1);

    // The promoted condition is a lone plain total-XP requirement; the
    // audit leaves it global
    assert_eq!(engine.audit_buckets(user_id).unwrap(), 0);

    let ranks = RankStore::new(engine.database().connection());
    let conditions = ranks.conditions_for_rank(bronze_id).unwrap();
    assert_eq!(conditions.len(), 1);
    assert!(!conditions[0].is_bucket);
    assert_eq!(conditions[0].threshold, 100.0);
}
