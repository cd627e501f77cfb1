// crates/db/tests/bitmask_test.rs
// Completion-bitmask persistence: monotonic OR-only updates.

use spartan_ledger_core::{compute_backfill_mask, DataCategory, MatchRow};
use spartan_ledger_db::Database;

async fn store_with_match(id: &str) -> Database {
    let db = Database::new_in_memory().await.unwrap();
    db.ensure_backfill_column().await.unwrap();
    db.upsert_match(&MatchRow {
        match_id: id.to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    db
}

#[tokio::test]
async fn marking_accumulates_bits_across_runs() {
    let db = store_with_match("m1").await;

    db.mark_backfill_completed("m1", DataCategory::Medals.bit())
        .await
        .unwrap();
    assert_eq!(db.get_backfill_mask("m1").await.unwrap(), 1);

    db.mark_backfill_completed("m1", DataCategory::Events.bit())
        .await
        .unwrap();
    assert_eq!(db.get_backfill_mask("m1").await.unwrap(), 3);

    // Re-marking an already-set bit changes nothing.
    db.mark_backfill_completed("m1", DataCategory::Medals.bit())
        .await
        .unwrap();
    assert_eq!(db.get_backfill_mask("m1").await.unwrap(), 3);
}

#[tokio::test]
async fn marking_a_combined_mask_in_one_update() {
    let db = store_with_match("m1").await;

    let mask = compute_backfill_mask(&[
        DataCategory::Medals,
        DataCategory::Skill,
        DataCategory::Aliases,
    ]);
    db.mark_backfill_completed("m1", mask).await.unwrap();

    let stored = db.get_backfill_mask("m1").await.unwrap();
    assert_eq!(stored, mask);
    assert_ne!(stored & DataCategory::Skill.bit(), 0);
    assert_eq!(stored & DataCategory::Events.bit(), 0);
}

#[tokio::test]
async fn unknown_match_reads_as_zero() {
    let db = store_with_match("m1").await;
    assert_eq!(db.get_backfill_mask("nope").await.unwrap(), 0);

    // Marking a nonexistent match is a no-op, not an error.
    db.mark_backfill_completed("nope", 1).await.unwrap();
    assert_eq!(db.get_backfill_mask("nope").await.unwrap(), 0);
}

#[tokio::test]
async fn sync_upsert_preserves_backfill_columns() {
    let db = store_with_match("m1").await;
    db.ensure_stat_columns().await.unwrap();

    db.mark_backfill_completed("m1", DataCategory::Accuracy.bit())
        .await
        .unwrap();
    db.update_accuracy("m1", 48.5).await.unwrap();

    // A later sync-era upsert of the same match must not clear what the
    // backfill already wrote.
    db.upsert_match(&MatchRow {
        match_id: "m1".into(),
        kills: 20,
        ..Default::default()
    })
    .await
    .unwrap();

    assert_eq!(
        db.get_backfill_mask("m1").await.unwrap(),
        DataCategory::Accuracy.bit()
    );
    let m = db.get_match("m1").await.unwrap().unwrap();
    assert_eq!(m.kills, 20);
    assert_eq!(m.accuracy, Some(48.5));
}
