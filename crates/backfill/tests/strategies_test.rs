// crates/backfill/tests/strategies_test.rs
// Local derivations and the citation engine against an in-memory store.

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::{assert_eq, assert_ne};
use spartan_ledger_backfill::strategies::{
    backfill_end_time, backfill_killer_victim_pairs, backfill_performance_scores,
    backfill_sessions, ToleranceWindowPairer,
};
use spartan_ledger_backfill::CitationEngine;
use spartan_ledger_core::{AwardRow, MatchRow, MedalRow, Xuid};
use spartan_ledger_db::Database;

const XUID: Xuid = 2_533_274_000_000_001;
const ENEMY: Xuid = 2_533_274_000_000_002;

async fn store() -> Database {
    let db = Database::new_in_memory().await.unwrap();
    db.migrate_all().await.unwrap();
    db
}

async fn seed_match(db: &Database, id: &str, day: u32, kills: i64, deaths: i64, assists: i64) {
    db.upsert_match(&MatchRow {
        match_id: id.to_string(),
        start_time: Some(Utc.with_ymd_and_hms(2024, 2, day, 20, 0, 0).unwrap()),
        duration_secs: Some(720),
        kills,
        deaths,
        assists,
        ..Default::default()
    })
    .await
    .unwrap();
}

async fn seed_kill_feed(db: &Database, match_id: &str) {
    sqlx::query(
        "INSERT INTO highlight_events (match_id, event_type, time_ms, xuid, gamertag) VALUES
             (?1, 'kill', 30000, ?2, 'Spartan117'),
             (?1, 'death', 30003, ?3, 'Locke'),
             (?1, 'kill', 45000, ?3, 'Locke'),
             (?1, 'death', 45001, ?2, 'Spartan117')",
    )
    .bind(match_id)
    .bind(XUID)
    .bind(ENEMY)
    .execute(db.pool())
    .await
    .unwrap();
}

#[tokio::test]
async fn pairing_is_incremental_then_rebuildable() {
    let db = store().await;
    seed_match(&db, "m1", 1, 10, 5, 2).await;
    seed_kill_feed(&db, "m1").await;

    let pairer = ToleranceWindowPairer::default();
    let inserted = backfill_killer_victim_pairs(&db, &pairer, false)
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    // Incremental rerun skips already-paired matches entirely.
    let inserted = backfill_killer_victim_pairs(&db, &pairer, false)
        .await
        .unwrap();
    assert_eq!(inserted, 0);
    assert_eq!(db.killer_victim_pairs("m1").await.unwrap().len(), 2);

    // Force drops and rebuilds; no duplicate accumulation.
    let inserted = backfill_killer_victim_pairs(&db, &pairer, true)
        .await
        .unwrap();
    assert_eq!(inserted, 2);
    assert_eq!(db.killer_victim_pairs("m1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn pairing_skips_one_sided_matches() {
    let db = store().await;
    seed_match(&db, "m1", 1, 10, 5, 2).await;
    sqlx::query(
        "INSERT INTO highlight_events (match_id, event_type, time_ms, xuid, gamertag)
         VALUES ('m1', 'kill', 1000, ?1, 'Spartan117')",
    )
    .bind(XUID)
    .execute(db.pool())
    .await
    .unwrap();

    let inserted = backfill_killer_victim_pairs(&db, &ToleranceWindowPairer::default(), false)
        .await
        .unwrap();
    assert_eq!(inserted, 0);
}

#[tokio::test]
async fn end_time_derivation_is_incremental_unless_forced() {
    let db = store().await;
    seed_match(&db, "m1", 1, 10, 5, 2).await;
    seed_match(&db, "m2", 2, 8, 9, 1).await;
    // m3 has no duration, so it can never be derived.
    db.upsert_match(&MatchRow {
        match_id: "m3".to_string(),
        start_time: Some(Utc.with_ymd_and_hms(2024, 2, 3, 20, 0, 0).unwrap()),
        ..Default::default()
    })
    .await
    .unwrap();

    assert_eq!(backfill_end_time(&db, false).await.unwrap(), 2);
    let m1 = db.get_match("m1").await.unwrap().unwrap();
    assert_eq!(
        m1.end_time.unwrap(),
        m1.start_time.unwrap() + Duration::seconds(720)
    );

    // Everything derivable already has an end time.
    assert_eq!(backfill_end_time(&db, false).await.unwrap(), 0);
    // Force re-derives the two derivable matches.
    assert_eq!(backfill_end_time(&db, true).await.unwrap(), 2);
}

#[tokio::test]
async fn sessions_bucket_by_time_gap() {
    let db = store().await;
    let base = Utc.with_ymd_and_hms(2024, 2, 1, 20, 0, 0).unwrap();
    // Two matches 20 minutes apart, then one 5 hours later.
    for (id, offset_mins) in [("m1", 0), ("m2", 20), ("m3", 320)] {
        db.upsert_match(&MatchRow {
            match_id: id.to_string(),
            start_time: Some(base + Duration::minutes(offset_mins)),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    assert_eq!(backfill_sessions(&db, false).await.unwrap(), 3);

    let session_of = |id: &str| {
        let id = id.to_string();
        let db = db.clone();
        async move {
            let row: (i64,) =
                sqlx::query_as("SELECT session_id FROM match_stats WHERE match_id = ?1")
                    .bind(id)
                    .fetch_one(db.pool())
                    .await
                    .unwrap();
            row.0
        }
    };
    assert_eq!(session_of("m1").await, session_of("m2").await);
    assert_ne!(session_of("m1").await, session_of("m3").await);

    // Incremental rerun rewrites nothing.
    assert_eq!(backfill_sessions(&db, false).await.unwrap(), 0);
    // Force reassigns all three.
    assert_eq!(backfill_sessions(&db, true).await.unwrap(), 3);
}

#[tokio::test]
async fn performance_scores_are_look_back_only() {
    let db = store().await;
    for day in 1..=12 {
        seed_match(&db, &format!("m{day}"), day, day as i64, 5, 2).await;
    }

    let scored = backfill_performance_scores(
        &db,
        &spartan_ledger_backfill::strategies::PercentileScorer,
    )
    .await
    .unwrap();
    assert_eq!(scored, 2, "only m11 and m12 have 10 earlier matches");

    let m11_score = db
        .get_match("m11")
        .await
        .unwrap()
        .unwrap()
        .performance_score
        .unwrap();

    // Inserting a later monster match must not change an existing score.
    seed_match(&db, "m13", 13, 50, 0, 20).await;
    backfill_performance_scores(
        &db,
        &spartan_ledger_backfill::strategies::PercentileScorer,
    )
    .await
    .unwrap();
    let m11_after = db
        .get_match("m11")
        .await
        .unwrap()
        .unwrap()
        .performance_score
        .unwrap();
    assert_eq!(m11_score, m11_after);
}

#[tokio::test]
async fn citations_store_only_positive_values() {
    let db = store().await;
    // A match where the player did nothing citation-worthy except kills.
    seed_match(&db, "m1", 1, 7, 9, 0).await;

    let engine = CitationEngine::load(&db).await.unwrap();
    let stored = engine
        .compute_and_store_for_match(&db, "m1", XUID)
        .await
        .unwrap();

    let values = db.citation_values("m1").await.unwrap();
    assert_eq!(stored as usize, values.len());
    assert_eq!(values.get("slayer"), Some(&7));
    // Zero-valued citations are never persisted.
    assert!(!values.contains_key("playmaker"));
    assert!(!values.contains_key("untouchable"));
}

#[tokio::test]
async fn citations_cover_every_mapping_kind() {
    let db = store().await;
    // Flawless, accurate match with a medal and an award.
    seed_match(&db, "m1", 1, 15, 0, 6).await;
    db.update_accuracy("m1", 93.0).await.unwrap();
    db.insert_medals(&[MedalRow {
        match_id: "m1".to_string(),
        medal_id: 2_430_242_797,
        count: 3,
    }])
    .await
    .unwrap();
    db.insert_awards(&[AwardRow {
        match_id: "m1".to_string(),
        xuid: XUID,
        award_name: "Headshot".to_string(),
        count: 4,
        score: 200,
    }])
    .await
    .unwrap();

    let engine = CitationEngine::load(&db).await.unwrap();
    engine
        .compute_and_store_for_match(&db, "m1", XUID)
        .await
        .unwrap();

    let values = db.citation_values("m1").await.unwrap();
    assert_eq!(values.get("slayer"), Some(&15)); // stat
    assert_eq!(values.get("killing_spree"), Some(&3)); // medal
    assert_eq!(values.get("sharpshooter"), Some(&4)); // award
    assert_eq!(values.get("marksman"), Some(&1)); // custom: accuracy >= 90
    assert_eq!(values.get("untouchable"), Some(&1)); // custom: no deaths
}

#[tokio::test]
async fn citation_backfill_is_incremental_with_replace_on_force() {
    let db = store().await;
    seed_match(&db, "m1", 1, 5, 3, 1).await;
    seed_match(&db, "m2", 2, 9, 4, 2).await;

    let engine = CitationEngine::load(&db).await.unwrap();
    let first = engine.backfill(&db, XUID, false).await.unwrap();
    assert!(first > 0);

    // Incremental rerun finds nothing uncited.
    assert_eq!(engine.backfill(&db, XUID, false).await.unwrap(), 0);

    // The player's kills get corrected; force recomputes and replaces.
    sqlx::query("UPDATE match_stats SET kills = 11 WHERE match_id = 'm1'")
        .execute(db.pool())
        .await
        .unwrap();
    assert!(engine.backfill(&db, XUID, true).await.unwrap() > 0);
    let values = db.citation_values("m1").await.unwrap();
    assert_eq!(values.get("slayer"), Some(&11));
}
