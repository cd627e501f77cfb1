// crates/db/tests/participants_test.rs
// Participant detail updates against a real (in-memory) store.

use pretty_assertions::assert_eq;
use spartan_ledger_core::{MatchRow, ParticipantRow, Xuid};
use spartan_ledger_db::Database;

const XUID: Xuid = 2_533_274_000_000_001;

async fn store_with_participant() -> Database {
    let db = Database::new_in_memory().await.unwrap();
    db.migrate_all().await.unwrap();

    db.upsert_match(&MatchRow {
        match_id: "m1".into(),
        ..Default::default()
    })
    .await
    .unwrap();
    db.upsert_participants(&[ParticipantRow {
        match_id: "m1".into(),
        xuid: XUID,
        team_id: Some(0),
        gamertag: Some("Spartan117".into()),
        ..Default::default()
    }])
    .await
    .unwrap();
    db
}

async fn kda(db: &Database) -> (Option<i64>, Option<i64>, Option<i64>) {
    sqlx::query_as(
        "SELECT kills, deaths, assists FROM match_participants
         WHERE match_id = 'm1' AND xuid = ?1",
    )
    .bind(XUID)
    .fetch_one(db.pool())
    .await
    .unwrap()
}

#[tokio::test]
async fn sparse_payload_keeps_filled_kda_columns() {
    let db = store_with_participant().await;

    db.update_participant_kda("m1", XUID, Some(10), Some(5), Some(2))
        .await
        .unwrap();

    // A rerun whose payload omits every field must not erase what a
    // previous run filled in.
    db.update_participant_kda("m1", XUID, None, None, None)
        .await
        .unwrap();

    assert_eq!(kda(&db).await, (Some(10), Some(5), Some(2)));
}

#[tokio::test]
async fn partial_payload_updates_only_present_fields() {
    let db = store_with_participant().await;

    db.update_participant_kda("m1", XUID, Some(10), Some(5), Some(2))
        .await
        .unwrap();
    db.update_participant_kda("m1", XUID, Some(11), None, None)
        .await
        .unwrap();

    assert_eq!(kda(&db).await, (Some(11), Some(5), Some(2)));
}

#[tokio::test]
async fn sparse_payload_keeps_scores_shots_and_damage() {
    let db = store_with_participant().await;

    db.update_participant_scores("m1", XUID, Some(1), Some(2400))
        .await
        .unwrap();
    db.update_participant_shots("m1", XUID, Some(200), Some(97))
        .await
        .unwrap();
    db.update_participant_damage("m1", XUID, Some(1800), Some(1500))
        .await
        .unwrap();

    db.update_participant_scores("m1", XUID, None, None)
        .await
        .unwrap();
    db.update_participant_shots("m1", XUID, None, None)
        .await
        .unwrap();
    db.update_participant_damage("m1", XUID, None, None)
        .await
        .unwrap();

    let row: (
        Option<i64>,
        Option<i64>,
        Option<i64>,
        Option<i64>,
        Option<i64>,
        Option<i64>,
    ) = sqlx::query_as(
        "SELECT rank, score, shots_fired, shots_hit, damage_dealt, damage_taken
         FROM match_participants WHERE match_id = 'm1' AND xuid = ?1",
    )
    .bind(XUID)
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(
        row,
        (
            Some(1),
            Some(2400),
            Some(200),
            Some(97),
            Some(1800),
            Some(1500)
        )
    );
}
