// crates/backfill/tests/orchestrator_test.rs
// Full orchestrator runs against an in-memory store and a scripted client.

use std::collections::{HashMap, HashSet};

use chrono::{TimeZone, Utc};
use spartan_ledger_backfill::client::{
    AssetKind, AssetRef, AwardPayload, ClientError, HighlightEventPayload, MatchStatsPayload,
    MedalPayload, PlayerStatsPayload, SkillEntry, SkillPayload, StatsClient,
};
use spartan_ledger_backfill::{run_backfill, BackfillError, BackfillRequest};
use spartan_ledger_core::{CategorySelection, DataCategory, MatchRow, Xuid};
use spartan_ledger_db::Database;

const XUID: Xuid = 2_533_274_000_000_001;
const TEAMMATE: Xuid = 2_533_274_000_000_002;
const ENEMY: Xuid = 2_533_274_000_000_003;
const GAMERTAG: &str = "Spartan117";

/// Plays back canned payloads; any match id not in the script fails with
/// a 500.
#[derive(Default)]
struct ScriptedClient {
    payloads: HashMap<String, MatchStatsPayload>,
    events: HashMap<String, Vec<HighlightEventPayload>>,
    skill: HashMap<String, SkillPayload>,
    assets: HashMap<String, String>,
    broken: HashSet<String>,
}

impl ScriptedClient {
    fn fail(endpoint: &str) -> ClientError {
        ClientError::Status {
            status: 500,
            endpoint: endpoint.to_string(),
        }
    }
}

impl StatsClient for ScriptedClient {
    async fn get_match_stats(&self, match_id: &str) -> Result<MatchStatsPayload, ClientError> {
        if self.broken.contains(match_id) {
            return Err(Self::fail(match_id));
        }
        self.payloads
            .get(match_id)
            .cloned()
            .ok_or_else(|| Self::fail(match_id))
    }

    async fn get_highlight_events(
        &self,
        match_id: &str,
    ) -> Result<Vec<HighlightEventPayload>, ClientError> {
        if self.broken.contains(match_id) {
            return Err(Self::fail(match_id));
        }
        Ok(self.events.get(match_id).cloned().unwrap_or_default())
    }

    async fn get_skill_stats(
        &self,
        match_id: &str,
        _xuids: &[Xuid],
    ) -> Result<SkillPayload, ClientError> {
        self.skill
            .get(match_id)
            .cloned()
            .ok_or_else(|| Self::fail(match_id))
    }

    async fn get_asset(
        &self,
        _kind: AssetKind,
        asset_id: &str,
    ) -> Result<Option<String>, ClientError> {
        Ok(self.assets.get(asset_id).cloned())
    }
}

fn player(xuid: Xuid, gamertag: &str, team: i64) -> PlayerStatsPayload {
    PlayerStatsPayload {
        xuid,
        gamertag: Some(gamertag.to_string()),
        team_id: Some(team),
        kills: Some(12),
        deaths: Some(7),
        assists: Some(4),
        accuracy: Some(48.5),
        shots_fired: Some(200),
        shots_hit: Some(97),
        rank: Some(1),
        score: Some(2400),
        medals: vec![MedalPayload {
            medal_id: 2_430_242_797,
            count: 2,
        }],
        awards: vec![AwardPayload {
            name: "Headshot".to_string(),
            count: 5,
            score: 250,
        }],
        ..Default::default()
    }
}

fn payload_for(match_id: &str) -> MatchStatsPayload {
    MatchStatsPayload {
        match_id: match_id.to_string(),
        players: vec![
            player(XUID, GAMERTAG, 0),
            player(TEAMMATE, "Noble6", 0),
            player(ENEMY, "Locke", 1),
        ],
        playlist: Some(AssetRef {
            asset_id: "pl-ranked".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn skill_for() -> SkillPayload {
    SkillPayload {
        entries: vec![
            SkillEntry {
                xuid: XUID,
                team_id: Some(0),
                mmr: Some(1500.0),
                ..Default::default()
            },
            SkillEntry {
                xuid: ENEMY,
                team_id: Some(1),
                mmr: Some(1340.0),
                ..Default::default()
            },
        ],
    }
}

fn kill_death_events(match_id: &str) -> Vec<HighlightEventPayload> {
    vec![
        HighlightEventPayload {
            event_type: "kill".to_string(),
            time_ms: 10_000,
            xuid: Some(XUID),
            gamertag: Some(GAMERTAG.to_string()),
            ..Default::default()
        },
        HighlightEventPayload {
            event_type: "death".to_string(),
            time_ms: 10_002,
            xuid: Some(ENEMY),
            gamertag: Some("Locke".to_string()),
            raw: serde_json::json!({ "match": match_id }),
            ..Default::default()
        },
    ]
}

/// A store with `n` sync-era matches and the target's alias seeded.
async fn seeded_store(n: usize) -> Database {
    let db = Database::new_in_memory().await.unwrap();
    db.migrate_all().await.unwrap();
    for i in 0..n {
        db.upsert_match(&MatchRow {
            match_id: format!("m{}", i + 1),
            start_time: Some(
                Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
                    + chrono::Duration::days(i as i64),
            ),
            duration_secs: Some(600),
            kills: 10,
            deaths: 8,
            assists: 3,
            ..Default::default()
        })
        .await
        .unwrap();
    }
    db.upsert_alias(XUID, GAMERTAG).await.unwrap();
    db
}

fn scripted_for(db_matches: &[&str]) -> ScriptedClient {
    let mut client = ScriptedClient::default();
    for id in db_matches {
        client.payloads.insert(id.to_string(), payload_for(id));
        client.events.insert(id.to_string(), kill_death_events(id));
        client.skill.insert(id.to_string(), skill_for());
    }
    client
        .assets
        .insert("pl-ranked".to_string(), "Ranked Arena".to_string());
    client
}

/// Every category except PerformanceScores, which needs 10+ matches of
/// history and would keep small fixtures permanently "missing".
fn all_api_categories() -> CategorySelection {
    DataCategory::ALL
        .iter()
        .filter(|c| **c != DataCategory::PerformanceScores)
        .fold(CategorySelection::new(), |sel, c| sel.request(*c))
}

fn request(selection: CategorySelection) -> BackfillRequest {
    BackfillRequest {
        gamertag: GAMERTAG.to_string(),
        selection,
        ..Default::default()
    }
}

#[tokio::test]
async fn full_run_fills_the_store_and_reaches_a_fixed_point() {
    let db = seeded_store(2).await;
    let client = scripted_for(&["m1", "m2"]);

    let counts = run_backfill(&db, &client, &request(all_api_categories()))
        .await
        .unwrap();

    assert_eq!(counts.matches_checked, 2);
    assert_eq!(counts.matches_missing_data, 2);
    assert_eq!(counts.medals_inserted, 2);
    assert_eq!(counts.events_inserted, 4);
    assert_eq!(counts.skill_inserted, 4);
    assert_eq!(counts.personal_scores_inserted, 2);
    assert_eq!(counts.accuracy_updated, 2);
    assert_eq!(counts.shots_updated, 2);
    assert_eq!(counts.enemy_mmr_updated, 2);
    assert_eq!(counts.assets_updated, 2);
    assert_eq!(counts.participants_inserted, 6);
    // Target + teammate + enemy, minus the pre-seeded target alias.
    assert_eq!(counts.aliases_inserted, 2);

    let m1 = db.get_match("m1").await.unwrap().unwrap();
    assert_eq!(m1.accuracy, Some(48.5));
    assert_eq!(m1.playlist_name.as_deref(), Some("Ranked Arena"));

    // Every attempted category is now marked; a second run finds nothing.
    let counts = run_backfill(&db, &client, &request(all_api_categories()))
        .await
        .unwrap();
    assert_eq!(counts.matches_missing_data, 0);
    assert_eq!(counts.medals_inserted, 0);
    assert_eq!(counts.events_inserted, 0);
}

#[tokio::test]
async fn failed_match_is_skipped_and_retried_next_run() {
    let db = seeded_store(2).await;
    let mut client = scripted_for(&["m1", "m2"]);
    client.broken.insert("m2".to_string());

    let selection = CategorySelection::new().request(DataCategory::Medals);
    let counts = run_backfill(&db, &client, &request(selection)).await.unwrap();
    assert_eq!(counts.matches_missing_data, 2);
    assert_eq!(counts.medals_inserted, 1);

    assert_ne!(db.get_backfill_mask("m1").await.unwrap(), 0);
    assert_eq!(db.get_backfill_mask("m2").await.unwrap(), 0);

    // The API recovers; the next run picks up only the failed match.
    client.broken.clear();
    let counts = run_backfill(&db, &client, &request(selection)).await.unwrap();
    assert_eq!(counts.matches_missing_data, 1);
    assert_eq!(counts.medals_inserted, 1);
}

#[tokio::test]
async fn dry_run_reports_counts_and_writes_nothing() {
    let db = seeded_store(3).await;
    let client = scripted_for(&["m1", "m2", "m3"]);

    let mut req = request(CategorySelection::all());
    req.dry_run = true;
    req.run_killer_victim = true;
    req.run_citations = true;

    let counts = run_backfill(&db, &client, &req).await.unwrap();
    assert_eq!(counts.matches_checked, 3);
    assert_eq!(counts.matches_missing_data, 3);
    assert_eq!(counts.medals_inserted, 0);
    assert_eq!(counts.killer_victim_pairs_inserted, 0);

    assert_eq!(db.get_backfill_mask("m1").await.unwrap(), 0);
    let medal_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM medals_earned")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(medal_count.0, 0);
}

#[tokio::test]
async fn unknown_gamertag_fails_without_touching_the_store() {
    let db = Database::new_in_memory().await.unwrap();
    let client = ScriptedClient::default();

    let mut req = request(CategorySelection::all());
    req.gamertag = "NeverSeen".to_string();

    let err = run_backfill(&db, &client, &req).await.unwrap_err();
    assert!(matches!(err, BackfillError::UnknownPlayer(tag) if tag == "NeverSeen"));
}

#[tokio::test]
async fn identity_falls_back_to_event_history() {
    let db = seeded_store(1).await;
    // No alias row for this spelling; the event scan must find it
    // case-insensitively.
    sqlx::query("DELETE FROM xuid_aliases").execute(db.pool()).await.unwrap();
    sqlx::query(
        "INSERT INTO highlight_events (match_id, event_type, time_ms, xuid, gamertag)
         VALUES ('m1', 'kill', 1000, ?1, 'Spartan117')",
    )
    .bind(XUID)
    .execute(db.pool())
    .await
    .unwrap();

    let client = scripted_for(&["m1"]);
    let mut req = request(CategorySelection::new().request(DataCategory::Medals));
    req.gamertag = "SPARTAN117".to_string();

    let counts = run_backfill(&db, &client, &req).await.unwrap();
    assert_eq!(counts.medals_inserted, 1);
}

#[tokio::test]
async fn local_pass_runs_without_api_categories() {
    let db = seeded_store(1).await;
    // Events already synced; only local derivations requested.
    sqlx::query(
        "INSERT INTO highlight_events (match_id, event_type, time_ms, xuid, gamertag) VALUES
             ('m1', 'kill', 5000, ?1, 'Spartan117'),
             ('m1', 'death', 5002, ?2, 'Locke')",
    )
    .bind(XUID)
    .bind(ENEMY)
    .execute(db.pool())
    .await
    .unwrap();

    let client = ScriptedClient::default();
    let mut req = request(CategorySelection::new());
    req.run_killer_victim = true;
    req.run_end_time = true;
    req.run_sessions = true;
    req.run_citations = true;

    let counts = run_backfill(&db, &client, &req).await.unwrap();
    assert_eq!(counts.killer_victim_pairs_inserted, 1);
    assert_eq!(counts.end_time_updated, 1);
    assert_eq!(counts.sessions_updated, 1);
    // slayer/playmaker citations come from the seeded kills/assists.
    assert!(counts.citations_computed >= 1);

    let m1 = db.get_match("m1").await.unwrap().unwrap();
    let start = m1.start_time.unwrap();
    assert_eq!(m1.end_time.unwrap(), start + chrono::Duration::seconds(600));
}

#[tokio::test]
async fn performance_scores_require_enough_history() {
    let db = seeded_store(12).await;
    let client = ScriptedClient::default();

    let req = request(CategorySelection::new().request(DataCategory::PerformanceScores));
    let counts = run_backfill(&db, &client, &req).await.unwrap();

    // 12 matches, 10-match look-back: only the two newest have enough
    // strictly-earlier history.
    assert_eq!(counts.performance_scores_inserted, 2);

    let m12 = db.get_match("m12").await.unwrap().unwrap();
    let score = m12.performance_score.unwrap();
    assert!((0.0..=100.0).contains(&score));
    let m5 = db.get_match("m5").await.unwrap().unwrap();
    assert!(m5.performance_score.is_none());
}

#[tokio::test]
async fn enemy_mmr_lands_on_the_target_row_only() {
    let db = seeded_store(1).await;
    let client = scripted_for(&["m1"]);

    let selection = CategorySelection::new()
        .request(DataCategory::Skill)
        .request(DataCategory::EnemyMmr);
    run_backfill(&db, &client, &request(selection)).await.unwrap();

    let own = db.get_skill("m1", XUID).await.unwrap().unwrap();
    assert_eq!(own.enemy_mmr, Some(1340.0));
    assert_eq!(own.mmr, Some(1500.0));

    let enemy = db.get_skill("m1", ENEMY).await.unwrap().unwrap();
    assert_eq!(enemy.enemy_mmr, None);
}
