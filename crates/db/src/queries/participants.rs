// crates/db/src/queries/participants.rs
// match_participants rows + detail-column updates, and the xuid_aliases
// table that identity resolution reads.

use chrono::Utc;
use sqlx::SqliteConnection;
use spartan_ledger_core::{ParticipantRow, Xuid};
use tracing::warn;

use super::encode_ts;
use crate::{Database, DbResult};

pub(crate) async fn upsert_participants_on(
    conn: &mut SqliteConnection,
    rows: &[ParticipantRow],
) -> DbResult<u64> {
    let mut inserted = 0u64;
    for row in rows {
        let result = sqlx::query(
            "INSERT INTO match_participants (match_id, xuid, team_id, outcome, gamertag)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(match_id, xuid) DO UPDATE SET
                 team_id = COALESCE(excluded.team_id, match_participants.team_id),
                 outcome = COALESCE(excluded.outcome, match_participants.outcome),
                 gamertag = COALESCE(excluded.gamertag, match_participants.gamertag)",
        )
        .bind(&row.match_id)
        .bind(row.xuid)
        .bind(row.team_id)
        .bind(row.outcome)
        .bind(&row.gamertag)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => inserted += 1,
            Err(e) => warn!(
                "failed to upsert participant {} for match {}: {e}",
                row.xuid, row.match_id
            ),
        }
    }
    Ok(inserted)
}

// The detail updates are COALESCE-guarded: columns densify, so a later
// payload that lacks a field must never erase a previously-filled value.

pub(crate) async fn update_participant_scores_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    xuid: Xuid,
    rank: Option<i64>,
    score: Option<i64>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE match_participants
         SET rank = COALESCE(?3, rank), score = COALESCE(?4, score)
         WHERE match_id = ?1 AND xuid = ?2",
    )
    .bind(match_id)
    .bind(xuid)
    .bind(rank)
    .bind(score)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_participant_kda_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    xuid: Xuid,
    kills: Option<i64>,
    deaths: Option<i64>,
    assists: Option<i64>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE match_participants
         SET kills = COALESCE(?3, kills),
             deaths = COALESCE(?4, deaths),
             assists = COALESCE(?5, assists)
         WHERE match_id = ?1 AND xuid = ?2",
    )
    .bind(match_id)
    .bind(xuid)
    .bind(kills)
    .bind(deaths)
    .bind(assists)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_participant_shots_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    xuid: Xuid,
    shots_fired: Option<i64>,
    shots_hit: Option<i64>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE match_participants
         SET shots_fired = COALESCE(?3, shots_fired),
             shots_hit = COALESCE(?4, shots_hit)
         WHERE match_id = ?1 AND xuid = ?2",
    )
    .bind(match_id)
    .bind(xuid)
    .bind(shots_fired)
    .bind(shots_hit)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_participant_damage_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    xuid: Xuid,
    damage_dealt: Option<i64>,
    damage_taken: Option<i64>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE match_participants
         SET damage_dealt = COALESCE(?3, damage_dealt),
             damage_taken = COALESCE(?4, damage_taken)
         WHERE match_id = ?1 AND xuid = ?2",
    )
    .bind(match_id)
    .bind(xuid)
    .bind(damage_dealt)
    .bind(damage_taken)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn upsert_alias_on(
    conn: &mut SqliteConnection,
    xuid: Xuid,
    gamertag: &str,
) -> DbResult<bool> {
    let now = encode_ts(Some(Utc::now()));
    let result = sqlx::query(
        "INSERT OR IGNORE INTO xuid_aliases (xuid, gamertag, last_seen) VALUES (?1, ?2, ?3)",
    )
    .bind(xuid)
    .bind(gamertag)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    let is_new = result.rows_affected() > 0;

    if !is_new {
        sqlx::query("UPDATE xuid_aliases SET last_seen = ?3 WHERE xuid = ?1 AND gamertag = ?2")
            .bind(xuid)
            .bind(gamertag)
            .bind(&now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(is_new)
}

pub(crate) async fn participant_xuids_on(
    conn: &mut SqliteConnection,
    match_id: &str,
) -> DbResult<Vec<Xuid>> {
    let xuids: Vec<i64> =
        sqlx::query_scalar("SELECT xuid FROM match_participants WHERE match_id = ?1")
            .bind(match_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(xuids)
}

impl Database {
    /// Upsert the base participant rows (team/outcome/gamertag). Detail
    /// columns are written by the granular updates below. Returns how many
    /// rows landed; per-row failures are logged and skipped.
    pub async fn upsert_participants(&self, rows: &[ParticipantRow]) -> DbResult<u64> {
        let mut conn = self.pool().acquire().await?;
        upsert_participants_on(&mut conn, rows).await
    }

    pub async fn update_participant_scores(
        &self,
        match_id: &str,
        xuid: Xuid,
        rank: Option<i64>,
        score: Option<i64>,
    ) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_participant_scores_on(&mut conn, match_id, xuid, rank, score).await
    }

    pub async fn update_participant_kda(
        &self,
        match_id: &str,
        xuid: Xuid,
        kills: Option<i64>,
        deaths: Option<i64>,
        assists: Option<i64>,
    ) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_participant_kda_on(&mut conn, match_id, xuid, kills, deaths, assists).await
    }

    pub async fn update_participant_shots(
        &self,
        match_id: &str,
        xuid: Xuid,
        shots_fired: Option<i64>,
        shots_hit: Option<i64>,
    ) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_participant_shots_on(&mut conn, match_id, xuid, shots_fired, shots_hit).await
    }

    pub async fn update_participant_damage(
        &self,
        match_id: &str,
        xuid: Xuid,
        damage_dealt: Option<i64>,
        damage_taken: Option<i64>,
    ) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_participant_damage_on(&mut conn, match_id, xuid, damage_dealt, damage_taken).await
    }

    /// Record that a gamertag was seen on a XUID. Returns true when the
    /// pair is new (the alias row did not exist before).
    pub async fn upsert_alias(&self, xuid: Xuid, gamertag: &str) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        upsert_alias_on(&mut conn, xuid, gamertag).await
    }

    /// Identity resolution, first leg: gamertag → XUID via the alias
    /// table, case-insensitive, most recently seen first.
    pub async fn resolve_alias(&self, gamertag: &str) -> DbResult<Option<Xuid>> {
        let xuid: Option<i64> = sqlx::query_scalar(
            "SELECT xuid FROM xuid_aliases
             WHERE LOWER(gamertag) = LOWER(?1)
             ORDER BY last_seen DESC LIMIT 1",
        )
        .bind(gamertag)
        .fetch_optional(self.pool())
        .await?;
        Ok(xuid)
    }
}
