// crates/db/src/queries/skill.rs
// player_match_stats (per-player skill/MMR) reads/writes.

use sqlx::SqliteConnection;
use spartan_ledger_core::{SkillRow, Xuid};
use tracing::warn;

use crate::{Database, DbResult};

pub(crate) async fn upsert_skill_on(
    conn: &mut SqliteConnection,
    rows: &[SkillRow],
) -> DbResult<u64> {
    let mut inserted = 0u64;
    for row in rows {
        let result = sqlx::query(
            "INSERT INTO player_match_stats
                 (match_id, xuid, mmr, mmr_variance, team_mmr, enemy_mmr)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(match_id, xuid) DO UPDATE SET
                 mmr = COALESCE(excluded.mmr, player_match_stats.mmr),
                 mmr_variance = COALESCE(excluded.mmr_variance, player_match_stats.mmr_variance),
                 team_mmr = COALESCE(excluded.team_mmr, player_match_stats.team_mmr),
                 enemy_mmr = COALESCE(excluded.enemy_mmr, player_match_stats.enemy_mmr)",
        )
        .bind(&row.match_id)
        .bind(row.xuid)
        .bind(row.mmr)
        .bind(row.mmr_variance)
        .bind(row.team_mmr)
        .bind(row.enemy_mmr)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => inserted += 1,
            Err(e) => warn!(
                "failed to upsert skill row {} for match {}: {e}",
                row.xuid, row.match_id
            ),
        }
    }
    Ok(inserted)
}

pub(crate) async fn update_enemy_mmr_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    xuid: Xuid,
    enemy_mmr: f64,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO player_match_stats (match_id, xuid, enemy_mmr)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(match_id, xuid) DO UPDATE SET enemy_mmr = excluded.enemy_mmr",
    )
    .bind(match_id)
    .bind(xuid)
    .bind(enemy_mmr)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Database {
    /// Upsert skill rows for a match. One row per participant; a failure on
    /// one row is logged and does not abort the rest.
    pub async fn upsert_skill(&self, rows: &[SkillRow]) -> DbResult<u64> {
        let mut conn = self.pool().acquire().await?;
        upsert_skill_on(&mut conn, rows).await
    }

    /// Set the opposing-team MMR for one player in one match. Inserts the
    /// skill row if the skill fetch has not run for it yet.
    pub async fn update_enemy_mmr(
        &self,
        match_id: &str,
        xuid: Xuid,
        enemy_mmr: f64,
    ) -> DbResult<()> {
        let mut conn = self.pool().acquire().await?;
        update_enemy_mmr_on(&mut conn, match_id, xuid, enemy_mmr).await
    }

    pub async fn get_skill(&self, match_id: &str, xuid: Xuid) -> DbResult<Option<SkillRow>> {
        let row: Option<(Option<f64>, Option<f64>, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT mmr, mmr_variance, team_mmr, enemy_mmr
             FROM player_match_stats WHERE match_id = ?1 AND xuid = ?2",
        )
        .bind(match_id)
        .bind(xuid)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(mmr, mmr_variance, team_mmr, enemy_mmr)| SkillRow {
            match_id: match_id.to_string(),
            xuid,
            mmr,
            mmr_variance,
            team_mmr,
            enemy_mmr,
        }))
    }
}
