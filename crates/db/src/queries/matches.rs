// crates/db/src/queries/matches.rs
// match_stats reads/writes: sync-era upsert, backfill updates, the
// completion bitmask, and the stat frames the strategies consume.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use spartan_ledger_core::{MatchRow, MatchStatFrame};

use super::{decode_ts, encode_ts};
use crate::{Database, DbResult};

/// OR the given bits into the match's completion bitmask. Monotonic:
/// bits are never cleared here, only added.
pub(crate) async fn mark_backfill_completed_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    mask: i64,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE match_stats
         SET backfill_completed = COALESCE(backfill_completed, 0) | ?2
         WHERE match_id = ?1",
    )
    .bind(match_id)
    .bind(mask)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_accuracy_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    accuracy: f64,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE match_stats SET accuracy = ?2 WHERE match_id = ?1")
        .bind(match_id)
        .bind(accuracy)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_shots_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    shots_fired: i64,
    shots_hit: i64,
    damage_dealt: Option<i64>,
    damage_taken: Option<i64>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE match_stats
         SET shots_fired = ?2, shots_hit = ?3,
             damage_dealt = COALESCE(?4, damage_dealt),
             damage_taken = COALESCE(?5, damage_taken)
         WHERE match_id = ?1",
    )
    .bind(match_id)
    .bind(shots_fired)
    .bind(shots_hit)
    .bind(damage_dealt)
    .bind(damage_taken)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Fill in resolved asset display names. `None` keeps whatever is
/// already stored, so partial resolution never erases earlier names.
pub(crate) async fn update_asset_names_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    playlist_name: Option<&str>,
    map_name: Option<&str>,
    map_mode_pair_name: Option<&str>,
    game_variant_name: Option<&str>,
) -> DbResult<bool> {
    let result = sqlx::query(
        "UPDATE match_stats
         SET playlist_name = COALESCE(?2, playlist_name),
             map_name = COALESCE(?3, map_name),
             map_mode_pair_name = COALESCE(?4, map_mode_pair_name),
             game_variant_name = COALESCE(?5, game_variant_name)
         WHERE match_id = ?1",
    )
    .bind(match_id)
    .bind(playlist_name)
    .bind(map_name)
    .bind(map_mode_pair_name)
    .bind(game_variant_name)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

impl Database {
    /// Upsert the sync-era columns of one match row. Backfilled columns
    /// (accuracy, names, bitmask, ...) are written by the targeted update
    /// methods below and are never touched here.
    pub async fn upsert_match(&self, row: &MatchRow) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO match_stats (
                match_id, start_time, duration_secs,
                kills, deaths, assists,
                playlist_id, map_id, map_mode_pair_id, game_variant_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(match_id) DO UPDATE SET
                start_time = COALESCE(excluded.start_time, match_stats.start_time),
                duration_secs = COALESCE(excluded.duration_secs, match_stats.duration_secs),
                kills = excluded.kills,
                deaths = excluded.deaths,
                assists = excluded.assists,
                playlist_id = COALESCE(excluded.playlist_id, match_stats.playlist_id),
                map_id = COALESCE(excluded.map_id, match_stats.map_id),
                map_mode_pair_id = COALESCE(excluded.map_mode_pair_id, match_stats.map_mode_pair_id),
                game_variant_id = COALESCE(excluded.game_variant_id, match_stats.game_variant_id)
            "#,
        )
        .bind(&row.match_id)
        .bind(encode_ts(row.start_time))
        .bind(row.duration_secs)
        .bind(row.kills)
        .bind(row.deaths)
        .bind(row.assists)
        .bind(&row.playlist_id)
        .bind(&row.map_id)
        .bind(&row.map_mode_pair_id)
        .bind(&row.game_variant_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Full match row. Requires a fully-migrated store (`migrate_all` or
    /// the per-category `ensure_*` migrators).
    pub async fn get_match(&self, match_id: &str) -> DbResult<Option<MatchRow>> {
        let row = sqlx::query(
            r#"
            SELECT match_id, start_time, duration_secs, end_time,
                   kills, deaths, assists,
                   accuracy, shots_fired, shots_hit, damage_dealt, damage_taken,
                   playlist_id, playlist_name, map_id, map_name,
                   map_mode_pair_id, map_mode_pair_name,
                   game_variant_id, game_variant_name,
                   performance_score, COALESCE(backfill_completed, 0) AS backfill_completed
            FROM match_stats WHERE match_id = ?1
            "#,
        )
        .bind(match_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| -> DbResult<MatchRow> {
            Ok(MatchRow {
                match_id: r.try_get("match_id")?,
                start_time: decode_ts(r.try_get("start_time")?),
                duration_secs: r.try_get("duration_secs")?,
                end_time: decode_ts(r.try_get("end_time")?),
                kills: r.try_get("kills")?,
                deaths: r.try_get("deaths")?,
                assists: r.try_get("assists")?,
                accuracy: r.try_get("accuracy")?,
                shots_fired: r.try_get("shots_fired")?,
                shots_hit: r.try_get("shots_hit")?,
                damage_dealt: r.try_get("damage_dealt")?,
                damage_taken: r.try_get("damage_taken")?,
                playlist_id: r.try_get("playlist_id")?,
                playlist_name: r.try_get("playlist_name")?,
                map_id: r.try_get("map_id")?,
                map_name: r.try_get("map_name")?,
                map_mode_pair_id: r.try_get("map_mode_pair_id")?,
                map_mode_pair_name: r.try_get("map_mode_pair_name")?,
                game_variant_id: r.try_get("game_variant_id")?,
                game_variant_name: r.try_get("game_variant_name")?,
                performance_score: r.try_get("performance_score")?,
                backfill_completed: r.try_get("backfill_completed")?,
            })
        })
        .transpose()
    }

    pub async fn count_matches(&self) -> DbResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM match_stats")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0 as u64)
    }

    /// OR the given bits into the match's completion bitmask. Monotonic:
    /// bits are never cleared here, only added.
    pub async fn mark_backfill_completed(&self, match_id: &str, mask: i64) -> DbResult<()> {
        let mut conn = self.pool().acquire().await?;
        mark_backfill_completed_on(&mut conn, match_id, mask).await
    }

    pub async fn get_backfill_mask(&self, match_id: &str) -> DbResult<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT COALESCE(backfill_completed, 0) FROM match_stats WHERE match_id = ?1",
        )
        .bind(match_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(m,)| m).unwrap_or(0))
    }

    pub async fn update_accuracy(&self, match_id: &str, accuracy: f64) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_accuracy_on(&mut conn, match_id, accuracy).await
    }

    pub async fn update_shots(
        &self,
        match_id: &str,
        shots_fired: i64,
        shots_hit: i64,
        damage_dealt: Option<i64>,
        damage_taken: Option<i64>,
    ) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_shots_on(&mut conn, match_id, shots_fired, shots_hit, damage_dealt, damage_taken)
            .await
    }

    /// Fill in resolved asset display names. `None` keeps whatever is
    /// already stored, so partial resolution never erases earlier names.
    pub async fn update_asset_names(
        &self,
        match_id: &str,
        playlist_name: Option<&str>,
        map_name: Option<&str>,
        map_mode_pair_name: Option<&str>,
        game_variant_name: Option<&str>,
    ) -> DbResult<bool> {
        let mut conn = self.pool().acquire().await?;
        update_asset_names_on(
            &mut conn,
            match_id,
            playlist_name,
            map_name,
            map_mode_pair_name,
            game_variant_name,
        )
        .await
    }

    pub async fn set_performance_score(&self, match_id: &str, score: f64) -> DbResult<()> {
        sqlx::query("UPDATE match_stats SET performance_score = ?2 WHERE match_id = ?1")
            .bind(match_id)
            .bind(score)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn update_end_time(&self, match_id: &str, end_time: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE match_stats SET end_time = ?2 WHERE match_id = ?1")
            .bind(match_id)
            .bind(encode_ts(Some(end_time)))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Matches eligible for end-time derivation: start and duration known,
    /// and (unless `force`) end time still NULL.
    pub async fn end_time_candidates(
        &self,
        force: bool,
    ) -> DbResult<Vec<(String, DateTime<Utc>, i64)>> {
        let filter = if force { "" } else { "AND end_time IS NULL" };
        let sql = format!(
            "SELECT match_id, start_time, duration_secs FROM match_stats
             WHERE start_time IS NOT NULL AND duration_secs IS NOT NULL {filter}"
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let match_id: String = r.try_get("match_id")?;
            let Some(start) = decode_ts(r.try_get("start_time")?) else {
                continue;
            };
            let duration: i64 = r.try_get("duration_secs")?;
            out.push((match_id, start, duration));
        }
        Ok(out)
    }

    /// Matches still awaiting a performance score, oldest first so history
    /// builds up before later matches are scored.
    pub async fn performance_score_candidates(&self) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT match_id FROM match_stats
             WHERE performance_score IS NULL AND start_time IS NOT NULL
             ORDER BY start_time ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    /// Matches with a known start time, oldest first, with their current
    /// session assignment. Input to session bucketing.
    pub async fn session_candidates(
        &self,
    ) -> DbResult<Vec<(String, DateTime<Utc>, Option<i64>)>> {
        let rows = sqlx::query(
            "SELECT match_id, start_time, session_id FROM match_stats
             WHERE start_time IS NOT NULL
             ORDER BY start_time ASC",
        )
        .fetch_all(self.pool())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let match_id: String = r.try_get("match_id")?;
            let Some(start) = decode_ts(r.try_get("start_time")?) else {
                continue;
            };
            let session_id: Option<i64> = r.try_get("session_id")?;
            out.push((match_id, start, session_id));
        }
        Ok(out)
    }

    pub async fn update_session_id(&self, match_id: &str, session_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE match_stats SET session_id = ?2 WHERE match_id = ?1")
            .bind(match_id)
            .bind(session_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// The stat frame for one match, used by relative scoring and by
    /// stat-mapped citations.
    pub async fn get_stat_frame(&self, match_id: &str) -> DbResult<Option<MatchStatFrame>> {
        let row = sqlx::query(
            "SELECT match_id, start_time, kills, deaths, assists,
                    accuracy, shots_fired, shots_hit, damage_dealt, damage_taken,
                    performance_score
             FROM match_stats WHERE match_id = ?1",
        )
        .bind(match_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| -> DbResult<MatchStatFrame> { Ok(frame_from_row(&r)?) })
            .transpose()
    }

    /// Historical frames strictly before `before`, newest first. This is
    /// the look-back window for relative scoring: matches that start at or
    /// after `before` never appear in it.
    pub async fn history_frames(&self, before: DateTime<Utc>) -> DbResult<Vec<MatchStatFrame>> {
        let rows = sqlx::query(
            "SELECT match_id, start_time, kills, deaths, assists,
                    accuracy, shots_fired, shots_hit, damage_dealt, damage_taken,
                    performance_score
             FROM match_stats
             WHERE start_time IS NOT NULL AND start_time < ?1
             ORDER BY start_time DESC",
        )
        .bind(encode_ts(Some(before)))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|r| frame_from_row(r).map_err(Into::into))
            .collect()
    }
}

fn frame_from_row(r: &sqlx::sqlite::SqliteRow) -> Result<MatchStatFrame, sqlx::Error> {
    Ok(MatchStatFrame {
        match_id: r.try_get("match_id")?,
        start_time: decode_ts(r.try_get("start_time")?),
        kills: r.try_get("kills")?,
        deaths: r.try_get("deaths")?,
        assists: r.try_get("assists")?,
        accuracy: r.try_get("accuracy")?,
        shots_fired: r.try_get("shots_fired")?,
        shots_hit: r.try_get("shots_hit")?,
        damage_dealt: r.try_get("damage_dealt")?,
        damage_taken: r.try_get("damage_taken")?,
        performance_score: r.try_get("performance_score")?,
    })
}
