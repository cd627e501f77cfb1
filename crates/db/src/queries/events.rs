// crates/db/src/queries/events.rs
// highlight_events and the derived killer_victim_pairs table.

use sqlx::{Row, SqliteConnection};
use spartan_ledger_core::{
    HighlightEventRow, KillFeedEvent, KillFeedKind, KillerVictimPair, Xuid,
};
use tracing::warn;

use crate::{migrations, Database, DbResult};

/// Replace a match's highlight events with the given set.
///
/// Events carry an autoincrement id, so plain re-insertion would
/// duplicate them on a forced rerun; delete-then-insert keeps the
/// operation idempotent per match.
pub(crate) async fn replace_highlight_events_on(
    conn: &mut SqliteConnection,
    match_id: &str,
    rows: &[HighlightEventRow],
) -> DbResult<u64> {
    sqlx::query("DELETE FROM highlight_events WHERE match_id = ?1")
        .bind(match_id)
        .execute(&mut *conn)
        .await?;

    let mut inserted = 0u64;
    for row in rows {
        let raw = serde_json::to_string(&row.raw_json).unwrap_or_else(|_| "{}".to_string());
        let result = sqlx::query(
            "INSERT INTO highlight_events
                 (match_id, event_type, time_ms, xuid, gamertag, type_hint, raw_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&row.match_id)
        .bind(&row.event_type)
        .bind(row.time_ms)
        .bind(row.xuid)
        .bind(&row.gamertag)
        .bind(&row.type_hint)
        .bind(raw)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => inserted += 1,
            Err(e) => warn!("failed to insert event for match {match_id}: {e}"),
        }
    }
    Ok(inserted)
}

impl Database {
    /// Replace a match's highlight events: delete-then-insert, idempotent
    /// per match.
    pub async fn replace_highlight_events(
        &self,
        match_id: &str,
        rows: &[HighlightEventRow],
    ) -> DbResult<u64> {
        let mut conn = self.pool().acquire().await?;
        replace_highlight_events_on(&mut conn, match_id, rows).await
    }

    /// Kill/death events for one match, ordered by time offset (id breaks
    /// ties so the ordering is stable across calls).
    pub async fn kill_feed(&self, match_id: &str) -> DbResult<Vec<KillFeedEvent>> {
        let rows = sqlx::query(
            "SELECT event_type, time_ms, xuid, gamertag
             FROM highlight_events
             WHERE match_id = ?1 AND event_type IN ('kill', 'death') AND xuid IS NOT NULL
             ORDER BY time_ms, id",
        )
        .bind(match_id)
        .fetch_all(self.pool())
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for r in rows {
            let event_type: String = r.try_get("event_type")?;
            let kind = match event_type.as_str() {
                "kill" => KillFeedKind::Kill,
                "death" => KillFeedKind::Death,
                _ => continue,
            };
            events.push(KillFeedEvent {
                kind,
                time_ms: r.try_get("time_ms")?,
                xuid: r.try_get("xuid")?,
                gamertag: r.try_get::<Option<String>, _>("gamertag")?.unwrap_or_default(),
            });
        }
        Ok(events)
    }

    /// Matches that have both kill and death events — the pairing
    /// strategy's candidates. Incremental mode (`already_paired_ok =
    /// false`) additionally skips matches that already have derived pairs.
    pub async fn pairing_candidates(&self, already_paired_ok: bool) -> DbResult<Vec<String>> {
        let skip_paired = if already_paired_ok {
            ""
        } else {
            "AND NOT EXISTS (SELECT 1 FROM killer_victim_pairs k WHERE k.match_id = m.match_id)"
        };
        let sql = format!(
            "SELECT m.match_id FROM match_stats m
             WHERE EXISTS (SELECT 1 FROM highlight_events e
                           WHERE e.match_id = m.match_id AND e.event_type = 'kill')
               AND EXISTS (SELECT 1 FROM highlight_events e
                           WHERE e.match_id = m.match_id AND e.event_type = 'death')
               {skip_paired}
             ORDER BY m.start_time IS NULL, m.start_time DESC"
        );
        let ids = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }

    pub async fn insert_killer_victim_pair(
        &self,
        match_id: &str,
        pair: &KillerVictimPair,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO killer_victim_pairs
                 (match_id, killer_xuid, killer_gamertag, victim_xuid, victim_gamertag, kill_count, time_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        )
        .bind(match_id)
        .bind(pair.killer_xuid)
        .bind(&pair.killer_gamertag)
        .bind(pair.victim_xuid)
        .bind(&pair.victim_gamertag)
        .bind(pair.time_ms)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Drop and recreate the derived pairs table (the force-rebuild path).
    pub async fn reset_killer_victim_pairs(&self) -> DbResult<()> {
        sqlx::query("DROP TABLE IF EXISTS killer_victim_pairs")
            .execute(self.pool())
            .await?;
        sqlx::query(migrations::KILLER_VICTIM_PAIRS_DDL)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn killer_victim_pairs(&self, match_id: &str) -> DbResult<Vec<KillerVictimPair>> {
        let rows = sqlx::query(
            "SELECT killer_xuid, killer_gamertag, victim_xuid, victim_gamertag, time_ms
             FROM killer_victim_pairs WHERE match_id = ?1
             ORDER BY time_ms",
        )
        .bind(match_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|r| -> Result<KillerVictimPair, sqlx::Error> {
                Ok(KillerVictimPair {
                    killer_xuid: r.try_get("killer_xuid")?,
                    killer_gamertag: r
                        .try_get::<Option<String>, _>("killer_gamertag")?
                        .unwrap_or_default(),
                    victim_xuid: r.try_get("victim_xuid")?,
                    victim_gamertag: r
                        .try_get::<Option<String>, _>("victim_gamertag")?
                        .unwrap_or_default(),
                    time_ms: r.try_get("time_ms")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Identity fallback: scan the player's own event history for a
    /// case-insensitive gamertag match with a usable XUID.
    pub async fn find_xuid_in_events(&self, gamertag: &str) -> DbResult<Option<Xuid>> {
        let xuid: Option<i64> = sqlx::query_scalar(
            "SELECT xuid FROM highlight_events
             WHERE LOWER(gamertag) = LOWER(?1) AND xuid IS NOT NULL AND xuid != 0
             LIMIT 1",
        )
        .bind(gamertag)
        .fetch_optional(self.pool())
        .await?;
        Ok(xuid)
    }
}
