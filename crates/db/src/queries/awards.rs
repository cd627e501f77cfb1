// crates/db/src/queries/awards.rs
// personal_score_awards reads/writes.

use std::collections::HashMap;

use sqlx::SqliteConnection;
use spartan_ledger_core::{AwardRow, Xuid};
use tracing::warn;

use crate::{Database, DbResult};

pub(crate) async fn insert_awards_on(
    conn: &mut SqliteConnection,
    rows: &[AwardRow],
) -> DbResult<u64> {
    let mut inserted = 0u64;
    for row in rows {
        let result = sqlx::query(
            "INSERT INTO personal_score_awards (match_id, xuid, award_name, count, score)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(match_id, xuid, award_name) DO UPDATE SET
                 count = excluded.count,
                 score = excluded.score",
        )
        .bind(&row.match_id)
        .bind(row.xuid)
        .bind(&row.award_name)
        .bind(row.count)
        .bind(row.score)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => inserted += 1,
            Err(e) => warn!(
                "failed to insert award '{}' for match {}: {e}",
                row.award_name, row.match_id
            ),
        }
    }
    Ok(inserted)
}

impl Database {
    /// Upsert personal-score award rows. Per-row failures are logged and
    /// skipped; returns how many rows landed.
    pub async fn insert_awards(&self, rows: &[AwardRow]) -> DbResult<u64> {
        let mut conn = self.pool().acquire().await?;
        insert_awards_on(&mut conn, rows).await
    }

    /// Award name → count for one player in one match.
    pub async fn award_counts(&self, match_id: &str, xuid: Xuid) -> DbResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT award_name, count FROM personal_score_awards
             WHERE match_id = ?1 AND xuid = ?2",
        )
        .bind(match_id)
        .bind(xuid)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().collect())
    }
}
