// crates/db/src/queries/medals.rs
// medals_earned reads/writes.

use std::collections::HashMap;

use sqlx::SqliteConnection;
use spartan_ledger_core::MedalRow;
use tracing::warn;

use crate::{Database, DbResult};

pub(crate) async fn insert_medals_on(
    conn: &mut SqliteConnection,
    rows: &[MedalRow],
) -> DbResult<u64> {
    let mut inserted = 0u64;
    for row in rows {
        let result = sqlx::query(
            "INSERT INTO medals_earned (match_id, medal_id, count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(match_id, medal_id) DO UPDATE SET count = excluded.count",
        )
        .bind(&row.match_id)
        .bind(row.medal_id)
        .bind(row.count)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(_) => inserted += 1,
            Err(e) => warn!(
                "failed to insert medal {} for match {}: {e}",
                row.medal_id, row.match_id
            ),
        }
    }
    Ok(inserted)
}

impl Database {
    /// Upsert medal rows for a match. A failure on one row is logged and
    /// does not abort the remaining rows. Returns how many rows landed.
    pub async fn insert_medals(&self, rows: &[MedalRow]) -> DbResult<u64> {
        let mut conn = self.pool().acquire().await?;
        insert_medals_on(&mut conn, rows).await
    }

    /// Medal id → count for one match.
    pub async fn medal_counts(&self, match_id: &str) -> DbResult<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT medal_id, count FROM medals_earned WHERE match_id = ?1")
                .bind(match_id)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().collect())
    }
}
