// crates/db/src/schema.rs
//! Targeted, idempotent schema migrators.
//!
//! The base migrations create the minimal sync-era schema; everything the
//! backfill writes on top of it (accuracy, resolved asset names, the
//! completion bitmask, participant detail columns) is added here via
//! column-existence checks, so every `ensure_*` call is safe to repeat.
//! The orchestrator runs only the migrators its requested categories need,
//! logs failures, and continues — a truly-missing column then fails loudly
//! at the next write instead.

use crate::{Database, DbResult};
use tracing::info;

/// `match_stats` columns the stats backfill fills in, with their types.
const STAT_COLUMNS: &[(&str, &str)] = &[
    ("accuracy", "REAL"),
    ("shots_fired", "INTEGER"),
    ("shots_hit", "INTEGER"),
    ("damage_dealt", "INTEGER"),
    ("damage_taken", "INTEGER"),
    ("performance_score", "REAL"),
    ("end_time", "TEXT"),
    ("playlist_name", "TEXT"),
    ("map_name", "TEXT"),
    ("map_mode_pair_name", "TEXT"),
    ("game_variant_name", "TEXT"),
];

/// `match_participants` detail columns, filled from per-player payloads.
const PARTICIPANT_COLUMNS: &[(&str, &str)] = &[
    ("rank", "INTEGER"),
    ("score", "INTEGER"),
    ("kills", "INTEGER"),
    ("deaths", "INTEGER"),
    ("assists", "INTEGER"),
    ("shots_fired", "INTEGER"),
    ("shots_hit", "INTEGER"),
    ("damage_dealt", "INTEGER"),
    ("damage_taken", "INTEGER"),
];

impl Database {
    /// Whether a table exists in the store.
    pub async fn table_exists(&self, table: &str) -> DbResult<bool> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(self.pool())
                .await?;
        Ok(row.0 > 0)
    }

    /// Whether a column exists on a table.
    pub async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool> {
        let columns: Vec<(String,)> =
            sqlx::query_as(&format!("SELECT name FROM pragma_table_info('{}')", table))
                .fetch_all(self.pool())
                .await?;
        Ok(columns.iter().any(|(name,)| name == column))
    }

    /// Add a column to a table if it doesn't already exist.
    async fn add_column_if_missing(&self, table: &str, column: &str, typedef: &str) -> DbResult<()> {
        if !self.column_exists(table, column).await? {
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, typedef);
            sqlx::query(&sql).execute(self.pool()).await?;
            info!("Schema migration: added {}.{}", table, column);
        }
        Ok(())
    }

    /// Ensure all backfillable `match_stats` columns exist.
    pub async fn ensure_stat_columns(&self) -> DbResult<()> {
        for (col, typedef) in STAT_COLUMNS {
            self.add_column_if_missing("match_stats", col, typedef).await?;
        }
        Ok(())
    }

    /// Ensure the completion-bitmask column exists.
    pub async fn ensure_backfill_column(&self) -> DbResult<()> {
        self.add_column_if_missing("match_stats", "backfill_completed", "INTEGER NOT NULL DEFAULT 0")
            .await
    }

    /// Ensure the play-session assignment column exists.
    pub async fn ensure_session_column(&self) -> DbResult<()> {
        self.add_column_if_missing("match_stats", "session_id", "INTEGER")
            .await
    }

    /// Ensure the `match_participants` detail columns exist.
    pub async fn ensure_participant_columns(&self) -> DbResult<()> {
        for (col, typedef) in PARTICIPANT_COLUMNS {
            self.add_column_if_missing("match_participants", col, typedef)
                .await?;
        }
        Ok(())
    }

    /// Widen `medals_earned.medal_id` from a legacy 32-bit declaration to
    /// INTEGER (i64) via a shadow-table rebuild, because SQLite cannot
    /// change a column's type in place. Returns whether a rebuild ran.
    pub async fn widen_medal_id_column(&self) -> DbResult<bool> {
        let columns: Vec<(String, String)> =
            sqlx::query_as("SELECT name, type FROM pragma_table_info('medals_earned')")
                .fetch_all(self.pool())
                .await?;
        let medal_type = columns
            .iter()
            .find(|(name, _)| name == "medal_id")
            .map(|(_, ty)| ty.to_ascii_uppercase());

        match medal_type {
            Some(ty) if ty != "INTEGER" => {}
            // Already wide (or the table is missing entirely) — nothing to do.
            _ => return Ok(false),
        }

        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"
            CREATE TABLE medals_earned_widened (
                match_id TEXT NOT NULL,
                medal_id INTEGER NOT NULL,
                count    INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (match_id, medal_id)
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO medals_earned_widened (match_id, medal_id, count)
             SELECT match_id, CAST(medal_id AS INTEGER), count FROM medals_earned",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("DROP TABLE medals_earned").execute(&mut *tx).await?;
        sqlx::query("ALTER TABLE medals_earned_widened RENAME TO medals_earned")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Schema migration: widened medals_earned.medal_id to INTEGER");
        Ok(true)
    }

    /// Run every targeted migrator. Used by local-only CLI paths and tests;
    /// the orchestrator runs only what its requested categories need.
    pub async fn migrate_all(&self) -> DbResult<()> {
        self.ensure_backfill_column().await?;
        self.ensure_stat_columns().await?;
        self.ensure_session_column().await?;
        self.ensure_participant_columns().await?;
        self.widen_medal_id_column().await?;
        Ok(())
    }
}
