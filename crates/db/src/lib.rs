// crates/db/src/lib.rs
// Per-player SQLite store for Halo Infinite match history.
pub mod detection;
mod migrations;
mod queries;
mod schema;

pub use detection::DetectionRequest;
pub use queries::MatchWriter;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine data directory")]
    NoDataDir,

    #[error("Failed to create store directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Handle to one player's store, wrapping a SQLite connection pool.
///
/// One store per player; the backfill run is the only writer. Opening a
/// store applies the base migrations; the targeted column migrators in
/// `schema` run separately, conditioned on which categories a run needs.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl Database {
    /// Open (or create) the store at the given path and run base migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("Store opened at {}", path.display());
        Ok(db)
    }

    /// Create an in-memory store (for testing).
    ///
    /// Uses `shared_cache(true)` so all pool connections see the same
    /// in-memory database; without it each connection gets its own.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open a player's store at its default location
    /// (`<data dir>/spartan-ledger/<gamertag>.db`).
    pub async fn open_player(gamertag: &str) -> DbResult<Self> {
        let path = player_store_path(gamertag)?;
        Self::new(&path).await
    }

    /// Run all inline base migrations.
    ///
    /// Uses a `_migrations` table to track which migrations have already
    /// been applied, so non-idempotent statements only execute once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version > current_version {
                match sqlx::query(migration).execute(&self.pool).await {
                    Ok(_) => {}
                    Err(e) if e.to_string().contains("duplicate column name") => {
                        // Column already exists from a run without tracking.
                    }
                    Err(e) => return Err(e.into()),
                }
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path to the store file. Empty for in-memory stores.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Default directory holding the per-player stores.
pub fn default_store_dir() -> DbResult<PathBuf> {
    let dir = dirs::data_dir().ok_or(DbError::NoDataDir)?;
    Ok(dir.join("spartan-ledger"))
}

/// Default location of one player's store:
/// `<data dir>/spartan-ledger/<gamertag>.db`.
pub fn player_store_path(gamertag: &str) -> DbResult<PathBuf> {
    Ok(default_store_dir()?.join(format!("{}.db", gamertag)))
}

/// Every `(gamertag, path)` player store under `dir`, sorted by gamertag.
/// WAL sidecar files (`.db-wal`, `.db-shm`) are ignored.
pub fn list_player_stores(dir: &Path) -> DbResult<Vec<(String, PathBuf)>> {
    let mut stores = Vec::new();
    if !dir.exists() {
        return Ok(stores);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "db") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stores.push((stem.to_string(), path.clone()));
            }
        }
    }
    stores.sort();
    Ok(stores)
}
