// crates/db/src/queries/citations.rs
// citation_definitions (the mapping table) and match_citations (derived
// per-match values).

use sqlx::Row;
use spartan_ledger_core::{CitationDefinition, CitationKind};
use tracing::warn;

use crate::{Database, DbResult};

impl Database {
    /// Load the enabled citation mapping rules. A row whose type-specific
    /// parameter is missing (a 'medal' row with NULL medal_id, say) is
    /// logged and skipped rather than failing the load.
    pub async fn load_citation_definitions(&self) -> DbResult<Vec<CitationDefinition>> {
        let rows = sqlx::query(
            "SELECT name, display_name, kind, medal_id, stat_field, award_name, custom_fn, enabled
             FROM citation_definitions WHERE enabled = 1
             ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;

        let mut defs = Vec::with_capacity(rows.len());
        for r in rows {
            let name: String = r.try_get("name")?;
            let kind_text: String = r.try_get("kind")?;
            let kind = match kind_text.as_str() {
                "medal" => r
                    .try_get::<Option<i64>, _>("medal_id")?
                    .map(|medal_id| CitationKind::Medal { medal_id }),
                "stat" => r
                    .try_get::<Option<String>, _>("stat_field")?
                    .map(|field| CitationKind::Stat { field }),
                "award" => r
                    .try_get::<Option<String>, _>("award_name")?
                    .map(|award_name| CitationKind::Award { award_name }),
                "custom" => r
                    .try_get::<Option<String>, _>("custom_fn")?
                    .map(|function| CitationKind::Custom { function }),
                _ => None,
            };
            let Some(kind) = kind else {
                warn!("skipping malformed citation definition '{name}' (kind '{kind_text}')");
                continue;
            };
            defs.push(CitationDefinition {
                name,
                display_name: r.try_get("display_name")?,
                kind,
                enabled: true,
            });
        }
        Ok(defs)
    }

    /// Store one computed citation value. Replace semantics: a recompute
    /// overwrites the previous value for the same (match, citation).
    pub async fn store_citation(&self, match_id: &str, citation: &str, value: i64) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO match_citations (match_id, citation, value)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(match_id, citation) DO UPDATE SET value = excluded.value",
        )
        .bind(match_id)
        .bind(citation)
        .bind(value)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Citation name → value for one match.
    pub async fn citation_values(
        &self,
        match_id: &str,
    ) -> DbResult<std::collections::HashMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT citation, value FROM match_citations WHERE match_id = ?1")
                .bind(match_id)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Matches the citation pass should visit: with `force`, every match;
    /// without, only matches with no stored citation rows yet.
    pub async fn matches_missing_citations(&self, force: bool) -> DbResult<Vec<String>> {
        let filter = if force {
            ""
        } else {
            "WHERE NOT EXISTS (SELECT 1 FROM match_citations c WHERE c.match_id = m.match_id)"
        };
        let sql = format!(
            "SELECT m.match_id FROM match_stats m {filter}
             ORDER BY m.start_time IS NULL, m.start_time DESC"
        );
        let ids = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }
}
