// crates/db/src/detection.rs
//! Missing-data detector.
//!
//! For each requested category this builds one typed predicate, guards it
//! with "completion bit clear" (unless forced, or the bitmask column has
//! not been migrated in yet), combines the predicates with OR or AND, and
//! runs a single query ordered newest-start-time first.
//!
//! All identifiers in the generated SQL are fixed compile-time strings;
//! the only user-supplied value, the target XUID, is always bound as a
//! parameter.

use spartan_ledger_core::{CategorySelection, DataCategory, DetectionMode, Xuid};
use tracing::warn;

use crate::{Database, DbResult};

/// One detection run's inputs.
#[derive(Debug, Clone, Default)]
pub struct DetectionRequest {
    pub mode: DetectionMode,
    pub selection: CategorySelection,
    /// Truncates the final ordered result, not the selection logic.
    pub max_matches: Option<usize>,
}

/// A per-category SQL predicate over `match_stats m`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// No related row for this match.
    NotInTable(&'static str),
    /// The column is NULL on the match row.
    ColumnNull(&'static str),
    /// Any of the columns is NULL on the match row.
    AnyColumnNull(&'static [&'static str]),
    /// No row for the target XUID with the column non-NULL.
    XuidColumnNull {
        table: &'static str,
        column: &'static str,
    },
    /// A participant row exists with any of these detail columns NULL.
    ParticipantColumnsNull(&'static [&'static str]),
    /// A participant has no alias row at all.
    ParticipantAliasMissing,
    /// Any asset name column is NULL or still holds its own id — the
    /// placeholder written when resolution never happened.
    AssetNameUnresolved,
    /// Selects everything. Used for forced categories, and as the safe
    /// degradation when the schema is too old to know what's missing.
    AlwaysTrue,
}

/// The four (id, name) asset column pairs on `match_stats`.
const ASSET_NAME_COLUMNS: [(&str, &str); 4] = [
    ("playlist_id", "playlist_name"),
    ("map_id", "map_name"),
    ("map_mode_pair_id", "map_mode_pair_name"),
    ("game_variant_id", "game_variant_name"),
];

impl Predicate {
    /// Render to a SQL fragment. Returns the fragment and how many times
    /// the target XUID must be bound for it.
    fn render(&self) -> (String, usize) {
        match self {
            Predicate::NotInTable(table) => (
                format!("NOT EXISTS (SELECT 1 FROM {table} t WHERE t.match_id = m.match_id)"),
                0,
            ),
            Predicate::ColumnNull(col) => (format!("m.{col} IS NULL"), 0),
            Predicate::AnyColumnNull(cols) => {
                let clauses: Vec<String> =
                    cols.iter().map(|c| format!("m.{c} IS NULL")).collect();
                (format!("({})", clauses.join(" OR ")), 0)
            }
            Predicate::XuidColumnNull { table, column } => (
                format!(
                    "NOT EXISTS (SELECT 1 FROM {table} s \
                     WHERE s.match_id = m.match_id AND s.xuid = ? AND s.{column} IS NOT NULL)"
                ),
                1,
            ),
            Predicate::ParticipantColumnsNull(cols) => {
                let clauses: Vec<String> =
                    cols.iter().map(|c| format!("p.{c} IS NULL")).collect();
                (
                    format!(
                        "EXISTS (SELECT 1 FROM match_participants p \
                         WHERE p.match_id = m.match_id AND ({}))",
                        clauses.join(" OR ")
                    ),
                    0,
                )
            }
            Predicate::ParticipantAliasMissing => (
                "EXISTS (SELECT 1 FROM match_participants p \
                 WHERE p.match_id = m.match_id \
                 AND NOT EXISTS (SELECT 1 FROM xuid_aliases a WHERE a.xuid = p.xuid))"
                    .to_string(),
                0,
            ),
            Predicate::AssetNameUnresolved => {
                let clauses: Vec<String> = ASSET_NAME_COLUMNS
                    .iter()
                    .map(|(id, name)| format!("m.{name} IS NULL OR m.{name} = m.{id}"))
                    .collect();
                (format!("({})", clauses.join(" OR ")), 0)
            }
            Predicate::AlwaysTrue => ("1 = 1".to_string(), 0),
        }
    }
}

impl Database {
    /// Build the predicate for one category against the store's actual
    /// schema. Where the schema is too old to carry the relevant columns,
    /// the predicate degenerates to `AlwaysTrue`: we cannot know what is
    /// missing, and over-selecting is safer than silently skipping.
    async fn predicate_for(&self, category: DataCategory) -> DbResult<Predicate> {
        let pred = match category {
            DataCategory::Medals => Predicate::NotInTable("medals_earned"),
            DataCategory::Events => Predicate::NotInTable("highlight_events"),
            DataCategory::Skill => Predicate::NotInTable("player_match_stats"),
            DataCategory::PersonalScores => Predicate::NotInTable("personal_score_awards"),
            DataCategory::Participants => Predicate::NotInTable("match_participants"),
            DataCategory::Accuracy => {
                if self.column_exists("match_stats", "accuracy").await? {
                    Predicate::ColumnNull("accuracy")
                } else {
                    Predicate::AlwaysTrue
                }
            }
            DataCategory::Shots => {
                if self.column_exists("match_stats", "shots_fired").await?
                    && self.column_exists("match_stats", "shots_hit").await?
                {
                    Predicate::AnyColumnNull(&["shots_fired", "shots_hit"])
                } else {
                    Predicate::AlwaysTrue
                }
            }
            DataCategory::EnemyMmr => {
                if self.column_exists("player_match_stats", "enemy_mmr").await? {
                    Predicate::XuidColumnNull {
                        table: "player_match_stats",
                        column: "enemy_mmr",
                    }
                } else {
                    Predicate::AlwaysTrue
                }
            }
            DataCategory::Assets => {
                let mut resolved = true;
                for (_, name) in ASSET_NAME_COLUMNS {
                    resolved &= self.column_exists("match_stats", name).await?;
                }
                if resolved {
                    Predicate::AssetNameUnresolved
                } else {
                    Predicate::AlwaysTrue
                }
            }
            DataCategory::PerformanceScores => {
                if self.column_exists("match_stats", "performance_score").await? {
                    Predicate::ColumnNull("performance_score")
                } else {
                    Predicate::AlwaysTrue
                }
            }
            DataCategory::ParticipantsScores => {
                self.participant_predicate(&["rank", "score"]).await?
            }
            DataCategory::ParticipantsKda => {
                self.participant_predicate(&["kills", "deaths", "assists"]).await?
            }
            DataCategory::ParticipantsShots => {
                self.participant_predicate(&["shots_fired", "shots_hit"]).await?
            }
            DataCategory::ParticipantsDamage => {
                self.participant_predicate(&["damage_dealt", "damage_taken"])
                    .await?
            }
            DataCategory::Aliases => {
                if self.table_exists("match_participants").await? {
                    Predicate::ParticipantAliasMissing
                } else {
                    Predicate::AlwaysTrue
                }
            }
        };
        Ok(pred)
    }

    async fn participant_predicate(
        &self,
        cols: &'static [&'static str],
    ) -> DbResult<Predicate> {
        if !self.table_exists("match_participants").await? {
            return Ok(Predicate::AlwaysTrue);
        }
        for col in cols {
            if !self.column_exists("match_participants", col).await? {
                return Ok(Predicate::AlwaysTrue);
            }
        }
        Ok(Predicate::ParticipantColumnsNull(cols))
    }

    /// Find the matches still missing data for the requested categories,
    /// newest start time first.
    ///
    /// OR mode selects matches missing *any* requested category; AND mode
    /// only matches missing *all* of them. Each non-forced predicate is
    /// additionally guarded by "completion bit clear". A forced category
    /// contributes an unconditional true — note that in AND mode this
    /// makes the conjunction degenerate to the remaining predicates.
    ///
    /// Fails closed: a detection query error is logged and yields an empty
    /// list rather than aborting the run.
    pub async fn find_matches_missing_data(
        &self,
        xuid: Xuid,
        req: &DetectionRequest,
    ) -> DbResult<Vec<String>> {
        if req.selection.is_empty() {
            return Ok(Vec::new());
        }

        match self.detect(xuid, req).await {
            Ok(ids) => Ok(ids),
            Err(e) => {
                warn!("missing-data detection failed, selecting nothing: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn detect(&self, xuid: Xuid, req: &DetectionRequest) -> DbResult<Vec<String>> {
        let has_bitmask = self
            .column_exists("match_stats", "backfill_completed")
            .await?;

        let mut fragments = Vec::new();
        let mut xuid_binds = 0usize;
        for category in req.selection.requested() {
            let forced = req.selection.is_forced(category);
            let predicate = if forced {
                Predicate::AlwaysTrue
            } else {
                self.predicate_for(category).await?
            };
            let (sql, binds) = predicate.render();
            xuid_binds += binds;

            // Force always bypasses the bitmask and re-evaluates everything.
            let fragment = if has_bitmask && !forced {
                format!(
                    "(({sql}) AND (COALESCE(m.backfill_completed, 0) & {bit}) = 0)",
                    bit = category.bit()
                )
            } else {
                format!("({sql})")
            };
            fragments.push(fragment);
        }

        let combiner = match req.mode {
            DetectionMode::Or => " OR ",
            DetectionMode::And => " AND ",
        };
        let sql = format!(
            "SELECT m.match_id FROM match_stats m WHERE {} \
             ORDER BY m.start_time IS NULL, m.start_time DESC",
            fragments.join(combiner)
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql);
        for _ in 0..xuid_binds {
            query = query.bind(xuid);
        }
        let mut ids = query.fetch_all(self.pool()).await?;

        if let Some(cap) = req.max_matches {
            ids.truncate(cap);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_not_in_table() {
        let (sql, binds) = Predicate::NotInTable("medals_earned").render();
        assert_eq!(
            sql,
            "NOT EXISTS (SELECT 1 FROM medals_earned t WHERE t.match_id = m.match_id)"
        );
        assert_eq!(binds, 0);
    }

    #[test]
    fn render_xuid_scoped_predicate_binds_once() {
        let (sql, binds) = Predicate::XuidColumnNull {
            table: "player_match_stats",
            column: "enemy_mmr",
        }
        .render();
        assert!(sql.contains("s.xuid = ?"));
        assert_eq!(binds, 1);
    }

    #[test]
    fn render_asset_predicate_covers_all_four_pairs() {
        let (sql, _) = Predicate::AssetNameUnresolved.render();
        for (id, name) in ASSET_NAME_COLUMNS {
            assert!(sql.contains(&format!("m.{name} = m.{id}")));
        }
    }

    #[test]
    fn render_any_column_null() {
        let (sql, _) = Predicate::AnyColumnNull(&["shots_fired", "shots_hit"]).render();
        assert_eq!(sql, "(m.shots_fired IS NULL OR m.shots_hit IS NULL)");
    }
}
