// crates/backfill/src/citations.rs
//! Citation engine: evaluates the configurable mapping rules against one
//! match's medals, stats, and awards, storing only strictly-positive
//! values.

use std::collections::HashMap;

use spartan_ledger_core::{CitationDefinition, CitationKind, MatchStatFrame, Xuid};
use spartan_ledger_db::{Database, DbResult};
use tracing::{info, warn};

type CustomFn = fn(&MatchStatFrame, &HashMap<String, i64>) -> i64;

/// The fixed registry of custom citation functions. Mapping rows name
/// these by string; unknown names warn and evaluate to zero.
fn custom_fn(name: &str) -> Option<CustomFn> {
    match name {
        "near_perfect_accuracy" => Some(near_perfect_accuracy),
        "flawless_match" => Some(flawless_match),
        _ => None,
    }
}

fn near_perfect_accuracy(frame: &MatchStatFrame, _awards: &HashMap<String, i64>) -> i64 {
    match frame.accuracy {
        Some(acc) if acc >= 90.0 => 1,
        _ => 0,
    }
}

fn flawless_match(frame: &MatchStatFrame, _awards: &HashMap<String, i64>) -> i64 {
    if frame.deaths == 0 && frame.kills > 0 {
        1
    } else {
        0
    }
}

/// Evaluates citation mappings. The mapping table is loaded once at
/// construction and cached for the engine's lifetime.
pub struct CitationEngine {
    defs: Vec<CitationDefinition>,
}

impl CitationEngine {
    pub async fn load(db: &Database) -> DbResult<Self> {
        let defs = db.load_citation_definitions().await?;
        Ok(Self { defs })
    }

    pub fn definitions(&self) -> &[CitationDefinition] {
        &self.defs
    }

    /// Evaluate one mapping against loaded per-match data.
    fn compute(
        def: &CitationDefinition,
        medals: &HashMap<i64, i64>,
        frame: Option<&MatchStatFrame>,
        awards: &HashMap<String, i64>,
    ) -> i64 {
        match &def.kind {
            CitationKind::Medal { medal_id } => medals.get(medal_id).copied().unwrap_or(0),
            CitationKind::Stat { field } => {
                frame.and_then(|f| f.stat(field)).unwrap_or(0)
            }
            CitationKind::Award { award_name } => awards.get(award_name).copied().unwrap_or(0),
            CitationKind::Custom { function } => match custom_fn(function) {
                Some(f) => frame.map(|fr| f(fr, awards)).unwrap_or(0),
                None => {
                    warn!(
                        "citation '{}': unknown custom function '{function}'",
                        def.name
                    );
                    0
                }
            },
        }
    }

    /// Evaluate every cached mapping for one match, storing each
    /// strictly-positive value. Zero-valued citations are never persisted.
    /// Returns how many citations were stored.
    pub async fn compute_and_store_for_match(
        &self,
        db: &Database,
        match_id: &str,
        xuid: Xuid,
    ) -> DbResult<u64> {
        let medals = db.medal_counts(match_id).await?;
        let awards = db.award_counts(match_id, xuid).await?;
        let frame = db.get_stat_frame(match_id).await?;

        let mut stored = 0u64;
        for def in &self.defs {
            let value = Self::compute(def, &medals, frame.as_ref(), &awards);
            if value > 0 {
                db.store_citation(match_id, &def.name, value).await?;
                stored += 1;
            }
        }
        Ok(stored)
    }

    /// Compute citations for every match lacking them (incremental) or
    /// every match (force). A failure on one match is logged and the loop
    /// continues. Returns how many citations were stored in total.
    pub async fn backfill(&self, db: &Database, xuid: Xuid, force: bool) -> DbResult<u64> {
        let candidates = db.matches_missing_citations(force).await?;
        let mut computed = 0u64;
        for match_id in &candidates {
            match self.compute_and_store_for_match(db, match_id, xuid).await {
                Ok(n) => computed += n,
                Err(e) => warn!("match {match_id}: citation computation failed: {e}"),
            }
        }
        info!(
            "citations: {computed} values across {} matches",
            candidates.len()
        );
        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, kind: CitationKind) -> CitationDefinition {
        CitationDefinition {
            name: name.to_string(),
            display_name: name.to_string(),
            kind,
            enabled: true,
        }
    }

    #[test]
    fn medal_mapping_reads_zero_for_absent_medal() {
        let medals = HashMap::from([(42i64, 3i64)]);
        let awards = HashMap::new();

        let hit = def("x", CitationKind::Medal { medal_id: 42 });
        let miss = def("y", CitationKind::Medal { medal_id: 7 });
        assert_eq!(CitationEngine::compute(&hit, &medals, None, &awards), 3);
        assert_eq!(CitationEngine::compute(&miss, &medals, None, &awards), 0);
    }

    #[test]
    fn stat_mapping_coerces_missing_to_zero() {
        let frame = MatchStatFrame {
            kills: 12,
            ..Default::default()
        };
        let medals = HashMap::new();
        let awards = HashMap::new();

        let kills = def("k", CitationKind::Stat { field: "kills".into() });
        let bogus = def("b", CitationKind::Stat { field: "warp_factor".into() });
        assert_eq!(
            CitationEngine::compute(&kills, &medals, Some(&frame), &awards),
            12
        );
        assert_eq!(
            CitationEngine::compute(&bogus, &medals, Some(&frame), &awards),
            0
        );
        // No frame at all also reads as zero.
        assert_eq!(CitationEngine::compute(&kills, &medals, None, &awards), 0);
    }

    #[test]
    fn unknown_custom_function_yields_zero() {
        let frame = MatchStatFrame::default();
        let d = def("c", CitationKind::Custom { function: "not_registered".into() });
        assert_eq!(
            CitationEngine::compute(&d, &HashMap::new(), Some(&frame), &HashMap::new()),
            0
        );
    }

    #[test]
    fn custom_functions_evaluate_frames() {
        let awards = HashMap::new();
        let sharp = MatchStatFrame {
            accuracy: Some(92.5),
            kills: 10,
            deaths: 0,
            ..Default::default()
        };
        let ordinary = MatchStatFrame {
            accuracy: Some(40.0),
            kills: 5,
            deaths: 7,
            ..Default::default()
        };

        assert_eq!(near_perfect_accuracy(&sharp, &awards), 1);
        assert_eq!(near_perfect_accuracy(&ordinary, &awards), 0);
        assert_eq!(flawless_match(&sharp, &awards), 1);
        assert_eq!(flawless_match(&ordinary, &awards), 0);
    }
}
