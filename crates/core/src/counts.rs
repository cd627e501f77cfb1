// crates/core/src/counts.rs
//! Per-run counts record.
//!
//! One well-defined struct with named integer fields instead of a
//! dynamically-keyed counter map, so the per-run contract is statically
//! checkable. Fields start at zero and are only ever incremented within
//! one run.

use std::fmt;
use std::ops::AddAssign;

/// Aggregate result of one backfill run (or of a whole batch, via `+=`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillCounts {
    /// Total match rows in the store when detection ran.
    pub matches_checked: u64,
    /// Matches the detector selected as missing at least one (OR) or all
    /// (AND) requested categories.
    pub matches_missing_data: u64,
    pub medals_inserted: u64,
    pub events_inserted: u64,
    pub skill_inserted: u64,
    pub personal_scores_inserted: u64,
    pub performance_scores_inserted: u64,
    pub aliases_inserted: u64,
    pub accuracy_updated: u64,
    pub shots_updated: u64,
    pub enemy_mmr_updated: u64,
    pub assets_updated: u64,
    pub participants_inserted: u64,
    pub participants_scores_updated: u64,
    pub participants_kda_updated: u64,
    pub participants_shots_updated: u64,
    pub participants_damage_updated: u64,
    pub killer_victim_pairs_inserted: u64,
    pub end_time_updated: u64,
    pub sessions_updated: u64,
    pub citations_computed: u64,
}

impl AddAssign for BackfillCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.matches_checked += rhs.matches_checked;
        self.matches_missing_data += rhs.matches_missing_data;
        self.medals_inserted += rhs.medals_inserted;
        self.events_inserted += rhs.events_inserted;
        self.skill_inserted += rhs.skill_inserted;
        self.personal_scores_inserted += rhs.personal_scores_inserted;
        self.performance_scores_inserted += rhs.performance_scores_inserted;
        self.aliases_inserted += rhs.aliases_inserted;
        self.accuracy_updated += rhs.accuracy_updated;
        self.shots_updated += rhs.shots_updated;
        self.enemy_mmr_updated += rhs.enemy_mmr_updated;
        self.assets_updated += rhs.assets_updated;
        self.participants_inserted += rhs.participants_inserted;
        self.participants_scores_updated += rhs.participants_scores_updated;
        self.participants_kda_updated += rhs.participants_kda_updated;
        self.participants_shots_updated += rhs.participants_shots_updated;
        self.participants_damage_updated += rhs.participants_damage_updated;
        self.killer_victim_pairs_inserted += rhs.killer_victim_pairs_inserted;
        self.end_time_updated += rhs.end_time_updated;
        self.sessions_updated += rhs.sessions_updated;
        self.citations_computed += rhs.citations_computed;
    }
}

impl BackfillCounts {
    /// (name, value) pairs in a fixed display order.
    pub fn fields(&self) -> [(&'static str, u64); 21] {
        [
            ("matches_checked", self.matches_checked),
            ("matches_missing_data", self.matches_missing_data),
            ("medals_inserted", self.medals_inserted),
            ("events_inserted", self.events_inserted),
            ("skill_inserted", self.skill_inserted),
            ("personal_scores_inserted", self.personal_scores_inserted),
            (
                "performance_scores_inserted",
                self.performance_scores_inserted,
            ),
            ("aliases_inserted", self.aliases_inserted),
            ("accuracy_updated", self.accuracy_updated),
            ("shots_updated", self.shots_updated),
            ("enemy_mmr_updated", self.enemy_mmr_updated),
            ("assets_updated", self.assets_updated),
            ("participants_inserted", self.participants_inserted),
            ("participants_scores_updated", self.participants_scores_updated),
            ("participants_kda_updated", self.participants_kda_updated),
            ("participants_shots_updated", self.participants_shots_updated),
            ("participants_damage_updated", self.participants_damage_updated),
            (
                "killer_victim_pairs_inserted",
                self.killer_victim_pairs_inserted,
            ),
            ("end_time_updated", self.end_time_updated),
            ("sessions_updated", self.sessions_updated),
            ("citations_computed", self.citations_computed),
        ]
    }
}

impl fmt::Display for BackfillCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.fields() {
            writeln!(f, "  {name:<30} {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_is_all_zero() {
        let counts = BackfillCounts::default();
        assert!(counts.fields().iter().all(|(_, v)| *v == 0));
    }

    #[test]
    fn add_assign_sums_every_field() {
        let mut a = BackfillCounts {
            medals_inserted: 2,
            end_time_updated: 1,
            ..Default::default()
        };
        let b = BackfillCounts {
            medals_inserted: 3,
            citations_computed: 7,
            ..Default::default()
        };
        a += b;
        assert_eq!(a.medals_inserted, 5);
        assert_eq!(a.end_time_updated, 1);
        assert_eq!(a.citations_computed, 7);
    }

    #[test]
    fn display_lists_all_fields() {
        let rendered = BackfillCounts::default().to_string();
        assert_eq!(rendered.lines().count(), 21);
        assert!(rendered.contains("matches_checked"));
        assert!(rendered.contains("citations_computed"));
    }
}
