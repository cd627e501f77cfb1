// crates/core/src/rows.rs
//! Row structs for the per-player store.
//!
//! These mirror the persisted schema column-for-column; the db crate binds
//! them directly. Optional fields stay `Option` because they arrive from
//! different API calls at different backfill stages.

use chrono::{DateTime, Utc};

use crate::Xuid;

/// One row in `match_stats`. Created by the initial sync with the minimal
/// columns filled; densified by backfill (columns are filled in, never
/// removed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchRow {
    pub match_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub end_time: Option<DateTime<Utc>>,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub accuracy: Option<f64>,
    pub shots_fired: Option<i64>,
    pub shots_hit: Option<i64>,
    pub damage_dealt: Option<i64>,
    pub damage_taken: Option<i64>,
    pub playlist_id: Option<String>,
    pub playlist_name: Option<String>,
    pub map_id: Option<String>,
    pub map_name: Option<String>,
    pub map_mode_pair_id: Option<String>,
    pub map_mode_pair_name: Option<String>,
    pub game_variant_id: Option<String>,
    pub game_variant_name: Option<String>,
    pub performance_score: Option<f64>,
    pub backfill_completed: i64,
}

/// The numeric slice of a match row used by relative scoring and by
/// stat-mapped citations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchStatFrame {
    pub match_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub accuracy: Option<f64>,
    pub shots_fired: Option<i64>,
    pub shots_hit: Option<i64>,
    pub damage_dealt: Option<i64>,
    pub damage_taken: Option<i64>,
    pub performance_score: Option<f64>,
}

impl MatchStatFrame {
    /// Look a stat up by its column name. Returns `None` for unknown names
    /// so stat-mapped citations can coerce to zero.
    pub fn stat(&self, name: &str) -> Option<i64> {
        match name {
            "kills" => Some(self.kills),
            "deaths" => Some(self.deaths),
            "assists" => Some(self.assists),
            "accuracy" => self.accuracy.map(|a| a.round() as i64),
            "shots_fired" => self.shots_fired,
            "shots_hit" => self.shots_hit,
            "damage_dealt" => self.damage_dealt,
            "damage_taken" => self.damage_taken,
            _ => None,
        }
    }
}

/// One row in `medals_earned`. `medal_id` is 64-bit: upstream medal name
/// ids overflowed 32 bits, which is what the widening migration repairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedalRow {
    pub match_id: String,
    pub medal_id: i64,
    pub count: i64,
}

/// One row in `highlight_events`. Ordered within a match by `time_ms`;
/// there is no cross-match ordering guarantee.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightEventRow {
    pub match_id: String,
    pub event_type: String,
    pub time_ms: i64,
    pub xuid: Option<Xuid>,
    pub gamertag: Option<String>,
    pub type_hint: Option<String>,
    pub raw_json: serde_json::Value,
}

/// One row in `match_participants`. The detail columns are NULL until the
/// corresponding participant-detail backfill stage runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticipantRow {
    pub match_id: String,
    pub xuid: Xuid,
    pub team_id: Option<i64>,
    pub outcome: Option<i64>,
    pub gamertag: Option<String>,
    pub rank: Option<i64>,
    pub score: Option<i64>,
    pub kills: Option<i64>,
    pub deaths: Option<i64>,
    pub assists: Option<i64>,
    pub shots_fired: Option<i64>,
    pub shots_hit: Option<i64>,
    pub damage_dealt: Option<i64>,
    pub damage_taken: Option<i64>,
}

/// One row in `player_match_stats`. `enemy_mmr` is derived from the skill
/// payload of the opposing team and is scoped to one XUID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkillRow {
    pub match_id: String,
    pub xuid: Xuid,
    pub mmr: Option<f64>,
    pub mmr_variance: Option<f64>,
    pub team_mmr: Option<f64>,
    pub enemy_mmr: Option<f64>,
}

/// One row in `personal_score_awards`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardRow {
    pub match_id: String,
    pub xuid: Xuid,
    pub award_name: String,
    pub count: i64,
    pub score: i64,
}

/// A kill-feed event extracted from `highlight_events`, the pairing
/// algorithm's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillFeedEvent {
    pub kind: KillFeedKind,
    pub time_ms: i64,
    pub xuid: Xuid,
    pub gamertag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillFeedKind {
    Kill,
    Death,
}

/// A paired kill: derived, rebuildable, not a source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillerVictimPair {
    pub killer_xuid: Xuid,
    pub killer_gamertag: String,
    pub victim_xuid: Xuid,
    pub victim_gamertag: String,
    pub time_ms: i64,
}

/// Reference data: one configurable citation mapping rule.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationDefinition {
    pub name: String,
    pub display_name: String,
    pub kind: CitationKind,
    pub enabled: bool,
}

/// Mapping type plus its type-specific parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum CitationKind {
    /// Medal-count lookup by medal id (0 if the medal is absent).
    Medal { medal_id: i64 },
    /// Named stat field coerced to integer (0 on missing/invalid).
    Stat { field: String },
    /// Award-count lookup by award name.
    Award { award_name: String },
    /// Named function from the fixed custom registry.
    Custom { function: String },
}

impl CitationKind {
    pub const fn kind_name(&self) -> &'static str {
        match self {
            CitationKind::Medal { .. } => "medal",
            CitationKind::Stat { .. } => "stat",
            CitationKind::Award { .. } => "award",
            CitationKind::Custom { .. } => "custom",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_lookup_known_and_unknown() {
        let frame = MatchStatFrame {
            kills: 12,
            accuracy: Some(48.6),
            ..Default::default()
        };
        assert_eq!(frame.stat("kills"), Some(12));
        assert_eq!(frame.stat("accuracy"), Some(49));
        assert_eq!(frame.stat("shots_fired"), None);
        assert_eq!(frame.stat("not_a_stat"), None);
    }
}
