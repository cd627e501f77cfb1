// crates/core/src/categories.rs
//! Backfill data categories and the completion-bitmask math.
//!
//! Each category owns one fixed power-of-two bit in the per-match
//! `backfill_completed` column. A set bit means "the backfill attempt for
//! this category ran to completion for this match" — it is a don't-retry
//! flag, never a guarantee that data was found.

use std::fmt;
use std::str::FromStr;

/// A backfillable data category. Bit values are fixed by declaration order
/// and must never be reordered: they are persisted in every player store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataCategory {
    Medals = 0,
    Events,
    Skill,
    PersonalScores,
    PerformanceScores,
    Accuracy,
    Shots,
    EnemyMmr,
    Assets,
    Participants,
    ParticipantsScores,
    ParticipantsKda,
    ParticipantsShots,
    ParticipantsDamage,
    Aliases,
}

impl DataCategory {
    pub const ALL: [DataCategory; 15] = [
        DataCategory::Medals,
        DataCategory::Events,
        DataCategory::Skill,
        DataCategory::PersonalScores,
        DataCategory::PerformanceScores,
        DataCategory::Accuracy,
        DataCategory::Shots,
        DataCategory::EnemyMmr,
        DataCategory::Assets,
        DataCategory::Participants,
        DataCategory::ParticipantsScores,
        DataCategory::ParticipantsKda,
        DataCategory::ParticipantsShots,
        DataCategory::ParticipantsDamage,
        DataCategory::Aliases,
    ];

    /// The completion-bitmask bit for this category.
    pub const fn bit(self) -> i64 {
        1 << (self as u8)
    }

    /// Stable snake_case name, used in the CLI and in log output.
    pub const fn name(self) -> &'static str {
        match self {
            DataCategory::Medals => "medals",
            DataCategory::Events => "events",
            DataCategory::Skill => "skill",
            DataCategory::PersonalScores => "personal_scores",
            DataCategory::PerformanceScores => "performance_scores",
            DataCategory::Accuracy => "accuracy",
            DataCategory::Shots => "shots",
            DataCategory::EnemyMmr => "enemy_mmr",
            DataCategory::Assets => "assets",
            DataCategory::Participants => "participants",
            DataCategory::ParticipantsScores => "participants_scores",
            DataCategory::ParticipantsKda => "participants_kda",
            DataCategory::ParticipantsShots => "participants_shots",
            DataCategory::ParticipantsDamage => "participants_damage",
            DataCategory::Aliases => "aliases",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataCategory::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown data category: {s}"))
    }
}

/// OR together the bits for the given categories. Pure and
/// order-independent; duplicates are harmless.
pub fn compute_backfill_mask(categories: &[DataCategory]) -> i64 {
    categories.iter().fold(0, |mask, c| mask | c.bit())
}

/// How per-category predicates combine in the missing-data detector.
///
/// `Or` selects matches missing *any* requested category (broad net,
/// maximizes coverage per pass). `And` selects matches missing *all* of
/// them (narrow pass that avoids reprocessing partially-complete matches).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    #[default]
    Or,
    And,
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "or" => Ok(DetectionMode::Or),
            "and" => Ok(DetectionMode::And),
            other => Err(format!("detection mode must be 'or' or 'and', got {other}")),
        }
    }
}

/// Which categories a run requests, and which of those are forced.
///
/// A forced category bypasses both the completion bitmask and the
/// underlying NULL/absence checks: every match is re-selected for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySelection {
    requested: i64,
    forced: i64,
}

impl CategorySelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every category (no forces).
    pub fn all() -> Self {
        Self {
            requested: compute_backfill_mask(&DataCategory::ALL),
            forced: 0,
        }
    }

    pub fn request(mut self, category: DataCategory) -> Self {
        self.requested |= category.bit();
        self
    }

    /// Force implies request.
    pub fn force(mut self, category: DataCategory) -> Self {
        self.requested |= category.bit();
        self.forced |= category.bit();
        self
    }

    pub fn is_requested(&self, category: DataCategory) -> bool {
        self.requested & category.bit() != 0
    }

    pub fn is_forced(&self, category: DataCategory) -> bool {
        self.forced & category.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.requested == 0
    }

    /// Requested categories in declaration order.
    pub fn requested(&self) -> impl Iterator<Item = DataCategory> + '_ {
        DataCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.is_requested(*c))
    }

    /// True when any category that needs the stats API is requested.
    /// (PerformanceScores is derived locally from already-stored rows.)
    pub fn any_api_backed(&self) -> bool {
        self.requested()
            .any(|c| c != DataCategory::PerformanceScores)
    }
}
