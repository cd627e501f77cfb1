// crates/backfill/src/client.rs
//! Stats-API collaborator: payload models and the client trait.
//!
//! The orchestrator only ever sees [`StatsClient`]; the concrete
//! rate-limited HTTP implementation lives in `http` and tests substitute
//! scripted clients.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use spartan_ledger_core::Xuid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Asset kinds the API can resolve to display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Playlist,
    Map,
    MapModePair,
    GameVariant,
}

impl AssetKind {
    pub const fn path_segment(self) -> &'static str {
        match self {
            AssetKind::Playlist => "playlists",
            AssetKind::Map => "maps",
            AssetKind::MapModePair => "map-mode-pairs",
            AssetKind::GameVariant => "game-variants",
        }
    }
}

/// An asset reference from a match payload. `name` is present when the
/// API already resolved it inline; otherwise a separate asset call is
/// needed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetRef {
    pub asset_id: String,
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedalPayload {
    pub medal_id: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwardPayload {
    pub name: String,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub score: i64,
}

/// One player's slice of a match payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerStatsPayload {
    pub xuid: Xuid,
    #[serde(default)]
    pub gamertag: Option<String>,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub outcome: Option<i64>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub kills: Option<i64>,
    #[serde(default)]
    pub deaths: Option<i64>,
    #[serde(default)]
    pub assists: Option<i64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub shots_fired: Option<i64>,
    #[serde(default)]
    pub shots_hit: Option<i64>,
    #[serde(default)]
    pub damage_dealt: Option<i64>,
    #[serde(default)]
    pub damage_taken: Option<i64>,
    #[serde(default)]
    pub medals: Vec<MedalPayload>,
    #[serde(default)]
    pub awards: Vec<AwardPayload>,
}

/// The full stats payload for one match. One fetch of this serves every
/// payload-derived category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchStatsPayload {
    pub match_id: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub playlist: Option<AssetRef>,
    #[serde(default)]
    pub map: Option<AssetRef>,
    #[serde(default)]
    pub map_mode_pair: Option<AssetRef>,
    #[serde(default)]
    pub game_variant: Option<AssetRef>,
    #[serde(default)]
    pub players: Vec<PlayerStatsPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HighlightEventPayload {
    pub event_type: String,
    pub time_ms: i64,
    #[serde(default)]
    pub xuid: Option<Xuid>,
    #[serde(default)]
    pub gamertag: Option<String>,
    #[serde(default)]
    pub type_hint: Option<String>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillEntry {
    pub xuid: Xuid,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub mmr: Option<f64>,
    #[serde(default)]
    pub mmr_variance: Option<f64>,
    #[serde(default)]
    pub team_mmr: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillPayload {
    #[serde(default)]
    pub entries: Vec<SkillEntry>,
}

/// The stats-API surface backfill consumes.
#[allow(async_fn_in_trait)]
pub trait StatsClient {
    async fn get_match_stats(&self, match_id: &str) -> Result<MatchStatsPayload, ClientError>;

    async fn get_highlight_events(
        &self,
        match_id: &str,
    ) -> Result<Vec<HighlightEventPayload>, ClientError>;

    async fn get_skill_stats(
        &self,
        match_id: &str,
        xuids: &[Xuid],
    ) -> Result<SkillPayload, ClientError>;

    /// Resolve an asset id to its display name. `Ok(None)` when the API
    /// does not know the asset.
    async fn get_asset(&self, kind: AssetKind, asset_id: &str)
        -> Result<Option<String>, ClientError>;
}
