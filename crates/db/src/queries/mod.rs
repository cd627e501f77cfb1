// crates/db/src/queries/mod.rs
// Store reads/writes, spread across one module per table group.

mod awards;
mod citations;
mod events;
mod matches;
mod medals;
mod participants;
mod skill;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Sqlite, Transaction};
use spartan_ledger_core::{
    AwardRow, HighlightEventRow, MedalRow, ParticipantRow, SkillRow, Xuid,
};

use crate::{Database, DbResult};

/// All of one match's backfill writes, applied in a single transaction.
///
/// Commit makes everything visible at once; dropping the writer without
/// committing (or calling [`rollback`](MatchWriter::rollback)) discards
/// it all, so a failure mid-match never leaves partial rows behind.
pub struct MatchWriter<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl Database {
    /// Begin the atomic write scope for one match's backfill.
    pub async fn begin_match_write(&self) -> DbResult<MatchWriter<'static>> {
        Ok(MatchWriter {
            tx: self.pool().begin().await?,
        })
    }
}

impl MatchWriter<'_> {
    pub async fn insert_medals(&mut self, rows: &[MedalRow]) -> DbResult<u64> {
        medals::insert_medals_on(&mut self.tx, rows).await
    }

    pub async fn insert_awards(&mut self, rows: &[AwardRow]) -> DbResult<u64> {
        awards::insert_awards_on(&mut self.tx, rows).await
    }

    pub async fn replace_highlight_events(
        &mut self,
        match_id: &str,
        rows: &[HighlightEventRow],
    ) -> DbResult<u64> {
        events::replace_highlight_events_on(&mut self.tx, match_id, rows).await
    }

    pub async fn upsert_skill(&mut self, rows: &[SkillRow]) -> DbResult<u64> {
        skill::upsert_skill_on(&mut self.tx, rows).await
    }

    pub async fn update_enemy_mmr(
        &mut self,
        match_id: &str,
        xuid: Xuid,
        enemy_mmr: f64,
    ) -> DbResult<()> {
        skill::update_enemy_mmr_on(&mut self.tx, match_id, xuid, enemy_mmr).await
    }

    pub async fn upsert_participants(&mut self, rows: &[ParticipantRow]) -> DbResult<u64> {
        participants::upsert_participants_on(&mut self.tx, rows).await
    }

    pub async fn update_participant_scores(
        &mut self,
        match_id: &str,
        xuid: Xuid,
        rank: Option<i64>,
        score: Option<i64>,
    ) -> DbResult<bool> {
        participants::update_participant_scores_on(&mut self.tx, match_id, xuid, rank, score).await
    }

    pub async fn update_participant_kda(
        &mut self,
        match_id: &str,
        xuid: Xuid,
        kills: Option<i64>,
        deaths: Option<i64>,
        assists: Option<i64>,
    ) -> DbResult<bool> {
        participants::update_participant_kda_on(&mut self.tx, match_id, xuid, kills, deaths, assists)
            .await
    }

    pub async fn update_participant_shots(
        &mut self,
        match_id: &str,
        xuid: Xuid,
        shots_fired: Option<i64>,
        shots_hit: Option<i64>,
    ) -> DbResult<bool> {
        participants::update_participant_shots_on(&mut self.tx, match_id, xuid, shots_fired, shots_hit)
            .await
    }

    pub async fn update_participant_damage(
        &mut self,
        match_id: &str,
        xuid: Xuid,
        damage_dealt: Option<i64>,
        damage_taken: Option<i64>,
    ) -> DbResult<bool> {
        participants::update_participant_damage_on(
            &mut self.tx,
            match_id,
            xuid,
            damage_dealt,
            damage_taken,
        )
        .await
    }

    pub async fn upsert_alias(&mut self, xuid: Xuid, gamertag: &str) -> DbResult<bool> {
        participants::upsert_alias_on(&mut self.tx, xuid, gamertag).await
    }

    /// All participant XUIDs for one match. Read through the transaction
    /// so it sees this match's own uncommitted participant rows.
    pub async fn participant_xuids(&mut self, match_id: &str) -> DbResult<Vec<Xuid>> {
        participants::participant_xuids_on(&mut self.tx, match_id).await
    }

    pub async fn update_accuracy(&mut self, match_id: &str, accuracy: f64) -> DbResult<bool> {
        matches::update_accuracy_on(&mut self.tx, match_id, accuracy).await
    }

    pub async fn update_shots(
        &mut self,
        match_id: &str,
        shots_fired: i64,
        shots_hit: i64,
        damage_dealt: Option<i64>,
        damage_taken: Option<i64>,
    ) -> DbResult<bool> {
        matches::update_shots_on(&mut self.tx, match_id, shots_fired, shots_hit, damage_dealt, damage_taken)
            .await
    }

    pub async fn update_asset_names(
        &mut self,
        match_id: &str,
        playlist_name: Option<&str>,
        map_name: Option<&str>,
        map_mode_pair_name: Option<&str>,
        game_variant_name: Option<&str>,
    ) -> DbResult<bool> {
        matches::update_asset_names_on(
            &mut self.tx,
            match_id,
            playlist_name,
            map_name,
            map_mode_pair_name,
            game_variant_name,
        )
        .await
    }

    pub async fn mark_backfill_completed(&mut self, match_id: &str, mask: i64) -> DbResult<()> {
        matches::mark_backfill_completed_on(&mut self.tx, match_id, mask).await
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Encode a timestamp as RFC 3339 UTC text ("2024-01-15T10:00:00Z").
/// A single uniform format keeps SQLite's lexicographic TEXT ordering
/// chronological.
pub(crate) fn encode_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Decode an RFC 3339 timestamp column; malformed text reads as NULL.
pub(crate) fn decode_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_round_trip() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let encoded = encode_ts(Some(t));
        assert_eq!(encoded.as_deref(), Some("2024-01-15T10:00:00Z"));
        assert_eq!(decode_ts(encoded), Some(t));
        assert_eq!(decode_ts(Some("garbage".into())), None);
        assert_eq!(encode_ts(None), None);
    }
}
