// crates/backfill/src/orchestrator.rs
//! Per-player backfill orchestration.
//!
//! One run: resolve the player's XUID, apply the schema migrations the
//! requested categories need, detect matches with missing data, fetch and
//! write per match (marking completion bits), then run the local-only
//! derivations. A failure on one match is logged and skipped; the match
//! stays unmarked and is retried on the next run.

use std::path::Path;

use spartan_ledger_core::{
    compute_backfill_mask, AwardRow, BackfillCounts, CategorySelection, DataCategory,
    DetectionMode, HighlightEventRow, MedalRow, ParticipantRow, SkillRow, Xuid,
};
use spartan_ledger_db::{Database, DbError, DetectionRequest, MatchWriter};
use thiserror::Error;
use tracing::{info, warn};

use crate::citations::CitationEngine;
use crate::client::{
    AssetKind, AssetRef, ClientError, MatchStatsPayload, PlayerStatsPayload, SkillPayload,
    StatsClient,
};
use crate::strategies::{self, PercentileScorer, ToleranceWindowPairer};

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("could not resolve a XUID for gamertag '{0}'")]
    UnknownPlayer(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// One per-player run's inputs.
#[derive(Debug, Clone, Default)]
pub struct BackfillRequest {
    pub gamertag: String,
    pub dry_run: bool,
    pub max_matches: Option<usize>,
    pub mode: DetectionMode,
    pub selection: CategorySelection,

    // Local-only derivations (not bitmask categories).
    pub run_killer_victim: bool,
    /// Drop and rebuild the derived pairs table instead of extending it.
    pub rebuild_killer_victim: bool,
    pub run_end_time: bool,
    pub force_end_time: bool,
    pub run_sessions: bool,
    pub force_sessions: bool,
    pub run_citations: bool,
    /// Recompute citations for every match, not just uncited ones.
    pub recompute_citations: bool,
}

impl BackfillRequest {
    fn any_local(&self) -> bool {
        self.run_killer_victim || self.run_end_time || self.run_sessions || self.run_citations
    }
}

/// Run one player's backfill. Counts accumulated before a fatal error are
/// lost with it; per-match and per-strategy failures are absorbed here and
/// never surface as `Err`.
pub async fn run_backfill<C: StatsClient>(
    db: &Database,
    client: &C,
    req: &BackfillRequest,
) -> Result<BackfillCounts, BackfillError> {
    let mut counts = BackfillCounts::default();

    let xuid = resolve_xuid(db, &req.gamertag).await?;
    info!("backfill for '{}' (xuid {xuid})", req.gamertag);

    apply_migrations(db, req).await;

    let detection = DetectionRequest {
        mode: req.mode,
        selection: req.selection,
        max_matches: req.max_matches,
    };
    let missing = db.find_matches_missing_data(xuid, &detection).await?;
    counts.matches_checked = db.count_matches().await?;
    counts.matches_missing_data = missing.len() as u64;

    if req.dry_run {
        info!(
            "dry run: {} of {} matches missing data, writing nothing",
            missing.len(),
            counts.matches_checked
        );
        return Ok(counts);
    }

    if req.selection.any_api_backed() && !missing.is_empty() {
        for match_id in &missing {
            if let Err(e) = process_match(db, client, xuid, match_id, &req.selection, &mut counts)
                .await
            {
                warn!("match {match_id}: backfill failed, will retry next run: {e}");
            }
        }
    } else if missing.is_empty() && !req.any_local()
        && !req.selection.is_requested(DataCategory::PerformanceScores)
    {
        info!("nothing missing and no local derivations requested");
        return Ok(counts);
    }

    run_local_pass(db, xuid, req, &mut counts).await;

    Ok(counts)
}

/// Run every known player store under `dir` through `run_backfill`,
/// summing counts. One player's failure is logged and never aborts the
/// batch.
pub async fn backfill_all_players<C: StatsClient>(
    dir: &Path,
    client: &C,
    template: &BackfillRequest,
) -> BackfillCounts {
    let mut totals = BackfillCounts::default();

    let stores = match spartan_ledger_db::list_player_stores(dir) {
        Ok(stores) => stores,
        Err(e) => {
            warn!("could not list player stores in {}: {e}", dir.display());
            return totals;
        }
    };
    info!("batch backfill across {} player stores", stores.len());

    for (gamertag, path) in stores {
        let db = match Database::new(&path).await {
            Ok(db) => db,
            Err(e) => {
                warn!("skipping '{gamertag}': could not open store: {e}");
                continue;
            }
        };
        let req = BackfillRequest {
            gamertag: gamertag.clone(),
            ..template.clone()
        };
        match run_backfill(&db, client, &req).await {
            Ok(counts) => totals += counts,
            Err(e) => warn!("skipping '{gamertag}': {e}"),
        }
    }
    totals
}

/// Gamertag → XUID: alias table first, then a case-insensitive scan of
/// the player's own event history.
async fn resolve_xuid(db: &Database, gamertag: &str) -> Result<Xuid, BackfillError> {
    if let Some(xuid) = db.resolve_alias(gamertag).await? {
        return Ok(xuid);
    }
    if let Some(xuid) = db.find_xuid_in_events(gamertag).await? {
        info!("resolved '{gamertag}' to xuid {xuid} via event history");
        return Ok(xuid);
    }
    Err(BackfillError::UnknownPlayer(gamertag.to_string()))
}

/// Apply only the schema migrations this run's categories need. Failures
/// are logged and swallowed; a truly-missing column fails loudly at the
/// next write instead.
async fn apply_migrations(db: &Database, req: &BackfillRequest) {
    use DataCategory::*;

    fn swallow<T>(what: &str, result: Result<T, DbError>) {
        if let Err(e) = result {
            warn!("schema migration '{what}' failed, continuing: {e}");
        }
    }

    let sel = &req.selection;
    if !sel.is_empty() {
        swallow("backfill column", db.ensure_backfill_column().await);
    }
    let needs_stat_columns = [Accuracy, Shots, Assets, PerformanceScores]
        .iter()
        .any(|c| sel.is_requested(*c))
        || req.run_end_time
        // Citations read the stat frame, which spans backfilled columns.
        || req.run_citations;
    if needs_stat_columns {
        swallow("stat columns", db.ensure_stat_columns().await);
    }
    let needs_participant_columns = [
        ParticipantsScores,
        ParticipantsKda,
        ParticipantsShots,
        ParticipantsDamage,
    ]
    .iter()
    .any(|c| sel.is_requested(*c));
    if needs_participant_columns {
        swallow("participant columns", db.ensure_participant_columns().await);
    }
    if sel.is_requested(Medals) {
        swallow("medal id widening", db.widen_medal_id_column().await);
    }
    if req.run_sessions {
        swallow("session column", db.ensure_session_column().await);
    }
}

/// Fetch and write everything the selection requests for one match, then
/// OR the completed categories into its bitmask in a single update.
///
/// Completion bits record that the attempt ran, not that data was found:
/// a fetched payload without the target player still marks the payload
/// categories done. Secondary fetches (events, skill, assets) fail softly
/// so one bad endpoint doesn't discard the rest of the match's progress.
///
/// All writes go through one [`MatchWriter`] transaction, committed after
/// the bitmask update: a crash or error mid-match rolls the whole match
/// back, so the store never holds rows for a match whose bits are unset.
async fn process_match<C: StatsClient>(
    db: &Database,
    client: &C,
    xuid: Xuid,
    match_id: &str,
    sel: &CategorySelection,
    counts: &mut BackfillCounts,
) -> Result<(), BackfillError> {
    use DataCategory::*;

    let mut completed: Vec<DataCategory> = Vec::new();
    // Accumulated locally and merged only after commit, so a rolled-back
    // match contributes nothing.
    let mut delta = BackfillCounts::default();

    let payload_backed = [
        Medals,
        PersonalScores,
        Accuracy,
        Shots,
        Assets,
        Participants,
        ParticipantsScores,
        ParticipantsKda,
        ParticipantsShots,
        ParticipantsDamage,
        Aliases,
        Skill,
        EnemyMmr,
    ];
    let needs_payload = payload_backed.iter().any(|c| sel.is_requested(*c));

    // Fetch before opening the transaction; network waits hold no locks.
    let payload = if needs_payload {
        Some(client.get_match_stats(match_id).await?)
    } else {
        None
    };

    let mut w = db.begin_match_write().await?;

    if let Some(payload) = &payload {
        let target = payload.players.iter().find(|p| p.xuid == xuid);

        if sel.is_requested(Medals) {
            if let Some(t) = target {
                let rows: Vec<MedalRow> = t
                    .medals
                    .iter()
                    .map(|m| MedalRow {
                        match_id: match_id.to_string(),
                        medal_id: m.medal_id,
                        count: m.count,
                    })
                    .collect();
                delta.medals_inserted += w.insert_medals(&rows).await?;
            }
            completed.push(Medals);
        }

        if sel.is_requested(PersonalScores) {
            if let Some(t) = target {
                let rows: Vec<AwardRow> = t
                    .awards
                    .iter()
                    .map(|a| AwardRow {
                        match_id: match_id.to_string(),
                        xuid,
                        award_name: a.name.clone(),
                        count: a.count,
                        score: a.score,
                    })
                    .collect();
                delta.personal_scores_inserted += w.insert_awards(&rows).await?;
            }
            completed.push(PersonalScores);
        }

        if sel.is_requested(Accuracy) {
            if let Some(accuracy) = target.and_then(accuracy_of) {
                if w.update_accuracy(match_id, accuracy).await? {
                    delta.accuracy_updated += 1;
                }
            }
            completed.push(Accuracy);
        }

        if sel.is_requested(Shots) {
            if let Some(t) = target {
                if let (Some(fired), Some(hit)) = (t.shots_fired, t.shots_hit) {
                    if w
                        .update_shots(match_id, fired, hit, t.damage_dealt, t.damage_taken)
                        .await?
                    {
                        delta.shots_updated += 1;
                    }
                }
            }
            completed.push(Shots);
        }

        if sel.is_requested(Participants) {
            let rows: Vec<ParticipantRow> = payload
                .players
                .iter()
                .map(|p| ParticipantRow {
                    match_id: match_id.to_string(),
                    xuid: p.xuid,
                    team_id: p.team_id,
                    outcome: p.outcome,
                    gamertag: p.gamertag.clone(),
                    ..Default::default()
                })
                .collect();
            delta.participants_inserted += w.upsert_participants(&rows).await?;
            completed.push(Participants);
        }

        if sel.is_requested(ParticipantsScores) {
            for p in &payload.players {
                if w
                    .update_participant_scores(match_id, p.xuid, p.rank, p.score)
                    .await?
                {
                    delta.participants_scores_updated += 1;
                }
            }
            completed.push(ParticipantsScores);
        }

        if sel.is_requested(ParticipantsKda) {
            for p in &payload.players {
                if w
                    .update_participant_kda(match_id, p.xuid, p.kills, p.deaths, p.assists)
                    .await?
                {
                    delta.participants_kda_updated += 1;
                }
            }
            completed.push(ParticipantsKda);
        }

        if sel.is_requested(ParticipantsShots) {
            for p in &payload.players {
                if w
                    .update_participant_shots(match_id, p.xuid, p.shots_fired, p.shots_hit)
                    .await?
                {
                    delta.participants_shots_updated += 1;
                }
            }
            completed.push(ParticipantsShots);
        }

        if sel.is_requested(ParticipantsDamage) {
            for p in &payload.players {
                if w
                    .update_participant_damage(match_id, p.xuid, p.damage_dealt, p.damage_taken)
                    .await?
                {
                    delta.participants_damage_updated += 1;
                }
            }
            completed.push(ParticipantsDamage);
        }

        if sel.is_requested(Aliases) {
            for p in &payload.players {
                if let Some(gamertag) = &p.gamertag {
                    if w.upsert_alias(p.xuid, gamertag).await? {
                        delta.aliases_inserted += 1;
                    }
                }
            }
            completed.push(Aliases);
        }

        if sel.is_requested(Assets) {
            match resolve_assets(&mut w, client, match_id, payload).await {
                Ok(updated) => {
                    if updated {
                        delta.assets_updated += 1;
                    }
                    completed.push(Assets);
                }
                Err(e) => warn!("match {match_id}: asset resolution failed: {e}"),
            }
        }

        if sel.is_requested(Skill) || sel.is_requested(EnemyMmr) {
            let mut xuids: Vec<Xuid> = payload.players.iter().map(|p| p.xuid).collect();
            if xuids.is_empty() {
                // Degraded payload; fall back to stored participant rows.
                xuids = w.participant_xuids(match_id).await?;
            }
            if xuids.is_empty() {
                warn!("match {match_id}: no participant XUIDs known, skipping skill fetch");
            } else {
                match client.get_skill_stats(match_id, &xuids).await {
                    Ok(skill) => {
                        if sel.is_requested(Skill) {
                            let rows: Vec<SkillRow> = skill
                                .entries
                                .iter()
                                .map(|e| SkillRow {
                                    match_id: match_id.to_string(),
                                    xuid: e.xuid,
                                    mmr: e.mmr,
                                    mmr_variance: e.mmr_variance,
                                    team_mmr: e.team_mmr,
                                    enemy_mmr: None,
                                })
                                .collect();
                            delta.skill_inserted += w.upsert_skill(&rows).await?;
                            completed.push(Skill);
                        }
                        if sel.is_requested(EnemyMmr) {
                            if let Some(enemy_mmr) = enemy_mmr_of(xuid, target, &skill) {
                                w.update_enemy_mmr(match_id, xuid, enemy_mmr).await?;
                                delta.enemy_mmr_updated += 1;
                            }
                            completed.push(EnemyMmr);
                        }
                    }
                    Err(e) => warn!("match {match_id}: skill fetch failed: {e}"),
                }
            }
        }
    }

    if sel.is_requested(Events) {
        match client.get_highlight_events(match_id).await {
            Ok(events) => {
                let rows: Vec<HighlightEventRow> = events
                    .into_iter()
                    .map(|e| HighlightEventRow {
                        match_id: match_id.to_string(),
                        event_type: e.event_type,
                        time_ms: e.time_ms,
                        xuid: e.xuid,
                        gamertag: e.gamertag,
                        type_hint: e.type_hint,
                        raw_json: e.raw,
                    })
                    .collect();
                delta.events_inserted += w.replace_highlight_events(match_id, &rows).await?;
                completed.push(Events);
            }
            Err(e) => warn!("match {match_id}: event fetch failed: {e}"),
        }
    }

    if !completed.is_empty() {
        w.mark_backfill_completed(match_id, compute_backfill_mask(&completed))
            .await?;
    }
    w.commit().await?;
    *counts += delta;
    Ok(())
}

/// Local-only derivations. Each strategy's failure is logged and the next
/// strategy still runs.
async fn run_local_pass(
    db: &Database,
    xuid: Xuid,
    req: &BackfillRequest,
    counts: &mut BackfillCounts,
) {
    if req.selection.is_requested(DataCategory::PerformanceScores) {
        match strategies::backfill_performance_scores(db, &PercentileScorer).await {
            Ok(n) => counts.performance_scores_inserted += n,
            Err(e) => warn!("performance scoring failed: {e}"),
        }
    }

    if req.run_killer_victim {
        let pairer = ToleranceWindowPairer::default();
        match strategies::backfill_killer_victim_pairs(db, &pairer, req.rebuild_killer_victim)
            .await
        {
            Ok(n) => counts.killer_victim_pairs_inserted += n,
            Err(e) => warn!("killer/victim pairing failed: {e}"),
        }
    }

    if req.run_end_time {
        match strategies::backfill_end_time(db, req.force_end_time).await {
            Ok(n) => counts.end_time_updated += n,
            Err(e) => warn!("end-time derivation failed: {e}"),
        }
    }

    if req.run_sessions {
        match strategies::backfill_sessions(db, req.force_sessions).await {
            Ok(n) => counts.sessions_updated += n,
            Err(e) => warn!("session bucketing failed: {e}"),
        }
    }

    if req.run_citations {
        match CitationEngine::load(db).await {
            Ok(engine) => match engine.backfill(db, xuid, req.recompute_citations).await {
                Ok(n) => counts.citations_computed += n,
                Err(e) => warn!("citation backfill failed: {e}"),
            },
            Err(e) => warn!("could not load citation definitions: {e}"),
        }
    }
}

/// Accuracy from the payload, falling back to shots when the API omits
/// the precomputed value.
fn accuracy_of(p: &PlayerStatsPayload) -> Option<f64> {
    p.accuracy.or(match (p.shots_fired, p.shots_hit) {
        (Some(fired), Some(hit)) if fired > 0 => Some(hit as f64 / fired as f64 * 100.0),
        _ => None,
    })
}

/// Mean MMR of the players on teams other than the target's.
fn enemy_mmr_of(
    xuid: Xuid,
    target: Option<&PlayerStatsPayload>,
    skill: &SkillPayload,
) -> Option<f64> {
    let own_team = target
        .and_then(|t| t.team_id)
        .or_else(|| skill.entries.iter().find(|e| e.xuid == xuid)?.team_id)?;

    let enemy_mmrs: Vec<f64> = skill
        .entries
        .iter()
        .filter(|e| e.team_id.is_some_and(|t| t != own_team))
        .filter_map(|e| e.mmr)
        .collect();
    if enemy_mmrs.is_empty() {
        return None;
    }
    Some(enemy_mmrs.iter().sum::<f64>() / enemy_mmrs.len() as f64)
}

async fn resolve_assets<C: StatsClient>(
    w: &mut MatchWriter<'_>,
    client: &C,
    match_id: &str,
    payload: &MatchStatsPayload,
) -> Result<bool, BackfillError> {
    let playlist = resolve_one(client, AssetKind::Playlist, payload.playlist.as_ref()).await?;
    let map = resolve_one(client, AssetKind::Map, payload.map.as_ref()).await?;
    let pair = resolve_one(client, AssetKind::MapModePair, payload.map_mode_pair.as_ref()).await?;
    let variant = resolve_one(client, AssetKind::GameVariant, payload.game_variant.as_ref()).await?;

    if [&playlist, &map, &pair, &variant].iter().all(|n| n.is_none()) {
        return Ok(false);
    }
    Ok(w
        .update_asset_names(
            match_id,
            playlist.as_deref(),
            map.as_deref(),
            pair.as_deref(),
            variant.as_deref(),
        )
        .await?)
}

async fn resolve_one<C: StatsClient>(
    client: &C,
    kind: AssetKind,
    asset: Option<&AssetRef>,
) -> Result<Option<String>, ClientError> {
    let Some(asset) = asset else {
        return Ok(None);
    };
    if let Some(name) = &asset.name {
        return Ok(Some(name.clone()));
    }
    client.get_asset(kind, &asset.asset_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SkillEntry;

    fn entry(xuid: Xuid, team: i64, mmr: f64) -> SkillEntry {
        SkillEntry {
            xuid,
            team_id: Some(team),
            mmr: Some(mmr),
            ..Default::default()
        }
    }

    #[test]
    fn enemy_mmr_averages_the_other_team() {
        let skill = SkillPayload {
            entries: vec![
                entry(1, 0, 1500.0),
                entry(2, 0, 1400.0),
                entry(3, 1, 1200.0),
                entry(4, 1, 1300.0),
            ],
        };
        assert_eq!(enemy_mmr_of(1, None, &skill), Some(1250.0));
        assert_eq!(enemy_mmr_of(3, None, &skill), Some(1450.0));
    }

    #[test]
    fn enemy_mmr_needs_team_information() {
        let skill = SkillPayload {
            entries: vec![entry(1, 0, 1500.0)],
        };
        // Unknown player, no team to oppose.
        assert_eq!(enemy_mmr_of(99, None, &skill), None);
        // Known player but no opponents with MMR.
        assert_eq!(enemy_mmr_of(1, None, &skill), None);
    }

    #[test]
    fn accuracy_falls_back_to_shot_ratio() {
        let direct = PlayerStatsPayload {
            accuracy: Some(51.5),
            ..Default::default()
        };
        assert_eq!(accuracy_of(&direct), Some(51.5));

        let derived = PlayerStatsPayload {
            shots_fired: Some(200),
            shots_hit: Some(90),
            ..Default::default()
        };
        assert_eq!(accuracy_of(&derived), Some(45.0));

        let empty = PlayerStatsPayload {
            shots_fired: Some(0),
            shots_hit: Some(0),
            ..Default::default()
        };
        assert_eq!(accuracy_of(&empty), None);
    }
}
