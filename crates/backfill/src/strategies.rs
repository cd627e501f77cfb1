// crates/backfill/src/strategies.rs
//! Local-only derivations: killer/victim pairing, end-time derivation,
//! session bucketing, and relative performance scoring. None of these
//! touch the network; each is independently invokable and idempotent
//! unless forced.

use chrono::Duration;
use spartan_ledger_core::{
    DataCategory, KillFeedEvent, KillFeedKind, KillerVictimPair, MatchStatFrame,
};
use spartan_ledger_db::{Database, DbResult};
use tracing::{debug, info, warn};

/// Gap between two matches that starts a new play session.
pub const SESSION_GAP_SECS: i64 = 3600;

/// Pairs kill events with death events within one match.
pub trait EventPairer {
    /// `events` are one match's kill/death events ordered by time offset.
    fn pair(&self, events: &[KillFeedEvent]) -> Vec<KillerVictimPair>;
}

/// Default pairer: a kill pairs with the earliest unconsumed death of a
/// different player within a fixed time tolerance. Greedy and
/// deterministic, so reruns over the same events produce the same pairs.
#[derive(Debug, Clone, Copy)]
pub struct ToleranceWindowPairer {
    pub tolerance_ms: i64,
}

impl Default for ToleranceWindowPairer {
    fn default() -> Self {
        Self { tolerance_ms: 5 }
    }
}

impl EventPairer for ToleranceWindowPairer {
    fn pair(&self, events: &[KillFeedEvent]) -> Vec<KillerVictimPair> {
        let kills: Vec<&KillFeedEvent> = events
            .iter()
            .filter(|e| e.kind == KillFeedKind::Kill)
            .collect();
        let deaths: Vec<&KillFeedEvent> = events
            .iter()
            .filter(|e| e.kind == KillFeedKind::Death)
            .collect();

        let mut used = vec![false; deaths.len()];
        let mut pairs = Vec::new();
        for kill in kills {
            let candidate = deaths.iter().enumerate().find(|(i, d)| {
                !used[*i]
                    && d.xuid != kill.xuid
                    && (d.time_ms - kill.time_ms).abs() <= self.tolerance_ms
            });
            if let Some((i, death)) = candidate {
                used[i] = true;
                pairs.push(KillerVictimPair {
                    killer_xuid: kill.xuid,
                    killer_gamertag: kill.gamertag.clone(),
                    victim_xuid: death.xuid,
                    victim_gamertag: death.gamertag.clone(),
                    time_ms: kill.time_ms,
                });
            }
        }
        pairs
    }
}

/// Rebuild (force) or extend (incremental) the derived killer/victim
/// table. Returns how many pairs were inserted.
pub async fn backfill_killer_victim_pairs(
    db: &Database,
    pairer: &impl EventPairer,
    force: bool,
) -> DbResult<u64> {
    if force {
        db.reset_killer_victim_pairs().await?;
    }

    let candidates = db.pairing_candidates(force).await?;
    let mut inserted = 0u64;
    for match_id in &candidates {
        let events = db.kill_feed(match_id).await?;
        let has_kill = events.iter().any(|e| e.kind == KillFeedKind::Kill);
        let has_death = events.iter().any(|e| e.kind == KillFeedKind::Death);
        if !has_kill || !has_death {
            debug!("match {match_id}: one-sided kill feed, skipping pairing");
            continue;
        }
        for pair in pairer.pair(&events) {
            match db.insert_killer_victim_pair(match_id, &pair).await {
                Ok(()) => inserted += 1,
                Err(e) => warn!("match {match_id}: failed to insert pair: {e}"),
            }
        }
    }
    info!(
        "killer/victim pairing: {inserted} pairs across {} matches",
        candidates.len()
    );
    Ok(inserted)
}

/// Derive `end_time = start_time + duration` where both inputs are known.
/// Incremental unless forced. Returns how many matches were updated.
pub async fn backfill_end_time(db: &Database, force: bool) -> DbResult<u64> {
    db.ensure_stat_columns().await?;

    let mut updated = 0u64;
    for (match_id, start, duration_secs) in db.end_time_candidates(force).await? {
        db.update_end_time(&match_id, start + Duration::seconds(duration_secs))
            .await?;
        updated += 1;
    }
    Ok(updated)
}

/// Bucket matches into play sessions: ordered by start time, a gap of more
/// than [`SESSION_GAP_SECS`] starts a new session. Assignment is computed
/// over the full history each run so session numbers stay consistent;
/// incremental mode only writes matches that have no assignment yet.
pub async fn backfill_sessions(db: &Database, force: bool) -> DbResult<u64> {
    db.ensure_session_column().await?;

    let candidates = db.session_candidates().await?;
    let mut updated = 0u64;
    let mut session = 0i64;
    let mut prev_start = None;
    for (match_id, start, current) in candidates {
        match prev_start {
            Some(prev) if start - prev <= Duration::seconds(SESSION_GAP_SECS) => {}
            _ => session += 1,
        }
        prev_start = Some(start);

        if force || current.is_none() {
            db.update_session_id(&match_id, session).await?;
            updated += 1;
        }
    }
    Ok(updated)
}

/// Scores one match relative to the player's earlier matches.
pub trait RelativeScorer {
    /// How many strictly-earlier matches must exist before scoring.
    fn min_history(&self) -> usize {
        10
    }

    /// Produce a score for `current` given its historical frame. The
    /// caller clamps the result to [0, 100].
    fn score(&self, current: &MatchStatFrame, history: &[MatchStatFrame]) -> f64;
}

/// Default scorer: a weighted blend of where the match's kills, deaths
/// (inverted), assists, and accuracy sit within the player's own history,
/// as percentiles. Missing accuracy drops that component and renormalizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentileScorer;

fn percentile_of(values: &[f64], x: f64) -> f64 {
    if values.is_empty() {
        return 50.0;
    }
    let below = values.iter().filter(|v| **v <= x).count();
    below as f64 / values.len() as f64 * 100.0
}

impl RelativeScorer for PercentileScorer {
    fn score(&self, current: &MatchStatFrame, history: &[MatchStatFrame]) -> f64 {
        let kills: Vec<f64> = history.iter().map(|f| f.kills as f64).collect();
        let deaths: Vec<f64> = history.iter().map(|f| f.deaths as f64).collect();
        let assists: Vec<f64> = history.iter().map(|f| f.assists as f64).collect();

        let mut score = 0.35 * percentile_of(&kills, current.kills as f64)
            + 0.25 * (100.0 - percentile_of(&deaths, current.deaths as f64))
            + 0.20 * percentile_of(&assists, current.assists as f64);
        let mut weight = 0.80;

        let accuracy_history: Vec<f64> = history.iter().filter_map(|f| f.accuracy).collect();
        if let Some(acc) = current.accuracy {
            if !accuracy_history.is_empty() {
                score += 0.20 * percentile_of(&accuracy_history, acc);
                weight += 0.20;
            }
        }

        score / weight
    }
}

/// Score one match if it is unscored and enough history exists. Returns
/// whether a score was written. Look-back only: matches starting at or
/// after this one never influence its score.
pub async fn compute_performance_score(
    db: &Database,
    scorer: &impl RelativeScorer,
    match_id: &str,
) -> DbResult<bool> {
    let Some(frame) = db.get_stat_frame(match_id).await? else {
        return Ok(false);
    };
    if frame.performance_score.is_some() {
        return Ok(false);
    }
    let Some(start) = frame.start_time else {
        return Ok(false);
    };

    let history = db.history_frames(start).await?;
    if history.len() < scorer.min_history() {
        debug!(
            "match {match_id}: {} of {} history matches, not scoring yet",
            history.len(),
            scorer.min_history()
        );
        return Ok(false);
    }

    let score = scorer.score(&frame, &history).clamp(0.0, 100.0);
    db.set_performance_score(match_id, score).await?;
    Ok(true)
}

/// Score every unscored match, oldest first. Returns how many scores were
/// written.
pub async fn backfill_performance_scores(
    db: &Database,
    scorer: &impl RelativeScorer,
) -> DbResult<u64> {
    db.ensure_stat_columns().await?;
    db.ensure_backfill_column().await?;

    let mut scored = 0u64;
    for match_id in db.performance_score_candidates().await? {
        if compute_performance_score(db, scorer, &match_id).await? {
            db.mark_backfill_completed(&match_id, DataCategory::PerformanceScores.bit())
                .await?;
            scored += 1;
        }
    }
    Ok(scored)
}
