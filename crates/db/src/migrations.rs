// crates/db/src/migrations.rs
/// Inline SQL migrations for the per-player store.
///
/// These create the minimal schema an initial sync writes into. Columns
/// added later by the stats API or by local derivations (accuracy,
/// resolved asset names, the `backfill_completed` bitmask, participant
/// detail columns) are NOT created here — the targeted migrators in
/// `schema.rs` add them on demand, which is what lets this code open
/// legacy stores that predate those fields.
///
/// Timestamps are stored as RFC 3339 UTC text, which sorts correctly
/// under SQLite's lexicographic TEXT ordering.

/// `killer_victim_pairs` DDL, shared with the force-rebuild path.
/// Derived and rebuildable; deliberately has no primary key, so reruns
/// without force may append duplicates.
pub const KILLER_VICTIM_PAIRS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS killer_victim_pairs (
    match_id        TEXT NOT NULL,
    killer_xuid     INTEGER NOT NULL,
    killer_gamertag TEXT,
    victim_xuid     INTEGER NOT NULL,
    victim_gamertag TEXT,
    kill_count      INTEGER NOT NULL DEFAULT 1,
    time_ms         INTEGER NOT NULL
);
"#;

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: match_stats — one row per match the player appeared in
    r#"
CREATE TABLE IF NOT EXISTS match_stats (
    match_id          TEXT PRIMARY KEY,
    start_time        TEXT,
    duration_secs     INTEGER,
    kills             INTEGER NOT NULL DEFAULT 0,
    deaths            INTEGER NOT NULL DEFAULT 0,
    assists           INTEGER NOT NULL DEFAULT 0,
    playlist_id       TEXT,
    map_id            TEXT,
    map_mode_pair_id  TEXT,
    game_variant_id   TEXT
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_match_stats_start ON match_stats(start_time DESC);"#,
    // Migration 2: medals_earned (medal_id is 64-bit; see widen_medal_id_column)
    r#"
CREATE TABLE IF NOT EXISTS medals_earned (
    match_id TEXT NOT NULL,
    medal_id INTEGER NOT NULL,
    count    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (match_id, medal_id)
);
"#,
    // Migration 3: highlight_events
    r#"
CREATE TABLE IF NOT EXISTS highlight_events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id   TEXT NOT NULL,
    event_type TEXT NOT NULL,
    time_ms    INTEGER NOT NULL,
    xuid       INTEGER,
    gamertag   TEXT,
    type_hint  TEXT,
    raw_json   TEXT NOT NULL DEFAULT '{}'
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_events_match_time ON highlight_events(match_id, time_ms);"#,
    // Migration 4: player_match_stats (skill/MMR per match per player)
    r#"
CREATE TABLE IF NOT EXISTS player_match_stats (
    match_id     TEXT NOT NULL,
    xuid         INTEGER NOT NULL,
    mmr          REAL,
    mmr_variance REAL,
    team_mmr     REAL,
    enemy_mmr    REAL,
    PRIMARY KEY (match_id, xuid)
);
"#,
    // Migration 5: personal_score_awards
    r#"
CREATE TABLE IF NOT EXISTS personal_score_awards (
    match_id   TEXT NOT NULL,
    xuid       INTEGER NOT NULL,
    award_name TEXT NOT NULL,
    count      INTEGER NOT NULL DEFAULT 0,
    score      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (match_id, xuid, award_name)
);
"#,
    // Migration 6: match_participants (detail columns added by schema.rs)
    r#"
CREATE TABLE IF NOT EXISTS match_participants (
    match_id TEXT NOT NULL,
    xuid     INTEGER NOT NULL,
    team_id  INTEGER,
    outcome  INTEGER,
    gamertag TEXT,
    PRIMARY KEY (match_id, xuid)
);
"#,
    // Migration 7: xuid_aliases (gamertags change; xuids do not)
    r#"
CREATE TABLE IF NOT EXISTS xuid_aliases (
    xuid      INTEGER NOT NULL,
    gamertag  TEXT NOT NULL,
    last_seen TEXT,
    PRIMARY KEY (xuid, gamertag)
);
"#,
    // Migration 8: killer_victim_pairs (derived)
    KILLER_VICTIM_PAIRS_DDL,
    r#"CREATE INDEX IF NOT EXISTS idx_pairs_match ON killer_victim_pairs(match_id);"#,
    // Migration 9: citation mapping table + derived values
    r#"
CREATE TABLE IF NOT EXISTS citation_definitions (
    name         TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    kind         TEXT NOT NULL CHECK (kind IN ('medal', 'stat', 'award', 'custom')),
    medal_id     INTEGER,
    stat_field   TEXT,
    award_name   TEXT,
    custom_fn    TEXT,
    enabled      INTEGER NOT NULL DEFAULT 1
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS match_citations (
    match_id TEXT NOT NULL,
    citation TEXT NOT NULL,
    value    INTEGER NOT NULL,
    PRIMARY KEY (match_id, citation)
);
"#,
    // Migration 10: default citation mappings so a fresh store computes
    // citations without manual setup
    r#"
INSERT OR IGNORE INTO citation_definitions (name, display_name, kind, medal_id, stat_field, award_name, custom_fn, enabled) VALUES
    ('slayer',          'Slayer',           'stat',   NULL,       'kills',   NULL,       NULL,                    1),
    ('playmaker',       'Playmaker',        'stat',   NULL,       'assists', NULL,       NULL,                    1),
    ('killing_spree',   'Killing Spree',    'medal',  2430242797, NULL,      NULL,       NULL,                    1),
    ('back_smack',      'Back Smack',       'medal',  548533137,  NULL,      NULL,       NULL,                    1),
    ('sharpshooter',    'Sharpshooter',     'award',  NULL,       NULL,      'Headshot', NULL,                    1),
    ('marksman',        'Marksman',         'custom', NULL,       NULL,      NULL,       'near_perfect_accuracy', 1),
    ('untouchable',     'Untouchable',      'custom', NULL,       NULL,      NULL,       'flawless_match',        1);
"#,
];
