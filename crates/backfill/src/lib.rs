// crates/backfill/src/lib.rs
// Incremental match-history backfill: stats-API client, per-player
// orchestrator, local derivation strategies, and the citation engine.

pub mod citations;
pub mod client;
pub mod http;
pub mod orchestrator;
pub mod strategies;

pub use citations::CitationEngine;
pub use client::{ClientError, StatsClient};
pub use http::HaloStatsClient;
pub use orchestrator::{backfill_all_players, run_backfill, BackfillError, BackfillRequest};
