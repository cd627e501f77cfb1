// crates/cli/src/main.rs
// Command-line entry point: per-player backfill, batch backfill, and
// citation-only runs.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use spartan_ledger_backfill::{backfill_all_players, run_backfill, BackfillRequest, HaloStatsClient};
use spartan_ledger_core::{CategorySelection, DataCategory, DetectionMode};
use spartan_ledger_db::{default_store_dir, Database};

#[derive(Parser)]
#[command(
    name = "spartan-ledger",
    about = "Incremental backfill for Halo Infinite per-player match stores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Backfill one player's store
    Backfill(BackfillArgs),
    /// Backfill every player store in the data directory
    BackfillAll(BackfillAllArgs),
    /// Compute citations for one player without touching the API
    Citations(CitationsArgs),
}

#[derive(Args)]
struct BackfillArgs {
    /// Player gamertag (names the store file)
    gamertag: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct BackfillAllArgs {
    /// Directory holding the player stores (defaults to the data dir)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CitationsArgs {
    /// Player gamertag (names the store file)
    gamertag: String,

    /// Recompute citations for every match, not just uncited ones
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct CommonArgs {
    /// Categories to backfill, comma-separated (default: all)
    #[arg(long, value_delimiter = ',')]
    categories: Vec<DataCategory>,

    /// Categories to force-reprocess, comma-separated (implies requesting them)
    #[arg(long, value_delimiter = ',')]
    force: Vec<DataCategory>,

    /// How category predicates combine: 'or' or 'and'
    #[arg(long, default_value = "or")]
    mode: DetectionMode,

    /// Detect and report only; write nothing
    #[arg(long)]
    dry_run: bool,

    /// Cap on how many matches one run processes
    #[arg(long)]
    max_matches: Option<usize>,

    /// Stats API base URL
    #[arg(long, default_value = "https://halo.api.dubme.com/hi")]
    api_url: String,

    /// API requests per second
    #[arg(long, default_value_t = 5.0)]
    rate: f64,

    /// Derive the killer/victim pairs table
    #[arg(long)]
    killer_victim: bool,

    /// Drop and rebuild the killer/victim table instead of extending it
    #[arg(long)]
    rebuild_killer_victim: bool,

    /// Derive end times from start time + duration
    #[arg(long)]
    end_time: bool,

    /// Recompute end times even where one is already stored
    #[arg(long)]
    force_end_time: bool,

    /// Bucket matches into play sessions
    #[arg(long)]
    sessions: bool,

    /// Reassign sessions for every match
    #[arg(long)]
    force_sessions: bool,

    /// Compute citations for uncited matches
    #[arg(long)]
    citations: bool,

    /// Recompute citations for every match
    #[arg(long)]
    recompute_citations: bool,
}

impl CommonArgs {
    fn selection(&self) -> CategorySelection {
        let mut selection = if self.categories.is_empty() {
            CategorySelection::all()
        } else {
            self.categories
                .iter()
                .fold(CategorySelection::new(), |sel, c| sel.request(*c))
        };
        for category in &self.force {
            selection = selection.force(*category);
        }
        selection
    }

    fn to_request(&self, gamertag: String) -> BackfillRequest {
        BackfillRequest {
            gamertag,
            dry_run: self.dry_run,
            max_matches: self.max_matches,
            mode: self.mode,
            selection: self.selection(),
            run_killer_victim: self.killer_victim || self.rebuild_killer_victim,
            rebuild_killer_victim: self.rebuild_killer_victim,
            run_end_time: self.end_time || self.force_end_time,
            force_end_time: self.force_end_time,
            run_sessions: self.sessions || self.force_sessions,
            force_sessions: self.force_sessions,
            run_citations: self.citations || self.recompute_citations,
            recompute_citations: self.recompute_citations,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Backfill(args) => {
            let db = Database::open_player(&args.gamertag).await?;
            let client = HaloStatsClient::new(&args.common.api_url, args.common.rate)?;
            let request = args.common.to_request(args.gamertag);
            let counts = run_backfill(&db, &client, &request).await?;
            println!("{counts}");
        }
        Command::BackfillAll(args) => {
            let dir = match &args.store_dir {
                Some(dir) => dir.clone(),
                None => default_store_dir()?,
            };
            let client = HaloStatsClient::new(&args.common.api_url, args.common.rate)?;
            // The gamertag is filled in per store during the fold.
            let template = args.common.to_request(String::new());
            let counts = backfill_all_players(&dir, &client, &template).await;
            println!("{counts}");
        }
        Command::Citations(args) => {
            let db = Database::open_player(&args.gamertag).await?;
            // No API categories requested, so the client is never called.
            let client = HaloStatsClient::new("http://localhost", 0.0)?;
            let request = BackfillRequest {
                gamertag: args.gamertag,
                run_citations: true,
                recompute_citations: args.force,
                ..Default::default()
            };
            let counts = run_backfill(&db, &client, &request).await?;
            println!("{counts}");
        }
    }

    info!("done");
    Ok(())
}
