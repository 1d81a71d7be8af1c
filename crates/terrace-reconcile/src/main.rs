//! terrace binary.
//!
//! Reads `terrace.toml` (or the path given with `--config`), opens the
//! SQLite warehouse and reconciles feed payloads into it, or prints the
//! stored state.
//!
//! ```text
//! terrace run --bootstrap bootstrap-static.json --fixtures fixtures.json
//! terrace project player
//! terrace project match_result
//! terrace history player --code 118748
//! terrace keys team
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use terrace_core::{entity::EntityType, store::Warehouse};
use terrace_reconcile::{ReconcileConfig, Reconciler};
use terrace_store_sqlite::SqliteWarehouse;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Terrace warehouse reconciler")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "terrace.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Reconcile teams, players, fixtures, results and stats from feed
  /// payloads.
  Run {
    /// `bootstrap-static` JSON payload.
    #[arg(long)]
    bootstrap: PathBuf,
    /// `fixtures` JSON payload.
    #[arg(long)]
    fixtures:  PathBuf,
  },
  /// Print the deduplicated dimension view of an entity type, or the
  /// per-team season records for `match_result`.
  Project { entity: EntityType },
  /// Print stored records of an entity type.
  History {
    entity: EntityType,
    /// Only records for this natural code.
    #[arg(long)]
    code:   Option<String>,
  },
  /// Print the surrogate key mapping of an entity type.
  Keys { entity: EntityType },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let cfg = ReconcileConfig::load(&cli.config).context("failed to load configuration")?;

  let store = SqliteWarehouse::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open warehouse at {:?}", cfg.store_path))?;
  let reconciler = Reconciler::new(store);

  match cli.command {
    Command::Run { bootstrap, fixtures } => {
      run(&reconciler, &cfg, &bootstrap, &fixtures).await
    }
    Command::Project { entity } => {
      let views = reconciler.project(entity).await?;
      if entity == EntityType::MatchResult {
        print_json(&views.team_history)
      } else {
        print_json(&views.dimension)
      }
    }
    Command::History { entity, code } => {
      let keep = |c: &str| code.as_deref().is_none_or(|wanted| wanted == c);
      if entity.is_volatile() {
        let mut records = reconciler.store().volatile(entity).await?;
        records.retain(|r| keep(r.natural_code.as_str()));
        print_json(&records)
      } else {
        let mut records = reconciler.store().history(entity).await?;
        records.retain(|r| keep(r.natural_code.as_str()));
        print_json(&records)
      }
    }
    Command::Keys { entity } => {
      let mappings = reconciler.store().key_mappings(entity).await?;
      print_json(&mappings)
    }
  }
}

async fn run(
  reconciler: &Reconciler<SqliteWarehouse>,
  cfg: &ReconcileConfig,
  bootstrap: &Path,
  fixtures: &Path,
) -> anyhow::Result<()> {
  let ingested_at = Utc::now();

  let raw = std::fs::read_to_string(bootstrap)
    .with_context(|| format!("failed to read {bootstrap:?}"))?;
  let base = terrace_feed::decode_bootstrap(&raw, ingested_at)
    .context("failed to decode bootstrap payload")?;

  let raw = std::fs::read_to_string(fixtures)
    .with_context(|| format!("failed to read {fixtures:?}"))?;
  let games = terrace_feed::decode_fixtures(&raw, base.season, ingested_at)
    .context("failed to decode fixtures payload")?;

  tracing::info!(season = %base.season, "payloads decoded");
  let snapshots = vec![base.teams, base.players, games.fixtures, games.results, games.stats];
  let reports = if cfg.parallel {
    reconciler.reconcile_all(snapshots).await
  } else {
    reconciler.reconcile_sequential(snapshots).await
  };

  for report in &reports {
    println!("{}", serde_json::to_string(report)?);
  }

  let failed: Vec<EntityType> = reports
    .iter()
    .filter(|r| !r.is_success())
    .map(|r| r.entity_type)
    .collect();
  if !failed.is_empty() {
    anyhow::bail!("reconciliation failed for {failed:?}");
  }
  Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
