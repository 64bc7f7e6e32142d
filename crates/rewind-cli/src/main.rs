//! rewind - point-in-time recovery for hierarchical parameter stores.
//!
//! Restores a key, or a path (recursively or not), to its state at a
//! point in time, and feeds change notifications into the version log.
//!
//! # Configuration
//!
//! Pass `--config <file>` or set `REWIND_*` variables (a `.env` file is
//! read first):
//!
//! - `REWIND_BUCKET` - versioned store namespace
//! - `REWIND_VERSIONED_DB_PATH`, `REWIND_LIVE_DB_PATH` - store locations,
//!   default under `~/.rewind`
//! - `REWIND_MAX_CONCURRENCY`, `REWIND_PAGE_SIZE`, `REWIND_BATCH_TIMEOUT_SECS`
//!
//! Logging goes to stderr and honours `RUST_LOG`.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use rewind_core::{
    CancellationToken, RestoreEngine, RewindConfig, Seeder, StoreFactory, Target,
    VersionLogWriter,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod args;
mod output;

use args::{Cli, Command, GlobalArgs, PointInTime};
use output::Format;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.global.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = load_config(&cli.global)?;
    let format = Format {
        json: cli.global.json,
        show_secrets: cli.global.show_secrets,
    };

    let clean = match cli.command {
        Command::Preview(args) => preview(config, args, format).await?,
        Command::Restore(args) => restore(config, args, format).await?,
        Command::Ingest { payload } => ingest(config, payload, format).await?,
        Command::Seed { prefixes, do_it } => seed(config, prefixes, !do_it, format).await?,
    };

    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(global: &GlobalArgs) -> Result<RewindConfig> {
    let mut config = match global.config {
        Some(ref path) => RewindConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RewindConfig::from_env(),
    };
    if let Some(ref bucket) = global.bucket {
        tracing::info!("{} set by arg", bucket);
        config.bucket = bucket.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Cancel the batch on Ctrl-C; finished rows are still reported.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing keys in flight");
            trigger.cancel();
        }
    });
    cancel
}

fn engine(config: RewindConfig) -> Result<RestoreEngine> {
    let stores = StoreFactory::open(&config)?;
    Ok(RestoreEngine::new(config, stores.versioned, stores.live)?)
}

async fn preview(config: RewindConfig, args: PointInTime, format: Format) -> Result<bool> {
    let target = Target::parse(&args.target)?;
    let report = engine(config)?
        .resolve_with_cancel(&target, args.checktime, args.recursive, cancel_on_interrupt())
        .await?;
    output::preview(&report, format)?;
    Ok(report.is_complete() && report.rows.iter().all(|r| r.failure.is_none()))
}

async fn restore(config: RewindConfig, args: PointInTime, format: Format) -> Result<bool> {
    let target = Target::parse(&args.target)?;
    let report = engine(config)?
        .apply_with_cancel(&target, args.checktime, args.recursive, cancel_on_interrupt())
        .await?;
    output::restore(&report, format)?;
    Ok(report.is_complete() && !report.rows.iter().any(|r| r.is_failed()))
}

async fn ingest(
    config: RewindConfig,
    payload: Option<std::path::PathBuf>,
    format: Format,
) -> Result<bool> {
    let payload = match payload {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let stores = StoreFactory::open(&config)?;
    let writer = VersionLogWriter::new(stores.versioned, stores.live, &config);
    let entries = writer.record_batch(&payload).await?;
    output::ingest(&entries, format)?;
    Ok(entries.iter().all(|e| e.result.is_ok()))
}

async fn seed(
    config: RewindConfig,
    prefixes: Vec<String>,
    dry_run: bool,
    format: Format,
) -> Result<bool> {
    let stores = StoreFactory::open(&config)?;
    let writer = VersionLogWriter::new(stores.versioned, stores.live.clone(), &config);
    let seeder = Seeder::new(stores.live, writer, &config);
    let report = seeder.seed(&prefixes, dry_run).await?;
    output::seed(&report, format)?;
    Ok(report.failures.is_empty())
}
