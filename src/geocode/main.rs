//! Batch reverse geocoding.
//!
//! Resolves every coordinate of the configured input to a province and
//! country and writes the results to the configured output, then merges
//! them back into the input when `[merge]` is configured.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use revgeocoder::batch::BatchRunner;
use revgeocoder::config::Config;
use revgeocoder::models::Terrain;
use revgeocoder::Resolver;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "geocode")]
#[command(about = "Reverse geocode coordinates to province and country")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "geocode.toml")]
    config: PathBuf,

    /// Rows per page (overrides [batch] size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Resolve the rows of each page in parallel
    #[arg(long)]
    parallel: bool,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Revgeocoder Batch Geocoding");
    info!("Config: {}", args.config.display());

    let mut config = Config::load_from_file(&args.config)?;
    if let Some(size) = args.batch_size {
        config.batch.size = size;
    }
    if args.parallel {
        config.batch.parallel = true;
    }
    config.validate()?;

    let store = config.load_boundaries().context("Failed to load boundaries")?;
    let resolver = Resolver::from_store(store)?;
    info!(
        "Indexed {} boundaries ({} land, {} water)",
        resolver.index().len(),
        resolver.store().count(Terrain::Land),
        resolver.store().count(Terrain::Water)
    );

    let mut source = config.input.open_source()?;
    let mut sink = config.output.create_sink()?;

    let mut runner = BatchRunner::new(&resolver, config.batch_size()?).parallel(config.batch.parallel);
    let pb = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {pos} rows ({per_sec})")?,
        );
        pb.enable_steady_tick(Duration::from_millis(200));
        runner = runner.with_progress(pb.clone());
        Some(pb)
    };

    let summary = runner.run(&mut source, &mut sink)?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let elapsed = summary.finished_at - summary.started_at;
    info!(
        "Geocoded {} of {} rows in {} pages ({} dropped) in {}s",
        summary.rows_written,
        summary.rows_read,
        summary.pages,
        summary.rows_failed,
        elapsed.num_seconds()
    );
    info!("Summary: {}", serde_json::to_string(&summary)?);

    // Close the output before reading it back
    drop(sink);
    if let Some(merged) = config.merge_results().context("Failed to merge results")? {
        info!("Merged results into {} input rows", merged);
    }

    Ok(())
}
