//! Boundary preparation.
//!
//! Merges the land and marine datasets into one boundary store, computes
//! their MBRs and writes both as GeoJSON artifacts for the geocode binary.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use revgeocoder::models::Terrain;
use revgeocoder::pip::geojson::read_feature_set;
use revgeocoder::pip::{compute_mbrs, write_mbrs_geojson, BoundarySpatialIndex, BoundaryStore, SourceFields};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "prepare")]
#[command(about = "Merge land and marine boundaries and compute their MBRs")]
struct Args {
    /// Land boundaries (GeoJSON, optionally .gz)
    #[arg(long)]
    land: PathBuf,

    /// Marine boundaries (GeoJSON, optionally .gz)
    #[arg(long)]
    marine: PathBuf,

    /// Directory for boundaries.geojson and mbrs.geojson
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,

    /// Province property of the land dataset
    #[arg(long, default_value = "name")]
    land_name: String,

    /// Country property of the land dataset
    #[arg(long, default_value = "admin")]
    land_admin: String,

    /// Name property of the marine dataset
    #[arg(long, default_value = "name")]
    marine_name: String,

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

    info!("Revgeocoder Boundary Preparation");

    let land = read_feature_set(&args.land, "land")?;
    let marine = read_feature_set(&args.marine, "marine")?;

    let store = BoundaryStore::load(
        &land,
        &SourceFields::new(&args.land_name, Some(args.land_admin.clone())),
        &marine,
        &SourceFields::new(&args.marine_name, None),
    )?;

    let mbrs = compute_mbrs(&store);

    // Boundaries that cannot be indexed fail here
    let index = BoundarySpatialIndex::build(&mbrs)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let boundaries_path = args.out_dir.join("boundaries.geojson");
    store.write_geojson(&boundaries_path)?;
    info!("Wrote {} boundaries to {}", store.len(), boundaries_path.display());

    let mbrs_path = args.out_dir.join("mbrs.geojson");
    write_mbrs_geojson(&mbrs, &mbrs_path)?;
    info!("Wrote {} MBRs to {}", index.len(), mbrs_path.display());

    info!(
        "Done: {} land, {} water",
        store.count(Terrain::Land),
        store.count(Terrain::Water)
    );
    Ok(())
}
