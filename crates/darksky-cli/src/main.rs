//! Command-line front end: load a raster, run one query, print the result as
//! JSON on stdout. Progress goes to the log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use darksky_core::{
    DarkSkyEngine, ExecutionStrategy, GeoCoordinate, KnownSite, RasterLoader, SearchConfig,
};
use log::info;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "darksky", about = "Find dark-sky observing sites near a location")]
struct Cli {
    /// Light-pollution raster image (PNG, JPEG or TIFF).
    #[arg(short, long, global = true, env = "DARKSKY_RASTER")]
    raster: Option<PathBuf>,

    /// Search configuration JSON; missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Run searches on the calling thread instead of a worker.
    #[arg(long, global = true)]
    inline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Nearest site dark enough to observe from.
    Nearest(SiteArgs),
    /// A primary site plus alternatives spread around the origin.
    Multiple(SiteArgs),
    /// Brightness class at a single location.
    Brightness(LocationArgs),
}

#[derive(Args, Debug)]
struct LocationArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,
}

#[derive(Args, Debug)]
struct SiteArgs {
    #[command(flatten)]
    location: LocationArgs,

    /// Search radius in km (defaults to the configured radius).
    #[arg(short = 'd', long)]
    max_distance_km: Option<f64>,

    /// JSON array of reference sites to annotate results with.
    #[arg(short, long)]
    known_sites: Option<PathBuf>,
}

impl LocationArgs {
    fn coordinate(&self) -> GeoCoordinate {
        GeoCoordinate::new(self.lat, self.lng)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };
    let raster = cli
        .raster
        .clone()
        .context("no raster given; pass --raster or set DARKSKY_RASTER")?;
    let strategy = if cli.inline { ExecutionStrategy::Inline } else { ExecutionStrategy::Worker };
    let engine = DarkSkyEngine::new(RasterLoader::from_path(raster), config, strategy)
        .context("failed to start search engine")?;

    let mut last_logged = -1.0;
    let mut on_progress = |p: f64| {
        if p - last_logged >= 0.1 || p >= 1.0 {
            info!("Progress {:>3.0}%", p * 100.0);
            last_logged = p;
        }
    };

    match &cli.command {
        Command::Nearest(args) => {
            let result = engine.find_nearest_dark_sky(
                args.location.coordinate(),
                args.max_distance_km,
                load_known_sites(args)?,
                &mut on_progress,
            )?;
            print_or_hint(&result)?;
        }
        Command::Multiple(args) => {
            let result = engine.find_multiple_dark_sites(
                args.location.coordinate(),
                args.max_distance_km,
                load_known_sites(args)?,
                &mut on_progress,
            )?;
            print_or_hint(&result)?;
        }
        Command::Brightness(args) => {
            let class = engine.brightness_class_for_location(args.coordinate())?;
            println!("{}", serde_json::to_string_pretty(&class)?);
            if class.is_none() {
                eprintln!("No data at this location (water or outside the raster).");
            }
        }
    }

    engine.shutdown();
    Ok(())
}

fn load_known_sites(args: &SiteArgs) -> Result<Arc<Vec<KnownSite>>> {
    let Some(path) = &args.known_sites else {
        return Ok(Arc::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read known sites from {}", path.display()))?;
    let sites: Vec<KnownSite> = serde_json::from_str(&text)
        .with_context(|| format!("invalid known sites JSON in {}", path.display()))?;
    info!("Loaded {} known sites", sites.len());
    Ok(Arc::new(sites))
}

fn print_or_hint<T: Serialize>(result: &Option<T>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if result.is_none() {
        eprintln!("No dark site found within the search radius. Try a larger --max-distance-km.");
    }
    Ok(())
}
