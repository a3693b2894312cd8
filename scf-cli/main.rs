use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::Parser;
use log::{error, info};
use scf_cli::{overlay, read_correspondences, run, RunConfig, ScfResult};
use scf_core::{default_threads, init_thread_pool};

/// Match Swiss-cheese features between two large tiled images.
#[derive(Debug, Parser)]
#[command(author, version, about = "Tiled SCF feature matching")]
struct Args {
    /// Run configuration (.toml or .json). Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Correspondence output file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Area gate threshold (raw tile-pair matches)
    #[arg(long)]
    area_threshold: Option<usize>,

    /// SCF gate threshold (summed reference template matches)
    #[arg(long)]
    scf_threshold: Option<usize>,

    /// Worker threads for tile decoding and matching
    #[arg(long)]
    threads: Option<usize>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Draw the accepted points over both source images into this directory
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Debug logging (per tile pair match counts)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = try_main(args) {
        error!("{err}");
        process::exit(1);
    }
}

fn try_main(args: Args) -> ScfResult<()> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(output) = args.output {
        config.output = output;
    }
    if let Some(n) = args.area_threshold {
        config.thresholds.area_threshold = n;
    }
    if let Some(n) = args.scf_threshold {
        config.thresholds.scf_threshold = n;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    config.validate()?;

    if let Some(path) = &args.write_config {
        config.save(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    init_thread_pool(config.threads.unwrap_or_else(default_threads))?;

    let t0 = Instant::now();
    let outcome = run(&config)?;
    let elapsed = t0.elapsed();

    println!("Time taken: {:.2?}", elapsed);
    println!("Image A: {} tiles, {} features", outcome.tiles_a, outcome.features_a);
    println!("Image B: {} tiles, {} features", outcome.tiles_b, outcome.features_b);
    println!("Reference templates with features: {}", outcome.references);
    println!("{}", outcome.report);

    if let Some(dir) = &args.overlay {
        let points = read_correspondences(&config.output)?;
        let [a, b] = overlay::write_overlays(&config, &points, dir)?;
        info!("Overlays saved as {} and {}", a.display(), b.display());
    }
    Ok(())
}
