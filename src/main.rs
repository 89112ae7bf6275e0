//! vsvi-precomputed - convert VAST tile sets into Neuroglancer precomputed volumes.
//!
//! This binary parses the command line, wires stores and sink together and
//! reports the outcome of a run.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vsvi_precomputed::{
    config::{Cli, Command, ConvertConfig, InspectConfig},
    ingest::{ingest, load_manifest, CancelHandle, IngestSummary},
    sink::PrecomputedInfo,
    IngestError,
};

/// Failed tiles listed individually at the end of a run.
const REPORTED_FAILURES: usize = 20;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Convert(config) => run_convert(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Convert Command
// =============================================================================

async fn run_convert(config: ConvertConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let (manifest_location, destination) =
        match (config.manifest_location(), config.output_location()) {
            (Ok(manifest), Ok(destination)) => (manifest, destination),
            (Err(e), _) | (_, Err(e)) => {
                error!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
        };
    let Some((source_root, _)) = manifest_location.split_file() else {
        error!("Configuration error: '{}' does not name a file", manifest_location);
        return ExitCode::FAILURE;
    };

    let options = config.ingest_options();
    info!("Configuration:");
    info!("  Manifest: {}", manifest_location);
    info!("  Tiles: {}", source_root);
    info!("  Output: {}", destination);
    info!("  Profile: {}", config.storage.profile);
    if let Some(ref endpoint) = config.storage.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  Workers: {}", options.workers);
    if options.start_at > 0 {
        info!("  Resuming at entry {}", options.start_at);
    }

    let start_at = options.start_at;
    let cancel = CancelHandle::new();
    spawn_interrupt_handler(cancel.clone());

    let result = ingest(
        &manifest_location,
        &source_root,
        &destination,
        &config.storage.s3_settings(),
        options,
        cancel,
    )
    .await;

    match result {
        Ok(summary) => report(&summary, start_at),
        Err(e) => {
            error!("{}", e);
            if let IngestError::Manifest(_) = e {
                error!("Please check that the manifest exists and is a valid VAST .vsvi file");
            }
            ExitCode::FAILURE
        }
    }
}

/// Stop dispatching new tiles on the first Ctrl-C.
fn spawn_interrupt_handler(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for tiles in flight to finish");
            cancel.cancel();
        }
    });
}

/// Print the run summary and pick the exit code.
///
/// Individual tile failures still exit successfully; an incomplete listing
/// or a cancelled run does not.
fn report(summary: &IngestSummary, start_at: usize) -> ExitCode {
    println!();
    print!("{}", summary);

    if !summary.failed_tiles.is_empty() {
        println!();
        println!("Failed tiles:");
        for failed in summary.failed_tiles.iter().take(REPORTED_FAILURES) {
            println!("  {}", failed.message);
        }
        if summary.failed() > REPORTED_FAILURES {
            println!("  ... and {} more", summary.failed() - REPORTED_FAILURES);
        }
    }

    if summary.cancelled {
        println!();
        println!(
            "Resume with --start-at {} to continue where this run stopped",
            summary.resume_at(start_at)
        );
    }

    if summary.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let location = match vsvi_precomputed::io::Location::parse(&config.input) {
        Ok(location) => location,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let manifest = match load_manifest(&location, &config.storage.s3_settings()).await {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("✓ Manifest: {}", location);
    if let Some(ref layer) = manifest.target_layer_name {
        println!("  Layer: {}", layer);
    }
    println!("  Template: {}", manifest.source_file_name_template);
    let prefix = manifest.tile_prefix();
    println!(
        "  Tile directory: {}",
        if prefix.is_empty() { "." } else { prefix.as_str() }
    );
    println!(
        "  Grid: sections {}..={}, rows {}..={}, columns {}..={}",
        manifest.source_min_s,
        manifest.source_max_s,
        manifest.source_min_r,
        manifest.source_max_r,
        manifest.source_min_c,
        manifest.source_max_c
    );
    println!();

    let info = PrecomputedInfo::from_spec(&manifest.volume_spec());
    match serde_json::to_string_pretty(&info) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "vsvi_precomputed=debug"
    } else {
        "vsvi_precomputed=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
