//! Command-line configuration for vsvi-precomputed.
//!
//! Options can be given as flags or as environment variables with the `VSVI_`
//! prefix:
//!
//! - `VSVI_INPUT` - Manifest location, local path or `s3://bucket/key.vsvi`
//! - `VSVI_OUTPUT` - Destination directory, local path or `s3://bucket/prefix/`
//! - `VSVI_PROFILE` - AWS credentials profile (default: default)
//! - `VSVI_S3_REGION` - AWS region (default: from profile, else us-east-1)
//! - `VSVI_S3_ENDPOINT` - Custom endpoint for S3-compatible services
//! - `VSVI_WORKERS` - Tiles processed concurrently (default: number of cores)
//! - `VSVI_START_AT` - Listed entries to skip when resuming (default: 0)
//!
//! # Example
//!
//! ```text
//! vsvi-precomputed convert -i s3://lab/neha/ROI1.vsvi -o s3://lab/neha/precomputed/
//! vsvi-precomputed inspect -i ./ROI1.vsvi
//! ```

use clap::{Args, Parser, Subcommand};

use crate::ingest::IngestOptions;
use crate::io::{Location, S3Settings};

// =============================================================================
// Default Values
// =============================================================================

/// Default AWS credentials profile.
pub const DEFAULT_PROFILE: &str = "default";

/// Manifest file extension.
pub const MANIFEST_EXTENSION: &str = ".vsvi";

// =============================================================================
// CLI Arguments
// =============================================================================

/// vsvi-precomputed - convert VAST tile sets into Neuroglancer precomputed volumes.
#[derive(Parser, Debug, Clone)]
#[command(name = "vsvi-precomputed")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a .vsvi tile set into a precomputed volume.
    Convert(ConvertConfig),

    /// Parse a manifest and print the volume it describes, without writing anything.
    Inspect(InspectConfig),
}

/// Storage connection options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// AWS credentials profile used for s3:// locations.
    #[arg(long, default_value = DEFAULT_PROFILE, env = "VSVI_PROFILE")]
    pub profile: String,

    /// AWS region. Falls back to the profile's region, then us-east-1.
    #[arg(long, env = "VSVI_S3_REGION")]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "VSVI_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,
}

impl StorageArgs {
    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            profile: Some(self.profile.clone()),
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConvertConfig {
    /// Manifest to convert (path or s3://bucket/key.vsvi).
    #[arg(short, long, env = "VSVI_INPUT")]
    pub input: String,

    /// Destination directory (path or s3://bucket/prefix/). Must end with '/'.
    #[arg(short, long, env = "VSVI_OUTPUT")]
    pub output: String,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Number of tiles processed concurrently.
    #[arg(long, env = "VSVI_WORKERS")]
    pub workers: Option<usize>,

    /// Skip this many listed entries (resume an interrupted run).
    #[arg(long, default_value_t = 0, env = "VSVI_START_AT")]
    pub start_at: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ConvertConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        validate_manifest_path(&self.input)?;

        if !self.output.ends_with('/') {
            return Err(format!(
                "Output '{}' must be a directory ending with '/'",
                self.output
            ));
        }
        Location::parse(&self.output).map_err(|e| format!("Invalid output: {}", e))?;

        if self.workers == Some(0) {
            return Err("workers must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn manifest_location(&self) -> Result<Location, String> {
        Location::parse(&self.input)
    }

    pub fn output_location(&self) -> Result<Location, String> {
        Location::parse(&self.output)
    }

    pub fn ingest_options(&self) -> IngestOptions {
        let defaults = IngestOptions::default();
        IngestOptions {
            workers: self.workers.unwrap_or(defaults.workers),
            start_at: self.start_at,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Manifest to inspect (path or s3://bucket/key.vsvi).
    #[arg(short, long, env = "VSVI_INPUT")]
    pub input: String,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_manifest_path(&self.input)
    }
}

fn validate_manifest_path(input: &str) -> Result<(), String> {
    if !input.to_lowercase().ends_with(MANIFEST_EXTENSION) {
        return Err(format!(
            "Input '{}' is not a {} manifest",
            input, MANIFEST_EXTENSION
        ));
    }
    Location::parse(input).map_err(|e| format!("Invalid input: {}", e))?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
