//! # vsvi-precomputed
//!
//! Converts VAST `.vsvi` tiled image datasets into Neuroglancer precomputed
//! volumes, reading tiles from a local directory or S3 and writing chunks to
//! either.
//!
//! ## Features
//!
//! - **Manifest-driven**: tile names are parsed with the manifest's printf-style template
//! - **Streaming**: tiles are listed lazily and processed with bounded concurrency
//! - **Fault tolerant**: bad tiles are logged and counted, the run carries on
//! - **Resumable**: `start_at` skips entries already handled by an interrupted run
//!
//! ## Architecture
//!
//! - [`manifest`] - manifest parsing, filename templates, grid mapping
//! - [`io`] - object stores (local directory, S3) and locations
//! - [`tile`] - tile decoding into sample buffers
//! - [`sink`] - destination volumes (precomputed, raw encoding)
//! - [`ingest`] - the pipeline tying it together
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use vsvi_precomputed::{ingest, CancelHandle, IngestOptions, Location, S3Settings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manifest = Location::parse("s3://lab/neha/ROI1.vsvi").unwrap();
//!     let (tiles, _) = manifest.split_file().unwrap();
//!     let output = Location::parse("/data/neha/precomputed/").unwrap();
//!
//!     let summary = ingest(
//!         &manifest,
//!         &tiles,
//!         &output,
//!         &S3Settings::default(),
//!         IngestOptions::default(),
//!         CancelHandle::new(),
//!     )
//!     .await
//!     .unwrap();
//!     println!("{}", summary);
//! }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod io;
pub mod manifest;
pub mod sink;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, ConvertConfig, InspectConfig, StorageArgs};
pub use error::{
    GridAxis, GridError, IngestError, IoError, ManifestError, SinkError, TemplateError, TileError,
    TileErrorKind,
};
pub use ingest::{ingest, CancelHandle, IngestOptions, IngestSummary, Ingester};
pub use io::{create_s3_client, LocalStore, Location, ObjectStore, S3Settings, S3Store, TileRef};
pub use manifest::{FilenameTemplate, GridIndex, GridMapper, Manifest, TileNaming, VoxelBox};
pub use sink::{PrecomputedInfo, PrecomputedSink, VolumeSink, VolumeSpec};
pub use tile::{SampleType, TileBuffer, TileDecoder};
