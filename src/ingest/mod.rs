//! The tile ingestion pipeline.
//!
//! ```text
//! list ──► parse name ──► map to region ──► fetch ──► decode ──► write_region
//!   │          (per tile, up to `workers` in flight)
//!   └── listing errors are recorded, the run continues
//! ```
//!
//! Per-tile failures never abort the run; they are collected in an
//! [`IngestSummary`]. Only an unusable manifest or a sink that cannot be
//! initialized are fatal.

mod pipeline;
mod summary;

use std::sync::Arc;

use tracing::info;

use crate::error::IngestError;
use crate::io::{open_store, Location, S3Settings};
use crate::manifest::Manifest;
use crate::sink::PrecomputedSink;

pub use pipeline::{default_workers, CancelHandle, IngestOptions, Ingester, PROGRESS_INTERVAL};
pub use summary::{FailedTile, IngestSummary, MAX_RECORDED_FAILURES};

/// Load the manifest at `manifest_location`.
pub async fn load_manifest(
    manifest_location: &Location,
    settings: &S3Settings,
) -> Result<Manifest, IngestError> {
    let (root, name) = manifest_location
        .split_file()
        .ok_or_else(|| IngestError::InvalidLocation(manifest_location.to_string()))?;
    let store = open_store(&root, settings).await;
    Ok(Manifest::load(store.as_ref(), &name).await?)
}

/// Convert the tile set described by a manifest into a precomputed volume.
///
/// Tiles are looked up relative to `source_root` (normally the manifest's
/// directory); the volume is written under `destination`.
pub async fn ingest(
    manifest_location: &Location,
    source_root: &Location,
    destination: &Location,
    settings: &S3Settings,
    options: IngestOptions,
    cancel: CancelHandle,
) -> Result<IngestSummary, IngestError> {
    let manifest = load_manifest(manifest_location, settings).await?;
    info!(
        manifest = %manifest_location,
        layer = manifest.target_layer_name.as_deref().unwrap_or("-"),
        size = ?manifest.volume_spec().size,
        "Loaded manifest"
    );

    let source = open_store(source_root, settings).await;
    let destination = open_store(destination, settings).await;
    let sink = Arc::new(PrecomputedSink::new(destination));

    Ingester::new(source, sink, options)
        .with_cancel_handle(cancel)
        .run(&manifest)
        .await
}
