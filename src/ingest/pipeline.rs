use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future;
use futures::stream::StreamExt;
use tracing::{debug, info, warn};

use super::summary::IngestSummary;
use crate::error::{IngestError, IoError, TileError};
use crate::io::{ObjectStore, TileRef};
use crate::manifest::{GridMapper, Manifest, TileNaming, VoxelBox};
use crate::sink::VolumeSink;
use crate::tile::{is_image_key, TileDecoder};

/// Log a progress line every this many listed entries.
pub const PROGRESS_INTERVAL: usize = 1000;

/// Worker count used when none is configured: one per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Tunables of an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Maximum number of tiles in flight
    pub workers: usize,
    /// Number of listed entries to skip, for resuming an interrupted run
    pub start_at: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            start_at: 0,
        }
    }
}

/// Stops a running ingestion from another task (e.g. a Ctrl-C handler).
///
/// No new tiles are dispatched once cancelled; tiles already in flight are
/// allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a worker needs to turn one listed tile into a written region.
struct TileContext {
    source: Arc<dyn ObjectStore>,
    sink: Arc<dyn VolumeSink>,
    naming: TileNaming,
    mapper: GridMapper,
    decoder: TileDecoder,
}

enum TileOutcome {
    Written,
    Skipped,
    Failed(TileError),
    ListingFailed(IoError),
}

impl TileContext {
    /// Parse, fetch, decode and write a single tile.
    async fn convert(&self, tile: &TileRef) -> Result<VoxelBox, TileError> {
        let key = tile.key.as_str();

        let index = self
            .naming
            .parse(&tile.name)
            .map_err(|source| TileError::FilenameMismatch {
                key: key.to_string(),
                source,
            })?;

        // Reject out-of-range indices before spending a fetch on them.
        self.mapper
            .grid_offsets(index)
            .map_err(|source| TileError::CoordinateOutOfRange {
                key: key.to_string(),
                source,
            })?;

        let bytes = self
            .source
            .get(key)
            .await
            .map_err(|source| TileError::FetchFailed {
                key: key.to_string(),
                source,
            })?;

        let decoder = self.decoder;
        let decoded = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| TileError::TaskFailed {
                key: key.to_string(),
                message: e.to_string(),
            })?
            .map_err(|message| TileError::DecodeFailed {
                key: key.to_string(),
                message,
            })?;

        let region = self
            .mapper
            .region(index, decoded.width(), decoded.height())
            .map_err(|source| TileError::CoordinateOutOfRange {
                key: key.to_string(),
                source,
            })?;

        self.sink
            .write_region(&region, &decoded)
            .await
            .map_err(|source| TileError::WriteFailed {
                key: key.to_string(),
                source,
            })?;

        debug!(key = %key, origin = ?region.origin, shape = ?region.shape, "Tile written");
        Ok(region)
    }
}

/// Run one listed entry to completion on its own task.
///
/// Spawning keeps a tile that has started writing alive even if the
/// dispatching stream is dropped, so chunks are never left half-merged by
/// cancellation.
async fn process(ctx: Arc<TileContext>, tile: TileRef) -> TileOutcome {
    if !is_image_key(&tile.name) {
        debug!(key = %tile.key, "Skipping non-image entry");
        return TileOutcome::Skipped;
    }

    let key = tile.key.clone();
    match tokio::spawn(async move { ctx.convert(&tile).await }).await {
        Ok(Ok(_)) => TileOutcome::Written,
        Ok(Err(e)) => TileOutcome::Failed(e),
        Err(e) => TileOutcome::Failed(TileError::TaskFailed {
            key,
            message: e.to_string(),
        }),
    }
}

/// Streams tiles from a source store into a volume sink.
///
/// # Example
///
/// ```ignore
/// let ingester = Ingester::new(source, sink, IngestOptions::default());
/// let cancel = ingester.cancel_handle();
/// let summary = ingester.run(&manifest).await?;
/// ```
pub struct Ingester {
    source: Arc<dyn ObjectStore>,
    sink: Arc<dyn VolumeSink>,
    options: IngestOptions,
    cancel: CancelHandle,
}

impl Ingester {
    pub fn new(
        source: Arc<dyn ObjectStore>,
        sink: Arc<dyn VolumeSink>,
        options: IngestOptions,
    ) -> Self {
        Self {
            source,
            sink,
            options,
            cancel: CancelHandle::new(),
        }
    }

    /// Use an externally created cancellation handle.
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Ingest every tile the manifest describes.
    ///
    /// The sink is initialized before anything is listed; failing that is the
    /// only fatal error once the manifest is valid. Individual tiles that
    /// cannot be parsed, fetched, decoded or written are logged and counted,
    /// and the run carries on.
    pub async fn run(&self, manifest: &Manifest) -> Result<IngestSummary, IngestError> {
        let naming = manifest.tile_naming()?;
        let mapper = manifest.grid_mapper();
        let spec = manifest.volume_spec();

        self.sink
            .initialize(&spec)
            .await
            .map_err(IngestError::SinkInitialization)?;

        let prefix = manifest.tile_prefix();
        let workers = self.options.workers.max(1);
        info!(
            source = %self.source.identifier(&prefix),
            template = %naming.template().as_str(),
            workers,
            start_at = self.options.start_at,
            "Starting ingestion"
        );

        let ctx = Arc::new(TileContext {
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            naming,
            mapper,
            decoder: TileDecoder::new(spec.sample_type),
        });

        let cancel = self.cancel.clone();
        let mut outcomes = self
            .source
            .list(&prefix, self.options.start_at)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(move |entry| {
                let ctx = Arc::clone(&ctx);
                async move {
                    match entry {
                        Ok(tile) => process(ctx, tile).await,
                        Err(e) => TileOutcome::ListingFailed(e),
                    }
                }
            })
            .buffer_unordered(workers);

        let mut summary = IngestSummary::default();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                TileOutcome::Written => summary.record_written(),
                TileOutcome::Skipped => summary.record_skipped(),
                TileOutcome::Failed(e) => {
                    warn!(key = %e.key(), kind = %e.kind(), error = %e, "Tile failed");
                    summary.record_failure(&e);
                }
                TileOutcome::ListingFailed(e) => {
                    warn!(error = %e, "Listing error");
                    summary.record_listing_error(&e);
                }
            }

            if summary.processed() % PROGRESS_INTERVAL == 0 {
                info!(
                    processed = summary.processed(),
                    written = summary.written,
                    failed = summary.failed(),
                    "Ingestion progress"
                );
            }
        }

        summary.cancelled = self.cancel.is_cancelled();
        info!(
            attempted = summary.attempted,
            written = summary.written,
            failed = summary.failed(),
            skipped = summary.skipped,
            listing_errors = summary.listing_errors.len(),
            cancelled = summary.cancelled,
            "Ingestion finished"
        );
        Ok(summary)
    }
}
