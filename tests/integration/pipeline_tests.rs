//! Integration tests for the ingestion pipeline.
//!
//! These tests verify:
//! - Tiles land at the regions their names describe
//! - Ragged edge tiles keep their decoded extent
//! - One bad tile never affects the others
//! - Fatal errors (sink initialization) stop the run before listing
//! - Cancellation and resuming with start_at

use std::sync::Arc;

use vsvi_precomputed::error::{IngestError, TileErrorKind};
use vsvi_precomputed::ingest::{CancelHandle, IngestOptions, Ingester};
use vsvi_precomputed::manifest::{Manifest, VoxelBox};
use vsvi_precomputed::tile::SampleType;

use super::test_utils::{
    gray16_png, gray_png, manifest_from, neha_manifest_json, small_manifest_json, tile_key,
    MockStore, RecordingSink,
};

fn options(workers: usize) -> IngestOptions {
    IngestOptions {
        workers,
        start_at: 0,
    }
}

fn tile_value(section: u32, row: u32, column: u32) -> u8 {
    (section * 10 + row * 3 + column) as u8
}

/// Every tile of the small dataset; the third column is 3 pixels wide.
fn small_dataset() -> MockStore {
    let mut store = MockStore::new();
    for section in 1..=2 {
        for row in 1..=2 {
            for column in 1..=3 {
                let width = if column == 3 { 3 } else { 4 };
                store = store.with_object(
                    tile_key(section, row, column),
                    gray_png(width, 4, tile_value(section, row, column)),
                );
            }
        }
    }
    store
}

async fn run(
    store: &Arc<MockStore>,
    sink: &Arc<RecordingSink>,
    manifest: &Manifest,
    options: IngestOptions,
) -> vsvi_precomputed::ingest::IngestSummary {
    Ingester::new(store.clone(), sink.clone(), options)
        .run(manifest)
        .await
        .unwrap()
}

// =============================================================================
// Placement
// =============================================================================

#[tokio::test]
async fn test_small_dataset_is_fully_written() {
    let store = Arc::new(small_dataset());
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(4)).await;

    assert_eq!(summary.attempted, 12);
    assert_eq!(summary.written, 12);
    assert_eq!(summary.failed(), 0);
    assert!(summary.is_complete());

    let writes = sink.writes().await;
    assert_eq!(writes.len(), 12);

    let first = &writes[0];
    assert_eq!(first.region, VoxelBox::new([0, 0, 0], [4, 4, 1]));
    assert_eq!(first.first_sample, Some(tile_value(1, 1, 1)));

    let last = writes.last().unwrap();
    assert_eq!(last.region, VoxelBox::new([8, 4, 1], [3, 4, 1]));
    assert_eq!(last.first_sample, Some(tile_value(2, 2, 3)));
}

#[tokio::test]
async fn test_neha_manifest_drives_sink_and_placement() {
    let store = Arc::new(
        MockStore::new()
            .with_object(tile_key(1, 10, 16), gray_png(8, 8, 7))
            .with_object(tile_key(26, 22, 47), gray_png(19, 8, 9)),
    );
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&neha_manifest_json());

    let summary = run(&store, &sink, &manifest, options(2)).await;
    assert_eq!(summary.written, 2);

    let specs = sink.specs().await;
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].chunk_size, [2048, 2048, 1]);
    assert_eq!(specs[0].sample_type, SampleType::Uint8);
    assert_eq!(specs[0].size, [95567, 73231, 94]);
    assert_eq!(specs[0].resolution, [4.0, 4.0, 30.0]);
    assert_eq!(specs[0].voxel_offset, [0, 0, 0]);

    let writes = sink.writes().await;
    assert_eq!(writes[0].region.origin, [30720, 18432, 0]);
    assert_eq!(writes[0].region.shape, [8, 8, 1]);
    assert_eq!(writes[1].region.origin, [46 * 2048, 21 * 2048, 25]);
    assert_eq!(writes[1].region.shape, [19, 8, 1]);
}

#[tokio::test]
async fn test_ragged_tile_uses_decoded_extent() {
    let store = Arc::new(MockStore::new().with_object(tile_key(1, 2, 3), gray_png(3, 2, 1)));
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(1)).await;
    assert_eq!(summary.written, 1);

    let writes = sink.writes().await;
    assert_eq!(writes[0].region, VoxelBox::new([8, 4, 0], [3, 2, 1]));
    assert_eq!((writes[0].width, writes[0].height), (3, 2));
}

#[tokio::test]
async fn test_sixteen_bit_tiles() {
    let mut json = small_manifest_json();
    json["SourceBytesPerPixel"] = 2.into();
    let manifest = manifest_from(&json);

    let store = Arc::new(
        MockStore::new()
            .with_object(tile_key(1, 1, 1), gray16_png(4, 4, 0x1234))
            .with_object(tile_key(1, 1, 2), gray_png(4, 4, 0xFF)),
    );
    let sink = Arc::new(RecordingSink::new());

    let summary = run(&store, &sink, &manifest, options(2)).await;
    assert_eq!(summary.written, 2);
    assert_eq!(sink.specs().await[0].sample_type, SampleType::Uint16);

    let writes = sink.writes().await;
    // little-endian low byte first
    assert_eq!(writes[0].first_sample, Some(0x34));
    assert_eq!(writes[1].first_sample, Some(0xFF));
}

#[tokio::test]
async fn test_worker_count_does_not_change_output() {
    let manifest = manifest_from(&small_manifest_json());

    let mut results = Vec::new();
    for workers in [1, 3, 32] {
        let store = Arc::new(small_dataset());
        let sink = Arc::new(RecordingSink::new());
        let summary = run(&store, &sink, &manifest, options(workers)).await;
        assert_eq!(summary.written, 12);
        results.push(sink.writes().await);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
}

// =============================================================================
// Per-Tile Failures
// =============================================================================

#[tokio::test]
async fn test_corrupt_tile_is_isolated() {
    let store = Arc::new(small_dataset().with_object(tile_key(1, 2, 2), b"not a png".to_vec()));
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(4)).await;

    assert_eq!(summary.attempted, 12);
    assert_eq!(summary.written, 11);
    assert_eq!(summary.failures_of(TileErrorKind::DecodeFailed), 1);
    assert_eq!(summary.failed_tiles[0].key, tile_key(1, 2, 2));
    assert!(summary.is_complete());
    assert_eq!(sink.writes().await.len(), 11);
}

#[tokio::test]
async fn test_unparseable_and_out_of_range_names_are_not_fetched() {
    let store = Arc::new(
        small_dataset()
            .with_object("mip0/0001_W01/0001_W01_overview.png", gray_png(4, 4, 0))
            .with_object(tile_key(1, 3, 1), gray_png(4, 4, 0))
            .with_object(tile_key(3, 1, 1), gray_png(4, 4, 0)),
    );
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(4)).await;

    assert_eq!(summary.written, 12);
    assert_eq!(summary.failures_of(TileErrorKind::FilenameMismatch), 1);
    assert_eq!(summary.failures_of(TileErrorKind::CoordinateOutOfRange), 2);
    assert_eq!(store.get_count("mip0/0001_W01/0001_W01_overview.png").await, 0);
    assert_eq!(store.get_count(&tile_key(1, 3, 1)).await, 0);
    assert_eq!(store.get_count(&tile_key(3, 1, 1)).await, 0);
    assert_eq!(store.total_gets().await, 12);
}

#[tokio::test]
async fn test_non_image_entries_are_skipped() {
    let store = Arc::new(
        small_dataset()
            .with_object("mip0/0001_W01/metadata.txt", b"hello".to_vec())
            .with_object("mip0/0002_W01/Thumbs.db", vec![0; 16]),
    );
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(4)).await;

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.attempted, 12);
    assert_eq!(summary.failed(), 0);
    assert_eq!(store.get_count("mip0/0001_W01/metadata.txt").await, 0);
}

#[tokio::test]
async fn test_fetch_failure_is_counted() {
    let store = Arc::new(small_dataset().with_failing_key(tile_key(2, 1, 1)));
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(4)).await;

    assert_eq!(summary.written, 11);
    assert_eq!(summary.failures_of(TileErrorKind::FetchFailed), 1);
}

#[tokio::test]
async fn test_write_failure_is_counted() {
    let store = Arc::new(small_dataset());
    let sink = Arc::new(RecordingSink::new().with_failing_origin([4, 0, 0]));
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(4)).await;

    assert_eq!(summary.written, 11);
    assert_eq!(summary.failures_of(TileErrorKind::WriteFailed), 1);
    assert_eq!(summary.failed_tiles[0].key, tile_key(1, 1, 2));
}

#[tokio::test]
async fn test_listing_error_does_not_stop_the_run() {
    let store = Arc::new(
        small_dataset()
            .with_page_size(2)
            .with_listing_error_after(5),
    );
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(&store, &sink, &manifest, options(2)).await;

    assert_eq!(summary.written, 12);
    assert_eq!(summary.listing_errors.len(), 1);
    assert!(!summary.is_complete());
    // the error took a listing position of its own
    assert_eq!(summary.processed(), 13);
    assert_eq!(summary.resume_at(0), 13);
}

// =============================================================================
// Fatal Errors and Control
// =============================================================================

#[tokio::test]
async fn test_sink_initialization_failure_is_fatal() {
    let store = Arc::new(small_dataset());
    let sink = Arc::new(RecordingSink::failing_initialize());
    let manifest = manifest_from(&small_manifest_json());

    let result = Ingester::new(store.clone(), sink.clone(), options(4))
        .run(&manifest)
        .await;

    assert!(matches!(result, Err(IngestError::SinkInitialization(_))));
    assert_eq!(store.list_calls(), 0);
    assert_eq!(store.total_gets().await, 0);
}

#[tokio::test]
async fn test_cancelled_run_dispatches_nothing_new() {
    let store = Arc::new(small_dataset());
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let cancel = CancelHandle::new();
    cancel.cancel();
    let summary = Ingester::new(store.clone(), sink.clone(), options(4))
        .with_cancel_handle(cancel)
        .run(&manifest)
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.attempted, 0);
    assert!(!summary.is_complete());
    // the volume is still created
    assert_eq!(sink.specs().await.len(), 1);
}

#[tokio::test]
async fn test_start_at_resumes_within_listing() {
    let store = Arc::new(small_dataset().with_page_size(5));
    let sink = Arc::new(RecordingSink::new());
    let manifest = manifest_from(&small_manifest_json());

    let summary = run(
        &store,
        &sink,
        &manifest,
        IngestOptions {
            workers: 3,
            start_at: 7,
        },
    )
    .await;

    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.written, 5);

    // The first seven keys in listing order were not fetched.
    let keys = store.keys().await;
    for key in &keys[..7] {
        assert_eq!(store.get_count(key).await, 0, "{}", key);
    }
    for key in &keys[7..] {
        assert_eq!(store.get_count(key).await, 1, "{}", key);
    }
}
