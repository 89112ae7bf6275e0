//! Test utilities for integration tests.
//!
//! This module provides an in-memory object store with paged listing, a sink
//! that records what it is asked to write, and helpers for building tile
//! images and manifests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use vsvi_precomputed::error::{IoError, SinkError};
use vsvi_precomputed::io::{ObjectStore, ObjectStream, TileRef};
use vsvi_precomputed::manifest::{Manifest, VoxelBox};
use vsvi_precomputed::sink::{VolumeSink, VolumeSpec};
use vsvi_precomputed::tile::TileBuffer;

// =============================================================================
// Mock Object Store
// =============================================================================

/// An in-memory object store.
///
/// Listing is served in pages like S3's ListObjectsV2, and can be told to
/// emit an error after a given number of entries. Every `get` is counted per
/// key so tests can check which tiles were fetched.
pub struct MockStore {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    page_size: usize,
    listing_error_after: Option<usize>,
    failing_keys: HashSet<String>,
    key_delays: HashMap<String, Duration>,
    get_delay: Option<Duration>,
    get_counts: Arc<RwLock<BTreeMap<String, usize>>>,
    list_calls: Arc<AtomicUsize>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            page_size: 1000,
            listing_error_after: None,
            failing_keys: HashSet::new(),
            key_delays: HashMap::new(),
            get_delay: None,
            get_counts: Arc::new(RwLock::new(BTreeMap::new())),
            list_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_object(self, key: impl Into<String>, data: Vec<u8>) -> Self {
        self.objects
            .try_write()
            .expect("store is not shared yet")
            .insert(key.into(), Bytes::from(data));
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Yield a listing error after `entries` listed objects, then carry on.
    pub fn with_listing_error_after(mut self, entries: usize) -> Self {
        self.listing_error_after = Some(entries);
        self
    }

    /// Make `get` fail for this key with a transport error.
    pub fn with_failing_key(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Wait before serving `get` for this key.
    pub fn with_key_delay(mut self, key: impl Into<String>, delay: Duration) -> Self {
        self.key_delays.insert(key.into(), delay);
        self
    }

    /// Wait after reading, before returning, on every `get` (hit or miss).
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    pub async fn get_count(&self, key: &str) -> usize {
        self.get_counts.read().await.get(key).copied().unwrap_or(0)
    }

    pub async fn total_gets(&self) -> usize {
        self.get_counts.read().await.values().sum()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn list(&self, prefix: &str, start_at: usize) -> ObjectStream {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let objects = Arc::clone(&self.objects);
        let prefix = match prefix.trim_matches('/') {
            "" => String::new(),
            p => format!("{}/", p),
        };
        let page_size = self.page_size.max(1);
        let error_after = self.listing_error_after;

        // Pages are fetched lazily, each one reading the current contents.
        let pages = stream::unfold(Some(0usize), move |offset| {
            let objects = Arc::clone(&objects);
            let prefix = prefix.clone();
            async move {
                let offset = offset?;
                let keys: Vec<String> = objects
                    .read()
                    .await
                    .keys()
                    .filter(|k| k.starts_with(&prefix) && !k.ends_with('/'))
                    .skip(offset)
                    .take(page_size + 1)
                    .cloned()
                    .collect();
                let next = (keys.len() > page_size).then_some(offset + page_size);

                let mut page: Vec<Result<TileRef, IoError>> = Vec::new();
                for (i, key) in keys.into_iter().take(page_size).enumerate() {
                    if error_after == Some(offset + i) {
                        page.push(Err(IoError::S3("SlowDown: please reduce your request rate".into())));
                    }
                    page.push(Ok(TileRef::new(key)));
                }
                Some((stream::iter(page), next))
            }
        });

        pages.flatten().skip(start_at).boxed()
    }

    async fn get(&self, key: &str) -> Result<Bytes, IoError> {
        *self
            .get_counts
            .write()
            .await
            .entry(key.to_string())
            .or_insert(0) += 1;

        if let Some(delay) = self.key_delays.get(key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing_keys.contains(key) {
            return Err(IoError::Connection(format!("connection reset reading {}", key)));
        }
        let result = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| IoError::NotFound(self.identifier(key)));
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), IoError> {
        self.objects.write().await.insert(key.to_string(), data);
        Ok(())
    }

    fn identifier(&self, key: &str) -> String {
        format!("mock://{}", key)
    }
}

// =============================================================================
// Recording Sink
// =============================================================================

/// A write seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub region: VoxelBox,
    pub width: u32,
    pub height: u32,
    pub first_sample: Option<u8>,
}

/// A sink that records calls instead of storing voxels.
#[derive(Default)]
pub struct RecordingSink {
    specs: RwLock<Vec<VolumeSpec>>,
    writes: RwLock<Vec<RecordedWrite>>,
    fail_initialize: bool,
    failing_origins: HashSet<[u64; 3]>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_initialize() -> Self {
        Self {
            fail_initialize: true,
            ..Self::default()
        }
    }

    /// Reject writes whose region starts at `origin`.
    pub fn with_failing_origin(mut self, origin: [u64; 3]) -> Self {
        self.failing_origins.insert(origin);
        self
    }

    pub async fn specs(&self) -> Vec<VolumeSpec> {
        self.specs.read().await.clone()
    }

    /// Recorded writes, sorted by origin (workers finish in any order).
    pub async fn writes(&self) -> Vec<RecordedWrite> {
        let mut writes = self.writes.read().await.clone();
        writes.sort_by_key(|w| (w.region.origin[2], w.region.origin[1], w.region.origin[0]));
        writes
    }
}

#[async_trait]
impl VolumeSink for RecordingSink {
    async fn initialize(&self, spec: &VolumeSpec) -> Result<(), SinkError> {
        if self.fail_initialize {
            return Err(SinkError::Io(IoError::S3("AccessDenied".to_string())));
        }
        self.specs.write().await.push(spec.clone());
        Ok(())
    }

    async fn write_region(&self, region: &VoxelBox, tile: &TileBuffer) -> Result<(), SinkError> {
        if self.failing_origins.contains(&region.origin) {
            return Err(SinkError::Io(IoError::S3("InternalError".to_string())));
        }
        self.writes.write().await.push(RecordedWrite {
            region: *region,
            width: tile.width(),
            height: tile.height(),
            first_sample: tile.as_bytes().first().copied(),
        });
        Ok(())
    }
}

// =============================================================================
// Test Images
// =============================================================================

/// Encode a uniform 8-bit grayscale PNG.
pub fn gray_png(width: u32, height: u32, value: u8) -> Vec<u8> {
    encode_png(DynamicImage::ImageLuma8(GrayImage::from_pixel(
        width,
        height,
        Luma([value]),
    )))
}

/// Encode an 8-bit grayscale PNG whose sample at (x, y) is `f(x, y)`.
pub fn gray_png_with(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> Vec<u8> {
    encode_png(DynamicImage::ImageLuma8(GrayImage::from_fn(
        width,
        height,
        |x, y| Luma([f(x, y)]),
    )))
}

/// Encode a uniform 16-bit grayscale PNG.
pub fn gray16_png(width: u32, height: u32, value: u16) -> Vec<u8> {
    let image: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_pixel(width, height, Luma([value]));
    encode_png(DynamicImage::ImageLuma16(image))
}

fn encode_png(image: DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("PNG encoding");
    buf
}

// =============================================================================
// Test Manifests
// =============================================================================

/// The manifest of the Neha_1mm_ROI1 dataset.
pub fn neha_manifest_json() -> serde_json::Value {
    serde_json::json!({
        "Comment": "Neha_1mm_ROI1",
        "ServerType": "imagetiles",
        "SourceFileNameTemplate": ".\\mip0\\%04d_*\\%04d_*_tr%d-tc%d.png",
        "SourceParamSequence": "ssrc",
        "SourceMinS": 1,
        "SourceMaxS": 94,
        "SourceMinR": 1,
        "SourceMaxR": 36,
        "SourceMinC": 1,
        "SourceMaxC": 47,
        "SourceTileSizeX": 2048,
        "SourceTileSizeY": 2048,
        "SourceBytesPerPixel": 1,
        "MissingImagePolicy": "white",
        "TargetDataSizeX": 95567,
        "TargetDataSizeY": 73231,
        "TargetDataSizeZ": 94,
        "OffsetX": 0,
        "OffsetY": 0,
        "OffsetZ": 0,
        "TargetVoxelSizeXnm": 4,
        "TargetVoxelSizeYnm": 4,
        "TargetVoxelSizeZnm": 30,
        "TargetLayerName": "Neha_1mm_ROI1"
    })
}

/// A small dataset: 4x4 tiles, sections 1..=2, rows 1..=2, columns 1..=3,
/// 11x8x2 voxels (the last column is 3 voxels wide).
pub fn small_manifest_json() -> serde_json::Value {
    serde_json::json!({
        "SourceFileNameTemplate": "./mip0/%04d_*/%04d_*_tr%d-tc%d.png",
        "SourceParamSequence": "ssrc",
        "SourceMinS": 1,
        "SourceMaxS": 2,
        "SourceMinR": 1,
        "SourceMaxR": 2,
        "SourceMinC": 1,
        "SourceMaxC": 3,
        "SourceTileSizeX": 4,
        "SourceTileSizeY": 4,
        "SourceBytesPerPixel": 1,
        "TargetDataSizeX": 11,
        "TargetDataSizeY": 8,
        "TargetDataSizeZ": 2,
        "OffsetX": 0,
        "OffsetY": 0,
        "OffsetZ": 0,
        "TargetVoxelSizeXnm": 8,
        "TargetVoxelSizeYnm": 8,
        "TargetVoxelSizeZnm": 40
    })
}

pub fn manifest_from(value: &serde_json::Value) -> Manifest {
    Manifest::from_slice(value.to_string().as_bytes()).expect("valid manifest")
}

/// Key of a tile in the layout VAST exports (`mip0/0001_W01/0001_W01_tr1-tc2.png`).
pub fn tile_key(section: u32, row: u32, column: u32) -> String {
    format!(
        "mip0/{s:04}_W01/{s:04}_W01_tr{r}-tc{c}.png",
        s = section,
        r = row,
        c = column
    )
}
