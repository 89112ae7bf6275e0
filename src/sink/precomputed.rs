//! Neuroglancer precomputed volumes with raw chunk encoding.
//!
//! Layout under the store root:
//!
//! ```text
//! info                                  JSON metadata
//! {key}/{x0}-{x1}_{y0}-{y1}_{z0}-{z1}   one file per chunk
//! ```
//!
//! Chunk bounds are absolute (voxel offset included) and clipped to the volume
//! at its upper faces. Chunk bytes are little-endian samples in x-fastest,
//! then y, then z order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::{Encoding, VolumeSink, VolumeSpec};
use crate::error::{IoError, SinkError};
use crate::io::ObjectStore;
use crate::manifest::VoxelBox;
use crate::tile::{SampleType, TileBuffer};

/// Key of the metadata document.
pub const INFO_KEY: &str = "info";

/// The `info` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputedInfo {
    pub data_type: SampleType,
    pub num_channels: u32,
    pub scales: Vec<ScaleInfo>,
    #[serde(rename = "type")]
    pub layer_type: String,
}

/// One resolution level of a precomputed volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleInfo {
    pub chunk_sizes: Vec<[u32; 3]>,
    pub encoding: String,
    pub key: String,
    #[serde(serialize_with = "serialize_resolution")]
    pub resolution: [f64; 3],
    pub size: [u64; 3],
    pub voxel_offset: [i64; 3],
}

/// Whole-number resolutions are written as JSON integers (`[4, 4, 30]`).
fn serialize_resolution<S: Serializer>(resolution: &[f64; 3], serializer: S) -> Result<S::Ok, S::Error> {
    let mut tuple = serializer.serialize_tuple(3)?;
    for value in resolution {
        if value.fract() == 0.0 && value.abs() < 9.0e15 {
            tuple.serialize_element(&(*value as i64))?;
        } else {
            tuple.serialize_element(value)?;
        }
    }
    tuple.end()
}

/// Scale key derived from the resolution, e.g. `4_4_30`.
pub fn scale_key(resolution: &[f64; 3]) -> String {
    format!("{}_{}_{}", resolution[0], resolution[1], resolution[2])
}

impl PrecomputedInfo {
    pub fn from_spec(spec: &VolumeSpec) -> Self {
        Self {
            data_type: spec.sample_type,
            num_channels: spec.num_channels,
            scales: vec![ScaleInfo {
                chunk_sizes: vec![spec.chunk_size],
                encoding: spec.encoding.as_str().to_string(),
                key: scale_key(&spec.resolution),
                resolution: spec.resolution,
                size: spec.size,
                voxel_offset: spec.voxel_offset,
            }],
            layer_type: "image".to_string(),
        }
    }
}

/// Geometry fixed at initialization.
#[derive(Debug)]
struct ScaleLayout {
    spec: VolumeSpec,
    key: String,
}

impl ScaleLayout {
    fn new(spec: &VolumeSpec) -> Self {
        Self {
            spec: spec.clone(),
            key: scale_key(&spec.resolution),
        }
    }

    fn volume(&self) -> VoxelBox {
        VoxelBox::new([0, 0, 0], self.spec.size)
    }

    /// Chunk boxes (volume-relative, clipped to the volume) covering `region`.
    fn chunks_covering(&self, region: &VoxelBox) -> Vec<VoxelBox> {
        let size = self.spec.size;
        let chunk = self.spec.chunk_size.map(u64::from);
        let end = region.end();
        let first: [u64; 3] = std::array::from_fn(|a| region.origin[a] / chunk[a]);
        let last: [u64; 3] = std::array::from_fn(|a| (end[a] - 1) / chunk[a]);

        let mut chunks = Vec::new();
        for gz in first[2]..=last[2] {
            for gy in first[1]..=last[1] {
                for gx in first[0]..=last[0] {
                    let origin = [gx * chunk[0], gy * chunk[1], gz * chunk[2]];
                    let shape: [u64; 3] =
                        std::array::from_fn(|a| chunk[a].min(size[a] - origin[a]));
                    chunks.push(VoxelBox::new(origin, shape));
                }
            }
        }
        chunks
    }

    fn chunk_key(&self, chunk: &VoxelBox) -> String {
        let offset = self.spec.voxel_offset;
        let end = chunk.end();
        let lo: [i64; 3] = std::array::from_fn(|a| chunk.origin[a] as i64 + offset[a]);
        let hi: [i64; 3] = std::array::from_fn(|a| end[a] as i64 + offset[a]);
        format!(
            "{}/{}-{}_{}-{}_{}-{}",
            self.key, lo[0], hi[0], lo[1], hi[1], lo[2], hi[2]
        )
    }

    fn chunk_bytes(&self, chunk: &VoxelBox) -> usize {
        chunk.voxel_count() as usize * self.spec.sample_type.byte_width()
    }
}

/// Copy the part of `tile` (placed at `region`) that falls in `overlap` into
/// the chunk buffer `data` covering `chunk`.
fn copy_into_chunk(
    data: &mut [u8],
    chunk: &VoxelBox,
    tile: &TileBuffer,
    region: &VoxelBox,
    overlap: &VoxelBox,
) {
    let width = tile.sample_type().byte_width();
    let run = overlap.shape[0] as usize * width;
    let src_x = (overlap.origin[0] - region.origin[0]) as usize * width;
    let [chunk_x, chunk_y, _] = chunk.shape.map(|s| s as usize);

    let z = (overlap.origin[2] - chunk.origin[2]) as usize;
    for y in overlap.origin[1]..overlap.end()[1] {
        let Some(row) = tile.row((y - region.origin[1]) as u32) else {
            continue;
        };
        let dst_y = (y - chunk.origin[1]) as usize;
        let dst_x = (overlap.origin[0] - chunk.origin[0]) as usize;
        let dst = ((z * chunk_y + dst_y) * chunk_x + dst_x) * width;
        data[dst..dst + run].copy_from_slice(&row[src_x..src_x + run]);
    }
}

/// Write locks for chunks that currently have a writer.
///
/// Entries are dropped once their last holder releases them.
#[derive(Default)]
struct ChunkLocks {
    held: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ChunkLocks {
    fn acquire(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(held.entry(key.to_string()).or_default())
    }

    fn release(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and `lock` itself are the only references left
        if Arc::strong_count(&lock) == 2 {
            held.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// [`VolumeSink`] writing a single-scale precomputed volume.
///
/// Chunks only partially covered by a write are read back, merged and
/// rewritten; chunks that do not exist yet are treated as zero-filled.
/// Every chunk write holds that chunk's lock, so a tile spilling into a
/// neighbour's chunk merges with the neighbour instead of overwriting it.
pub struct PrecomputedSink {
    store: Arc<dyn ObjectStore>,
    layout: OnceLock<ScaleLayout>,
    locks: ChunkLocks,
}

impl PrecomputedSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            layout: OnceLock::new(),
            locks: ChunkLocks::default(),
        }
    }

    /// The metadata written at initialization, if any.
    pub fn info(&self) -> Option<PrecomputedInfo> {
        self.layout
            .get()
            .map(|layout| PrecomputedInfo::from_spec(&layout.spec))
    }

    fn check_spec(existing: &VolumeSpec, requested: &VolumeSpec) -> Result<(), SinkError> {
        if existing == requested {
            Ok(())
        } else {
            Err(SinkError::Conflict(format!(
                "existing {:?}, requested {:?}",
                existing, requested
            )))
        }
    }

    async fn read_chunk(&self, key: &str, expected: usize) -> Result<Vec<u8>, SinkError> {
        match self.store.get(key).await {
            Ok(bytes) if bytes.len() == expected => Ok(bytes.to_vec()),
            Ok(bytes) => Err(SinkError::CorruptChunk {
                key: key.to_string(),
                expected,
                actual: bytes.len(),
            }),
            Err(IoError::NotFound(_)) => Ok(vec![0; expected]),
            Err(e) => Err(e.into()),
        }
    }

    /// Merge the `overlap` part of `tile` into one chunk.
    async fn write_chunk(
        &self,
        layout: &ScaleLayout,
        chunk: &VoxelBox,
        overlap: &VoxelBox,
        region: &VoxelBox,
        tile: &TileBuffer,
    ) -> Result<(), SinkError> {
        let key = layout.chunk_key(chunk);
        let expected = layout.chunk_bytes(chunk);

        let lock = self.locks.acquire(&key);
        let result = async {
            let _guard = lock.lock().await;
            let mut data = if overlap == chunk {
                vec![0; expected]
            } else {
                self.read_chunk(&key, expected).await?
            };
            copy_into_chunk(&mut data, chunk, tile, region, overlap);
            self.store.put(&key, Bytes::from(data)).await?;
            Ok::<_, SinkError>(())
        }
        .await;
        self.locks.release(&key, lock);

        if result.is_ok() {
            debug!(chunk = %key, "Wrote chunk");
        }
        result
    }
}

fn validate_spec(spec: &VolumeSpec) -> Result<(), SinkError> {
    if spec.chunk_size.iter().any(|&c| c == 0) {
        return Err(SinkError::Conflict(format!(
            "chunk size must be positive, got {:?}",
            spec.chunk_size
        )));
    }
    if spec.num_channels != 1 {
        return Err(SinkError::Conflict(format!(
            "only single-channel volumes are supported, got {}",
            spec.num_channels
        )));
    }
    if spec.encoding != Encoding::Raw {
        return Err(SinkError::Conflict(format!(
            "unsupported encoding {}",
            spec.encoding
        )));
    }
    Ok(())
}

#[async_trait]
impl VolumeSink for PrecomputedSink {
    async fn initialize(&self, spec: &VolumeSpec) -> Result<(), SinkError> {
        if let Some(layout) = self.layout.get() {
            return Self::check_spec(&layout.spec, spec);
        }
        validate_spec(spec)?;

        let info = PrecomputedInfo::from_spec(spec);
        let body =
            serde_json::to_vec_pretty(&info).map_err(|e| SinkError::Serialization(e.to_string()))?;
        self.store.put(INFO_KEY, Bytes::from(body)).await?;

        if let Err(rejected) = self.layout.set(ScaleLayout::new(spec)) {
            // Lost a race against a concurrent initialize
            if let Some(layout) = self.layout.get() {
                return Self::check_spec(&layout.spec, &rejected.spec);
            }
        }

        info!(
            location = %self.store.identifier(INFO_KEY),
            scale = %scale_key(&spec.resolution),
            size = ?spec.size,
            chunk_size = ?spec.chunk_size,
            data_type = %spec.sample_type,
            "Initialized precomputed volume"
        );
        Ok(())
    }

    async fn write_region(&self, region: &VoxelBox, tile: &TileBuffer) -> Result<(), SinkError> {
        let layout = self.layout.get().ok_or(SinkError::NotInitialized)?;

        if tile.sample_type() != layout.spec.sample_type {
            return Err(SinkError::SampleTypeMismatch {
                expected: layout.spec.sample_type.to_string(),
                actual: tile.sample_type().to_string(),
            });
        }
        if region.shape != [tile.width() as u64, tile.height() as u64, 1] {
            return Err(SinkError::ShapeMismatch {
                width: tile.width(),
                height: tile.height(),
                shape: region.shape,
            });
        }

        let clipped = region
            .intersection(&layout.volume())
            .ok_or(SinkError::OutOfBounds {
                origin: region.origin,
                shape: region.shape,
                size: layout.spec.size,
            })?;

        for chunk in layout.chunks_covering(&clipped) {
            let Some(overlap) = clipped.intersection(&chunk) else {
                continue;
            };
            self.write_chunk(layout, &chunk, &overlap, region, tile)
                .await?;
        }
        Ok(())
    }
}
