//! Destination volumes.
//!
//! # Components
//!
//! - [`VolumeSink`]: the seam the ingestion pipeline writes through
//! - [`VolumeSpec`]: geometry and sample format of the destination volume
//! - [`PrecomputedSink`]: Neuroglancer precomputed (raw encoding) on any [`ObjectStore`](crate::io::ObjectStore)

mod precomputed;

use std::fmt;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::manifest::VoxelBox;
use crate::tile::{SampleType, TileBuffer};

pub use precomputed::{PrecomputedInfo, PrecomputedSink, ScaleInfo, INFO_KEY};

/// Chunk encoding of the destination volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Uncompressed little-endian samples
    Raw,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a single-scale destination volume.
///
/// Sizes and offsets are in (x, y, z) order; resolution is in nanometres.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSpec {
    pub chunk_size: [u32; 3],
    pub size: [u64; 3],
    pub voxel_offset: [i64; 3],
    pub resolution: [f64; 3],
    pub sample_type: SampleType,
    pub num_channels: u32,
    pub encoding: Encoding,
}

/// A chunked destination volume.
///
/// Regions passed to [`write_region`](VolumeSink::write_region) are relative
/// to the volume's voxel offset. Implementations must accept concurrent
/// writes, including writes of regions that share a chunk.
#[async_trait]
pub trait VolumeSink: Send + Sync {
    /// Create (or reopen) the volume. Repeating the call with the same spec
    /// is a no-op; a different spec is rejected.
    async fn initialize(&self, spec: &VolumeSpec) -> Result<(), SinkError>;

    /// Store `tile` at `region`, whose shape must be `[width, height, 1]`.
    ///
    /// Parts of the region beyond the volume are dropped; a region entirely
    /// outside the volume is an error.
    async fn write_region(&self, region: &VoxelBox, tile: &TileBuffer) -> Result<(), SinkError>;
}
