//! The `.vsvi` manifest document.

use serde::Deserialize;
use tracing::debug;

use crate::error::{IoError, ManifestError};
use crate::io::ObjectStore;
use crate::sink::{Encoding, VolumeSpec};
use crate::tile::SampleType;

use super::grid::GridMapper;
use super::template::TileNaming;

/// Declared geometry and naming scheme of a VAST tile set.
///
/// Field names follow the JSON keys written by VAST (`SourceMinS`,
/// `TargetVoxelSizeXnm`, ...). Every geometry field is required; keys this
/// crate does not use (`ServerType`, `MipMap*`, `MissingImagePolicy`, ...) are
/// ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    /// Printf-style tile path template, e.g. `./mip0/%04d_*/%04d_*_tr%d-tc%d.png`
    pub source_file_name_template: String,

    /// Letter per template placeholder (`s`ection, `r`ow, `c`olumn, `m`ip)
    pub source_param_sequence: Option<String>,

    pub source_min_s: i64,
    pub source_max_s: i64,
    pub source_min_r: i64,
    pub source_max_r: i64,
    pub source_min_c: i64,
    pub source_max_c: i64,

    pub source_tile_size_x: u32,
    pub source_tile_size_y: u32,

    /// 1 for 8-bit, 2 for 16-bit samples
    pub source_bytes_per_pixel: u8,

    pub target_data_size_x: u64,
    pub target_data_size_y: u64,
    pub target_data_size_z: u64,

    pub offset_x: i64,
    pub offset_y: i64,
    pub offset_z: i64,

    pub target_voxel_size_xnm: f64,
    pub target_voxel_size_ynm: f64,
    pub target_voxel_size_znm: f64,

    pub target_layer_name: Option<String>,
    pub comment: Option<String>,
}

impl Manifest {
    /// Parse and validate a manifest document.
    ///
    /// Backslashes are rewritten to forward slashes before parsing, so
    /// `.\\mip0\\...` templates work. An escaped pair becomes a single `/`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ManifestError::Malformed(format!("not UTF-8: {}", e)))?;
        let normalized = text.replace("\\\\", "/").replace('\\', "/");

        let manifest: Manifest = serde_json::from_str(&normalized)
            .map_err(|e| ManifestError::Malformed(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest stored under `key` in `store`.
    pub async fn load(store: &dyn ObjectStore, key: &str) -> Result<Self, ManifestError> {
        let location = store.identifier(key);
        let bytes = store.get(key).await.map_err(|e| ManifestError::NotFound {
            location: location.clone(),
            reason: match e {
                IoError::NotFound(_) => "no such file or object".to_string(),
                other => other.to_string(),
            },
        })?;

        debug!(location = %location, size = bytes.len(), "Read manifest");
        Self::from_slice(&bytes)
    }

    /// Check the invariants the rest of the pipeline relies on.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (axis, min, max) in [
            ("S", self.source_min_s, self.source_max_s),
            ("R", self.source_min_r, self.source_max_r),
            ("C", self.source_min_c, self.source_max_c),
        ] {
            if min > max {
                return Err(ManifestError::Malformed(format!(
                    "SourceMin{axis} ({min}) is greater than SourceMax{axis} ({max})"
                )));
            }
        }

        if self.source_tile_size_x == 0 || self.source_tile_size_y == 0 {
            return Err(ManifestError::Malformed(format!(
                "tile size must be positive, got {}x{}",
                self.source_tile_size_x, self.source_tile_size_y
            )));
        }

        if SampleType::from_bytes_per_pixel(self.source_bytes_per_pixel).is_none() {
            return Err(ManifestError::Malformed(format!(
                "SourceBytesPerPixel must be 1 or 2, got {}",
                self.source_bytes_per_pixel
            )));
        }

        self.tile_naming()?;
        Ok(())
    }

    /// Destination sample width.
    pub fn sample_type(&self) -> SampleType {
        // validate() rejects anything but 1 and 2
        SampleType::from_bytes_per_pixel(self.source_bytes_per_pixel).unwrap_or(SampleType::Uint8)
    }

    /// Compile the filename template together with the parameter sequence.
    pub fn tile_naming(&self) -> Result<TileNaming, ManifestError> {
        TileNaming::new(
            &self.source_file_name_template,
            self.source_param_sequence.as_deref(),
        )
        .map_err(|e| ManifestError::Malformed(e.to_string()))
    }

    /// Mapper from grid indices to voxel regions.
    pub fn grid_mapper(&self) -> GridMapper {
        GridMapper::new(
            self.source_min_s..=self.source_max_s,
            self.source_min_r..=self.source_max_r,
            self.source_min_c..=self.source_max_c,
            self.source_tile_size_x,
            self.source_tile_size_y,
        )
    }

    /// Directory, relative to the manifest, that holds the tiles.
    ///
    /// This is the template's first path segment (`mip0` for
    /// `./mip0/%04d_*/...`), or an empty string when tiles sit next to the
    /// manifest or the first segment is itself templated.
    pub fn tile_prefix(&self) -> String {
        self.tile_naming()
            .ok()
            .and_then(|naming| naming.template().leading_directory().map(str::to_string))
            .unwrap_or_default()
    }

    /// Destination volume description.
    ///
    /// Chunks are one tile wide and one section deep.
    pub fn volume_spec(&self) -> VolumeSpec {
        VolumeSpec {
            chunk_size: [self.source_tile_size_x, self.source_tile_size_y, 1],
            size: [
                self.target_data_size_x,
                self.target_data_size_y,
                self.target_data_size_z,
            ],
            voxel_offset: [self.offset_x, self.offset_y, self.offset_z],
            resolution: [
                self.target_voxel_size_xnm,
                self.target_voxel_size_ynm,
                self.target_voxel_size_znm,
            ],
            sample_type: self.sample_type(),
            num_channels: 1,
            encoding: Encoding::Raw,
        }
    }
}
