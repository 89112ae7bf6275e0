//! Decoded tile pixels in destination sample layout.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width of one destination sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Uint8,
    Uint16,
}

impl SampleType {
    /// Map a manifest `SourceBytesPerPixel` value to a sample type.
    pub fn from_bytes_per_pixel(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(SampleType::Uint8),
            2 => Some(SampleType::Uint16),
            _ => None,
        }
    }

    /// Number of bytes per sample.
    #[inline]
    pub fn byte_width(self) -> usize {
        match self {
            SampleType::Uint8 => 1,
            SampleType::Uint16 => 2,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleType::Uint8 => write!(f, "uint8"),
            SampleType::Uint16 => write!(f, "uint16"),
        }
    }
}

/// A single decoded tile, one z-slice deep.
///
/// Samples are stored little-endian with x varying fastest, then y. A decoded
/// image row `y` therefore occupies bytes
/// `[y * width * byte_width, (y + 1) * width * byte_width)`. This is the
/// column-major (x, y) order the precomputed raw encoding expects, so the
/// image-space (row, column) to volume-space (x, y) transpose needs no copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBuffer {
    width: u32,
    height: u32,
    sample_type: SampleType,
    data: Vec<u8>,
}

impl TileBuffer {
    /// Wrap raw little-endian sample bytes.
    ///
    /// Returns `None` when `data` is not exactly `width * height` samples.
    pub fn new(width: u32, height: u32, sample_type: SampleType, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * sample_type.byte_width();
        if data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            sample_type,
            data,
        })
    }

    /// Build an 8-bit buffer from samples in x-fastest order.
    pub fn from_u8(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        Self::new(width, height, SampleType::Uint8, samples)
    }

    /// Build a 16-bit buffer from samples in x-fastest order.
    pub fn from_u16(width: u32, height: u32, samples: &[u16]) -> Option<Self> {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(width, height, SampleType::Uint16, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Raw little-endian sample bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of row `y`, or `None` past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.row_stride();
        let start = y as usize * stride;
        Some(&self.data[start..start + stride])
    }

    /// Number of bytes in one row.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.sample_type.byte_width()
    }
}
