//! Source tile decoder.
//!
//! Decodes PNG, JPEG and TIFF tile files into [`TileBuffer`]s at the sample
//! width declared by the manifest.
//!
//! # Design Decisions
//!
//! - **Format sniffing**: the container format is guessed from the leading
//!   bytes, not from the key's extension.
//!
//! - **Single channel**: destination volumes have one channel. Color tiles are
//!   converted to luma rather than rejected.

use std::io::Cursor;

use image::{DynamicImage, ImageReader};

use super::buffer::{SampleType, TileBuffer};

/// File extensions the pipeline treats as tile images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Check whether a key names an image by its extension (case-insensitive).
pub fn is_image_key(key: &str) -> bool {
    let name = key.rsplit(['/', '\\']).next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => IMAGE_EXTENSIONS
            .iter()
            .any(|candidate| ext.eq_ignore_ascii_case(candidate)),
        _ => false,
    }
}

/// Decoder from encoded tile bytes to destination samples.
///
/// # Example
///
/// ```ignore
/// use vsvi_precomputed::tile::{SampleType, TileDecoder};
///
/// let decoder = TileDecoder::new(SampleType::Uint8);
/// let tile = decoder.decode(&png_bytes)?;
/// println!("{}x{}", tile.width(), tile.height());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TileDecoder {
    sample_type: SampleType,
}

impl TileDecoder {
    /// Create a decoder producing samples of the given width.
    pub fn new(sample_type: SampleType) -> Self {
        Self { sample_type }
    }

    /// Decode encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns the codec's message if the format cannot be recognized or the
    /// data is corrupt.
    pub fn decode(&self, source: &[u8]) -> Result<TileBuffer, String> {
        let reader = ImageReader::new(Cursor::new(source))
            .with_guessed_format()
            .map_err(|e| e.to_string())?;

        if reader.format().is_none() {
            return Err("unrecognized image format".to_string());
        }

        let img = reader.decode().map_err(|e| e.to_string())?;
        self.convert(img)
    }

    fn convert(&self, img: DynamicImage) -> Result<TileBuffer, String> {
        let (width, height) = (img.width(), img.height());
        let buffer = match self.sample_type {
            SampleType::Uint8 => TileBuffer::from_u8(width, height, img.into_luma8().into_raw()),
            SampleType::Uint16 => {
                TileBuffer::from_u16(width, height, img.into_luma16().as_raw())
            }
        };
        buffer.ok_or_else(|| format!("decoded buffer does not match {}x{}", width, height))
    }
}
