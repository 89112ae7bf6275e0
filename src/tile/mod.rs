//! Tile pixel handling.
//!
//! # Components
//!
//! - [`TileBuffer`]: decoded samples of one tile, x-fastest, little-endian
//! - [`SampleType`]: destination sample width (8 or 16 bit)
//! - [`TileDecoder`]: decodes PNG/JPEG/TIFF tile files into a [`TileBuffer`]

mod buffer;
mod decoder;

pub use buffer::{SampleType, TileBuffer};
pub use decoder::{is_image_key, TileDecoder, IMAGE_EXTENSIONS};
