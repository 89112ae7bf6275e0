//! VAST `.vsvi` manifest handling.
//!
//! # Components
//!
//! - [`Manifest`]: the parsed and validated manifest document
//! - [`FilenameTemplate`] / [`TileNaming`]: recover grid indices from tile file names
//! - [`GridMapper`]: turn grid indices into destination voxel regions

mod grid;
mod model;
mod template;

pub use grid::{GridIndex, GridMapper, VoxelBox};
pub use model::Manifest;
pub use template::{FilenameTemplate, GridParam, TileNaming, DEFAULT_PARAM_SEQUENCE};
