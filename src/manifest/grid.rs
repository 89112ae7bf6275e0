//! Grid index to voxel region mapping.
//!
//! Source tiles are addressed by (section, row, column). In the destination
//! volume a tile at zero-based offsets `(s', r', c')` occupies
//! `[c' * tile_x, ...) x [r' * tile_y, ...) x [s', s' + 1)`.

use std::ops::RangeInclusive;

use crate::error::{GridAxis, GridError};

/// A tile's position in the source tiling scheme, as parsed from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridIndex {
    /// Section (z)
    pub section: u64,
    /// Row (y)
    pub row: u64,
    /// Column (x)
    pub column: u64,
}

/// An axis-aligned, half-open box of voxels in (x, y, z) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoxelBox {
    pub origin: [u64; 3],
    pub shape: [u64; 3],
}

impl VoxelBox {
    pub fn new(origin: [u64; 3], shape: [u64; 3]) -> Self {
        Self { origin, shape }
    }

    /// Exclusive upper corner.
    pub fn end(&self) -> [u64; 3] {
        [
            self.origin[0] + self.shape[0],
            self.origin[1] + self.shape[1],
            self.origin[2] + self.shape[2],
        ]
    }

    /// Number of voxels in the box.
    pub fn voxel_count(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Overlap of two boxes, or `None` when they are disjoint.
    pub fn intersection(&self, other: &VoxelBox) -> Option<VoxelBox> {
        let (a_end, b_end) = (self.end(), other.end());
        let mut origin = [0u64; 3];
        let mut shape = [0u64; 3];
        for axis in 0..3 {
            let lo = self.origin[axis].max(other.origin[axis]);
            let hi = a_end[axis].min(b_end[axis]);
            if hi <= lo {
                return None;
            }
            origin[axis] = lo;
            shape[axis] = hi - lo;
        }
        Some(VoxelBox { origin, shape })
    }
}

/// Maps parsed grid indices onto destination voxel regions.
///
/// Pure and cheap to clone; shared by every ingestion worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridMapper {
    sections: RangeInclusive<i64>,
    rows: RangeInclusive<i64>,
    columns: RangeInclusive<i64>,
    tile_size: [u32; 2],
}

impl GridMapper {
    /// Create a mapper from declared index bounds and tile pixel size.
    pub fn new(
        sections: RangeInclusive<i64>,
        rows: RangeInclusive<i64>,
        columns: RangeInclusive<i64>,
        tile_size_x: u32,
        tile_size_y: u32,
    ) -> Self {
        Self {
            sections,
            rows,
            columns,
            tile_size: [tile_size_x, tile_size_y],
        }
    }

    /// (axis, parsed index, declared range) in x, y, z order.
    fn axes(&self, index: GridIndex) -> [(GridAxis, u64, &RangeInclusive<i64>); 3] {
        [
            (GridAxis::Column, index.column, &self.columns),
            (GridAxis::Row, index.row, &self.rows),
            (GridAxis::Section, index.section, &self.sections),
        ]
    }

    /// Zero-based offset of `value` within an axis range.
    fn offset(axis: GridAxis, value: u64, range: &RangeInclusive<i64>) -> Result<u64, GridError> {
        let signed = i64::try_from(value).map_err(|_| out_of_range(axis, value, range))?;
        if !range.contains(&signed) {
            return Err(out_of_range(axis, value, range));
        }
        // Spans up to u64::MAX when the range covers all of i64
        u64::try_from(i128::from(signed) - i128::from(*range.start()))
            .map_err(|_| out_of_range(axis, value, range))
    }

    /// Zero-based (column, row, section) offsets of a tile.
    pub fn grid_offsets(&self, index: GridIndex) -> Result<[u64; 3], GridError> {
        let [x, y, z] = self.axes(index);
        Ok([
            Self::offset(x.0, x.1, x.2)?,
            Self::offset(y.0, y.1, y.2)?,
            Self::offset(z.0, z.1, z.2)?,
        ])
    }

    /// Voxel origin of a tile: `(c' * tile_x, r' * tile_y, s')`.
    ///
    /// An origin that does not fit in `u64` is reported as out of range.
    pub fn origin(&self, index: GridIndex) -> Result<[u64; 3], GridError> {
        let offsets = self.grid_offsets(index)?;
        let scale = [u64::from(self.tile_size[0]), u64::from(self.tile_size[1]), 1];
        let axes = self.axes(index);

        let mut origin = [0u64; 3];
        for axis in 0..3 {
            let (name, value, range) = axes[axis];
            origin[axis] = offsets[axis]
                .checked_mul(scale[axis])
                .ok_or_else(|| out_of_range(name, value, range))?;
        }
        Ok(origin)
    }

    /// Destination region for a tile whose decoded image is `width x height`.
    ///
    /// The decoded extent is used rather than the declared tile size, so
    /// undersized edge tiles keep their real footprint.
    pub fn region(&self, index: GridIndex, width: u32, height: u32) -> Result<VoxelBox, GridError> {
        let origin = self.origin(index)?;
        let shape = [u64::from(width), u64::from(height), 1];
        for (axis, (name, value, range)) in self.axes(index).into_iter().enumerate() {
            if origin[axis].checked_add(shape[axis]).is_none() {
                return Err(out_of_range(name, value, range));
            }
        }
        Ok(VoxelBox::new(origin, shape))
    }
}

fn out_of_range(axis: GridAxis, value: u64, range: &RangeInclusive<i64>) -> GridError {
    GridError::OutOfRange {
        axis,
        value,
        min: *range.start(),
        max: *range.end(),
    }
}
