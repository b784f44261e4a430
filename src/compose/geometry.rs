use std::collections::BTreeMap;

use crate::compose::map::CompositionMap;
use crate::foundation::core::{PixelRange, Shape5};
use crate::foundation::error::{TessellaError, TessellaResult};

/// Immutable geometry snapshot of one composition.
///
/// Derived once in `set_composition` from the grid bounds and the per-level
/// unit tile shapes; every later per-chunk request validates against this
/// snapshot without revisiting source metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlateGeometry {
    channels: u64,
    grid_rows: u64,
    grid_cols: u64,
    unit_shapes: BTreeMap<u32, (u64, u64)>,
}

impl PlateGeometry {
    /// Build the snapshot from a composition map and the discovered
    /// per-level unit tile shapes `(H_L, W_L)`.
    pub fn new(map: &CompositionMap, unit_shapes: BTreeMap<u32, (u64, u64)>) -> Self {
        Self {
            channels: map.channels(),
            grid_rows: map.rows(),
            grid_cols: map.cols(),
            unit_shapes,
        }
    }

    /// Channel count of the plate.
    pub fn channels(&self) -> u64 {
        self.channels
    }

    /// Levels of the composition, ascending.
    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.unit_shapes.keys().copied()
    }

    /// Unit tile shape `(H_L, W_L)` at `level`.
    pub fn unit_shape(&self, level: u32) -> Option<(u64, u64)> {
        self.unit_shapes.get(&level).copied()
    }

    /// Plate shape `(1, C, 1, R*H_L, K*W_L)` at `level`.
    pub fn plate_shape(&self, level: u32) -> Option<Shape5> {
        let (h, w) = self.unit_shape(level)?;
        Some(Shape5::plate(
            self.channels,
            self.grid_rows * h,
            self.grid_cols * w,
        ))
    }

    /// Plate shapes for every level, ascending.
    pub fn plate_shapes(&self) -> BTreeMap<u32, Shape5> {
        self.levels()
            .filter_map(|l| Some((l, self.plate_shape(l)?)))
            .collect()
    }

    /// Output region in plate coordinates covered by chunk
    /// `(y_chunk, x_chunk)` at `level`, clipped to the plate extent.
    ///
    /// A chunk exists iff its origin lies inside the extent (half-open
    /// rule), so the last partial chunk is addressable and the next index
    /// past it is rejected.
    pub fn chunk_region(
        &self,
        level: u32,
        y_chunk: u64,
        x_chunk: u64,
        chunk_edge: u64,
    ) -> TessellaResult<(PixelRange, PixelRange)> {
        let plate = self
            .plate_shape(level)
            .ok_or(TessellaError::UnknownLevel { level })?;
        let (height, width) = (plate.height(), plate.width());

        let y0 = y_chunk * chunk_edge;
        if y0 >= height {
            return Err(TessellaError::OutOfRange {
                axis: "y",
                index: y_chunk,
                chunks: height.div_ceil(chunk_edge),
            });
        }
        let x0 = x_chunk * chunk_edge;
        if x0 >= width {
            return Err(TessellaError::OutOfRange {
                axis: "x",
                index: x_chunk,
                chunks: width.div_ceil(chunk_edge),
            });
        }

        let y = PixelRange::new(y0, (y0 + chunk_edge).min(height))?;
        let x = PixelRange::new(x0, (x0 + chunk_edge).min(width))?;
        Ok((y, x))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/geometry.rs"]
mod tests;
