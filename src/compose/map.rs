use std::collections::{BTreeMap, BTreeSet};

use crate::foundation::core::GridKey;
use crate::foundation::error::{TessellaError, TessellaResult};

/// Mapping from grid positions to unit-pyramid directory names.
///
/// The map is replaced wholesale by
/// [`crate::PyramidCompositor::set_composition`]; afterwards it is read-only.
/// Values are resolved relative to the compositor's input root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositionMap {
    entries: BTreeMap<GridKey, String>,
}

impl CompositionMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `source` to the grid position `key`, replacing any previous
    /// assignment.
    pub fn insert(&mut self, key: GridKey, source: impl Into<String>) {
        self.entries.insert(key, source.into());
    }

    /// Return `true` when no position is populated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of populated positions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Grid column count `K = max(col) + 1` (0 when empty).
    pub fn cols(&self) -> u64 {
        self.entries
            .keys()
            .map(|k| u64::from(k.col) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Grid row count `R = max(row) + 1` (0 when empty).
    pub fn rows(&self) -> u64 {
        self.entries
            .keys()
            .map(|k| u64::from(k.row) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Channel count `C = max(channel) + 1` (0 when empty).
    pub fn channels(&self) -> u64 {
        self.entries
            .keys()
            .map(|k| u64::from(k.channel) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Source assigned to `(col, row, channel)`, if inside the grid.
    pub fn source_at(&self, col: u32, row: u32, channel: u32) -> Option<&str> {
        self.entries
            .get(&GridKey { col, row, channel })
            .map(String::as_str)
    }

    /// Distinct source names, in deterministic order.
    pub fn distinct_sources(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.entries.values().map(String::as_str).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Check that the map is non-empty and rectangularly dense: every
    /// `(col, row, channel)` in `[0,K)x[0,R)x[0,C)` must be populated.
    pub fn validate_dense(&self) -> TessellaResult<()> {
        if self.is_empty() {
            return Err(TessellaError::geometry("composition map is empty"));
        }
        let (cols, rows, channels) = (self.cols(), self.rows(), self.channels());
        let expected = cols * rows * channels;
        if self.entries.len() as u64 == expected {
            return Ok(());
        }
        for channel in 0..channels {
            for row in 0..rows {
                for col in 0..cols {
                    let key = GridKey {
                        col: col as u32,
                        row: row as u32,
                        channel: channel as u32,
                    };
                    if !self.entries.contains_key(&key) {
                        return Err(TessellaError::geometry(format!(
                            "composition grid is missing (col {col}, row {row}, channel {channel}) \
                             within its {cols}x{rows}x{channels} bounding box"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromIterator<(GridKey, String)> for CompositionMap {
    fn from_iter<I: IntoIterator<Item = (GridKey, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/map.rs"]
mod tests;
