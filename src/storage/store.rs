use std::sync::Arc;

use crate::foundation::core::{Selection, Shape5};
use crate::foundation::error::TessellaResult;
use crate::storage::dtype::ElementType;
use crate::storage::spec::{ReadSpec, WriteSpec};

/// Read handle over one chunked array.
///
/// Handles are shareable across concurrent reads and expose no mutation.
pub trait ArrayReader: Send + Sync {
    /// Declared extents of the array.
    fn shape(&self) -> Shape5;

    /// Element type of the array.
    fn dtype(&self) -> ElementType;

    /// Read `sel` into `dst` as a row-major `(y, x)` buffer.
    ///
    /// `dst` must hold exactly `sel.len_elements() * dtype().width()` bytes.
    fn read_rect(&self, sel: &Selection, dst: &mut [u8]) -> TessellaResult<()>;
}

impl std::fmt::Debug for dyn ArrayReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn ArrayReader")
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .finish()
    }
}

/// Write handle over one chunked array.
///
/// Concurrent writes to disjoint rectangles must be safe; callers never issue
/// concurrent writes to overlapping rectangles.
pub trait ArrayWriter: Send + Sync {
    /// Declared extents of the array.
    fn shape(&self) -> Shape5;

    /// Write `src` (row-major `(y, x)`) over `sel`.
    fn write_rect(&self, sel: &Selection, src: &[u8]) -> TessellaResult<()>;
}

/// Backend contract for chunked-array storage and sidecar files.
///
/// This is the seam to the external storage driver. The compositor consumes
/// arrays and plain-text sidecar files through it and never touches the
/// filesystem directly; [`crate::MemoryStore`] is the in-process reference
/// implementation.
pub trait ArrayStore: Send + Sync {
    /// Open an existing array read-only.
    fn open_read(&self, spec: &ReadSpec) -> TessellaResult<Arc<dyn ArrayReader>>;

    /// Create an array, removing any existing one at the same path.
    fn open_write(&self, spec: &WriteSpec) -> TessellaResult<Arc<dyn ArrayWriter>>;

    /// Read a sidecar text file.
    fn read_text(&self, path: &str) -> TessellaResult<String>;

    /// Write a sidecar text file, replacing any existing content.
    fn write_text(&self, path: &str, text: &str) -> TessellaResult<()>;

    /// Remove everything at or under `path`. Removing a missing path is not
    /// an error.
    fn remove_tree(&self, path: &str) -> TessellaResult<()>;

    /// Return `true` when anything exists at or under `path`.
    fn exists(&self, path: &str) -> bool;
}

/// Join two store path segments with a single `/`.
///
/// Store paths use `/` separators regardless of platform.
pub fn join_path(base: &str, seg: &str) -> String {
    let base = base.trim_end_matches('/');
    let seg = seg.trim_start_matches('/');
    if base.is_empty() {
        return seg.to_string();
    }
    if seg.is_empty() {
        return base.to_string();
    }
    format!("{base}/{seg}")
}

#[cfg(test)]
#[path = "../../tests/unit/storage/store.rs"]
mod tests;
