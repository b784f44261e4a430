use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::foundation::core::{AXIS_C, AXIS_T, AXIS_X, AXIS_Y, AXIS_Z, Selection, Shape5};
use crate::foundation::error::{TessellaError, TessellaResult};
use crate::storage::dtype::ElementType;
use crate::storage::spec::{ReadSpec, WriteSpec};
use crate::storage::store::{ArrayReader, ArrayStore, ArrayWriter};

/// In-process [`ArrayStore`] used by the test suite and as a reference
/// backend.
///
/// Arrays are contiguous zero-initialized byte buffers; the declared chunk
/// shape is recorded but storage is not actually chunked. Tile reads are
/// counted, which lets tests observe that a repeated chunk write performs no
/// source work.
#[derive(Default)]
pub struct MemoryStore {
    arrays: RwLock<HashMap<String, Arc<MemArray>>>,
    files: RwLock<HashMap<String, String>>,
    reads: Arc<AtomicU64>,
}

struct MemArray {
    shape: Shape5,
    chunk_shape: Shape5,
    dtype: ElementType,
    data: Mutex<Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read_rect` calls served so far, across all arrays.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Declared chunk shape of the array at `path`, if one exists.
    pub fn chunk_shape(&self, path: &str) -> Option<Shape5> {
        self.arrays_read().get(path).map(|a| a.chunk_shape)
    }

    fn arrays_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<MemArray>>> {
        self.arrays.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn arrays_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<MemArray>>> {
        self.arrays.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn files_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, String>> {
        self.files.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn files_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.files.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemArray {
    /// Byte offset of `(t, c, z, y, x.start)` and the row span in bytes.
    fn row_span(&self, sel: &Selection, y: u64) -> (usize, usize) {
        let [_, channels, layers, height, width] = self.shape.0;
        let esize = self.dtype.width() as u64;
        let flat =
            (((sel.t * channels + sel.c) * layers + sel.z) * height + y) * width + sel.x.start;
        ((flat * esize) as usize, (sel.x.len() * esize) as usize)
    }

    fn check_bounds(&self, sel: &Selection) -> TessellaResult<()> {
        let s = self.shape.0;
        let in_bounds = sel.t < s[AXIS_T]
            && sel.c < s[AXIS_C]
            && sel.z < s[AXIS_Z]
            && sel.y.start <= sel.y.end
            && sel.x.start <= sel.x.end
            && sel.y.end <= s[AXIS_Y]
            && sel.x.end <= s[AXIS_X];
        if !in_bounds {
            return Err(TessellaError::io(format!(
                "selection {sel:?} exceeds array shape {:?}",
                self.shape
            )));
        }
        Ok(())
    }

    fn check_buffer(&self, sel: &Selection, len: usize) -> TessellaResult<()> {
        let want = (sel.len_elements() as usize) * self.dtype.width();
        if len != want {
            return Err(TessellaError::io(format!(
                "buffer holds {len} bytes, selection covers {want}"
            )));
        }
        Ok(())
    }
}

struct MemReader {
    array: Arc<MemArray>,
    reads: Arc<AtomicU64>,
}

impl ArrayReader for MemReader {
    fn shape(&self) -> Shape5 {
        self.array.shape
    }

    fn dtype(&self) -> ElementType {
        self.array.dtype
    }

    fn read_rect(&self, sel: &Selection, dst: &mut [u8]) -> TessellaResult<()> {
        self.array.check_bounds(sel)?;
        self.array.check_buffer(sel, dst.len())?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let data = self.array.data.lock().unwrap_or_else(PoisonError::into_inner);
        let row_bytes = (sel.x.len() as usize) * self.array.dtype.width();
        for (i, y) in (sel.y.start..sel.y.end).enumerate() {
            let (off, span) = self.array.row_span(sel, y);
            dst[i * row_bytes..(i + 1) * row_bytes].copy_from_slice(&data[off..off + span]);
        }
        Ok(())
    }
}

struct MemWriter {
    array: Arc<MemArray>,
}

impl ArrayWriter for MemWriter {
    fn shape(&self) -> Shape5 {
        self.array.shape
    }

    fn write_rect(&self, sel: &Selection, src: &[u8]) -> TessellaResult<()> {
        self.array.check_bounds(sel)?;
        self.array.check_buffer(sel, src.len())?;

        let mut data = self.array.data.lock().unwrap_or_else(PoisonError::into_inner);
        let row_bytes = (sel.x.len() as usize) * self.array.dtype.width();
        for (i, y) in (sel.y.start..sel.y.end).enumerate() {
            let (off, span) = self.array.row_span(sel, y);
            data[off..off + span].copy_from_slice(&src[i * row_bytes..(i + 1) * row_bytes]);
        }
        Ok(())
    }
}

impl ArrayStore for MemoryStore {
    fn open_read(&self, spec: &ReadSpec) -> TessellaResult<Arc<dyn ArrayReader>> {
        let array = self
            .arrays_read()
            .get(&spec.path)
            .cloned()
            .ok_or_else(|| TessellaError::io(format!("no array at '{}'", spec.path)))?;
        Ok(Arc::new(MemReader {
            array,
            reads: Arc::clone(&self.reads),
        }))
    }

    fn open_write(&self, spec: &WriteSpec) -> TessellaResult<Arc<dyn ArrayWriter>> {
        let elements = spec.shape.len_elements();
        if elements == 0 {
            return Err(TessellaError::io(format!(
                "refusing to create empty array at '{}'",
                spec.path
            )));
        }
        let bytes = (elements as usize) * spec.dtype.width();
        let array = Arc::new(MemArray {
            shape: spec.shape,
            chunk_shape: spec.chunk_shape,
            dtype: spec.dtype,
            data: Mutex::new(vec![0u8; bytes]),
        });
        // create-and-delete-existing: replace whatever was at the path
        self.arrays_write().insert(spec.path.clone(), Arc::clone(&array));
        Ok(Arc::new(MemWriter { array }))
    }

    fn read_text(&self, path: &str) -> TessellaResult<String> {
        self.files_read()
            .get(path)
            .cloned()
            .ok_or_else(|| TessellaError::io(format!("no file at '{path}'")))
    }

    fn write_text(&self, path: &str, text: &str) -> TessellaResult<()> {
        self.files_write().insert(path.to_string(), text.to_string());
        Ok(())
    }

    fn remove_tree(&self, path: &str) -> TessellaResult<()> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.arrays_write()
            .retain(|k, _| k != path && !k.starts_with(&prefix));
        self.files_write()
            .retain(|k, _| k != path && !k.starts_with(&prefix));
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let hit = |k: &String| k == path || k.starts_with(&prefix);
        self.arrays_read().keys().any(hit) || self.files_read().keys().any(hit)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/storage/memory.rs"]
mod tests;
