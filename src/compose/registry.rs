use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::foundation::error::{TessellaError, TessellaResult};
use crate::sidecar::emit::MultiscaleAttrs;
use crate::storage::dtype::ElementType;
use crate::storage::spec::ReadSpec;
use crate::storage::store::{ArrayReader, ArrayStore, join_path};

/// Level set, tile shapes, and element type discovered from one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    /// `(H_L, W_L)` per level, ascending.
    pub levels: BTreeMap<u32, (u64, u64)>,
    /// Element type shared by all levels of the source.
    pub dtype: ElementType,
}

impl SourceInfo {
    /// Check agreement with the composition's authoritative source.
    pub fn ensure_agrees_with(&self, reference: &SourceInfo, path: &str) -> TessellaResult<()> {
        if self.dtype != reference.dtype {
            return Err(TessellaError::TypeMismatch {
                expected: reference.dtype.name().to_string(),
                found: self.dtype.name().to_string(),
                path: path.to_string(),
            });
        }
        if self.levels != reference.levels {
            return Err(TessellaError::geometry(format!(
                "source '{path}' levels {:?} differ from the composition's {:?}",
                self.levels, reference.levels
            )));
        }
        Ok(())
    }
}

/// Cache of read handles over unit-pyramid level arrays.
///
/// Keyed by the fully-qualified per-level path. Handles are shared across
/// concurrent tile reads; insertion is idempotent under concurrency. The
/// cache lives for one composition interval and is cleared when the
/// composition is replaced or reset.
pub struct SourceRegistry {
    store: Arc<dyn ArrayStore>,
    readers: RwLock<HashMap<String, Arc<dyn ArrayReader>>>,
}

impl SourceRegistry {
    /// Create an empty registry over `store`.
    pub fn new(store: Arc<dyn ArrayStore>) -> Self {
        Self {
            store,
            readers: RwLock::new(HashMap::new()),
        }
    }

    /// Open the array at `path` read-only, memoized.
    ///
    /// The second call with the same path returns the cached handle.
    pub fn open(&self, path: &str) -> TessellaResult<Arc<dyn ArrayReader>> {
        if let Some(reader) = self
            .readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok(Arc::clone(reader));
        }

        let reader = self
            .store
            .open_read(&ReadSpec::new(path))
            .map_err(|e| TessellaError::source_unavailable(path, e.to_string()))?;

        // insert-or-get: a racing open keeps the first inserted handle
        let mut cache = self.readers.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(path.to_string()).or_insert(reader)))
    }

    /// Number of cached read handles.
    pub fn cached_readers(&self) -> usize {
        self.readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every cached handle.
    pub fn clear(&self) {
        self.readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Discover the level set, per-level tile shapes, and element type of
    /// the unit pyramid rooted at `source_root`.
    ///
    /// Reads the multiscales sidecar descriptor to enumerate levels, then
    /// opens each level array (warming the reader cache) to record its
    /// trailing two extents and element type.
    pub fn introspect(&self, source_root: &str) -> TessellaResult<SourceInfo> {
        let attrs_path = join_path(source_root, "data.zarr/0/.zattrs");
        let text = self
            .store
            .read_text(&attrs_path)
            .map_err(|e| TessellaError::source_unavailable(source_root, e.to_string()))?;
        let attrs: MultiscaleAttrs = serde_json::from_str(&text).map_err(|e| {
            TessellaError::source_unavailable(
                source_root,
                format!("malformed multiscales attributes: {e}"),
            )
        })?;
        let scale = attrs.multiscales.first().ok_or_else(|| {
            TessellaError::source_unavailable(source_root, "no multiscales entry")
        })?;

        let mut levels = BTreeMap::new();
        let mut dtype: Option<ElementType> = None;
        for dataset in &scale.datasets {
            let level: u32 = dataset.path.parse().map_err(|_| {
                TessellaError::source_unavailable(
                    source_root,
                    format!("non-numeric level '{}'", dataset.path),
                )
            })?;
            let level_path = join_path(source_root, &format!("data.zarr/0/{level}"));
            let reader = self.open(&level_path)?;
            let shape = reader.shape();
            levels.insert(level, (shape.height(), shape.width()));

            match dtype {
                None => dtype = Some(reader.dtype()),
                Some(expected) if expected != reader.dtype() => {
                    return Err(TessellaError::TypeMismatch {
                        expected: expected.name().to_string(),
                        found: reader.dtype().name().to_string(),
                        path: level_path,
                    });
                }
                Some(_) => {}
            }
        }

        let dtype = dtype.ok_or_else(|| {
            TessellaError::source_unavailable(source_root, "multiscales entry lists no levels")
        })?;
        debug!(source = source_root, levels = levels.len(), %dtype, "introspected source");
        Ok(SourceInfo { levels, dtype })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/registry.rs"]
mod tests;
