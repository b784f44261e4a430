use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::compose::assemble::{AssembleCtx, assemble_chunk};
use crate::compose::geometry::PlateGeometry;
use crate::compose::map::CompositionMap;
use crate::compose::registry::{SourceInfo, SourceRegistry};
use crate::foundation::core::{CHUNK_EDGE, ChunkKey, Selection, Shape5};
use crate::foundation::error::{TessellaError, TessellaResult};
use crate::sidecar::emit;
use crate::storage::dtype::ElementType;
use crate::storage::spec::WriteSpec;
use crate::storage::store::{ArrayStore, ArrayWriter, join_path};

/// Worker-pool options for source introspection, array creation, and tile
/// reads.
///
/// With `parallel: false` every fan-out degrades to an in-order loop with
/// identical results, which is the configuration the deterministic tests
/// run under.
#[derive(Clone, Debug)]
pub struct Threading {
    /// Run fan-outs on a dedicated rayon pool.
    pub parallel: bool,
    /// Worker count override; `None` uses the hardware-parallelism default.
    pub threads: Option<usize>,
}

impl Default for Threading {
    fn default() -> Self {
        Self {
            parallel: true,
            threads: None,
        }
    }
}

/// Snapshot established by `set_composition` and consumed read-only by every
/// later chunk request.
struct ActiveComposition {
    map: CompositionMap,
    geometry: PlateGeometry,
    dtype: ElementType,
    writers: BTreeMap<u32, Arc<dyn ArrayWriter>>,
}

/// The pyramid compositor facade.
///
/// Lifecycle: `new` (unconfigured) -> [`Self::set_composition`] (active) ->
/// any number of [`Self::write_chunk`] calls -> [`Self::reset_composition`]
/// (unconfigured again). `write_chunk` takes `&self` and may be called
/// concurrently for distinct chunks; requests for the same chunk serialize
/// and write at most once.
pub struct PyramidCompositor {
    store: Arc<dyn ArrayStore>,
    input_root: String,
    plate_root: String,
    pool: Option<rayon::ThreadPool>,
    registry: SourceRegistry,
    active: Option<ActiveComposition>,
    materialized: Mutex<HashSet<ChunkKey>>,
    in_flight: Mutex<HashMap<ChunkKey, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for PyramidCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PyramidCompositor")
            .field("input_root", &self.input_root)
            .field("plate_root", &self.plate_root)
            .finish_non_exhaustive()
    }
}

impl PyramidCompositor {
    /// Create an unconfigured compositor.
    ///
    /// The plate pyramid will live at `<output_root>/<plate_name>`; map
    /// sources resolve under `input_root`.
    pub fn new(
        store: Arc<dyn ArrayStore>,
        input_root: impl Into<String>,
        output_root: impl Into<String>,
        plate_name: impl Into<String>,
        threading: Threading,
    ) -> TessellaResult<Self> {
        let pool = if threading.parallel {
            Some(build_thread_pool(threading.threads)?)
        } else {
            None
        };
        Ok(Self {
            registry: SourceRegistry::new(Arc::clone(&store)),
            store,
            input_root: input_root.into(),
            plate_root: join_path(&output_root.into(), &plate_name.into()),
            pool,
            active: None,
            materialized: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Return `true` when a composition is set.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Root path of the plate pyramid.
    pub fn plate_root(&self) -> &str {
        &self.plate_root
    }

    /// Geometry snapshot of the active composition.
    pub fn geometry(&self) -> Option<&PlateGeometry> {
        self.active.as_ref().map(|a| &a.geometry)
    }

    /// Element type of the active composition.
    pub fn element_type(&self) -> Option<ElementType> {
        self.active.as_ref().map(|a| a.dtype)
    }

    /// Number of chunks materialized so far.
    pub fn materialized_chunks(&self) -> usize {
        lock(&self.materialized).len()
    }

    /// Replace the composition and (re)build the plate structure.
    ///
    /// Clears all prior state, introspects the distinct sources
    /// concurrently, validates their agreement, creates one output array per
    /// level, and emits the sidecar descriptors. On failure before sidecar
    /// emission the facade is unconfigured and any partially created output
    /// is removed; a sidecar failure is returned but leaves the composition
    /// active with its arrays intact.
    pub fn set_composition(&mut self, map: CompositionMap) -> TessellaResult<()> {
        self.teardown_state();
        match self.install_composition(map) {
            Ok(()) => {}
            Err(e) => {
                self.teardown_state();
                if let Err(cleanup) = self.store.remove_tree(&self.plate_root) {
                    warn!(plate = %self.plate_root, error = %cleanup, "cleanup after failed set_composition");
                }
                return Err(e);
            }
        }
        self.emit_sidecars()
    }

    /// Materialize one output chunk.
    ///
    /// A chunk already recorded as materialized is a no-op: no source reads,
    /// no write. Validation runs against the snapshot established by
    /// [`Self::set_composition`].
    pub fn write_chunk(
        &self,
        level: u32,
        channel: u32,
        y_chunk: u64,
        x_chunk: u64,
    ) -> TessellaResult<()> {
        let active = self.active.as_ref().ok_or(TessellaError::NotConfigured)?;

        let (unit_h, unit_w) = active
            .geometry
            .unit_shape(level)
            .ok_or(TessellaError::UnknownLevel { level })?;
        let channels = active.geometry.channels();
        if u64::from(channel) >= channels {
            return Err(TessellaError::UnknownChannel { channel, channels });
        }
        let (region_y, region_x) =
            active
                .geometry
                .chunk_region(level, y_chunk, x_chunk, CHUNK_EDGE)?;

        let key = ChunkKey {
            level,
            channel,
            y: y_chunk,
            x: x_chunk,
        };
        if lock(&self.materialized).contains(&key) {
            return Ok(());
        }

        // Same-key requests serialize here; the loser of the race re-checks
        // the done-set and leaves without touching the sources.
        let slot = Arc::clone(
            lock(&self.in_flight)
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if lock(&self.materialized).contains(&key) {
            return Ok(());
        }

        let ctx = AssembleCtx {
            registry: &self.registry,
            map: &active.map,
            input_root: &self.input_root,
            level,
            channel,
            dtype: active.dtype,
            unit_h,
            unit_w,
        };
        let assembly = assemble_chunk(&ctx, region_y, region_x, self.pool.as_ref())?;

        let writer = active
            .writers
            .get(&level)
            .ok_or(TessellaError::UnknownLevel { level })?;
        writer.write_rect(
            &Selection::plane(u64::from(channel), region_y, region_x),
            &assembly,
        )?;

        lock(&self.materialized).insert(key);
        debug!(
            level,
            channel,
            y = y_chunk,
            x = x_chunk,
            rows = region_y.len(),
            cols = region_x.len(),
            "materialized chunk"
        );
        Ok(())
    }

    /// Remove the output tree and return to the unconfigured state.
    pub fn reset_composition(&mut self) -> TessellaResult<()> {
        self.store.remove_tree(&self.plate_root)?;
        self.teardown_state();
        debug!(plate = %self.plate_root, "composition reset");
        Ok(())
    }

    fn install_composition(&mut self, map: CompositionMap) -> TessellaResult<()> {
        map.validate_dense()?;
        // a fresh composition starts from an empty output tree
        self.store.remove_tree(&self.plate_root)?;

        let sources = map.distinct_sources();
        let infos: Vec<(String, SourceInfo)> = collect_results(self.for_each(
            &sources,
            |source| {
                let info = self
                    .registry
                    .introspect(&join_path(&self.input_root, source))?;
                Ok((source.clone(), info))
            },
        ))?;

        // first source (deterministic order) is authoritative
        let (_, reference) = infos
            .first()
            .ok_or_else(|| TessellaError::geometry("composition map names no sources"))?;
        for (source, info) in &infos {
            info.ensure_agrees_with(reference, source)?;
        }

        let geometry = PlateGeometry::new(&map, reference.levels.clone());
        let dtype = reference.dtype;
        let levels: Vec<u32> = geometry.levels().collect();
        debug!(
            sources = sources.len(),
            levels = levels.len(),
            channels = geometry.channels(),
            %dtype,
            "composition configured"
        );

        let writers: BTreeMap<u32, Arc<dyn ArrayWriter>> =
            collect_results(self.for_each(&levels, |level| {
                let shape = geometry
                    .plate_shape(*level)
                    .ok_or(TessellaError::UnknownLevel { level: *level })?;
                let spec = WriteSpec::new(
                    join_path(&self.plate_root, &format!("data.zarr/0/{level}")),
                    shape,
                    Shape5([1, 1, 1, CHUNK_EDGE, CHUNK_EDGE]),
                    dtype,
                );
                Ok((*level, self.store.open_write(&spec)?))
            }))?
            .into_iter()
            .collect();

        self.active = Some(ActiveComposition {
            map,
            geometry,
            dtype,
            writers,
        });
        Ok(())
    }

    fn emit_sidecars(&self) -> TessellaResult<()> {
        let Some(active) = self.active.as_ref() else {
            return Err(TessellaError::NotConfigured);
        };
        let shapes = active.geometry.plate_shapes();
        let shape0 = shapes
            .values()
            .next()
            .copied()
            .ok_or_else(|| TessellaError::sidecar("composition has no levels"))?;
        emit::write_descriptor_xml(self.store.as_ref(), &self.plate_root, shape0, active.dtype)?;
        emit::write_plate_attributes(self.store.as_ref(), &self.plate_root, "data.zarr/0", &shapes)?;
        emit::write_group_markers(self.store.as_ref(), &self.plate_root)
    }

    /// Run `f` over `items`, on the pool when one is configured.
    fn for_each<I, T, F>(&self, items: &[I], f: F) -> Vec<TessellaResult<T>>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> TessellaResult<T> + Send + Sync,
    {
        match self.pool.as_ref() {
            Some(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            None => items.iter().map(&f).collect(),
        }
    }

    fn teardown_state(&mut self) {
        self.active = None;
        lock(&self.materialized).clear();
        lock(&self.in_flight).clear();
        self.registry.clear();
    }
}

fn collect_results<T>(results: Vec<TessellaResult<T>>) -> TessellaResult<Vec<T>> {
    results.into_iter().collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn build_thread_pool(threads: Option<usize>) -> TessellaResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(anyhow::anyhow!("threading 'threads' must be >= 1 when set").into());
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build worker pool: {e}").into())
}

#[cfg(test)]
#[path = "../../tests/unit/compose/compositor.rs"]
mod tests;
