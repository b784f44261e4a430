//! Tessella is a virtual pyramid compositor.
//!
//! Given a grid arrangement of pre-existing multi-resolution tiled image
//! pyramids ("unit pyramids"), Tessella lays out a single larger pyramid (the
//! "plate pyramid") and materializes its chunks on demand, persisting them in
//! a chunked 5-D array format `(t, c, z, y, x)`.
//!
//! # Pipeline overview
//!
//! 1. **Configure**: [`PyramidCompositor::set_composition`] takes a
//!    [`CompositionMap`] (`(col, row, channel) -> unit pyramid`), discovers
//!    the shared level set, per-level tile shapes, and element type of the
//!    sources, creates one output array per level, and emits the sidecar
//!    descriptors.
//! 2. **Materialize**: [`PyramidCompositor::write_chunk`] decomposes one
//!    output chunk into the source-tile rectangles that contribute to it,
//!    reads them in parallel, assembles a contiguous buffer, and writes it
//!    to the backing array exactly once per chunk.
//! 3. **Reset**: [`PyramidCompositor::reset_composition`] removes the output
//!    tree and returns the facade to its unconfigured state.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Lazy-by-default**: composition is structured up front; pixels move
//!   only when a chunk is requested.
//! - **Storage-agnostic**: the chunked-array backend is consumed through the
//!   [`ArrayStore`] trait family; [`MemoryStore`] is the in-process
//!   reference implementation used by the test suite.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod compose;
mod foundation;
mod sidecar;
mod storage;

pub use compose::compositor::{PyramidCompositor, Threading};
pub use compose::geometry::PlateGeometry;
pub use compose::map::CompositionMap;
pub use compose::registry::{SourceInfo, SourceRegistry};
pub use foundation::core::{
    AXIS_C, AXIS_T, AXIS_X, AXIS_Y, AXIS_Z, CHUNK_EDGE, ChunkKey, GridKey, PixelRange, Selection,
    Shape5,
};
pub use foundation::error::{TessellaError, TessellaResult};
pub use sidecar::emit::{write_descriptor_xml, write_group_markers, write_plate_attributes};
pub use storage::dtype::ElementType;
pub use storage::memory::MemoryStore;
pub use storage::spec::{ReadSpec, WriteSpec};
pub use storage::store::{ArrayReader, ArrayStore, ArrayWriter, join_path};
