//! Sidecar descriptors emitted once per composition: the OME descriptor XML,
//! the multiscales plate attributes, and the zarr group markers.
//!
//! Emission failures are surfaced as [`TessellaError::Sidecar`] but never
//! roll back the output arrays.

use std::collections::BTreeMap;

use crate::foundation::core::Shape5;
use crate::foundation::error::{TessellaError, TessellaResult};
use crate::storage::dtype::ElementType;
use crate::storage::store::{ArrayStore, join_path};

/// Multiscales attribute document (`.zattrs`), shared between the emitter
/// and source introspection.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct MultiscaleAttrs {
    pub multiscales: Vec<Multiscale>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Multiscale {
    pub version: String,
    pub datasets: Vec<Dataset>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Dataset {
    pub path: String,
}

#[derive(serde::Serialize)]
struct GroupMarker {
    zarr_format: u32,
}

/// Write `METADATA.ome.xml` under `plate_root` describing the level-0 plate.
pub fn write_descriptor_xml(
    store: &dyn ArrayStore,
    plate_root: &str,
    shape0: Shape5,
    dtype: ElementType,
) -> TessellaResult<()> {
    let name = plate_root.rsplit('/').next().unwrap_or(plate_root);
    let channels: String = (0..shape0.channels())
        .map(|c| format!("      <Channel ID=\"Channel:0:{c}\" SamplesPerPixel=\"1\"/>\n"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <OME xmlns=\"http://www.openmicroscopy.org/Schemas/OME/2016-06\">\n\
         \x20 <Image ID=\"Image:0\" Name=\"{name}\">\n\
         \x20   <Pixels BigEndian=\"false\" DimensionOrder=\"XYZCT\" ID=\"Pixels:0\" \
         Interleaved=\"false\" SizeC=\"{c}\" SizeT=\"1\" SizeX=\"{x}\" SizeY=\"{y}\" \
         SizeZ=\"1\" Type=\"{dtype}\">\n\
         {channels}\
         \x20   </Pixels>\n\
         \x20 </Image>\n\
         </OME>\n",
        c = shape0.channels(),
        x = shape0.width(),
        y = shape0.height(),
    );
    store
        .write_text(&join_path(plate_root, "METADATA.ome.xml"), &xml)
        .map_err(|e| TessellaError::sidecar(e.to_string()))
}

/// Write the multiscales `.zattrs` under `data_subpath` listing every level.
///
/// The emitted document is the same shape source introspection parses, so a
/// composed plate can itself serve as a unit pyramid.
pub fn write_plate_attributes(
    store: &dyn ArrayStore,
    plate_root: &str,
    data_subpath: &str,
    shapes: &BTreeMap<u32, Shape5>,
) -> TessellaResult<()> {
    let attrs = MultiscaleAttrs {
        multiscales: vec![Multiscale {
            version: "0.1".to_string(),
            datasets: shapes
                .keys()
                .map(|level| Dataset {
                    path: level.to_string(),
                })
                .collect(),
        }],
    };
    let text =
        serde_json::to_string_pretty(&attrs).map_err(|e| TessellaError::sidecar(e.to_string()))?;
    let dir = join_path(plate_root, data_subpath);
    store
        .write_text(&join_path(&dir, ".zattrs"), &text)
        .map_err(|e| TessellaError::sidecar(e.to_string()))
}

/// Write `.zgroup` markers at the plate root and its zarr group directories.
pub fn write_group_markers(store: &dyn ArrayStore, plate_root: &str) -> TessellaResult<()> {
    let text = serde_json::to_string(&GroupMarker { zarr_format: 2 })
        .map_err(|e| TessellaError::sidecar(e.to_string()))?;
    for dir in ["", "data.zarr", "data.zarr/0"] {
        let marker = join_path(&join_path(plate_root, dir), ".zgroup");
        store
            .write_text(&marker, &text)
            .map_err(|e| TessellaError::sidecar(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/sidecar/emit.rs"]
mod tests;
