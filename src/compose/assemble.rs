//! The chunk assembly core: decompose one output region into the source-tile
//! rectangles that contribute to it, read them in parallel, and stitch the
//! patches into a single contiguous buffer.

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::compose::map::CompositionMap;
use crate::compose::registry::SourceRegistry;
use crate::foundation::core::{PixelRange, Selection};
use crate::foundation::error::{TessellaError, TessellaResult};
use crate::storage::dtype::ElementType;
use crate::storage::store::join_path;

/// One source-tile read scheduled for an output region.
///
/// `src_y`/`src_x` address the unit pyramid at `(col, row)`; `dst_y`/`dst_x`
/// are the patch origin inside the assembly buffer. Destination rectangles
/// of one decomposition are pairwise disjoint and cover the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TileJob {
    pub col: u32,
    pub row: u32,
    pub src_y: PixelRange,
    pub src_x: PixelRange,
    pub dst_y: u64,
    pub dst_x: u64,
}

/// A tile read result: `height * width` elements at `(dst_y, dst_x)`.
pub(crate) struct TilePatch {
    pub dst_y: u64,
    pub dst_x: u64,
    pub height: u64,
    pub width: u64,
    pub bytes: Vec<u8>,
}

/// Decompose an output region into per-tile jobs.
///
/// Walks rows, then columns: at each position the job takes pixels up to the
/// nearer of the tile edge and the region edge, so tile and chunk edges need
/// not align.
pub(crate) fn decompose(
    region_y: PixelRange,
    region_x: PixelRange,
    unit_h: u64,
    unit_w: u64,
) -> SmallVec<[TileJob; 4]> {
    let mut jobs = SmallVec::new();

    let mut pos_y = region_y.start;
    while pos_y < region_y.end {
        let row = pos_y / unit_h;
        let src_y0 = pos_y - row * unit_h;
        let take_y = ((row + 1) * unit_h - pos_y).min(region_y.end - pos_y);
        let dst_y = pos_y - region_y.start;

        let mut pos_x = region_x.start;
        while pos_x < region_x.end {
            let col = pos_x / unit_w;
            let src_x0 = pos_x - col * unit_w;
            let take_x = ((col + 1) * unit_w - pos_x).min(region_x.end - pos_x);
            let dst_x = pos_x - region_x.start;

            jobs.push(TileJob {
                col: col as u32,
                row: row as u32,
                src_y: PixelRange {
                    start: src_y0,
                    end: src_y0 + take_y,
                },
                src_x: PixelRange {
                    start: src_x0,
                    end: src_x0 + take_x,
                },
                dst_y,
                dst_x,
            });
            pos_x += take_x;
        }
        pos_y += take_y;
    }
    jobs
}

/// Copy a patch into the assembly buffer, one contiguous row at a time.
pub(crate) fn blit(patch: &TilePatch, assembly: &mut [u8], assembly_width: u64, esize: usize) {
    let row_bytes = (patch.width as usize) * esize;
    for i in 0..patch.height {
        let src_off = (i as usize) * row_bytes;
        let dst_off = (((patch.dst_y + i) * assembly_width + patch.dst_x) as usize) * esize;
        assembly[dst_off..dst_off + row_bytes]
            .copy_from_slice(&patch.bytes[src_off..src_off + row_bytes]);
    }
}

/// Everything a materialization needs to resolve and read source tiles.
pub(crate) struct AssembleCtx<'a> {
    pub registry: &'a SourceRegistry,
    pub map: &'a CompositionMap,
    pub input_root: &'a str,
    pub level: u32,
    pub channel: u32,
    pub dtype: ElementType,
    pub unit_h: u64,
    pub unit_w: u64,
}

impl AssembleCtx<'_> {
    fn read_tile(&self, job: &TileJob) -> TessellaResult<TilePatch> {
        let source = self
            .map
            .source_at(job.col, job.row, self.channel)
            .ok_or_else(|| {
                TessellaError::geometry(format!(
                    "no source at (col {}, row {}, channel {})",
                    job.col, job.row, self.channel
                ))
            })?;
        let path = join_path(
            &join_path(self.input_root, source),
            &format!("data.zarr/0/{}", self.level),
        );
        let reader = self.registry.open(&path)?;
        if reader.dtype() != self.dtype {
            return Err(TessellaError::TypeMismatch {
                expected: self.dtype.name().to_string(),
                found: reader.dtype().name().to_string(),
                path,
            });
        }

        let esize = self.dtype.width();
        let mut bytes =
            vec![0u8; (job.src_y.len() * job.src_x.len()) as usize * esize];
        let sel = Selection::plane(u64::from(self.channel), job.src_y, job.src_x);
        reader.read_rect(&sel, &mut bytes)?;
        Ok(TilePatch {
            dst_y: job.dst_y,
            dst_x: job.dst_x,
            height: job.src_y.len(),
            width: job.src_x.len(),
            bytes,
        })
    }
}

/// Assemble one output region into a contiguous row-major buffer.
///
/// Tile reads run on `pool` when one is given and in order otherwise; either
/// way every read completes before the first patch lands in the buffer, and
/// any read failure fails the whole request.
pub(crate) fn assemble_chunk(
    ctx: &AssembleCtx<'_>,
    region_y: PixelRange,
    region_x: PixelRange,
    pool: Option<&rayon::ThreadPool>,
) -> TessellaResult<Vec<u8>> {
    let jobs = decompose(region_y, region_x, ctx.unit_h, ctx.unit_w);

    let patches: Vec<TessellaResult<TilePatch>> = match pool {
        Some(pool) => pool.install(|| {
            jobs.as_slice()
                .par_iter()
                .map(|job| ctx.read_tile(job))
                .collect()
        }),
        None => jobs.iter().map(|job| ctx.read_tile(job)).collect(),
    };

    let esize = ctx.dtype.width();
    let mut assembly = vec![0u8; (region_y.len() * region_x.len()) as usize * esize];
    for patch in patches {
        blit(&patch?, &mut assembly, region_x.len(), esize);
    }
    Ok(assembly)
}

#[cfg(test)]
#[path = "../../tests/unit/compose/assemble.rs"]
mod tests;
