use super::*;

use std::sync::Arc;

use crate::compose::registry::SourceRegistry;
use crate::foundation::core::{GridKey, Shape5};
use crate::storage::memory::MemoryStore;
use crate::storage::spec::WriteSpec;
use crate::storage::store::{ArrayStore, ArrayWriter};

fn range(start: u64, end: u64) -> PixelRange {
    PixelRange { start, end }
}

#[test]
fn aligned_region_is_one_job() {
    let jobs = decompose(range(0, 512), range(0, 512), 512, 512);
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        jobs[0],
        TileJob {
            col: 0,
            row: 0,
            src_y: range(0, 512),
            src_x: range(0, 512),
            dst_y: 0,
            dst_x: 0,
        }
    );
}

#[test]
fn four_quadrant_decomposition() {
    // 1024-wide region over a 2x2 grid of 600-pixel tiles
    let jobs = decompose(range(0, 1024), range(0, 1024), 600, 600);
    assert_eq!(jobs.len(), 4);
    assert_eq!(
        jobs[0],
        TileJob {
            col: 0,
            row: 0,
            src_y: range(0, 600),
            src_x: range(0, 600),
            dst_y: 0,
            dst_x: 0,
        }
    );
    assert_eq!(
        jobs[1],
        TileJob {
            col: 1,
            row: 0,
            src_y: range(0, 600),
            src_x: range(0, 424),
            dst_y: 0,
            dst_x: 600,
        }
    );
    assert_eq!(
        jobs[2],
        TileJob {
            col: 0,
            row: 1,
            src_y: range(0, 424),
            src_x: range(0, 600),
            dst_y: 600,
            dst_x: 0,
        }
    );
    assert_eq!(
        jobs[3],
        TileJob {
            col: 1,
            row: 1,
            src_y: range(0, 424),
            src_x: range(0, 424),
            dst_y: 600,
            dst_x: 600,
        }
    );
}

#[test]
fn offset_region_inside_one_tile() {
    let jobs = decompose(range(1024, 1500), range(1024, 1500), 1500, 1500);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].src_y, range(1024, 1500));
    assert_eq!(jobs[0].src_x, range(1024, 1500));
    assert_eq!((jobs[0].dst_y, jobs[0].dst_x), (0, 0));
}

#[test]
fn jobs_tile_the_region_exactly() {
    let region_y = range(5, 27);
    let region_x = range(0, 13);
    let jobs = decompose(region_y, region_x, 10, 4);

    let mut covered = 0;
    for job in &jobs {
        assert!(job.src_y.len() > 0 && job.src_x.len() > 0);
        assert!(job.src_y.end <= 10 && job.src_x.end <= 4);
        covered += job.src_y.len() * job.src_x.len();
    }
    assert_eq!(covered, region_y.len() * region_x.len());

    // destination rectangles are pairwise disjoint
    for (i, a) in jobs.iter().enumerate() {
        for b in jobs.iter().skip(i + 1) {
            let y_overlap = a.dst_y < b.dst_y + b.src_y.len() && b.dst_y < a.dst_y + a.src_y.len();
            let x_overlap = a.dst_x < b.dst_x + b.src_x.len() && b.dst_x < a.dst_x + a.src_x.len();
            assert!(!(y_overlap && x_overlap), "jobs {a:?} and {b:?} overlap");
        }
    }
}

#[test]
fn blit_places_rows_at_destination_offset() {
    let patch = TilePatch {
        dst_y: 1,
        dst_x: 1,
        height: 2,
        width: 2,
        bytes: vec![1, 2, 3, 4],
    };
    let mut assembly = vec![0u8; 16];
    blit(&patch, &mut assembly, 4, 1);
    #[rustfmt::skip]
    assert_eq!(assembly, vec![
        0, 0, 0, 0,
        0, 1, 2, 0,
        0, 3, 4, 0,
        0, 0, 0, 0,
    ]);
}

#[test]
fn blit_respects_element_width() {
    let patch = TilePatch {
        dst_y: 0,
        dst_x: 1,
        height: 1,
        width: 1,
        bytes: vec![0xAB, 0xCD],
    };
    let mut assembly = vec![0u8; 8]; // 2x2 of u16
    blit(&patch, &mut assembly, 2, 2);
    assert_eq!(assembly, [0, 0, 0xAB, 0xCD, 0, 0, 0, 0]);
}

fn single_source_ctx() -> (Arc<MemoryStore>, CompositionMap) {
    let store = Arc::new(MemoryStore::new());
    let writer = store
        .open_write(&WriteSpec::new(
            "in/img/data.zarr/0/0",
            Shape5([1, 1, 1, 4, 4]),
            Shape5([1, 1, 1, 4, 4]),
            ElementType::U8,
        ))
        .unwrap();
    let bytes: Vec<u8> = (0..16).collect();
    writer
        .write_rect(&Selection::plane(0, range(0, 4), range(0, 4)), &bytes)
        .unwrap();

    let mut map = CompositionMap::new();
    map.insert(
        GridKey {
            col: 0,
            row: 0,
            channel: 0,
        },
        "img",
    );
    (store, map)
}

#[test]
fn assemble_copies_a_single_source_through() {
    let (store, map) = single_source_ctx();
    let registry = SourceRegistry::new(store as Arc<dyn ArrayStore>);
    let ctx = AssembleCtx {
        registry: &registry,
        map: &map,
        input_root: "in",
        level: 0,
        channel: 0,
        dtype: ElementType::U8,
        unit_h: 4,
        unit_w: 4,
    };
    let assembly = assemble_chunk(&ctx, range(0, 4), range(0, 4), None).unwrap();
    assert_eq!(assembly, (0..16).collect::<Vec<u8>>());
}

#[test]
fn assemble_rejects_source_with_wrong_dtype() {
    let (store, map) = single_source_ctx();
    let registry = SourceRegistry::new(store as Arc<dyn ArrayStore>);
    let ctx = AssembleCtx {
        registry: &registry,
        map: &map,
        input_root: "in",
        level: 0,
        channel: 0,
        dtype: ElementType::U16,
        unit_h: 4,
        unit_w: 4,
    };
    let err = assemble_chunk(&ctx, range(0, 4), range(0, 4), None).unwrap_err();
    assert!(matches!(err, TessellaError::TypeMismatch { .. }));
}
