use super::*;

use crate::storage::memory::MemoryStore;
use crate::storage::spec::WriteSpec;
use crate::foundation::core::Shape5;

fn store_with_source(levels: &[(u32, u64, u64)], dtype: ElementType) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let datasets: Vec<String> = levels
        .iter()
        .map(|(l, _, _)| format!("{{\"path\": \"{l}\"}}"))
        .collect();
    let zattrs = format!(
        "{{\"multiscales\": [{{\"version\": \"0.1\", \"datasets\": [{}]}}]}}",
        datasets.join(", ")
    );
    store
        .write_text("in/img/data.zarr/0/.zattrs", &zattrs)
        .unwrap();
    for &(level, h, w) in levels {
        store
            .open_write(&WriteSpec::new(
                format!("in/img/data.zarr/0/{level}"),
                Shape5([1, 1, 1, h, w]),
                Shape5([1, 1, 1, h, w]),
                dtype,
            ))
            .unwrap();
    }
    store
}

#[test]
fn open_is_memoized_per_path() {
    let store = store_with_source(&[(0, 4, 4)], ElementType::U8);
    let registry = SourceRegistry::new(store);

    let a = registry.open("in/img/data.zarr/0/0").unwrap();
    let b = registry.open("in/img/data.zarr/0/0").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.cached_readers(), 1);

    registry.clear();
    assert_eq!(registry.cached_readers(), 0);
}

#[test]
fn open_missing_path_is_source_unavailable() {
    let registry = SourceRegistry::new(Arc::new(MemoryStore::new()));
    let err = registry.open("in/img/data.zarr/0/0").unwrap_err();
    assert!(matches!(err, TessellaError::SourceUnavailable { .. }));
}

#[test]
fn introspect_discovers_levels_shapes_and_dtype() {
    let store = store_with_source(&[(0, 8, 6), (1, 4, 3)], ElementType::U16);
    let registry = SourceRegistry::new(store);

    let info = registry.introspect("in/img").unwrap();
    assert_eq!(info.dtype, ElementType::U16);
    assert_eq!(info.levels.len(), 2);
    assert_eq!(info.levels[&0], (8, 6));
    assert_eq!(info.levels[&1], (4, 3));
    // introspection warms the reader cache
    assert_eq!(registry.cached_readers(), 2);
}

#[test]
fn introspect_without_sidecar_is_source_unavailable() {
    let registry = SourceRegistry::new(Arc::new(MemoryStore::new()));
    let err = registry.introspect("in/img").unwrap_err();
    assert!(matches!(err, TessellaError::SourceUnavailable { .. }));
}

#[test]
fn introspect_rejects_malformed_attributes() {
    let store = Arc::new(MemoryStore::new());
    store
        .write_text("in/img/data.zarr/0/.zattrs", "not json")
        .unwrap();
    let registry = SourceRegistry::new(store);
    let err = registry.introspect("in/img").unwrap_err();
    match err {
        TessellaError::SourceUnavailable { reason, .. } => {
            assert!(reason.contains("malformed"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn agreement_check_flags_dtype_and_geometry() {
    let reference = SourceInfo {
        levels: [(0, (8, 8))].into_iter().collect(),
        dtype: ElementType::U16,
    };

    let other_type = SourceInfo {
        levels: reference.levels.clone(),
        dtype: ElementType::U8,
    };
    assert!(matches!(
        other_type.ensure_agrees_with(&reference, "in/b"),
        Err(TessellaError::TypeMismatch { .. })
    ));

    let other_shape = SourceInfo {
        levels: [(0, (8, 16))].into_iter().collect(),
        dtype: ElementType::U16,
    };
    assert!(matches!(
        other_shape.ensure_agrees_with(&reference, "in/b"),
        Err(TessellaError::GeometryMismatch(_))
    ));

    reference.ensure_agrees_with(&reference.clone(), "in/a").unwrap();
}
