use super::*;

fn key(col: u32, row: u32, channel: u32) -> GridKey {
    GridKey { col, row, channel }
}

#[test]
fn empty_map_has_zero_bounds() {
    let map = CompositionMap::new();
    assert!(map.is_empty());
    assert_eq!(map.cols(), 0);
    assert_eq!(map.rows(), 0);
    assert_eq!(map.channels(), 0);
    assert!(map.validate_dense().is_err());
}

#[test]
fn bounds_are_max_plus_one() {
    let mut map = CompositionMap::new();
    map.insert(key(0, 0, 0), "a");
    map.insert(key(2, 1, 0), "b");
    assert_eq!(map.cols(), 3);
    assert_eq!(map.rows(), 2);
    assert_eq!(map.channels(), 1);
    assert_eq!(map.len(), 2);
}

#[test]
fn source_at_hits_and_misses() {
    let mut map = CompositionMap::new();
    map.insert(key(1, 0, 0), "img_b");
    assert_eq!(map.source_at(1, 0, 0), Some("img_b"));
    assert_eq!(map.source_at(0, 0, 0), None);
    assert_eq!(map.source_at(1, 0, 1), None);
}

#[test]
fn insert_replaces_previous_assignment() {
    let mut map = CompositionMap::new();
    map.insert(key(0, 0, 0), "old");
    map.insert(key(0, 0, 0), "new");
    assert_eq!(map.len(), 1);
    assert_eq!(map.source_at(0, 0, 0), Some("new"));
}

#[test]
fn distinct_sources_dedupes_in_order() {
    let mut map = CompositionMap::new();
    map.insert(key(0, 0, 0), "zeta");
    map.insert(key(1, 0, 0), "alpha");
    map.insert(key(0, 1, 0), "zeta");
    map.insert(key(1, 1, 0), "alpha");
    assert_eq!(map.distinct_sources(), ["alpha", "zeta"]);
}

#[test]
fn dense_grid_validates() {
    let mut map = CompositionMap::new();
    for channel in 0..2 {
        for row in 0..2 {
            for col in 0..3 {
                map.insert(key(col, row, channel), format!("img_{col}_{row}_{channel}"));
            }
        }
    }
    map.validate_dense().unwrap();
}

#[test]
fn sparse_grid_is_rejected_with_the_hole_named() {
    let mut map = CompositionMap::new();
    map.insert(key(0, 0, 0), "a");
    map.insert(key(1, 1, 0), "b");
    let err = map.validate_dense().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("missing"));
    assert!(msg.contains("col 1, row 0"));
}

#[test]
fn collects_from_iterator() {
    let map: CompositionMap = [(key(0, 0, 0), "a".to_string()), (key(1, 0, 0), "b".to_string())]
        .into_iter()
        .collect();
    assert_eq!(map.cols(), 2);
    map.validate_dense().unwrap();
}
