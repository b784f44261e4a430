use super::*;

#[test]
fn join_path_inserts_single_separator() {
    assert_eq!(join_path("a", "b"), "a/b");
    assert_eq!(join_path("a/", "b"), "a/b");
    assert_eq!(join_path("a", "/b"), "a/b");
    assert_eq!(join_path("a/", "/b/c"), "a/b/c");
}

#[test]
fn join_path_handles_empty_segments() {
    assert_eq!(join_path("", "b"), "b");
    assert_eq!(join_path("a", ""), "a");
    assert_eq!(join_path("a/", ""), "a");
}
