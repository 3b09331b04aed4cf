use super::persistence;
use super::*;
use crate::VaultError;
use tempfile::TempDir;

fn two_axis_index() -> VectorIndex {
    let mut index = VectorIndex::new(2).expect("can create index");
    index.add("x", &[1.0, 0.0]).expect("can add x");
    index.add("y", &[0.0, 1.0]).expect("can add y");
    index
}

#[test]
fn zero_dimension_rejected() {
    assert!(VectorIndex::new(0).is_err());
}

#[test]
fn self_similarity_is_top_result() {
    let mut index = VectorIndex::new(3).expect("can create index");
    index.add("a", &[1.0, 2.0, 2.0]).expect("can add");
    index.add("b", &[-1.0, 0.5, 0.0]).expect("can add");

    let matches = index
        .search(&[1.0, 2.0, 2.0], 1, 0.9)
        .expect("search succeeds");

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "a");
    assert!((matches[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn threshold_excludes_orthogonal_vectors() {
    let index = two_axis_index();

    let matches = index.search(&[1.0, 0.0], 2, 0.5).expect("search succeeds");

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "x");
    assert!((matches[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn dimension_mismatch_rejected_before_mutation() {
    let mut index = two_axis_index();

    let add_err = index.add("z", &[1.0, 2.0, 3.0]).unwrap_err();
    assert!(matches!(add_err, VaultError::DimensionMismatch { expected: 2, actual: 3 }));
    assert_eq!(index.slot_count(), 2);

    let search_err = index.search(&[1.0], 1, 0.0).unwrap_err();
    assert!(matches!(search_err, VaultError::DimensionMismatch { expected: 2, actual: 1 }));
}

#[test]
fn duplicate_id_rejected() {
    let mut index = two_axis_index();

    let err = index.add("x", &[0.5, 0.5]).unwrap_err();
    assert!(matches!(err, VaultError::DuplicateId(id) if id == "x"));
    assert_eq!(index.len(), 2);
}

#[test]
fn deleted_id_never_surfaces_in_search() {
    let mut index = two_axis_index();

    assert!(index.delete("x"));
    assert!(!index.delete("x"));

    // The slot physically persists until a rebuild.
    assert_eq!(index.slot_count(), 2);
    assert_eq!(index.len(), 1);
    assert_eq!(index.deleted_count(), 1);

    let matches = index.search(&[1.0, 0.0], 10, -1.0).expect("search succeeds");
    assert!(matches.iter().all(|m| m.id != "x"));
}

#[test]
fn delete_then_add_replaces_in_a_new_slot() {
    let mut index = two_axis_index();

    assert!(index.delete("x"));
    let slot = index.add("x", &[0.0, 1.0]).expect("can re-add");

    assert_eq!(slot, 2);
    assert_eq!(index.slot_count(), 3);

    let matches = index.search(&[0.0, 1.0], 10, 0.9).expect("search succeeds");
    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["y", "x"]);
}

#[test]
fn ties_resolve_to_the_earlier_slot() {
    let mut index = VectorIndex::new(2).expect("can create index");
    index.add("b", &[2.0, 0.0]).expect("can add");
    index.add("a", &[4.0, 0.0]).expect("can add");

    let matches = index.search(&[1.0, 0.0], 2, 0.0).expect("search succeeds");

    // Equal scores after normalization; insertion order wins.
    assert_eq!(matches[0].id, "b");
    assert_eq!(matches[1].id, "a");
}

#[test]
fn empty_index_returns_empty() {
    let index = VectorIndex::new(4).expect("can create index");
    let matches = index.search(&[1.0, 0.0, 0.0, 0.0], 5, 0.0).expect("search succeeds");
    assert!(matches.is_empty());
}

#[test]
fn k_limits_result_count() {
    let mut index = VectorIndex::new(2).expect("can create index");
    for i in 0..5 {
        index
            .add(&format!("v{i}"), &[1.0, i as f32 * 0.01])
            .expect("can add");
    }

    let matches = index.search(&[1.0, 0.0], 3, 0.0).expect("search succeeds");
    assert_eq!(matches.len(), 3);
}

#[test]
fn vectors_are_normalized_on_add() {
    let mut index = VectorIndex::new(2).expect("can create index");
    index.add("v", &[3.0, 4.0]).expect("can add");

    let stored = index.vector_for("v").expect("vector exists");
    assert!((stored[0] - 0.6).abs() < 1e-6);
    assert!((stored[1] - 0.8).abs() < 1e-6);
}

#[test]
fn rebuild_purges_deleted_slots() {
    let mut index = VectorIndex::new(2).expect("can create index");
    index.add("a", &[1.0, 0.0]).expect("can add");
    index.add("b", &[0.0, 1.0]).expect("can add");
    index.add("c", &[1.0, 1.0]).expect("can add");
    index.delete("b");

    let live: Vec<(String, Vec<f32>)> = index
        .iter_live()
        .map(|(id, vector)| (id.to_string(), vector.to_vec()))
        .collect();
    index.rebuild(live).expect("rebuild succeeds");

    assert_eq!(index.len(), 2);
    assert_eq!(index.slot_count(), 2);
    assert_eq!(index.deleted_count(), 0);

    let matches = index.search(&[1.0, 1.0], 10, -1.0).expect("search succeeds");
    let ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
    assert!(ids.contains(&"a"));
    assert!(ids.contains(&"c"));
    assert!(!ids.contains(&"b"));
}

#[test]
fn failed_rebuild_leaves_index_unchanged() {
    let mut index = two_axis_index();

    let err = index
        .rebuild(vec![("a".to_string(), vec![1.0, 2.0, 3.0])])
        .unwrap_err();
    assert!(matches!(err, VaultError::DimensionMismatch { .. }));

    let err = index
        .rebuild(vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("a".to_string(), vec![0.0, 1.0]),
        ])
        .unwrap_err();
    assert!(matches!(err, VaultError::DuplicateId(_)));

    assert_eq!(index.len(), 2);
    assert!(index.contains("x"));
    assert!(index.contains("y"));
}

#[test]
fn persistence_round_trip_preserves_search_results() {
    let dir = TempDir::new().expect("can create temp dir");
    let mut index = VectorIndex::new(3).expect("can create index");
    index.add("a", &[1.0, 0.2, 0.0]).expect("can add");
    index.add("b", &[0.0, 1.0, 0.5]).expect("can add");
    index.add("c", &[0.3, 0.3, 0.9]).expect("can add");
    index.delete("b");

    persistence::save(&index, dir.path()).expect("save succeeds");
    let loaded = persistence::load(dir.path(), 3)
        .expect("load succeeds")
        .expect("index present");

    assert_eq!(loaded.slot_count(), index.slot_count());
    assert_eq!(loaded.len(), index.len());
    assert_eq!(loaded.deleted_count(), 1);

    for query in [[1.0, 0.0, 0.0], [0.1, 0.9, 0.4], [0.5, 0.5, 0.5]] {
        let before = index.search(&query, 10, -1.0).expect("search succeeds");
        let after = loaded.search(&query, 10, -1.0).expect("search succeeds");
        assert_eq!(before, after);
    }
}

#[test]
fn load_of_missing_pair_is_a_fresh_start() {
    let dir = TempDir::new().expect("can create temp dir");
    let loaded = persistence::load(dir.path(), 4).expect("load succeeds");
    assert!(loaded.is_none());
}

#[test]
fn half_a_pair_is_corrupt() {
    let dir = TempDir::new().expect("can create temp dir");
    let index = two_axis_index();
    persistence::save(&index, dir.path()).expect("save succeeds");

    std::fs::remove_file(dir.path().join(persistence::ID_MAP_FILE)).expect("can remove");
    let err = persistence::load(dir.path(), 2).unwrap_err();
    assert!(matches!(err, VaultError::IndexCorrupt(_)));

    persistence::save(&index, dir.path()).expect("save succeeds");
    std::fs::remove_file(dir.path().join(persistence::VECTORS_FILE)).expect("can remove");
    let err = persistence::load(dir.path(), 2).unwrap_err();
    assert!(matches!(err, VaultError::IndexCorrupt(_)));
}

#[test]
fn truncated_backing_store_is_corrupt() {
    let dir = TempDir::new().expect("can create temp dir");
    let index = two_axis_index();
    persistence::save(&index, dir.path()).expect("save succeeds");

    let path = dir.path().join(persistence::VECTORS_FILE);
    let bytes = std::fs::read(&path).expect("can read");
    std::fs::write(&path, &bytes[..bytes.len() - 4]).expect("can write");

    let err = persistence::load(dir.path(), 2).unwrap_err();
    assert!(matches!(err, VaultError::IndexCorrupt(_)));
}

#[test]
fn load_with_wrong_dimension_is_rejected() {
    let dir = TempDir::new().expect("can create temp dir");
    let index = two_axis_index();
    persistence::save(&index, dir.path()).expect("save succeeds");

    let err = persistence::load(dir.path(), 5).unwrap_err();
    assert!(matches!(
        err,
        VaultError::DimensionMismatch {
            expected: 5,
            actual: 2
        }
    ));
}
