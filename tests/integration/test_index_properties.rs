//! Ranking, removal and rebuild properties of the vector index over
//! randomized data.

use std::collections::HashSet;

use stylematch::vector::{VectorError, VectorIndex, inner_product};

use crate::common::{pid, random_unit_vectors};

const DIM: usize = 32;

fn populated(count: usize, seed: u64) -> (VectorIndex, Vec<Vec<f32>>) {
    let vectors = random_unit_vectors(count, DIM, seed);
    let mut index = VectorIndex::with_dimension(DIM).unwrap();
    for (i, v) in vectors.iter().enumerate() {
        index.insert(pid(i as u64), v).unwrap();
    }
    (index, vectors)
}

#[test]
fn test_search_results_are_bounded_and_sorted() {
    let (index, _) = populated(200, 1);
    let queries = random_unit_vectors(20, DIM, 2);

    for query in &queries {
        for k in [1, 5, 17, 200, 500] {
            let results = index.search(query, k).unwrap();
            assert_eq!(results.len(), k.min(200));
            for pair in results.windows(2) {
                assert!(pair[0].1 >= pair[1].1, "scores must not increase");
            }
            for (id, _) in &results {
                assert!(index.contains(*id));
            }
        }
    }
}

#[test]
fn test_search_matches_brute_force() {
    let (index, vectors) = populated(300, 3);
    let query = &random_unit_vectors(1, DIM, 4)[0];

    let mut expected: Vec<(u64, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u64, inner_product(query, v)))
        .collect();
    expected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let results = index.search(query, 10).unwrap();
    let got: Vec<u64> = results.iter().map(|(id, _)| id.get()).collect();
    let want: Vec<u64> = expected.iter().take(10).map(|(id, _)| *id).collect();
    assert_eq!(got, want);
    for ((_, score), (_, expected_score)) in results.iter().zip(expected.iter()) {
        assert!((score.get() - expected_score).abs() < 1e-5);
    }
}

#[test]
fn test_full_k_covers_every_id_once() {
    let (index, _) = populated(64, 5);
    let query = &random_unit_vectors(1, DIM, 6)[0];

    let results = index.search(query, 64).unwrap();
    let ids: HashSet<u64> = results.iter().map(|(id, _)| id.get()).collect();
    assert_eq!(results.len(), 64);
    assert_eq!(ids, (0..64).collect::<HashSet<u64>>());
}

#[test]
fn test_removed_ids_never_returned() {
    let (mut index, vectors) = populated(100, 7);

    for id in (0..100).step_by(3) {
        assert!(index.remove(pid(id)).unwrap());
    }
    assert_eq!(index.len(), 100 - 34);

    // Searching with a removed vector must not surface its id
    for id in (0..100u64).step_by(3) {
        let results = index.search(&vectors[id as usize], 100).unwrap();
        assert!(results.iter().all(|(hit, _)| hit.get() % 3 != 0));
    }

    // Survivors keep their embeddings
    assert_eq!(index.get(pid(1)).unwrap(), vectors[1].as_slice());
}

#[test]
fn test_absent_remove_leaves_index_identical() {
    let (mut index, _) = populated(50, 8);
    let before = index.clone();

    assert!(!index.remove(pid(999)).unwrap());
    assert_eq!(index, before);
    assert_eq!(index.as_matrix(), before.as_matrix());
    assert_eq!(index.ids(), before.ids());
}

#[test]
fn test_failed_rebuild_keeps_previous_results() {
    let (mut index, _) = populated(40, 9);
    let query = &random_unit_vectors(1, DIM, 10)[0];
    let before = index.search(query, 10).unwrap();

    let mut source: Vec<_> = random_unit_vectors(30, DIM, 11)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (pid(1_000 + i as u64), v))
        .collect();
    source.push((pid(5_000), vec![0.0; DIM - 1]));

    assert!(matches!(
        index.rebuild(source),
        Err(VectorError::DimensionMismatch { .. })
    ));
    assert_eq!(index.search(query, 10).unwrap(), before);
}

#[test]
fn test_rebuild_replaces_contents() {
    let (mut index, _) = populated(40, 12);
    let fresh = random_unit_vectors(10, DIM, 13);

    let count = index
        .rebuild(fresh.iter().enumerate().map(|(i, v)| (pid(500 + i as u64), v)))
        .unwrap();
    assert_eq!(count, 10);
    assert!(!index.contains(pid(0)));
    assert!(index.contains(pid(509)));
}

#[test]
fn test_parallel_scan_agrees_with_sequential() {
    let vectors = random_unit_vectors(2_000, DIM, 14);
    let source: Vec<_> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (pid(i as u64), v.clone()))
        .collect();

    let mut sequential = VectorIndex::with_dimension(DIM)
        .unwrap()
        .with_parallel_threshold(usize::MAX);
    sequential.rebuild(source.clone()).unwrap();
    let mut parallel = VectorIndex::with_dimension(DIM)
        .unwrap()
        .with_parallel_threshold(16);
    parallel.rebuild(source).unwrap();

    for query in random_unit_vectors(10, DIM, 15) {
        assert_eq!(
            sequential.search(&query, 25).unwrap(),
            parallel.search(&query, 25).unwrap()
        );
    }
}
