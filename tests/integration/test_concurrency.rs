//! Readers racing writers on a shared index.

use std::thread;

use stylematch::vector::{SharedVectorIndex, VectorIndex};

use crate::common::{pid, random_unit_vectors};

const DIM: usize = 24;

/// Generation `g` holds ids `g * 1000 .. g * 1000 + size`.
fn generation(g: u64, size: usize) -> Vec<(stylematch::ProductId, Vec<f32>)> {
    random_unit_vectors(size, DIM, g)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (pid(g * 1_000 + i as u64), v))
        .collect()
}

#[test]
fn test_searches_see_whole_generations_during_rebuild() {
    let mut initial = VectorIndex::with_dimension(DIM).unwrap();
    initial.rebuild(generation(0, 200)).unwrap();
    let shared = SharedVectorIndex::from_index(initial);
    let queries = random_unit_vectors(4, DIM, 99);

    thread::scope(|scope| {
        for _ in 0..4 {
            let shared = shared.clone();
            let queries = &queries;
            scope.spawn(move || {
                for round in 0..200 {
                    let query = &queries[round % queries.len()];
                    let results = shared.search(query, 200).unwrap();
                    assert_eq!(results.len(), 200);
                    let generation = results[0].0.get() / 1_000;
                    assert!(
                        results.iter().all(|(id, _)| id.get() / 1_000 == generation),
                        "search mixed two generations"
                    );
                }
            });
        }

        let writer = shared.clone();
        scope.spawn(move || {
            for g in 1..=10 {
                assert_eq!(writer.rebuild(generation(g, 200)).unwrap(), 200);
            }
        });
    });

    assert_eq!(shared.len(), 200);
    assert!(shared.read().contains(pid(10_000)));
}

#[test]
fn test_concurrent_removals_are_serialized() {
    let mut initial = VectorIndex::with_dimension(DIM).unwrap();
    initial.rebuild(generation(0, 100)).unwrap();
    let shared = SharedVectorIndex::from_index(initial);

    thread::scope(|scope| {
        for worker in 0..4u64 {
            let shared = shared.clone();
            scope.spawn(move || {
                for id in (worker..100).step_by(4) {
                    assert!(shared.remove(pid(id)).unwrap());
                }
            });
        }
        let reader = shared.clone();
        scope.spawn(move || {
            let query = &random_unit_vectors(1, DIM, 7)[0];
            for _ in 0..100 {
                let index = reader.read();
                let results = index.search(query, 100).unwrap();
                assert_eq!(results.len(), index.len());
            }
        });
    });

    assert!(shared.is_empty());
}
