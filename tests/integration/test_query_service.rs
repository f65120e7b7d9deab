//! End-to-end search through `QueryService` with an on-disk catalog.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use stylematch::vector::{IndexStorage, SharedVectorIndex, VectorDimension};
use stylematch::{JsonCatalog, QueryService, SearchPolicy, ServiceError};

use crate::common::{FixedProvider, pid, product, write_catalog};

fn dim4() -> VectorDimension {
    VectorDimension::new(4).unwrap()
}

/// Catalog of five products; product 4 has no embedding yet.
fn catalog_in(dir: &Path) -> JsonCatalog {
    let path = dir.join("catalog.json");
    write_catalog(
        &path,
        &[
            product(1, "Northwind", "White Tee", Some(vec![1.0, 0.0, 0.0, 0.0])),
            product(2, "Northwind", "Cream Tee", Some(vec![0.8, 0.6, 0.0, 0.0])),
            product(3, "Fabrikam", "Denim Jacket", Some(vec![0.0, 1.0, 0.0, 0.0])),
            product(4, "Fabrikam", "Wool Scarf", None),
            product(5, "Contoso", "Rain Boots", Some(vec![0.0, 0.0, 1.0, 0.0])),
        ],
    );
    JsonCatalog::load(&path).unwrap()
}

fn synced_service(dir: &Path) -> QueryService {
    let service = QueryService::new(SharedVectorIndex::new(dim4()), Arc::new(catalog_in(dir)))
        .with_storage(IndexStorage::new(dir.join("index")));
    assert_eq!(service.resync().unwrap(), 4);
    service
}

#[test]
fn test_search_applies_threshold_and_joins_catalog() {
    let temp_dir = TempDir::new().unwrap();
    let service = synced_service(temp_dir.path());

    let response = service.search_by_vector(&[1.0, 0.0, 0.0, 0.0], None, None);
    assert!(!response.is_error());
    assert_eq!(response.message, "Found 2 matching products");

    let ids: Vec<u64> = response.matches.iter().map(|m| m.product_id.get()).collect();
    assert_eq!(ids, vec![1, 2]);
    let best = &response.matches[0];
    assert_eq!(best.name, "White Tee");
    assert_eq!(best.product_url, "https://shop.example.com/p/1");
    assert!((best.similarity_score - 1.0).abs() < 1e-6);
    assert!((response.matches[1].similarity_score - 0.8).abs() < 1e-6);
}

#[test]
fn test_limit_and_threshold_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let service = synced_service(temp_dir.path());
    let query = [1.0, 0.0, 0.0, 0.0];

    let everything = service.search_by_vector(&query, None, Some(0.0));
    assert_eq!(everything.matches.len(), 4);

    let top = service.search_by_vector(&query, Some(1), Some(0.0));
    assert_eq!(top.matches.len(), 1);
    assert_eq!(top.matches[0].product_id, pid(1));

    // Zero is clamped up to a single result
    let clamped = service.search_by_vector(&query, Some(0), Some(0.0));
    assert_eq!(clamped.matches.len(), 1);

    let strict = service.search_by_vector(&query, None, Some(0.95));
    assert_eq!(strict.matches.len(), 1);
    assert_eq!(strict.message, "Found 1 matching products");
}

#[test]
fn test_policy_limits_results() {
    let temp_dir = TempDir::new().unwrap();
    let policy = SearchPolicy {
        default_limit: 1,
        max_limit: 2,
        threshold: 0.0,
    };
    let service = synced_service(temp_dir.path()).with_policy(policy);
    let query = [0.5, 0.5, 0.5, 0.5];

    assert_eq!(service.search_by_vector(&query, None, None).matches.len(), 1);
    assert_eq!(service.search_by_vector(&query, Some(50), None).matches.len(), 2);
}

#[test]
fn test_image_search_through_provider() {
    let temp_dir = TempDir::new().unwrap();
    let service = synced_service(temp_dir.path());
    let provider = FixedProvider {
        dimension: dim4(),
        embeddings: vec![("jacket.jpg", vec![0.0, 1.0, 0.0, 0.0])],
    };

    let response = service.search_by_image(&provider, Path::new("uploads/jacket.jpg"), None, None);
    let ids: Vec<u64> = response.matches.iter().map(|m| m.product_id.get()).collect();
    assert_eq!(ids, vec![3, 2]);

    let failed = service.search_by_image(&provider, Path::new("uploads/unknown.jpg"), None, None);
    assert!(failed.is_error());
    assert!(failed.matches.is_empty());
    assert_eq!(failed.message, "Error searching products");
}

#[test]
fn test_bad_query_degrades_to_error_response() {
    let temp_dir = TempDir::new().unwrap();
    let service = synced_service(temp_dir.path());

    let response = service.search_by_vector(&[1.0, 0.0, 0.0], None, None);
    assert!(response.is_error());
    assert!(response.matches.is_empty());

    assert!(matches!(
        service.find_matches(&[1.0, 0.0, 0.0], None, None),
        Err(ServiceError::Index(_))
    ));
}

#[test]
fn test_products_missing_from_catalog_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let service = synced_service(temp_dir.path());

    assert!(!service.index_product(pid(99), &[0.0, 0.0, 0.0, 1.0]).unwrap());
    let hits = service.find_hits(&[0.0, 0.0, 0.0, 1.0], None, None).unwrap();
    assert_eq!(hits[0].0, pid(99));

    let response = service.search_by_vector(&[0.0, 0.0, 0.0, 1.0], None, None);
    assert!(!response.is_error());
    assert!(response.matches.is_empty());
}

#[test]
fn test_upsert_and_remove_change_results() {
    let temp_dir = TempDir::new().unwrap();
    let service = synced_service(temp_dir.path());
    let query = [0.0, 0.0, 1.0, 0.0];

    // Product 4 had no embedding, so this is an insert
    assert!(!service.index_product(pid(4), &[0.0, 0.0, 0.6, 0.8]).unwrap());
    let ids: Vec<u64> = service
        .search_by_vector(&query, None, None)
        .matches
        .iter()
        .map(|m| m.product_id.get())
        .collect();
    assert_eq!(ids, vec![5, 4]);

    // Replacing an embedding moves the product
    assert!(service.index_product(pid(1), &query).unwrap());
    assert_eq!(service.search_by_vector(&query, None, None).matches.len(), 3);

    assert!(service.remove_product(pid(5)).unwrap());
    assert!(!service.remove_product(pid(5)).unwrap());
    let response = service.search_by_vector(&query, None, None);
    let names: Vec<&str> = response.matches.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["White Tee", "Wool Scarf"]);
}

#[test]
fn test_resync_persists_and_restore_reloads() {
    let temp_dir = TempDir::new().unwrap();
    let _ = synced_service(temp_dir.path());

    let storage = IndexStorage::new(temp_dir.path().join("index"));
    assert!(storage.exists());

    let restarted = QueryService::new(
        SharedVectorIndex::new(dim4()),
        Arc::new(catalog_in(temp_dir.path())),
    )
    .with_storage(storage);
    assert_eq!(restarted.restore(), 4);

    let stats = restarted.stats();
    assert_eq!(stats.products, 4);
    assert_eq!(stats.dimension, 4);
    assert_eq!(stats.model_name.as_deref(), Some("ClipVitB32"));
    assert!(stats.size_bytes.unwrap() > 0);
    assert!(stats.created_at.unwrap() <= stats.updated_at.unwrap());
}

#[test]
fn test_restore_without_snapshot_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    let service = QueryService::new(
        SharedVectorIndex::new(dim4()),
        Arc::new(catalog_in(temp_dir.path())),
    )
    .with_storage(IndexStorage::new(temp_dir.path().join("nothing-here")));

    assert_eq!(service.restore(), 0);
    assert!(service.index().is_empty());
    let response = service.search_by_vector(&[1.0, 0.0, 0.0, 0.0], None, None);
    assert!(!response.is_error());
    assert_eq!(response.message, "Found 0 matching products");
}

#[test]
fn test_persist_requires_storage() {
    let temp_dir = TempDir::new().unwrap();
    let service = QueryService::new(
        SharedVectorIndex::new(dim4()),
        Arc::new(catalog_in(temp_dir.path())),
    );

    assert!(matches!(service.persist(), Err(ServiceError::Config { .. })));
    // Without storage, resync only rebuilds in memory
    assert_eq!(service.resync().unwrap(), 4);
    assert!(service.stats().path.is_none());
}
