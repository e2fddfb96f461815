use merkle_tree_sync::core::hash::ShaHasher;
use merkle_tree_sync::storage::MemoryNodeStore;
use merkle_tree_sync::test_utils::{memory_config, reference_root, AdditiveHasher};
use merkle_tree_sync::{LeafEvent, MTError, MerkleTreeService, NodeHasher, NodeValue};

use assert_matches::assert_matches;
use std::collections::BTreeMap;
use std::sync::Arc;

fn v(byte: u8) -> NodeValue {
    NodeValue::new(vec![byte])
}

fn sha_leaf(i: u64) -> NodeValue {
    let mut bytes = vec![0xabu8; 32];
    bytes[24..].copy_from_slice(&i.to_be_bytes());
    NodeValue::new(bytes)
}

async fn additive_service(height: u8) -> (MerkleTreeService, MemoryNodeStore) {
    let store = MemoryNodeStore::new();
    let service = MerkleTreeService::with_parts(
        memory_config(height, 1),
        Arc::new(store.clone()),
        Arc::new(AdditiveHasher),
    )
    .await
    .unwrap();
    (service, store)
}

#[tokio::test]
async fn test_concrete_example_height_two() {
    let (service, _) = additive_service(2).await;
    let q = service.query();

    service.insert_leaf(0, v(0x01)).await.unwrap();
    assert_eq!(q.get_node(3).await.unwrap(), v(0x01));
    assert_eq!(q.get_node(4).await.unwrap(), v(0x00));
    assert_eq!(q.get_node(1).await.unwrap(), v(0x01));
    assert_eq!(q.get_root().await.unwrap(), v(0x01));

    service.insert_leaf(1, v(0x02)).await.unwrap();
    assert_eq!(q.get_node(1).await.unwrap(), v(0x03));
    assert_eq!(q.get_root().await.unwrap(), v(0x03));
    assert_eq!(service.checkpoint().watermark, Some(1));
}

#[tokio::test]
async fn test_root_matches_reference_for_every_prefix() {
    for height in 1..=5u8 {
        let (service, _) = additive_service(height).await;
        let capacity = 1u64 << height;
        let mut applied = BTreeMap::new();
        // deterministic but irregular leaf values
        let mut seed = 7u32;
        for i in 0..capacity {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let value = v((seed >> 16) as u8);
            applied.insert(i, value.clone());
            let report = service.insert_leaf(i, value).await.unwrap();
            assert_eq!(
                report.root,
                reference_root(height, &applied, &AdditiveHasher, &v(0)),
                "height {} after leaf {}",
                height,
                i
            );
        }
    }
}

#[tokio::test]
async fn test_sha_root_matches_reference() {
    let config = memory_config(6, 32);
    let service = MerkleTreeService::open(config).await.unwrap();
    let leaves: BTreeMap<u64, NodeValue> = (0..13).map(|i| (i, sha_leaf(i))).collect();
    service
        .insert_leaves(0, leaves.values().cloned().collect())
        .await
        .unwrap();
    let hasher = ShaHasher::new();
    let expected = reference_root(6, &leaves, &hasher, &NodeValue::zero(hasher.output_len()));
    assert_eq!(service.query().get_root().await.unwrap(), expected);
}

#[tokio::test]
async fn test_batch_and_sequential_inserts_agree() {
    for height in [4u8, 10, 32] {
        let batched = MerkleTreeService::open(memory_config(height, 32)).await.unwrap();
        let sequential = MerkleTreeService::open(memory_config(height, 32)).await.unwrap();

        batched
            .insert_leaves(0, (0..10).map(sha_leaf).collect())
            .await
            .unwrap();
        for i in 0..10 {
            sequential.insert_leaf(i, sha_leaf(i)).await.unwrap();
        }

        let a = batched.query().get_root().await.unwrap();
        let b = sequential.query().get_root().await.unwrap();
        assert_eq!(a, b, "height {}", height);
        assert_eq!(
            batched.query().count_nodes().await.unwrap(),
            sequential.query().count_nodes().await.unwrap()
        );
    }
}

#[tokio::test]
async fn test_redelivery_is_idempotent_and_conflict_changes_nothing() {
    let (service, store) = additive_service(3).await;
    service.insert_leaves(0, vec![v(1), v(2), v(3)]).await.unwrap();
    let before = store.snapshot();
    let root = service.checkpoint().root;

    let report = service.insert_leaf(1, v(2)).await.unwrap();
    assert_eq!((report.applied, report.duplicates), (0, 1));
    assert_eq!(store.snapshot(), before);

    let err = service.insert_leaf(1, v(5)).await.unwrap_err();
    assert_matches!(err, MTError::Conflict { leaf_index: 1, .. });
    assert_eq!(err.kind().status_code(), 409);
    assert_eq!(store.snapshot(), before);
    assert_eq!(service.checkpoint().root, root);
}

#[tokio::test]
async fn test_out_of_order_leaf_waits_for_predecessors() {
    let (service, _) = additive_service(3).await;
    let q = service.query();

    let report = service.insert_leaf(2, v(5)).await.unwrap();
    assert_eq!(report.watermark, None);
    assert_eq!(report.buffered, 1);
    assert_eq!(q.get_leaf(2).await.unwrap(), v(0));
    assert_eq!(q.count_nodes().await.unwrap(), 0);

    service.insert_leaf(0, v(1)).await.unwrap();
    assert_eq!(q.get_leaf(2).await.unwrap(), v(0));

    let report = service.insert_leaf(1, v(2)).await.unwrap();
    assert_eq!(report.watermark, Some(2));
    assert_eq!(report.applied, 2);
    assert_eq!(q.get_leaf(2).await.unwrap(), v(5));
    assert_eq!(q.get_root().await.unwrap(), v(8));
}

#[tokio::test]
async fn test_sibling_paths_reconstruct_root() {
    let service = MerkleTreeService::open(memory_config(8, 32)).await.unwrap();
    service
        .insert_leaves(0, (0..21).map(sha_leaf).collect())
        .await
        .unwrap();
    let q = service.query();
    let root = q.get_root().await.unwrap();
    let hasher = ShaHasher::new();

    for leaf in [0u64, 1, 7, 8, 20] {
        let path = q.get_sibling_path(leaf).await.unwrap();
        assert_eq!(path.len(), 8);
        let leaf_value = q.get_leaf(leaf).await.unwrap();
        assert!(merkle_tree_sync::query::verify_sibling_path(&hasher, leaf, &leaf_value, &path, &root).unwrap());
        assert!(!merkle_tree_sync::query::verify_sibling_path(&hasher, leaf, &sha_leaf(99), &path, &root).unwrap());
    }
}

#[tokio::test]
async fn test_boundary_errors() {
    let (service, store) = additive_service(2).await;
    assert_matches!(service.insert_leaf(4, v(1)).await, Err(MTError::OutOfRange { .. }));
    assert_matches!(
        service.insert_leaf(0, NodeValue::new(vec![1, 1])).await,
        Err(MTError::Validation(_))
    );
    assert_matches!(service.query().get_node(7).await, Err(MTError::OutOfRange { .. }));
    assert!(store.is_empty());
    assert_eq!(
        service.ingest(LeafEvent::batch(0, vec![])).await.unwrap().applied,
        0
    );
}
