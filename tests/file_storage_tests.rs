use merkle_tree_sync::config::{Config, HashType, StorageType};
use merkle_tree_sync::storage::{FileNodeStore, NodeStore};
use merkle_tree_sync::{LeafEvent, MTError, MerkleTreeService, NodeValue};

use assert_matches::assert_matches;
use std::fs;
use tempfile::tempdir;

fn file_config(base_path: &std::path::Path, height: u8) -> Config {
    let mut config = Config::default();
    config.tree.height = height;
    config.storage.storage_type = StorageType::File;
    config.storage.base_path = base_path.to_string_lossy().into_owned();
    config
}

fn leaf(i: u64) -> NodeValue {
    let mut bytes = vec![0u8; 32];
    bytes[24..].copy_from_slice(&i.to_be_bytes());
    NodeValue::new(bytes)
}

#[tokio::test]
async fn test_restart_recovers_watermark_and_root() {
    let dir = tempdir().unwrap();
    let root_before;
    {
        let service = MerkleTreeService::open(file_config(dir.path(), 16)).await.unwrap();
        service.insert_leaves(0, (0..5).map(leaf).collect()).await.unwrap();
        // buffered entries are not persisted
        service.insert_leaf(9, leaf(9)).await.unwrap();
        root_before = service.checkpoint().root;
    }

    let service = MerkleTreeService::open(file_config(dir.path(), 16)).await.unwrap();
    let checkpoint = service.checkpoint();
    assert_eq!(checkpoint.watermark, Some(4));
    assert_eq!(checkpoint.root, root_before);
    assert_eq!(service.query().get_leaf(9).await.unwrap(), NodeValue::zero(27));

    let report = service.insert_leaf(5, leaf(5)).await.unwrap();
    assert_eq!(report.watermark, Some(5));
}

#[tokio::test]
async fn test_reopen_matches_in_memory_tree() {
    let dir = tempdir().unwrap();
    let mut memory = file_config(dir.path(), 12);
    memory.storage.storage_type = StorageType::Memory;
    let in_memory = MerkleTreeService::open(memory).await.unwrap();
    {
        let on_disk = MerkleTreeService::open(file_config(dir.path(), 12)).await.unwrap();
        for i in 0..20 {
            on_disk.insert_leaf(i, leaf(i)).await.unwrap();
            in_memory.insert_leaf(i, leaf(i)).await.unwrap();
        }
        on_disk.rewind(15).await.unwrap();
        in_memory.rewind(15).await.unwrap();
    }
    let reopened = MerkleTreeService::open(file_config(dir.path(), 12)).await.unwrap();
    assert_eq!(
        reopened.query().get_root().await.unwrap(),
        in_memory.query().get_root().await.unwrap()
    );
    assert_eq!(
        reopened.query().count_nodes().await.unwrap(),
        in_memory.query().count_nodes().await.unwrap()
    );
    assert_eq!(reopened.query().count_leaves().await.unwrap(), 15);
}

#[tokio::test]
async fn test_torn_journal_tail_is_discarded() {
    let dir = tempdir().unwrap();
    {
        let service = MerkleTreeService::open(file_config(dir.path(), 8)).await.unwrap();
        service.insert_leaves(0, (0..3).map(leaf).collect()).await.unwrap();
    }
    let journal = dir.path().join("nodes.jsonl");
    let mut raw = fs::read(&journal).unwrap();
    raw.extend_from_slice(br#"{"puts":[{"nodeIndex":258,"value":"0x01"#);
    fs::write(&journal, raw).unwrap();

    let service = MerkleTreeService::open(file_config(dir.path(), 8)).await.unwrap();
    assert_eq!(service.checkpoint().watermark, Some(2));
    service.insert_leaf(3, leaf(3)).await.unwrap();
    drop(service);

    let service = MerkleTreeService::open(file_config(dir.path(), 8)).await.unwrap();
    assert_eq!(service.checkpoint().watermark, Some(3));
}

#[tokio::test]
async fn test_store_refuses_different_tree_shape() {
    let dir = tempdir().unwrap();
    {
        MerkleTreeService::open(file_config(dir.path(), 8)).await.unwrap();
    }
    let mut other = file_config(dir.path(), 8);
    other.tree.hash_type = HashType::Blake3;
    let err = MerkleTreeService::open(other).await.unwrap_err();
    assert_matches!(err, MTError::StorageError(_));
}

#[tokio::test]
async fn test_journal_lines_use_persisted_node_layout() {
    let dir = tempdir().unwrap();
    let config = file_config(dir.path(), 4);
    let metadata = config.tree_metadata();
    let store = FileNodeStore::open(dir.path(), &metadata).await.unwrap();
    let service = MerkleTreeService::with_parts(
        config,
        std::sync::Arc::new(store),
        merkle_tree_sync::core::hasher_for(HashType::Sha),
    )
    .await
    .unwrap();
    service.ingest(LeafEvent::single(0, leaf(1))).await.unwrap();
    assert_eq!(service.store().count_nodes().await.unwrap(), 5);

    let journal = fs::read_to_string(dir.path().join("nodes.jsonl")).unwrap();
    let line: serde_json::Value = serde_json::from_str(journal.lines().next().unwrap()).unwrap();
    assert_eq!(line["leafCount"], 1);
    let first = &line["puts"][0];
    assert_eq!(first["nodeIndex"], 0);
    assert!(first["value"].as_str().unwrap().starts_with("0x"));
}
