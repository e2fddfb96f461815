use criterion::{black_box, criterion_group, criterion_main, Criterion};
use merkle_tree_sync::core::hash::ShaHasher;
use merkle_tree_sync::core::propagation::HashPropagator;
use merkle_tree_sync::storage::{MemoryNodeStore, NodeStore};
use merkle_tree_sync::test_utils::memory_config;
use merkle_tree_sync::{LeafEvent, MerkleTreeService, NodeValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn leaf(i: u64) -> NodeValue {
    let mut bytes = vec![0u8; 32];
    bytes[24..].copy_from_slice(&i.to_be_bytes());
    NodeValue::new(bytes)
}

fn bench_propagate_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = memory_config(32, 32);
    let propagator = HashPropagator::new(&config.tree_metadata(), Arc::new(ShaHasher::new())).unwrap();
    let batch: BTreeMap<u64, NodeValue> = (0..256).map(|i| (i, leaf(i))).collect();

    c.bench_function("propagate_256_leaves_h32", |b| {
        b.to_async(&rt).iter(|| async {
            let store = MemoryNodeStore::new();
            let out = propagator
                .propagate(&store as &dyn NodeStore, black_box(&batch), Some(256))
                .await
                .unwrap();
            black_box(out.root);
        });
    });
}

fn bench_sibling_path(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let service = rt
        .block_on(MerkleTreeService::open(memory_config(32, 32)))
        .unwrap();

    // Prepopulate with 1000 leaves
    rt.block_on(async {
        let values = (0..1000).map(leaf).collect();
        service.ingest(LeafEvent::batch(0, values)).await.unwrap();
    });

    c.bench_function("sibling_path_h32", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = service.query().get_sibling_path(black_box(517)).await.unwrap();
        });
    });
}

criterion_group!(benches, bench_propagate_batch, bench_sibling_path);
criterion_main!(benches);
