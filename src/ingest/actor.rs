// src/ingest/actor.rs

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{ErrorKind, MTError, Result};
use crate::ingest::event::LeafEvent;
use crate::ingest::ingestor::LeafIngestor;

/// Counters reported by the ingestion task when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Notifications received.
    pub events: u64,
    /// Leaves committed.
    pub applied: u64,
    /// Re-delivered leaves ignored as duplicates.
    pub duplicates: u64,
    /// Notifications dropped as out of range or malformed.
    pub rejected: u64,
}

/// Sending side of the ingestion task. Cloneable; the task stops once every
/// handle is dropped and the queue is drained.
#[derive(Debug, Clone)]
pub struct IngestionHandle {
    tx: mpsc::Sender<LeafEvent>,
}

impl IngestionHandle {
    /// Queue a notification, waiting while the channel is full.
    ///
    /// Fails with `ChannelClosed` once the task has stopped, for example
    /// after it surfaced a conflict.
    pub async fn submit(&self, event: LeafEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| MTError::ChannelClosed)
    }

    /// Whether the ingestion task is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the writer task consuming a bounded channel of `capacity` events.
///
/// The task returns `Ok(stats)` when every handle has been dropped. It
/// returns the error, and stops accepting events, on a conflict, a sync gap
/// or a store/hash failure that outlived its retries; those need an
/// operator. Malformed and out-of-range events are logged and skipped.
pub fn spawn_ingestion(
    ingestor: Arc<Mutex<LeafIngestor>>,
    capacity: usize,
) -> (IngestionHandle, JoinHandle<Result<IngestStats>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run(ingestor, rx));
    (IngestionHandle { tx }, task)
}

async fn run(ingestor: Arc<Mutex<LeafIngestor>>, mut rx: mpsc::Receiver<LeafEvent>) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    info!("Ingestion task started");
    while let Some(event) = rx.recv().await {
        stats.events += 1;
        let first = event.first_index();
        let result = ingestor.lock().await.ingest(event).await;
        match result {
            Ok(report) => {
                stats.applied += report.applied as u64;
                stats.duplicates += report.duplicates as u64;
            }
            Err(e) if matches!(e.kind(), ErrorKind::OutOfRange | ErrorKind::Validation) => {
                stats.rejected += 1;
                warn!("Skipping notification starting at leaf {}: {}", first, e);
            }
            Err(e) => {
                error!("Ingestion stopped at notification starting at leaf {}: {}", first, e);
                rx.close();
                return Err(e);
            }
        }
    }
    debug!("Ingestion channel closed by all senders");
    info!(
        "Ingestion task finished: {} events, {} leaves applied, {} duplicates, {} rejected",
        stats.events, stats.applied, stats.duplicates, stats.rejected
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IngestionConfig, TrackerConfig};
    use crate::core::node::NodeValue;
    use crate::core::propagation::HashPropagator;
    use crate::storage::MemoryNodeStore;
    use crate::test_utils::{additive_metadata, AdditiveHasher};
    use assert_matches::assert_matches;

    fn v(byte: u8) -> NodeValue {
        NodeValue::new(vec![byte])
    }

    async fn shared_ingestor() -> Arc<Mutex<LeafIngestor>> {
        let propagator = HashPropagator::new(&additive_metadata(3), Arc::new(AdditiveHasher)).unwrap();
        let ingestor = LeafIngestor::open(
            Arc::new(MemoryNodeStore::new()),
            propagator,
            IngestionConfig::default(),
            &TrackerConfig::default(),
        )
        .await
        .unwrap();
        Arc::new(Mutex::new(ingestor))
    }

    #[tokio::test]
    async fn test_task_applies_events_and_stops_on_drop() {
        let ingestor = shared_ingestor().await;
        let (handle, task) = spawn_ingestion(ingestor.clone(), 4);
        handle.submit(LeafEvent::single(1, v(2))).await.unwrap();
        handle.submit(LeafEvent::single(0, v(1))).await.unwrap();
        handle.submit(LeafEvent::single(0, v(1))).await.unwrap();
        handle.submit(LeafEvent::single(99, v(1))).await.unwrap();
        drop(handle);

        let stats = task.await.unwrap().unwrap();
        assert_eq!(
            stats,
            IngestStats {
                events: 4,
                applied: 2,
                duplicates: 1,
                rejected: 1
            }
        );
        assert_eq!(ingestor.lock().await.watermark(), Some(1));
    }

    #[tokio::test]
    async fn test_task_stops_on_conflict() {
        let ingestor = shared_ingestor().await;
        let (handle, task) = spawn_ingestion(ingestor, 4);
        handle.submit(LeafEvent::single(0, v(1))).await.unwrap();
        handle.submit(LeafEvent::single(0, v(2))).await.unwrap();

        assert_matches!(task.await.unwrap(), Err(MTError::Conflict { leaf_index: 0, .. }));
        assert!(handle.is_closed());
        assert_matches!(
            handle.submit(LeafEvent::single(1, v(1))).await,
            Err(MTError::ChannelClosed)
        );
    }
}
