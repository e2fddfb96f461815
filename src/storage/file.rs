// src/storage/file.rs

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::core::node::{Node, NodeValue, TreeMetadata};
use crate::error::MTError;
use crate::storage::memory::NodeMap;
use crate::storage::{NodeStore, WriteBatch};

const MARKER_FILE_NAME: &str = ".merkle-tree-sync";
const METADATA_FILE_NAME: &str = "metadata.json";
const JOURNAL_FILE_NAME: &str = "nodes.jsonl";

/// One committed batch, one line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    puts: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    deletes: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leaf_count: Option<u64>,
}

impl BatchRecord {
    fn from_batch(batch: &WriteBatch) -> Self {
        Self {
            puts: batch
                .puts()
                .iter()
                .map(|(i, v)| Node::new(*i, v.clone()))
                .collect(),
            deletes: batch.deletes().iter().copied().collect(),
            leaf_count: batch.leaf_count(),
        }
    }

    fn into_batch(self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for index in self.deletes {
            batch.delete(index);
        }
        for node in self.puts {
            batch.put(node.node_index, node.value);
        }
        if let Some(leaf_count) = self.leaf_count {
            batch.set_leaf_count(leaf_count);
        }
        batch
    }
}

/// Injected journal failure, consumed by the next commit.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JournalFault {
    /// Write half the line, then fail.
    Append,
    /// As `Append`, and the rollback fails too.
    AppendAndRollback,
}

#[derive(Debug)]
struct JournalWriter {
    file: fs::File,
    /// Length of the journal's valid prefix.
    len: u64,
    /// Set when a failed append could not be rolled back; the file may end
    /// in a partial line and no further appends are accepted.
    poisoned: bool,
    #[cfg(test)]
    fault: Option<JournalFault>,
}

impl JournalWriter {
    fn new(file: fs::File, len: u64) -> Self {
        Self {
            file,
            len,
            poisoned: false,
            #[cfg(test)]
            fault: None,
        }
    }

    async fn append(&mut self, line: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fault.is_some() {
            self.file.write_all(&line[..line.len() / 2]).await?;
            self.file.flush().await?;
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected append failure"));
        }
        self.file.write_all(line).await?;
        self.file.sync_data().await
    }

    /// Cut the file back to the valid prefix.
    async fn rollback(&mut self) -> std::io::Result<()> {
        #[cfg(test)]
        if self.fault.take() == Some(JournalFault::AppendAndRollback) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "injected rollback failure"));
        }
        self.file.set_len(self.len).await
    }
}

/// A node store persisted to the file system.
///
/// Layout under `base_path`:
/// - `metadata.json`: the tree metadata the directory was created with
/// - `nodes.jsonl`: append-only journal, one committed batch per line
///
/// The full node map is replayed into memory on open. A commit appends its
/// line and syncs it before the in-memory state changes, so a crash leaves at
/// most a torn final line, which the next open truncates.
#[derive(Debug)]
pub struct FileNodeStore {
    base_path: PathBuf,
    state: RwLock<NodeMap>,
    writer: Mutex<JournalWriter>,
}

fn storage_err(action: &str, path: &Path, e: impl std::fmt::Display) -> MTError {
    MTError::StorageError(format!("Failed to {} '{}': {}", action, path.display(), e))
}

impl FileNodeStore {
    /// Opens (or creates) a store rooted at `base_path` for a tree described
    /// by `metadata`.
    ///
    /// Fails with `StorageError` if the directory was created for different
    /// metadata or the journal is corrupt before its final line.
    pub async fn open<P: AsRef<Path>>(base_path: P, metadata: &TreeMetadata) -> Result<Self, MTError> {
        let path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&path)
            .await
            .map_err(|e| storage_err("create base path", &path, e))?;

        let marker_path = path.join(MARKER_FILE_NAME);
        if !fs::try_exists(&marker_path)
            .await
            .map_err(|e| storage_err("check marker file", &marker_path, e))?
        {
            fs::File::create(&marker_path)
                .await
                .map_err(|e| storage_err("create marker file", &marker_path, e))?;
        }

        Self::pin_metadata(&path.join(METADATA_FILE_NAME), metadata).await?;

        let journal_path = path.join(JOURNAL_FILE_NAME);
        let (state, valid_len) = Self::replay(&journal_path).await?;

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .await
            .map_err(|e| storage_err("open journal", &journal_path, e))?;
        let on_disk = file
            .metadata()
            .await
            .map_err(|e| storage_err("stat journal", &journal_path, e))?
            .len();
        if on_disk > valid_len {
            warn!(
                "Truncating torn journal tail in '{}' ({} -> {} bytes)",
                journal_path.display(),
                on_disk,
                valid_len
            );
            file.set_len(valid_len)
                .await
                .map_err(|e| storage_err("truncate journal", &journal_path, e))?;
        }

        info!(
            "Opened node store at '{}': {} nodes, leaf count {}",
            path.display(),
            state.len(),
            state.leaf_count()
        );

        Ok(Self {
            base_path: path,
            state: RwLock::new(state),
            writer: Mutex::new(JournalWriter::new(file, valid_len)),
        })
    }

    /// Root directory of this store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn pin_metadata(meta_path: &Path, metadata: &TreeMetadata) -> Result<(), MTError> {
        match fs::read(meta_path).await {
            Ok(bytes) => {
                let stored: TreeMetadata = serde_json::from_slice(&bytes)?;
                if &stored != metadata {
                    return Err(MTError::StorageError(format!(
                        "Store at '{}' was created for height {} / {} / leaf length {}, not height {} / {} / leaf length {}",
                        meta_path.display(),
                        stored.height(),
                        stored.hash_type(),
                        stored.leaf_hash_length(),
                        metadata.height(),
                        metadata.hash_type(),
                        metadata.leaf_hash_length()
                    )));
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let json = serde_json::to_string_pretty(metadata)?;
                fs::write(meta_path, json)
                    .await
                    .map_err(|e| storage_err("write metadata", meta_path, e))
            }
            Err(e) => Err(storage_err("read metadata", meta_path, e)),
        }
    }

    /// Rebuild the node map from the journal. Returns the state and the byte
    /// length of the valid prefix.
    async fn replay(journal_path: &Path) -> Result<(NodeMap, u64), MTError> {
        let mut state = NodeMap::default();
        let bytes = match fs::read(journal_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((state, 0)),
            Err(e) => return Err(storage_err("read journal", journal_path, e)),
        };

        let mut offset = 0usize;
        let mut line_no = 0usize;
        while offset < bytes.len() {
            line_no += 1;
            let Some(rel_end) = bytes[offset..].iter().position(|b| *b == b'\n') else {
                // No newline: the final write never completed.
                break;
            };
            let line = &bytes[offset..offset + rel_end];
            let next = offset + rel_end + 1;
            match serde_json::from_slice::<BatchRecord>(line) {
                Ok(record) => state.apply(&record.into_batch()),
                Err(e) if next >= bytes.len() => {
                    debug!("Discarding unreadable final journal line {}: {}", line_no, e);
                    break;
                }
                Err(e) => {
                    return Err(MTError::StorageError(format!(
                        "Corrupt journal '{}' at line {}: {}",
                        journal_path.display(),
                        line_no,
                        e
                    )))
                }
            }
            offset = next;
        }
        Ok((state, offset as u64))
    }
}

#[async_trait]
impl NodeStore for FileNodeStore {
    async fn get_node(&self, node_index: u64) -> Result<Option<NodeValue>, MTError> {
        Ok(self.state.read().get(node_index))
    }

    async fn get_nodes(&self, node_indices: &[u64]) -> Result<Vec<Node>, MTError> {
        Ok(self.state.read().get_many(node_indices))
    }

    async fn get_nodes_in_range(&self, min_index: u64, max_index: u64) -> Result<Vec<Node>, MTError> {
        Ok(self.state.read().range(min_index, max_index))
    }

    async fn get_nodes_by_value(&self, value: &NodeValue) -> Result<Vec<Node>, MTError> {
        Ok(self.state.read().by_value(value))
    }

    async fn count_nodes(&self) -> Result<u64, MTError> {
        Ok(self.state.read().len())
    }

    async fn load_leaf_count(&self) -> Result<u64, MTError> {
        Ok(self.state.read().leaf_count())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), MTError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut line = serde_json::to_vec(&BatchRecord::from_batch(&batch))?;
        line.push(b'\n');

        let journal_path = self.base_path.join(JOURNAL_FILE_NAME);
        let mut writer = self.writer.lock().await;
        if writer.poisoned {
            return Err(MTError::StorageError(format!(
                "Journal '{}' has an unrecovered partial write; reopen the store",
                journal_path.display()
            )));
        }
        if let Err(e) = writer.append(&line).await {
            // Drop whatever part of the line made it out so the next append starts clean.
            if let Err(rollback) = writer.rollback().await {
                writer.poisoned = true;
                error!(
                    "Journal '{}' left with a partial line, refusing further commits: {}",
                    journal_path.display(),
                    rollback
                );
                return Err(storage_err(
                    "roll back journal",
                    &journal_path,
                    format!("{} (after append failure: {})", rollback, e),
                ));
            }
            return Err(storage_err("append to journal", &journal_path, e));
        }
        writer.len += line.len() as u64;

        self.state.write().apply(&batch);
        Ok(())
    }
}
