// src/ingest/event.rs

use serde::{Deserialize, Serialize};

use crate::core::node::NodeValue;
use crate::error::{MTError, Result};

/// One leaf-append notification from the on-chain feed.
///
/// Wire shapes are `{"leafIndex": 5, "leafValue": "0x.."}` and
/// `{"minLeafIndex": 5, "leafValues": ["0x..", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeafEvent {
    /// A single leaf.
    #[serde(rename_all = "camelCase")]
    Single {
        leaf_index: u64,
        leaf_value: NodeValue,
    },
    /// A contiguous run of leaves starting at `min_leaf_index`.
    #[serde(rename_all = "camelCase")]
    Batch {
        min_leaf_index: u64,
        leaf_values: Vec<NodeValue>,
    },
}

impl LeafEvent {
    pub fn single(leaf_index: u64, leaf_value: NodeValue) -> Self {
        LeafEvent::Single {
            leaf_index,
            leaf_value,
        }
    }

    pub fn batch(min_leaf_index: u64, leaf_values: Vec<NodeValue>) -> Self {
        LeafEvent::Batch {
            min_leaf_index,
            leaf_values,
        }
    }

    /// First leaf index carried by the event.
    pub fn first_index(&self) -> u64 {
        match self {
            LeafEvent::Single { leaf_index, .. } => *leaf_index,
            LeafEvent::Batch { min_leaf_index, .. } => *min_leaf_index,
        }
    }

    /// Number of leaves carried.
    pub fn len(&self) -> usize {
        match self {
            LeafEvent::Single { .. } => 1,
            LeafEvent::Batch { leaf_values, .. } => leaf_values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize into `(leafIndex, value)` pairs in index order.
    pub fn into_pairs(self) -> Result<Vec<(u64, NodeValue)>> {
        match self {
            LeafEvent::Single {
                leaf_index,
                leaf_value,
            } => Ok(vec![(leaf_index, leaf_value)]),
            LeafEvent::Batch {
                min_leaf_index,
                leaf_values,
            } => leaf_values
                .into_iter()
                .enumerate()
                .map(|(offset, value)| {
                    min_leaf_index
                        .checked_add(offset as u64)
                        .map(|index| (index, value))
                        .ok_or_else(|| {
                            MTError::validation(format!(
                                "batch starting at {} overflows the leaf index space",
                                min_leaf_index
                            ))
                        })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_batch() {
        let single: LeafEvent = serde_json::from_str(r#"{"leafIndex":3,"leafValue":"0x0a"}"#).unwrap();
        assert_eq!(single, LeafEvent::single(3, NodeValue::new(vec![10])));

        let batch: LeafEvent =
            serde_json::from_str(r#"{"minLeafIndex":4,"leafValues":["0x01","02"]}"#).unwrap();
        assert_eq!(batch.first_index(), 4);
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.into_pairs().unwrap(),
            vec![(4, NodeValue::new(vec![1])), (5, NodeValue::new(vec![2]))]
        );
    }

    #[test]
    fn test_rejects_malformed_events() {
        assert!(serde_json::from_str::<LeafEvent>(r#"{"leafIndex":3,"leafValue":"0xzz"}"#).is_err());
        assert!(serde_json::from_str::<LeafEvent>(r#"{"leafIndex":-1,"leafValue":"0x00"}"#).is_err());
        assert!(serde_json::from_str::<LeafEvent>(r#"{"index":1}"#).is_err());
    }

    #[test]
    fn test_batch_overflow_is_validation_error() {
        let event = LeafEvent::batch(u64::MAX, vec![NodeValue::new(vec![1]), NodeValue::new(vec![2])]);
        assert!(matches!(event.into_pairs(), Err(MTError::Validation(_))));
    }

    #[test]
    fn test_serializes_to_feed_shape() {
        let json = serde_json::to_string(&LeafEvent::batch(0, vec![NodeValue::new(vec![0xff])])).unwrap();
        assert_eq!(json, r#"{"minLeafIndex":0,"leafValues":["0xff"]}"#);
    }
}
