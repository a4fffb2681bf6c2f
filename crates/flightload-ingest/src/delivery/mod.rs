//! Bulk create-only delivery
//!
//! Records are grouped into [`BulkBatch`]es by the [`BatchDeliverer`] and
//! written through a [`DocumentIndex`]. Two indexes are provided:
//!
//! - [`ElasticsearchClient`]: the `_bulk` REST endpoint
//! - [`MemoryIndex`]: in-process store used for dry runs and tests

pub mod deliverer;
pub mod elastic;
pub mod memory;

use async_trait::async_trait;
use std::sync::OnceLock;

use crate::error::DeliveryError;

pub use deliverer::{BatchDeliverer, DeliveryState, DeliverySummary};
pub use elastic::ElasticsearchClient;
pub use memory::MemoryIndex;

/// Bytes added per item on the wire besides the id and document
/// (action line skeleton plus two newlines)
const ITEM_OVERHEAD_BYTES: usize = 48;

/// One create action: the identity and the already-encoded JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub id: String,
    pub document: String,
}

impl BulkItem {
    /// Approximate size of this item in a bulk request body
    pub fn encoded_len(&self) -> usize {
        self.id.len() + self.document.len() + ITEM_OVERHEAD_BYTES
    }
}

/// A group of create actions submitted as one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkBatch {
    /// Sequence number, starting at 1, in submission order
    pub id: u64,
    pub items: Vec<BulkItem>,
    pub bytes: usize,
}

impl BulkBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Failure reported by the index for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub kind: String,
    pub reason: String,
}

/// Per-item result of a bulk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: String,
    pub status: u16,
    pub error: Option<ItemError>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Outcome of one bulk request, in item order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub items: Vec<ItemOutcome>,
}

impl BulkResponse {
    /// The first failed item of `batch` as a [`DeliveryError`]
    pub fn first_failure(&self, batch: u64) -> Option<DeliveryError> {
        self.items
            .iter()
            .find(|item| !item.is_success())
            .map(|item| {
                let (kind, reason) = match &item.error {
                    Some(err) => (err.kind.clone(), err.reason.clone()),
                    None => ("unknown".to_string(), format!("status {}", item.status)),
                };
                DeliveryError::Rejected {
                    batch,
                    id: item.id.clone(),
                    status: item.status,
                    kind,
                    reason,
                }
            })
    }
}

/// Store that accepts create-only bulk writes
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Create every item of `batch`; an existing identity is an item failure.
    ///
    /// `Err` means the request as a whole failed. Item failures come back in
    /// the response.
    async fn bulk_create(&self, batch: &BulkBatch) -> Result<BulkResponse, DeliveryError>;
}

/// Write-once flag recording the first delivery failure
#[derive(Debug, Default)]
pub struct AbortSignal {
    error: OnceLock<DeliveryError>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` unless one is already recorded.
    ///
    /// Returns true for the call that tripped the signal.
    pub fn trip(&self, error: DeliveryError) -> bool {
        self.error.set(error).is_ok()
    }

    pub fn get(&self) -> Option<&DeliveryError> {
        self.error.get()
    }

    pub fn is_tripped(&self) -> bool {
        self.error.get().is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn outcome(id: &str, status: u16, error: Option<(&str, &str)>) -> ItemOutcome {
        ItemOutcome {
            id: id.to_string(),
            status,
            error: error.map(|(kind, reason)| ItemError {
                kind: kind.to_string(),
                reason: reason.to_string(),
            }),
        }
    }

    #[test]
    fn test_first_failure_picks_first_bad_item() {
        let response = BulkResponse {
            items: vec![
                outcome("a", 201, None),
                outcome("b", 409, Some(("version_conflict_engine_exception", "exists"))),
                outcome("c", 400, Some(("mapper_parsing_exception", "bad"))),
            ],
        };

        let err = response.first_failure(3).unwrap();
        assert!(err.is_conflict());
        assert_eq!(err.flight_id(), Some("b"));
        assert!(matches!(err, DeliveryError::Rejected { batch: 3, .. }));
    }

    #[test]
    fn test_error_object_fails_even_with_2xx() {
        let response = BulkResponse {
            items: vec![outcome("a", 200, Some(("weird", "still an error")))],
        };
        assert!(response.first_failure(1).is_some());
    }

    #[test]
    fn test_all_success() {
        let response = BulkResponse {
            items: vec![outcome("a", 201, None), outcome("b", 200, None)],
        };
        assert_eq!(response.first_failure(1), None);
    }

    #[test]
    fn test_abort_signal_is_write_once() {
        let signal = AbortSignal::new();
        assert!(!signal.is_tripped());

        assert!(signal.trip(DeliveryError::Transport {
            batch: 1,
            reason: "first".into()
        }));
        assert!(!signal.trip(DeliveryError::QueueClosed));

        assert!(signal.is_tripped());
        assert_eq!(
            signal.get(),
            Some(&DeliveryError::Transport {
                batch: 1,
                reason: "first".into()
            })
        );
    }
}
