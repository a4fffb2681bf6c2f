//! In-process create-only index

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::{BulkBatch, BulkResponse, DocumentIndex, ItemError, ItemOutcome};
use crate::error::{DeliveryError, CONFLICT_ERROR_KIND};

/// Keeps documents in a map keyed by identity, with the same create-only
/// item semantics as the REST index
#[derive(Debug, Default)]
pub struct MemoryIndex {
    documents: Mutex<HashMap<String, Value>>,
    requests: AtomicU64,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.lock().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<Value> {
        self.documents.lock().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.documents.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Bulk requests received
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn bulk_create(&self, batch: &BulkBatch) -> Result<BulkResponse, DeliveryError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut documents = self.documents.lock().await;

        let items = batch
            .items
            .iter()
            .map(|item| {
                if documents.contains_key(&item.id) {
                    return ItemOutcome {
                        id: item.id.clone(),
                        status: 409,
                        error: Some(ItemError {
                            kind: CONFLICT_ERROR_KIND.to_string(),
                            reason: format!(
                                "[{}]: version conflict, document already exists",
                                item.id
                            ),
                        }),
                    };
                }

                match serde_json::from_str::<Value>(&item.document) {
                    Ok(doc) => {
                        documents.insert(item.id.clone(), doc);
                        ItemOutcome {
                            id: item.id.clone(),
                            status: 201,
                            error: None,
                        }
                    },
                    Err(e) => ItemOutcome {
                        id: item.id.clone(),
                        status: 400,
                        error: Some(ItemError {
                            kind: "mapper_parsing_exception".to_string(),
                            reason: e.to_string(),
                        }),
                    },
                }
            })
            .collect();

        Ok(BulkResponse { items })
    }
}
