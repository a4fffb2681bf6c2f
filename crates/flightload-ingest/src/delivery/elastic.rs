//! Elasticsearch REST client
//!
//! Covers what the loader needs: create-only `_bulk` writes and index
//! existence, creation and deletion.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::{debug, info};

use super::{BulkBatch, BulkResponse, DocumentIndex, ItemError, ItemOutcome};
use crate::config::ElasticConfig;
use crate::error::{DeliveryError, IndexError};

const NDJSON: &str = "application/x-ndjson";

/// Client for one index on one cluster
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    client: Client,
    endpoint: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireBulkResponse {
    #[serde(default)]
    items: Vec<WireBulkItem>,
}

#[derive(Debug, Deserialize)]
struct WireBulkItem {
    #[serde(alias = "index")]
    create: WireItemResult,
}

#[derive(Debug, Deserialize)]
struct WireItemResult {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<WireItemError>,
}

#[derive(Debug, Deserialize)]
struct WireItemError {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

impl From<WireBulkResponse> for BulkResponse {
    fn from(wire: WireBulkResponse) -> Self {
        let items = wire
            .items
            .into_iter()
            .map(|item| {
                let result = item.create;
                ItemOutcome {
                    id: result.id,
                    status: result.status,
                    error: result.error.map(|e| ItemError {
                        kind: e.kind,
                        reason: e.reason.unwrap_or_default(),
                    }),
                }
            })
            .collect();
        BulkResponse { items }
    }
}

impl ElasticsearchClient {
    pub fn new(config: &ElasticConfig) -> Result<Self, IndexError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| IndexError::Http {
                url: config.endpoint.clone(),
                source,
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.index)
    }

    fn bulk_url(&self) -> String {
        format!("{}/_bulk", self.endpoint)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    /// Newline-delimited create actions for `batch`
    pub fn encode_bulk(&self, batch: &BulkBatch) -> String {
        let mut body = String::with_capacity(batch.bytes + self.index.len() * batch.len());
        for item in &batch.items {
            let action = json!({ "create": { "_index": self.index, "_id": item.id } });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&item.document);
            body.push('\n');
        }
        body
    }

    pub async fn index_exists(&self) -> Result<bool, IndexError> {
        let url = self.index_url();
        let response = self
            .request(Method::HEAD, &url)
            .send()
            .await
            .map_err(|source| IndexError::Http { url, source })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(IndexError::Status {
                operation: "existence check",
                index: self.index.clone(),
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }

    /// Create the index with `mapping` as the request body
    pub async fn create_index(&self, mapping: &str) -> Result<(), IndexError> {
        let request = self
            .request(Method::PUT, &self.index_url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(mapping.to_string());
        self.acknowledged("creation", request).await?;
        info!(index = %self.index, "Index created");
        Ok(())
    }

    pub async fn delete_index(&self) -> Result<(), IndexError> {
        let request = self.request(Method::DELETE, &self.index_url());
        self.acknowledged("deletion", request).await?;
        info!(index = %self.index, "Index deleted");
        Ok(())
    }

    /// Create the index from the mapping file unless it already exists.
    ///
    /// Returns true when the index was created.
    pub async fn ensure_index(&self, mapping_path: &Path) -> Result<bool, IndexError> {
        if self.index_exists().await? {
            info!(index = %self.index, "Index already exists");
            return Ok(false);
        }

        let mapping = tokio::fs::read_to_string(mapping_path)
            .await
            .map_err(|source| IndexError::Mapping {
                path: mapping_path.to_path_buf(),
                source,
            })?;
        debug!(index = %self.index, mapping = %mapping_path.display(), "Creating index");
        self.create_index(&mapping).await?;
        Ok(true)
    }

    async fn acknowledged(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(), IndexError> {
        let url = self.index_url();
        let response = request.send().await.map_err(|source| IndexError::Http {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| IndexError::Http { url, source })?;

        if !status.is_success() {
            return Err(IndexError::Status {
                operation,
                index: self.index.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let ack: Acknowledged = serde_json::from_str(&body).unwrap_or(Acknowledged {
            acknowledged: false,
        });
        if !ack.acknowledged {
            return Err(IndexError::NotAcknowledged {
                operation,
                index: self.index.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for ElasticsearchClient {
    async fn bulk_create(&self, batch: &BulkBatch) -> Result<BulkResponse, DeliveryError> {
        let transport = |reason: String| DeliveryError::Transport {
            batch: batch.id,
            reason,
        };

        let response = self
            .request(Method::POST, &self.bulk_url())
            .header(reqwest::header::CONTENT_TYPE, NDJSON)
            .body(self.encode_bulk(batch))
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport(e.to_string()))?;
        if !status.is_success() {
            return Err(transport(format!("status {}: {}", status.as_u16(), body)));
        }

        let wire: WireBulkResponse = serde_json::from_str(&body)
            .map_err(|e| transport(format!("unreadable bulk response: {e}")))?;
        if wire.items.len() != batch.len() {
            return Err(transport(format!(
                "bulk response has {} items for {} actions",
                wire.items.len(),
                batch.len()
            )));
        }
        Ok(wire.into())
    }
}
