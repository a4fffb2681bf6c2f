//! Flightload Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads monthly on-time flight extracts into a search index. Each row is
//! joined with airline and airport reference data, its clocks are placed in
//! the airports' timezones, and the result is written under a deterministic
//! identity with create-only bulk requests.
//!
//! # Modules
//!
//! - [`reference`]: airline and airport lookup tables
//! - [`time`]: local clock to offset-aware timestamp
//! - [`identity`]: per-flight document id
//! - [`coerce`]: raw column conversion
//! - [`transform`]: one row to one [`models::FlightRecord`]
//! - [`delivery`]: batching, worker pool, index clients
//! - [`pipeline`]: the load driver
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flightload_ingest::config::IngestConfig;
//! use flightload_ingest::delivery::ElasticsearchClient;
//! use flightload_ingest::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let client = ElasticsearchClient::new(&config.elastic)?;
//!     client.ensure_index(config.mapping_path()).await?;
//!
//!     let summary = Pipeline::new(config.sources, config.delivery)
//!         .run(Arc::new(client))
//!         .await?;
//!     println!("{} flights delivered", summary.delivered);
//!     Ok(())
//! }
//! ```

pub mod coerce;
pub mod config;
pub mod delivery;
pub mod error;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod reference;
pub mod time;
pub mod transform;

pub use error::{IngestError, Result};
pub use models::{FlightRecord, TransformedFlight};
pub use pipeline::{Pipeline, RunSummary};
