//! Loader configuration
//!
//! Everything is read from environment variables (after loading a `.env`
//! file, if any). Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{IngestError, Result};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_ENDPOINT: &str = "http://localhost:9200";
pub const DEFAULT_INDEX: &str = "flights";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAPPING_FILE: &str = "mapping.json";

pub const DEFAULT_AIRLINES_FILE: &str = "airlines.csv";
pub const DEFAULT_AIRPORTS_FILE: &str = "airports.csv";
/// Relative to the home directory
pub const DEFAULT_DATA_SUBDIR: &str = "data/flights";

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_BULK_ACTIONS: usize = 1000;
pub const DEFAULT_BULK_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// Monthly extracts loaded when no file list is configured
pub fn default_flight_files() -> Vec<String> {
    let months = (1..=12).map(|m| format!("2017-{m:02}.csv"));
    let months = months.chain((1..=7).map(|m| format!("2018-{m:02}.csv")));
    months.collect()
}

/// Where the index lives and how to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElasticConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub index: String,
    pub request_timeout_secs: u64,
    /// Index mapping used when the index has to be created
    pub mapping_file: PathBuf,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            username: None,
            password: None,
            index: DEFAULT_INDEX.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            mapping_file: PathBuf::from(DEFAULT_MAPPING_FILE),
        }
    }
}

impl ElasticConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Input extracts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub data_dir: PathBuf,
    pub airlines_file: String,
    pub airports_file: String,
    /// Flight extracts, loaded in this order
    pub flight_files: Vec<String>,
}

impl SourceConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            airlines_file: DEFAULT_AIRLINES_FILE.to_string(),
            airports_file: DEFAULT_AIRPORTS_FILE.to_string(),
            flight_files: default_flight_files(),
        }
    }

    pub fn airlines_path(&self) -> PathBuf {
        self.data_dir.join(&self.airlines_file)
    }

    pub fn airports_path(&self) -> PathBuf {
        self.data_dir.join(&self.airports_file)
    }

    pub fn flight_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.flight_files.iter().map(|f| self.data_dir.join(f))
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|home| home.join(DEFAULT_DATA_SUBDIR))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_SUBDIR));
        Self::new(data_dir)
    }
}

/// Batching and worker pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub workers: usize,
    /// Flush a batch after this many items
    pub bulk_actions: usize,
    /// Flush a batch once its encoded size reaches this many bytes
    pub bulk_size_bytes: usize,
    /// Batches waiting for a worker before the producer blocks, `None`
    /// follows `workers`
    pub queue_capacity: Option<usize>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            bulk_actions: DEFAULT_BULK_ACTIONS,
            bulk_size_bytes: DEFAULT_BULK_SIZE_BYTES,
            queue_capacity: None,
        }
    }
}

impl DeliveryConfig {
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(IngestError::config("FLIGHTLOAD_WORKERS must be greater than 0"));
        }
        if self.bulk_actions == 0 {
            return Err(IngestError::config("FLIGHTLOAD_BULK_ACTIONS must be greater than 0"));
        }
        if self.bulk_size_bytes == 0 {
            return Err(IngestError::config(
                "FLIGHTLOAD_BULK_SIZE_BYTES must be greater than 0",
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err(IngestError::config(
                "FLIGHTLOAD_QUEUE_CAPACITY must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Complete loader configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestConfig {
    pub elastic: ElasticConfig,
    pub sources: SourceConfig,
    pub delivery: DeliveryConfig,
}

impl IngestConfig {
    /// Load from the process environment, reading `.env` first
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source
    ///
    /// Values are parsed but not validated; call [`IngestConfig::validate`]
    /// once any overrides have been applied.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let elastic = ElasticConfig {
            endpoint: get("ELASTIC_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            username: get("ELASTIC_USERNAME"),
            password: get("ELASTIC_PASSWORD"),
            index: get("FLIGHTLOAD_INDEX").unwrap_or_else(|| DEFAULT_INDEX.to_string()),
            request_timeout_secs: parse_or(
                "FLIGHTLOAD_REQUEST_TIMEOUT_SECS",
                get("FLIGHTLOAD_REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            mapping_file: get("FLIGHTLOAD_MAPPING_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MAPPING_FILE)),
        };

        let mut sources = match get("FLIGHTLOAD_DATA_DIR") {
            Some(dir) => SourceConfig::new(dir),
            None => SourceConfig::default(),
        };
        if let Some(file) = get("FLIGHTLOAD_AIRLINES_FILE") {
            sources.airlines_file = file;
        }
        if let Some(file) = get("FLIGHTLOAD_AIRPORTS_FILE") {
            sources.airports_file = file;
        }
        if let Some(files) = get("FLIGHTLOAD_FLIGHT_FILES") {
            sources.flight_files = split_list(&files);
        }

        let delivery = DeliveryConfig {
            workers: parse_or("FLIGHTLOAD_WORKERS", get("FLIGHTLOAD_WORKERS"), DEFAULT_WORKERS)?,
            bulk_actions: parse_or(
                "FLIGHTLOAD_BULK_ACTIONS",
                get("FLIGHTLOAD_BULK_ACTIONS"),
                DEFAULT_BULK_ACTIONS,
            )?,
            bulk_size_bytes: parse_or(
                "FLIGHTLOAD_BULK_SIZE_BYTES",
                get("FLIGHTLOAD_BULK_SIZE_BYTES"),
                DEFAULT_BULK_SIZE_BYTES,
            )?,
            queue_capacity: get("FLIGHTLOAD_QUEUE_CAPACITY")
                .map(|raw| parse_or("FLIGHTLOAD_QUEUE_CAPACITY", Some(raw), 0))
                .transpose()?,
        };

        Ok(Self {
            elastic,
            sources,
            delivery,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.elastic.endpoint.trim().is_empty() {
            return Err(IngestError::config("ELASTIC_ENDPOINT must not be empty"));
        }
        if self.elastic.index.trim().is_empty() {
            return Err(IngestError::config("FLIGHTLOAD_INDEX must not be empty"));
        }
        if self.elastic.request_timeout_secs == 0 {
            return Err(IngestError::config(
                "FLIGHTLOAD_REQUEST_TIMEOUT_SECS must be greater than 0",
            ));
        }
        if self.sources.flight_files.is_empty() {
            return Err(IngestError::config("at least one flight file must be configured"));
        }
        self.delivery.validate()
    }

    pub fn mapping_path(&self) -> &Path {
        &self.elastic.mapping_file
    }
}

/// Split a comma separated list, dropping empty entries
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| IngestError::config(format!("{key} has an invalid value '{value}'"))),
        None => Ok(default),
    }
}
