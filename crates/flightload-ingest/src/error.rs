//! Error types for the flight loader
//!
//! Every failure is fatal for the run. The variants exist so the operator
//! sees which stage failed and, where one is known, which flight caused it.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::AirportRole;

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Reference extract could not be loaded
#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Failed to open reference file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {source_name} at line {line}: {source}")]
    Csv {
        source_name: String,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("{source_name} line {line}: expected at least {expected} fields, got {actual}")]
    ShortRow {
        source_name: String,
        line: u64,
        expected: usize,
        actual: usize,
    },
}

/// Wall-clock value could not be turned into an instant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("invalid clock value '{0}', expected four digits HHMM")]
    InvalidClock(String),

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("local time {0} has no instant in its timezone")]
    Unresolvable(String),
}

/// Raw field could not be converted to its typed form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: cannot convert '{value}': {reason}")]
pub struct CoercionError {
    pub field: &'static str,
    pub value: String,
    pub reason: String,
}

impl CoercionError {
    pub fn new(field: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Flight row could not be turned into a [`FlightRecord`](crate::models::FlightRecord)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("flight row has {actual} fields, expected at least {expected}")]
    MalformedRow { expected: usize, actual: usize },

    #[error("{id}: invalid flight date '{value}'")]
    InvalidDate { id: String, value: String },

    #[error("{id}: {role} airport '{code}' not found in reference data")]
    UnknownAirport {
        id: String,
        role: AirportRole,
        code: String,
    },

    #[error("{id}: timezone '{timezone}' of airport {airport} cannot be resolved")]
    UnknownTimezone {
        id: String,
        airport: String,
        timezone: String,
    },

    #[error("{id}: {field}: {source}")]
    InvalidTime {
        id: String,
        field: &'static str,
        #[source]
        source: TimeError,
    },

    #[error("{id}: {source}")]
    Coercion {
        id: String,
        #[source]
        source: CoercionError,
    },
}

impl TransformError {
    /// Identity of the offending flight, when the row got far enough to have one
    pub fn flight_id(&self) -> Option<&str> {
        match self {
            TransformError::MalformedRow { .. } => None,
            TransformError::InvalidDate { id, .. }
            | TransformError::UnknownAirport { id, .. }
            | TransformError::UnknownTimezone { id, .. }
            | TransformError::InvalidTime { id, .. }
            | TransformError::Coercion { id, .. } => Some(id),
        }
    }
}

/// Bulk delivery failed; the run must stop
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("batch {batch}: document {id} rejected with status {status} ({kind}): {reason}")]
    Rejected {
        batch: u64,
        id: String,
        status: u16,
        kind: String,
        reason: String,
    },

    #[error("batch {batch}: bulk request failed: {reason}")]
    Transport { batch: u64, reason: String },

    #[error("failed to encode document {id}: {reason}")]
    Encode { id: String, reason: String },

    #[error("delivery queue closed before all batches were submitted")]
    QueueClosed,

    #[error("delivery worker {worker} stopped unexpectedly: {reason}")]
    WorkerPanicked { worker: usize, reason: String },
}

/// Error type reported by the index when a document with the same id exists
pub const CONFLICT_ERROR_KIND: &str = "version_conflict_engine_exception";

impl DeliveryError {
    /// True when the index refused a create because the identity already exists
    pub fn is_conflict(&self) -> bool {
        match self {
            DeliveryError::Rejected { status, kind, .. } => {
                *status == 409 || kind == CONFLICT_ERROR_KIND
            },
            _ => false,
        }
    }

    pub fn flight_id(&self) -> Option<&str> {
        match self {
            DeliveryError::Rejected { id, .. } | DeliveryError::Encode { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Index administration request failed
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} of index '{index}' returned status {status}: {body}")]
    Status {
        operation: &'static str,
        index: String,
        status: u16,
        body: String,
    },

    #[error("{operation} of index '{index}' was not acknowledged")]
    NotAcknowledged {
        operation: &'static str,
        index: String,
    },

    #[error("Failed to read mapping file {path}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error for a load run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("{file} line {line}: {source}")]
    Transform {
        file: String,
        line: u64,
        #[source]
        source: TransformError,
    },

    #[error("Failed to open flight file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read flight file {file} at line {line}: {source}")]
    Csv {
        file: String,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Identity of the flight that stopped the run, if the failure is tied to one
    pub fn flight_id(&self) -> Option<&str> {
        match self {
            IngestError::Transform { source, .. } => source.flight_id(),
            IngestError::Delivery(err) => err.flight_id(),
            _ => None,
        }
    }
}
