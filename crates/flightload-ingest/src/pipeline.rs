//! Load driver: reference data first, then every flight file in order
//!
//! Parsing and transformation run sequentially on the calling task; only
//! delivery is concurrent. The first error of any kind ends the run.

use csv::StringRecord;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{DeliveryConfig, SourceConfig};
use crate::delivery::{BatchDeliverer, DocumentIndex};
use crate::error::{IngestError, Result};
use crate::reference::{ReferenceLoader, ReferenceTables};
use crate::transform::RecordTransformer;

/// Counts for a completed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub rows: u64,
    pub headers_skipped: u64,
    pub delivered: u64,
    pub batches: u64,
}

pub struct Pipeline {
    sources: SourceConfig,
    delivery: DeliveryConfig,
}

impl Pipeline {
    pub fn new(sources: SourceConfig, delivery: DeliveryConfig) -> Self {
        Self { sources, delivery }
    }

    pub fn load_reference(&self) -> Result<ReferenceTables> {
        let loader = ReferenceLoader::new();

        let airlines = loader.load_airlines_file(&self.sources.airlines_path())?;
        let airports = loader.load_airports_file(&self.sources.airports_path())?;

        Ok(ReferenceTables::new(airlines, airports))
    }

    /// Run the whole load against `index`
    pub async fn run(&self, index: Arc<dyn DocumentIndex>) -> Result<RunSummary> {
        let tables = self.load_reference()?;
        let transformer = RecordTransformer::new(&tables);
        let mut deliverer = BatchDeliverer::start(index, self.delivery);
        let mut summary = RunSummary::default();

        for path in self.sources.flight_paths() {
            if let Err(err) = self
                .load_file(&path, &transformer, &mut deliverer, &mut summary)
                .await
            {
                deliverer.abandon();
                error!(
                    file = %path.display(),
                    id = err.flight_id().unwrap_or_default(),
                    error = %err,
                    "Load aborted"
                );
                return Err(err);
            }
            summary.files += 1;
        }

        let delivered = deliverer.finish().await?;
        summary.delivered = delivered.delivered;
        summary.batches = delivered.batches;

        info!(
            files = summary.files,
            rows = summary.rows,
            headers_skipped = summary.headers_skipped,
            delivered = summary.delivered,
            batches = summary.batches,
            "Load complete"
        );
        Ok(summary)
    }

    async fn load_file(
        &self,
        path: &Path,
        transformer: &RecordTransformer<'_>,
        deliverer: &mut BatchDeliverer,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let file_name = path.display().to_string();
        info!(file = %file_name, "Parsing flight file");

        let file = File::open(path).map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut csv = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(BufReader::new(file));

        let mut row = StringRecord::new();
        let mut rows = 0u64;
        loop {
            let line = csv.position().line();
            let more = csv.read_record(&mut row).map_err(|source| IngestError::Csv {
                file: file_name.clone(),
                line,
                source,
            })?;
            if !more {
                break;
            }

            let flight = transformer
                .transform(&row)
                .map_err(|source| IngestError::Transform {
                    file: file_name.clone(),
                    line,
                    source,
                })?;

            match flight {
                Some(flight) => {
                    deliverer.add(&flight).await?;
                    rows += 1;
                },
                None => summary.headers_skipped += 1,
            }
        }

        if rows == 0 {
            warn!(file = %file_name, "Flight file has no data rows");
        }
        summary.rows += rows;
        info!(file = %file_name, rows, "Flight file queued");
        Ok(())
    }
}
