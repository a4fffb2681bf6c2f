//! Flightload - flight extract loader

use clap::Parser;
use flightload_common::logging::{init_logging, LogConfig, LogLevel};
use flightload_ingest::config::{split_list, IngestConfig};
use flightload_ingest::delivery::{DocumentIndex, ElasticsearchClient, MemoryIndex};
use flightload_ingest::pipeline::Pipeline;
use flightload_ingest::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "flightload")]
#[command(author, version, about = "Load flight extracts into a search index")]
struct Cli {
    /// Delete the index and exit
    #[arg(long)]
    delete: bool,

    /// Transform and deliver into memory without touching the index
    #[arg(long, conflicts_with = "delete")]
    dry_run: bool,

    /// Directory holding the reference and flight extracts
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Flight files to load, comma separated, in order
    #[arg(long)]
    files: Option<String>,

    /// Number of delivery workers
    #[arg(long)]
    workers: Option<usize>,

    /// Target index name
    #[arg(long)]
    index: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut IngestConfig) {
        if let Some(dir) = &self.data_dir {
            config.sources.data_dir = dir.clone();
        }
        if let Some(files) = &self.files {
            config.sources.flight_files = split_list(files);
        }
        if let Some(workers) = self.workers {
            config.delivery.workers = workers;
        }
        if let Some(index) = &self.index {
            config.elastic.index = index.clone();
        }
    }

    /// Logging defaults before `LOG_*` variables are merged
    fn log_config(&self) -> LogConfig {
        let log_level = if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        LogConfig::builder()
            .level(log_level)
            .log_file_prefix("flightload")
            .build()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // `.env` has to be loaded before logging reads LOG_*
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Environment variables take precedence over the flag
    let logging = cli.log_config().merge_env().and_then(|config| init_logging(&config));
    let _guard = match logging {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(
                id = err.flight_id().unwrap_or_default(),
                error = %err,
                "Flight load failed"
            );
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut config = IngestConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.delete {
        let client = ElasticsearchClient::new(&config.elastic)?;
        client.delete_index().await?;
        return Ok(());
    }

    let pipeline = Pipeline::new(config.sources.clone(), config.delivery);

    let (index, memory): (Arc<dyn DocumentIndex>, Option<Arc<MemoryIndex>>) = if cli.dry_run {
        info!("Dry run, documents are kept in memory");
        let memory = Arc::new(MemoryIndex::new());
        let index: Arc<dyn DocumentIndex> = memory.clone();
        (index, Some(memory))
    } else {
        let client = ElasticsearchClient::new(&config.elastic)?;
        client.ensure_index(config.mapping_path()).await?;
        let index: Arc<dyn DocumentIndex> = Arc::new(client);
        (index, None)
    };

    let summary = pipeline.run(index).await?;

    if let Some(memory) = memory {
        info!(documents = memory.len().await, "Dry run finished");
    }
    println!(
        "Loaded {} flights from {} files in {} batches",
        summary.delivered, summary.files, summary.batches
    );
    Ok(())
}
