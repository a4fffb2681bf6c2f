//! Batching and the delivery worker pool
//!
//! The producer side (`add`) runs on the driver task and fills a buffer. Full
//! buffers become [`BulkBatch`]es pushed into a bounded queue that a fixed set
//! of worker tasks drain. The first failure anywhere trips the shared
//! [`AbortSignal`]; after that nothing new is submitted and workers exit.

use futures::future::join_all;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{AbortSignal, BulkBatch, BulkItem, DocumentIndex};
use crate::config::DeliveryConfig;
use crate::error::DeliveryError;
use crate::models::TransformedFlight;

/// Where the deliverer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Nothing added yet
    Idle,
    Accumulating,
    /// A batch is being handed to the queue
    Submitting,
    Completed,
    /// Terminal; a failure was recorded or the run was abandoned
    Aborted,
}

/// Totals after a successful `finish`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySummary {
    pub delivered: u64,
    pub batches: u64,
}

#[derive(Debug, Default)]
struct DeliveryStats {
    delivered: AtomicU64,
    batches: AtomicU64,
}

type BatchQueue = Arc<Mutex<mpsc::Receiver<BulkBatch>>>;

/// Groups records into bulk batches and writes them with a worker pool
pub struct BatchDeliverer {
    config: DeliveryConfig,
    sender: Option<mpsc::Sender<BulkBatch>>,
    workers: Vec<JoinHandle<()>>,
    abort: Arc<AbortSignal>,
    stats: Arc<DeliveryStats>,
    buffer: Vec<BulkItem>,
    buffered_bytes: usize,
    next_batch: u64,
    state: DeliveryState,
}

impl BatchDeliverer {
    /// Spawn `config.workers` workers writing to `index`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(index: Arc<dyn DocumentIndex>, config: DeliveryConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity().max(1));
        let queue: BatchQueue = Arc::new(Mutex::new(receiver));
        let abort = Arc::new(AbortSignal::new());
        let stats = Arc::new(DeliveryStats::default());

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&index),
                    Arc::clone(&queue),
                    Arc::clone(&abort),
                    Arc::clone(&stats),
                ))
            })
            .collect();

        debug!(
            workers = config.workers,
            bulk_actions = config.bulk_actions,
            bulk_size_bytes = config.bulk_size_bytes,
            queue_capacity = config.queue_capacity(),
            "Delivery workers started"
        );

        Self {
            config,
            sender: Some(sender),
            workers,
            abort,
            stats,
            buffer: Vec::with_capacity(config.bulk_actions.min(4096)),
            buffered_bytes: 0,
            next_batch: 0,
            state: DeliveryState::Idle,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    /// Items written successfully so far
    pub fn delivered(&self) -> u64 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    /// Batches handed to the queue so far
    pub fn submitted_batches(&self) -> u64 {
        self.next_batch
    }

    /// Queue one record, submitting a batch when a threshold is reached.
    ///
    /// Blocks while the queue is full. Returns the recorded failure once the
    /// deliverer has aborted.
    pub async fn add(&mut self, flight: &TransformedFlight) -> Result<(), DeliveryError> {
        self.check_open()?;

        let document = serde_json::to_string(&flight.record).map_err(|e| {
            let err = DeliveryError::Encode {
                id: flight.id.clone(),
                reason: e.to_string(),
            };
            self.abort.trip(err.clone());
            self.state = DeliveryState::Aborted;
            err
        })?;

        let item = BulkItem {
            id: flight.id.clone(),
            document,
        };
        self.buffered_bytes += item.encoded_len();
        self.buffer.push(item);
        self.state = DeliveryState::Accumulating;

        if self.buffer.len() >= self.config.bulk_actions
            || self.buffered_bytes >= self.config.bulk_size_bytes
        {
            self.dispatch().await?;
        }
        Ok(())
    }

    /// Submit what is buffered, wait for every worker, and report the outcome
    pub async fn finish(&mut self) -> Result<DeliverySummary, DeliveryError> {
        self.check_open()?;

        let flushed = if self.buffer.is_empty() {
            Ok(())
        } else {
            self.dispatch().await
        };

        // Closing the queue lets idle workers see the end of input
        self.sender.take();

        let handles = mem::take(&mut self.workers);
        for (worker, joined) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = joined {
                error!(worker, error = %e, "Delivery worker failed");
                self.abort.trip(DeliveryError::WorkerPanicked {
                    worker,
                    reason: e.to_string(),
                });
            }
        }

        if let Some(err) = self.abort.get() {
            self.state = DeliveryState::Aborted;
            return Err(err.clone());
        }
        if let Err(err) = flushed {
            self.state = DeliveryState::Aborted;
            return Err(err);
        }

        let summary = DeliverySummary {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            batches: self.stats.batches.load(Ordering::Relaxed),
        };
        self.state = DeliveryState::Completed;
        info!(
            delivered = summary.delivered,
            batches = summary.batches,
            "Delivery complete"
        );
        Ok(summary)
    }

    /// Stop all workers now, dropping anything not yet written
    pub fn abandon(&mut self) {
        self.sender.take();
        self.buffer.clear();
        self.buffered_bytes = 0;
        for handle in self.workers.drain(..) {
            handle.abort();
        }
        if self.state != DeliveryState::Completed {
            self.state = DeliveryState::Aborted;
        }
        warn!(
            delivered = self.stats.delivered.load(Ordering::Relaxed),
            "Delivery abandoned"
        );
    }

    fn check_open(&mut self) -> Result<(), DeliveryError> {
        if let Some(err) = self.abort.get() {
            self.state = DeliveryState::Aborted;
            return Err(err.clone());
        }
        match self.state {
            DeliveryState::Completed | DeliveryState::Aborted => Err(DeliveryError::QueueClosed),
            _ => Ok(()),
        }
    }

    async fn dispatch(&mut self) -> Result<(), DeliveryError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(DeliveryError::QueueClosed);
        };

        self.next_batch += 1;
        let batch = BulkBatch {
            id: self.next_batch,
            items: mem::take(&mut self.buffer),
            bytes: mem::replace(&mut self.buffered_bytes, 0),
        };

        self.state = DeliveryState::Submitting;
        debug!(batch = batch.id, items = batch.len(), bytes = batch.bytes, "Submitting batch");

        if sender.send(batch).await.is_err() {
            // Every worker is gone, which only happens after a failure
            self.state = DeliveryState::Aborted;
            return Err(self.abort.get().cloned().unwrap_or(DeliveryError::QueueClosed));
        }

        if let Some(err) = self.abort.get() {
            self.state = DeliveryState::Aborted;
            return Err(err.clone());
        }
        self.state = DeliveryState::Accumulating;
        Ok(())
    }
}

impl Drop for BatchDeliverer {
    fn drop(&mut self) {
        for handle in &self.workers {
            handle.abort();
        }
    }
}

async fn run_worker(
    worker: usize,
    index: Arc<dyn DocumentIndex>,
    queue: BatchQueue,
    abort: Arc<AbortSignal>,
    stats: Arc<DeliveryStats>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(batch) = next else {
            break;
        };
        if abort.is_tripped() {
            break;
        }

        let outcome = match index.bulk_create(&batch).await {
            Ok(response) => match response.first_failure(batch.id) {
                Some(err) => Err(err),
                None => Ok(()),
            },
            Err(err) => Err(err),
        };

        match outcome {
            Ok(()) => {
                stats.delivered.fetch_add(batch.len() as u64, Ordering::Relaxed);
                stats.batches.fetch_add(1, Ordering::Relaxed);
                debug!(worker, batch = batch.id, items = batch.len(), "Batch written");
            },
            Err(err) => {
                error!(
                    worker,
                    batch = batch.id,
                    id = err.flight_id().unwrap_or_default(),
                    error = %err,
                    "Bulk write failed"
                );
                abort.trip(err);
                break;
            },
        }
    }
    debug!(worker, "Delivery worker stopped");
}
