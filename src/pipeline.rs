//! Bounded, concurrent ingestion pipeline.
//!
//! A single decode/submit loop feeds a bounded channel; a fixed pool of
//! worker tasks normalizes records and flushes them to the store in bulk
//! batches. The bounded channel is the only flow-control mechanism: the
//! submit loop blocks when workers fall behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::decode::{READ_BATCH_SIZE, RecordSource};
use crate::error::{Error, Result};
use crate::model::{RawTrip, TripRecord};
use crate::normalize::normalize;
use crate::store::TripStore;

/// Bulk-write retry budget for transient persistence failures.
const MAX_WRITE_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Log a progress line every time the committed counter crosses a multiple
/// of this.
const PROGRESS_INTERVAL: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker pool size; 0 selects the available CPU parallelism.
    pub workers: usize,
    /// Capacity of the bounded submit channel; 0 is clamped to 1.
    pub channel_capacity: usize,
    /// Records buffered per worker before a bulk write.
    pub flush_threshold: usize,
    /// Rows requested from the source per decode call.
    pub read_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            workers: 0,
            channel_capacity: 20,
            flush_threshold: 100,
            read_batch_size: READ_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

/// Cooperative cancellation for an ingestion run.
///
/// Cancelling stops the submit loop at the next batch boundary and closes
/// the channel; in-flight workers drain what they already hold and flush
/// their partial buffers before exiting.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome of a completed ingestion run.
#[derive(Debug, Clone, Copy)]
pub struct IngestSummary {
    /// Records committed to the store.
    pub committed: u64,
    /// Records dropped by per-record normalization failures.
    pub dropped: u64,
    pub elapsed: Duration,
}

type SharedRx = Arc<Mutex<mpsc::Receiver<RawTrip>>>;

/// Runs the full ingestion: decode, normalize, batch, bulk-upsert.
///
/// Decode and persistence failures abort the run; normalization failures
/// drop single records. A worker flushes a full buffer before accepting
/// its next record; no cross-worker ordering is guaranteed.
pub async fn ingest<S, R>(
    store: Arc<S>,
    mut source: R,
    config: PipelineConfig,
    cancel: CancelFlag,
) -> Result<IngestSummary>
where
    S: TripStore,
    R: RecordSource,
{
    let started = Instant::now();
    let workers = config.worker_count();

    let (tx, rx) = mpsc::channel::<RawTrip>(config.channel_capacity.max(1));
    let rx: SharedRx = Arc::new(Mutex::new(rx));

    let committed = Arc::new(AtomicU64::new(0));
    let dropped = Arc::new(AtomicU64::new(0));

    info!(workers, flush_threshold = config.flush_threshold, "starting ingest");

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        handles.push(tokio::spawn(worker_loop(
            Arc::clone(&store),
            Arc::clone(&rx),
            config.flush_threshold,
            Arc::clone(&committed),
            Arc::clone(&dropped),
        )));
    }

    let mut decode_err: Option<Error> = None;
    'submit: loop {
        if cancel.is_cancelled() {
            info!("ingest cancelled, draining in-flight workers");
            break;
        }

        match source.next_batch(config.read_batch_size) {
            Ok(Some(rows)) => {
                for raw in rows {
                    // Blocks when the channel is full: back-pressure.
                    if tx.send(raw).await.is_err() {
                        break 'submit;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                decode_err = Some(e);
                break;
            }
        }
    }

    // Closing the channel signals completion; workers flush and exit.
    drop(tx);

    let mut worker_err: Option<Error> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if worker_err.is_none() {
                    worker_err = Some(e);
                }
            }
            Err(e) => {
                if worker_err.is_none() {
                    worker_err = Some(Error::Internal(format!("ingest worker panicked: {e}")));
                }
            }
        }
    }

    if let Some(e) = decode_err {
        return Err(e);
    }
    if let Some(e) = worker_err {
        return Err(e);
    }

    Ok(IngestSummary {
        committed: committed.load(Ordering::Relaxed),
        dropped: dropped.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    })
}

async fn worker_loop<S: TripStore>(
    store: Arc<S>,
    rx: SharedRx,
    flush_threshold: usize,
    committed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
) -> Result<()> {
    let mut buffer: Vec<TripRecord> = Vec::with_capacity(flush_threshold);

    loop {
        let next = { rx.lock().await.recv().await };
        let Some(raw) = next else { break };

        match normalize(raw) {
            Ok(trip) => buffer.push(trip),
            Err(Error::Normalize(msg)) => {
                warn!(error = %msg, "dropping record that failed normalization");
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }

        if buffer.len() >= flush_threshold {
            flush(store.as_ref(), &mut buffer, &committed).await?;
        }
    }

    if !buffer.is_empty() {
        flush(store.as_ref(), &mut buffer, &committed).await?;
    }

    Ok(())
}

/// Bulk-writes the buffer, retrying transient failures with exponential
/// backoff before giving up. Upsert-by-key keeps retries idempotent.
async fn flush<S: TripStore + ?Sized>(
    store: &S,
    buffer: &mut Vec<TripRecord>,
    committed: &AtomicU64,
) -> Result<()> {
    let batch = std::mem::take(buffer);
    let n = batch.len() as u64;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.upsert_many(batch.clone()).await {
            Ok(_) => break,
            Err(e) if e.is_transient() && attempt < MAX_WRITE_ATTEMPTS => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "transient bulk-write failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    let total = committed.fetch_add(n, Ordering::Relaxed) + n;
    if total / PROGRESS_INTERVAL != (total - n) / PROGRESS_INTERVAL {
        info!(converted = total, "ingest progress");
    }

    Ok(())
}
