//! The result sink (§4.H.1, ADDED): mirrors every appended event-log record
//! to an external HTTP collector, grounded on
//! `mblib/io/result.py::HTTPResultWriter`.
//!
//! Unlike a plain bounded-channel send, `submit` busy-polls a fixed interval
//! while the queue is over capacity, matching the Python original's
//! `_wait_over` — the spec calls for an *observable, logged* wait rather
//! than an opaque blocking send.

use std::env;
use std::time::Duration;

use mobility_wire::ResultRecord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_QUEUE_SIZE: usize = 500;
const DEFAULT_OVER_INTERVAL_SECS: u64 = 1;

/// Reads `RESULT_WRITER_QUEUE_SIZE` (default 500), falling back to the
/// default on anything unparseable (§6 env vars).
pub fn queue_size_from_env() -> usize {
    env::var("RESULT_WRITER_QUEUE_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_QUEUE_SIZE)
}

/// Reads `RESULT_WRITER_OVER_INTERVAL` in seconds (default 1).
pub fn over_interval_from_env() -> Duration {
    let secs = env::var("RESULT_WRITER_OVER_INTERVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_OVER_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// A broker-owned client of its own event stream; never a blocking
/// participant in the peek/step/dispatch critical path (§4.H.1).
pub struct ResultWriter {
    tx: mpsc::Sender<ResultRecord>,
    worker: JoinHandle<()>,
    queue_size: usize,
    over_interval: Duration,
}

impl ResultWriter {
    /// Spawns the background task that batches and POSTs records to
    /// `writer_url`.
    pub fn spawn(
        client: reqwest::Client,
        writer_url: String,
        queue_size: usize,
        over_interval: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<ResultRecord>(queue_size);
        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(err) = client
                    .post(&writer_url)
                    .json(&record)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                {
                    tracing::warn!(seqno = record.seqno, error = %err, "result sink rejected record");
                }
            }
        });
        Self {
            tx,
            worker,
            queue_size,
            over_interval,
        }
    }

    /// Enqueues `record`, busy-polling at `over_interval` while the channel
    /// reports itself over `queue_size` capacity (§4.H.1, §5 "Result writer
    /// policy").
    pub async fn submit(&self, record: ResultRecord) {
        while self.tx.capacity() == 0 {
            tracing::debug!(queue_size = self.queue_size, "result sink queue is full, waiting");
            tokio::time::sleep(self.over_interval).await;
        }
        if self.tx.send(record).await.is_err() {
            tracing::warn!("result sink worker has exited; dropping record");
        }
    }

    /// Closes the channel and drains remaining queued records via the
    /// worker's own non-blocking fast path before returning (§4.H.1 "On
    /// finish").
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
