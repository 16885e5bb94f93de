//! Worker service
//!
//! Pulls one job at a time from a [`JobQueue`], runs it through the
//! [`EventProcessor`] and reports the outcome. The loop is the outer fault
//! barrier: a panicking job or a queue failure is logged and the next job is
//! attempted.

pub mod http;
pub mod processor;

pub use http::{FetchError, FetchResult, HttpConfig, HttpFetcher, Retrieved, SourceFetcher};
pub use processor::{EventProcessor, EventRecord, ProcessError};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::observability::Metrics;
use crate::queue::{JobQueue, Outcome, QueueError};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause after a queue error before asking for the next job
    pub reconnect_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

pub struct Worker<Q: JobQueue> {
    queue: Q,
    processor: EventProcessor,
    config: WorkerConfig,
    metrics: Arc<Metrics>,
}

impl<Q: JobQueue> Worker<Q> {
    pub fn new(queue: Q, processor: EventProcessor, config: WorkerConfig) -> Self {
        Self {
            queue,
            processor,
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Process jobs forever
    pub async fn run(&mut self) {
        loop {
            if let Err(e) = self.run_once().await {
                self.metrics.queue_error();
                error!(error = %e, "Exception retrieving log event");
                tokio::time::sleep(self.config.reconnect_delay).await;
            }
        }
    }

    /// Wait for one job, process it and report its outcome
    pub async fn run_once(&mut self) -> Result<Outcome, QueueError> {
        let job = self.queue.next_job().await?;
        self.metrics.job_received();
        info!(handle = %job.handle, function = %job.function, "Processing job");

        let outcome = match AssertUnwindSafe(self.processor.handle(&job.arguments))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                self.metrics.job_panicked();
                let message = panic_message(panic.as_ref());
                error!(handle = %job.handle, panic = %message, "Job handler panicked");
                Outcome::Exception(format!("worker panicked: {}", message))
            }
        };

        match &outcome {
            Outcome::Complete => self.metrics.job_completed(),
            Outcome::Exception(_) => self.metrics.job_failed(),
        }

        self.queue.report(job.handle, &outcome).await?;
        Ok(outcome)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
