//! Logging setup and worker counters

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open debug log {path}: {source}")]
    DebugLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install the global tracing subscriber.
///
/// With a debug log path, events at `debug` and above are appended to that
/// file. Without one only errors reach stderr. `RUST_LOG` overrides either
/// default.
pub fn init_logging(debuglog: Option<&Path>) -> Result<(), LoggingError> {
    match debuglog {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::DebugLog {
                    path: path.to_path_buf(),
                    source,
                })?;

            tracing_subscriber::fmt()
                .with_env_filter(env_filter("debug"))
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init()
                .map_err(|e| LoggingError::Init(e.to_string()))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter("error"))
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string())),
    }
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Render an error with every `source()` below it, joined by `: `
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // Wrappers often repeat their cause verbatim
        if !rendered.ends_with(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}

/// Job counters for the worker loop
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_received: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_panicked: AtomicU64,
    queue_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_received(&self) {
        self.jobs_received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_received", "Metric incremented");
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_completed", "Metric incremented");
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_failed", "Metric incremented");
    }

    /// Counted in addition to `job_failed`
    pub fn job_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_panicked", "Metric incremented");
    }

    pub fn queue_error(&self) {
        self.queue_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "queue_errors", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_received: self.jobs_received.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_panicked: self.jobs_panicked.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub jobs_received: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_panicked: u64,
    pub queue_errors: u64,
}
