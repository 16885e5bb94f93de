//! Event processor - turns one job payload into a stored run

use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use super::http::{FetchError, Retrieved, SourceFetcher};
use crate::event::{DecodeError, JobArguments};
use crate::normalize::{self, NormalizeError, RunContext};
use crate::observability::error_chain;
use crate::queue::Outcome;
use crate::sink::{ResultSink, SinkError, StreamParser};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("source artifact unavailable: {0}")]
    SourceUnavailable(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Event fields plus the retrieved stream, ready for storage
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub log_url: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub payload: Bytes,
}

pub struct EventProcessor {
    fetcher: Arc<dyn SourceFetcher>,
    parser: Arc<dyn StreamParser>,
    sink: Arc<dyn ResultSink>,
}

impl EventProcessor {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        parser: Arc<dyn StreamParser>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            sink,
        }
    }

    /// Process one job payload and decide its outcome.
    ///
    /// Every failure is converted into [`Outcome::Exception`] carrying the
    /// full cause chain; nothing escapes as an error.
    pub async fn handle(&self, arguments: &[u8]) -> Outcome {
        match self.process(arguments).await {
            Ok(()) => Outcome::Complete,
            Err(e) => {
                let message = error_chain(&e);
                error!(error = %message, "Exception handling log event");
                Outcome::Exception(message)
            }
        }
    }

    async fn process(&self, arguments: &[u8]) -> Result<()> {
        let event = JobArguments::decode(arguments)?;
        debug!(
            source_url = %event.source_url,
            retry = event.retry,
            build_status = %event.fields.build_status,
            "Handling event"
        );

        // Aborted builds are discarded upstream; acknowledge without fetching
        if event.fields.is_aborted() {
            info!(source_url = %event.source_url, "Skipping aborted build");
            return Ok(());
        }

        let fetched = match self.fetcher.retrieve(&event.source_url, event.retry).await? {
            Retrieved::Found(fetched) => fetched,
            Retrieved::NotFound => return Err(ProcessError::SourceUnavailable(event.source_url)),
        };
        let payload = fetched.into_payload()?;
        debug!(source_url = %event.source_url, size = payload.len(), "Pushing subunit stream");

        let mut metadata = event.fields.metadata;
        metadata
            .entry("retry".to_string())
            .or_insert(Value::Bool(event.retry));

        self.write_to_db(EventRecord {
            log_url: event.fields.log_url,
            metadata,
            payload,
        })
        .await
    }

    /// Normalize run metadata, parse the stream and hand both to the sink.
    ///
    /// The payload is moved into the parser and released whether or not the
    /// sink succeeds.
    pub async fn write_to_db(&self, record: EventRecord) -> Result<()> {
        let artifacts_dir = record.log_url.as_deref().map(normalize::artifacts_dir);

        let results = self.parser.parse(record.payload).await?;
        let run_started_at = normalize::run_started_at(&results)?;

        let run = RunContext {
            artifacts_dir,
            run_meta: record.metadata,
            run_started_at,
        };

        debug!(
            artifacts = run.artifacts_dir.as_deref().unwrap_or(""),
            run_at = %run.run_started_at,
            groups = results.groups.len(),
            "Storing run"
        );

        self.sink.persist(run, results).await?;
        Ok(())
    }
}
