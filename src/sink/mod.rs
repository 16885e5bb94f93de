//! Result sink: stream parsing and run persistence
//!
//! The worker does not understand the subunit binary encoding and does not own
//! a storage schema. Both live behind traits:
//!
//! - [`StreamParser`] turns a decompressed payload into [`ParsedResults`]
//! - [`ResultSink`] persists one run given its [`RunContext`] and results
//!
//! The shipped adapters are [`CommandParser`] (pipes the payload through an
//! external converter) and [`ObjectStoreSink`] (one JSON record per run).

mod parser;
mod store;

pub use parser::CommandParser;
pub use store::{ObjectStoreSink, RunRecord, RunSummary};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::normalize::{RUN_TIME_KEY, RunContext};
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to start parser '{program}': {source}")]
    ParserSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parser exited with {status}: {stderr}")]
    ParserFailed { status: String, stderr: String },

    #[error("parser I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid parser output: {0}")]
    InvalidResults(String),

    #[error("failed to encode run record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// One named result group (usually a single test) from a parsed stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultGroup {
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Parsed stream: result groups keyed by name plus the total run duration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResults {
    pub groups: BTreeMap<String, ResultGroup>,
    pub run_time: Option<f64>,
}

impl ParsedResults {
    /// Decode the JSON document produced by a converter.
    ///
    /// The document is an object of result groups; a numeric (or null)
    /// `run_time` entry carries the run duration in seconds.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let document: Map<String, Value> =
            serde_json::from_slice(raw).map_err(|e| SinkError::InvalidResults(e.to_string()))?;

        let mut results = ParsedResults::default();
        for (name, value) in document {
            if name == RUN_TIME_KEY && !value.is_object() {
                results.run_time = match value {
                    Value::Null => None,
                    Value::Number(seconds) => seconds.as_f64(),
                    other => {
                        return Err(SinkError::InvalidResults(format!(
                            "'{}' must be a number, got {}",
                            RUN_TIME_KEY, other
                        )));
                    }
                };
                continue;
            }

            let group: ResultGroup = serde_json::from_value(value)
                .map_err(|e| SinkError::InvalidResults(format!("group '{}': {}", name, e)))?;
            results.groups.insert(name, group);
        }

        Ok(results)
    }
}

/// Converts a raw payload into result groups
#[async_trait]
pub trait StreamParser: Send + Sync {
    async fn parse(&self, payload: Bytes) -> Result<ParsedResults>;
}

/// Persists a parsed run together with its normalized metadata
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, run: RunContext, results: ParsedResults) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_results_document() {
        let raw = br#"{
            "tempest.api.test_servers.test_create": {
                "start_time": "2024-03-01T10:00:05Z",
                "end_time": "2024-03-01T10:00:09Z",
                "status": "success",
                "worker": "worker-0"
            },
            "tempest.api.test_servers.test_delete": {
                "start_time": "2024-03-01T10:00:01+00:00",
                "status": "fail"
            },
            "run_time": 42.5
        }"#;

        let results = ParsedResults::from_json(raw).unwrap();
        assert_eq!(results.groups.len(), 2);
        assert_eq!(results.run_time, Some(42.5));

        let create = &results.groups["tempest.api.test_servers.test_create"];
        assert_eq!(
            create.start_time,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap()
        );
        assert_eq!(create.status.as_deref(), Some("success"));
        assert_eq!(create.extra["worker"], Value::from("worker-0"));

        let delete = &results.groups["tempest.api.test_servers.test_delete"];
        assert!(delete.end_time.is_none());
    }

    #[test]
    fn test_group_without_start_time_rejected() {
        let raw = br#"{"test_a": {"status": "success"}}"#;
        let err = ParsedResults::from_json(raw).unwrap_err();
        assert!(matches!(err, SinkError::InvalidResults(_)));
        assert!(err.to_string().contains("test_a"));
    }

    #[test]
    fn test_non_object_document_rejected() {
        let err = ParsedResults::from_json(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, SinkError::InvalidResults(_)));
    }

    #[test]
    fn test_non_numeric_run_time_rejected() {
        let raw = br#"{
            "test_a": {"start_time": "2024-03-01T10:00:05Z"},
            "run_time": "42.5s"
        }"#;

        let err = ParsedResults::from_json(raw).unwrap_err();
        assert!(matches!(err, SinkError::InvalidResults(_)));
        assert!(err.to_string().contains("run_time"));

        let results = ParsedResults::from_json(
            br#"{"test_a": {"start_time": "2024-03-01T10:00:05Z"}, "run_time": null}"#,
        )
        .unwrap();
        assert!(results.run_time.is_none());
    }
}
