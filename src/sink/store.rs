use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use super::{ParsedResults, Result, ResultGroup, ResultSink};
use crate::normalize::RunContext;
use crate::storage::StorageClient;

/// Pass/fail/skip counts over a run's result groups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub passes: u32,
    pub fails: u32,
    pub skips: u32,
}

impl RunSummary {
    pub fn from_groups<'a>(groups: impl IntoIterator<Item = &'a ResultGroup>) -> Self {
        let mut summary = RunSummary::default();
        for group in groups {
            match group.status.as_deref() {
                Some("success") | Some("xfail") => summary.passes += 1,
                Some("fail") | Some("uxsuccess") => summary.fails += 1,
                Some("skip") => summary.skips += 1,
                _ => {}
            }
        }
        summary
    }
}

/// Stored form of one processed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub artifacts: Option<String>,
    pub run_meta: BTreeMap<String, Value>,
    pub run_at: DateTime<Utc>,
    pub run_time: Option<f64>,
    pub summary: RunSummary,
    pub tests: BTreeMap<String, ResultGroup>,
}

impl RunRecord {
    pub fn new(run: RunContext, results: ParsedResults) -> Self {
        let summary = RunSummary::from_groups(results.groups.values());
        Self {
            id: Uuid::now_v7(),
            artifacts: run.artifacts_dir,
            run_meta: run.run_meta,
            run_at: run.run_started_at,
            run_time: results.run_time,
            summary,
            tests: results.groups,
        }
    }
}

/// Sink writing one JSON [`RunRecord`] per run under a key prefix
#[derive(Clone)]
pub struct ObjectStoreSink {
    storage: StorageClient,
    prefix: String,
}

impl ObjectStoreSink {
    pub fn new(storage: StorageClient, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn record_key(&self, id: &Uuid) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{}.json", id)
        } else {
            format!("{}/{}.json", prefix, id)
        }
    }
}

#[async_trait]
impl ResultSink for ObjectStoreSink {
    async fn persist(&self, run: RunContext, results: ParsedResults) -> Result<()> {
        let record = RunRecord::new(run, results);
        let key = self.record_key(&record.id);
        let body = serde_json::to_vec(&record)?;

        self.storage.upload(&key, body).await?;

        info!(
            key = %key,
            artifacts = record.artifacts.as_deref().unwrap_or(""),
            tests = record.tests.len(),
            passes = record.summary.passes,
            fails = record.summary.fails,
            skips = record.summary.skips,
            "Run stored"
        );

        Ok(())
    }
}
