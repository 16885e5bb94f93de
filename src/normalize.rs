//! Run metadata derived from the artifact location and parsed results

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::sink::ParsedResults;

/// Pseudo-group emitted by parsers for the total run duration
pub const RUN_TIME_KEY: &str = "run_time";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("parsed stream contains no result groups to date the run")]
    NoResultGroups,
}

/// Metadata handed to the sink alongside the parsed results
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub artifacts_dir: Option<String>,
    pub run_meta: BTreeMap<String, Value>,
    pub run_started_at: DateTime<Utc>,
}

/// Directory holding a job run's artifacts, given the URL of one artifact.
///
/// Artifacts sit in the run directory itself, under `logs/`, or under
/// `logs/old/`; the nesting is stripped so all three resolve to the same run.
pub fn artifacts_dir(log_url: &str) -> String {
    let log_dir = dirname(log_url);

    match basename(log_dir) {
        "logs" => dirname(log_dir).to_string(),
        "old" => dirname(dirname(log_dir)).to_string(),
        _ => log_dir.to_string(),
    }
}

/// Earliest `start_time` across result groups, ignoring the `run_time` entry
pub fn run_started_at(results: &ParsedResults) -> Result<DateTime<Utc>, NormalizeError> {
    results
        .groups
        .iter()
        .filter(|(name, _)| name.as_str() != RUN_TIME_KEY)
        .map(|(_, group)| group.start_time)
        .min()
        .ok_or(NormalizeError::NoResultGroups)
}

/// Everything before the last `/`, with trailing slashes trimmed unless the
/// head is nothing but slashes.
fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        None => "",
        Some(idx) => {
            let head = &path[..=idx];
            let trimmed = head.trim_end_matches('/');
            if trimmed.is_empty() { head } else { trimmed }
        }
    }
}

fn basename(path: &str) -> &str {
    match path.rfind('/') {
        None => path,
        Some(idx) => &path[idx + 1..],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ResultGroup;
    use chrono::TimeZone;

    fn group(start: DateTime<Utc>) -> ResultGroup {
        ResultGroup {
            start_time: start,
            end_time: None,
            status: Some("success".to_string()),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_artifacts_dir_under_logs() {
        assert_eq!(artifacts_dir("/a/b/c/logs/file"), "/a/b/c");
        assert_eq!(
            artifacts_dir("http://x/123/logs/console"),
            "http://x/123"
        );
    }

    #[test]
    fn test_artifacts_dir_under_logs_old() {
        assert_eq!(artifacts_dir("/a/b/c/logs/old/file"), "/a/b/c");
        assert_eq!(
            artifacts_dir("http://logs.example.org/45/678/logs/old/testrepository.subunit"),
            "http://logs.example.org/45/678"
        );
    }

    #[test]
    fn test_artifacts_dir_top_level() {
        assert_eq!(artifacts_dir("/a/b/file"), "/a/b");
        assert_eq!(artifacts_dir("http://x/console"), "http://x");
    }

    #[test]
    fn test_artifacts_dir_degenerate_paths() {
        assert_eq!(artifacts_dir("file"), "");
        assert_eq!(artifacts_dir("/file"), "/");
        assert_eq!(artifacts_dir("logs/file"), "");
        assert_eq!(artifacts_dir("/a//logs//file"), "/a");
    }

    #[test]
    fn test_run_started_at_takes_minimum() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();

        let mut results = ParsedResults::default();
        results.groups.insert("test_b".to_string(), group(late));
        results.groups.insert("test_a".to_string(), group(early));

        assert_eq!(run_started_at(&results).unwrap(), early);
    }

    #[test]
    fn test_run_started_at_ignores_run_time_group() {
        let bogus = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let real = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        let mut results = ParsedResults::default();
        results.groups.insert(RUN_TIME_KEY.to_string(), group(bogus));
        results.groups.insert("test_a".to_string(), group(real));

        assert_eq!(run_started_at(&results).unwrap(), real);
    }

    #[test]
    fn test_run_started_at_empty_is_data_error() {
        let mut results = ParsedResults::default();
        results.run_time = Some(12.5);

        assert!(matches!(
            run_started_at(&results),
            Err(NormalizeError::NoResultGroups)
        ));

        let bogus = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        results.groups.insert(RUN_TIME_KEY.to_string(), group(bogus));
        assert!(matches!(
            run_started_at(&results),
            Err(NormalizeError::NoResultGroups)
        ));
    }
}
