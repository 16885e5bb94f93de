//! Job payload schema
//!
//! A queued job carries UTF-8 JSON of the form
//! `{"source_url": ..., "retry": ..., "event": {"fields": {...}}}`. Older
//! producers nest the metadata under `@fields` instead; [`JobArguments::decode`]
//! resolves the alias once so the rest of the worker only sees [`EventFields`].

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Build status marking runs that are discarded rather than processed
pub const ABORTED: &str = "ABORTED";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("job payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("malformed job payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("event has no 'fields' or '@fields' mapping")]
    MissingFields,

    #[error("event fields have no string 'build_status'")]
    MissingBuildStatus,

    #[error("event field 'log_url' must be a string")]
    InvalidLogUrl,
}

/// Raw job arguments as they arrive from the queue
#[derive(Debug, Clone, Deserialize)]
pub struct JobArguments {
    pub source_url: String,
    pub retry: bool,
    pub event: RawEvent,
}

/// Event envelope before alias resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
    #[serde(default, rename = "@fields")]
    pub legacy_fields: Option<Map<String, Value>>,
}

/// Canonical event metadata with `build_status` and `log_url` pulled out
#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub build_status: String,
    pub log_url: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl EventFields {
    pub fn is_aborted(&self) -> bool {
        self.build_status == ABORTED
    }
}

/// Decoded job: source location, pass-through retry flag and canonical fields
#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub source_url: String,
    pub retry: bool,
    pub fields: EventFields,
}

impl JobArguments {
    /// Decode raw job bytes (UTF-8 JSON) into a canonical [`JobEvent`]
    pub fn decode(payload: &[u8]) -> Result<JobEvent, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        let arguments: JobArguments = serde_json::from_str(text)?;
        arguments.into_event()
    }

    pub fn into_event(self) -> Result<JobEvent, DecodeError> {
        let fields = self.event.resolve_fields()?;
        Ok(JobEvent {
            source_url: self.source_url,
            retry: self.retry,
            fields,
        })
    }
}

impl RawEvent {
    /// Pick `fields`, falling back to `@fields` when the primary is missing or empty
    pub fn resolve_fields(self) -> Result<EventFields, DecodeError> {
        let mut fields = match (self.fields, self.legacy_fields) {
            (Some(primary), _) if !primary.is_empty() => primary,
            (_, Some(legacy)) => legacy,
            (Some(primary), None) => primary,
            (None, None) => return Err(DecodeError::MissingFields),
        };

        let build_status = match fields.remove("build_status") {
            Some(Value::String(status)) => status,
            _ => return Err(DecodeError::MissingBuildStatus),
        };

        let log_url = match fields.remove("log_url") {
            None | Some(Value::Null) => None,
            Some(Value::String(url)) if url.is_empty() => None,
            Some(Value::String(url)) => Some(url),
            Some(_) => return Err(DecodeError::InvalidLogUrl),
        };

        Ok(EventFields {
            build_status,
            log_url,
            metadata: fields.into_iter().collect(),
        })
    }
}
