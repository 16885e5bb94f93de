use super::models::{Config, SinkConfig, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Queue host must not be empty")]
    EmptyQueueHost,

    #[error("Queue port must be non-zero")]
    InvalidQueuePort,

    #[error("Queue function name must not be empty")]
    EmptyFunction,

    #[error("Timeout must be positive: {field} = {value}")]
    InvalidTimeout { field: String, value: u64 },

    #[error("Sink parser program is not configured")]
    MissingParserProgram,

    #[error("Local storage root must not be empty")]
    EmptyStorageRoot,
}

/// Validate the worker configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_queue(config)?;
    validate_fetch(config)?;
    Ok(())
}

/// Validate the sink configuration
pub fn validate_sink(sink: &SinkConfig) -> Result<(), ValidationError> {
    match sink.parser.program.as_deref() {
        Some(program) if !program.trim().is_empty() => {}
        _ => return Err(ValidationError::MissingParserProgram),
    }

    if sink.storage.provider == StorageProvider::Local
        && sink.storage.root.as_os_str().is_empty()
    {
        return Err(ValidationError::EmptyStorageRoot);
    }

    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    if config.queue.host.trim().is_empty() {
        return Err(ValidationError::EmptyQueueHost);
    }
    if config.queue.port == 0 {
        return Err(ValidationError::InvalidQueuePort);
    }
    if config.queue.function.trim().is_empty() {
        return Err(ValidationError::EmptyFunction);
    }
    Ok(())
}

fn validate_fetch(config: &Config) -> Result<(), ValidationError> {
    for (field, value) in [
        ("connect_timeout_secs", config.fetch.connect_timeout_secs),
        ("request_timeout_secs", config.fetch.request_timeout_secs),
    ] {
        if value == 0 {
            return Err(ValidationError::InvalidTimeout {
                field: field.to_string(),
                value,
            });
        }
    }
    Ok(())
}
