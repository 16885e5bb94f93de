//! Job queue client
//!
//! The worker only needs two operations from a queue: block until a job is
//! assigned, and report that job's single [`Outcome`]. [`JobQueue`] captures
//! exactly that; [`GearmanWorker`] implements it over the Gearman protocol.

pub mod gearman;
pub mod packet;

pub use gearman::GearmanWorker;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue protocol error: {0}")]
    Protocol(String),

    #[error("queue server error {code}: {message}")]
    Server { code: String, message: String },

    #[error("not connected to the queue server")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Server-assigned job handle.
///
/// Not `Clone`: [`JobQueue::report`] takes it by value, so each job can be
/// answered only once.
#[derive(Debug, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job assigned by the queue
#[derive(Debug)]
pub struct Job {
    pub handle: JobHandle,
    pub function: String,
    pub arguments: Bytes,
}

/// Terminal signal sent back to the queue for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Exception(String),
}

#[async_trait]
pub trait JobQueue: Send {
    /// Wait until the server assigns a job
    async fn next_job(&mut self) -> Result<Job>;

    /// Send the job's outcome; consumes the handle
    async fn report(&mut self, handle: JobHandle, outcome: &Outcome) -> Result<()>;
}
