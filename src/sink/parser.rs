use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ParsedResults, Result, SinkError, StreamParser};

/// Parser that pipes the payload through an external converter command.
///
/// The command reads the stream on stdin and prints a JSON results document
/// (see [`ParsedResults::from_json`]) on stdout.
#[derive(Debug, Clone)]
pub struct CommandParser {
    program: String,
    args: Vec<String>,
}

impl CommandParser {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl StreamParser for CommandParser {
    async fn parse(&self, payload: Bytes) -> Result<ParsedResults> {
        debug!(program = %self.program, size = payload.len(), "Converting stream");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SinkError::ParserSpawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SinkError::InvalidResults("parser stdin unavailable".to_string()))?;

        // stdin is fed from its own task: the converter may fill stdout before draining stdin
        let writer = tokio::spawn(async move { stdin.write_all(&payload).await });

        let output = child.wait_with_output().await?;

        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                warn!(program = %self.program, "Parser closed stdin before reading the whole stream");
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(SinkError::Io(std::io::Error::other(e))),
        }

        if !output.status.success() {
            return Err(SinkError::ParserFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let results = ParsedResults::from_json(&output.stdout)?;
        debug!(groups = results.groups.len(), "Stream converted");

        Ok(results)
    }
}
