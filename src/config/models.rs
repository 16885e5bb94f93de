use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::worker::HttpConfig;

/// Worker configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Path to the sink configuration file
    #[serde(default)]
    pub sink_config: Option<PathBuf>,
}

/// Gearman server connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_host")]
    pub host: String,
    #[serde(default = "default_queue_port")]
    pub port: u16,
    #[serde(default = "default_function")]
    pub function: String,
    /// Defaults to `<hostname>-pusher`
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl QueueConfig {
    pub fn worker_id(&self) -> String {
        match &self.worker_id {
            Some(id) => id.clone(),
            None => {
                let host = hostname::get()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "localhost".to_string());
                format!("{}-pusher", host)
            }
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: default_queue_host(),
            port: default_queue_port(),
            function: default_function(),
            worker_id: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_queue_host() -> String {
    "127.0.0.1".to_string()
}

fn default_queue_port() -> u16 {
    4730
}

fn default_function() -> String {
    "push-subunit".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

/// Artifact download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn to_http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("subunit-pusher/{}", env!("CARGO_PKG_VERSION"))
}

/// Sink configuration, kept in its own file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// External subunit-to-JSON converter
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ParserConfig {
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Storage provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Local,
    Memory,
}

/// Where run records are written
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_storage_prefix")]
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            root: default_storage_root(),
            prefix: default_storage_prefix(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/runs")
}

fn default_storage_prefix() -> String {
    "runs".to_string()
}
