use super::models::{Config, SinkConfig};
use config::{ConfigError, Environment, File, Map};
use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "SUBUNIT_PUSHER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/subunit-pusher.toml";
const ENV_PREFIX: &str = "SUBUNIT_PUSHER";
const SINK_ENV_PREFIX: &str = "SUBUNIT_SINK";
const ENV_SEPARATOR: &str = "__";

/// Resolve the worker configuration path: explicit path, then
/// `SUBUNIT_PUSHER_CONFIG`, then the default location
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load worker configuration with priority:
/// 1. Defaults (embedded in structs)
/// 2. Config file, TOML or YAML by extension (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(explicit: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();
    load_from_sources(&config_path(explicit))
}

pub fn load_from_sources(config_path: &Path) -> Result<Config, ConfigError> {
    load_layered(config_path, ENV_PREFIX, None)
}

pub fn load_sink(path: &Path) -> Result<SinkConfig, ConfigError> {
    load_layered(path, SINK_ENV_PREFIX, None)
}

/// `env` replaces the process environment when given
fn load_layered<T: DeserializeOwned>(
    path: &Path,
    env_prefix: &str,
    env: Option<Map<String, String>>,
) -> Result<T, ConfigError> {
    let mut builder = config::Config::builder();

    if path.exists() {
        tracing::info!("Loading configuration from: {}", path.display());
        builder = builder.add_source(File::from(path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            path.display()
        );
    }

    // SUBUNIT_PUSHER__QUEUE__HOST -> queue.host
    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageProvider;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_from_sources(&temp_dir.path().join("nonexistent.toml")).unwrap();

        assert_eq!(config.queue.host, "127.0.0.1");
        assert_eq!(config.queue.port, 4730);
        assert_eq!(config.queue.function, "push-subunit");
        assert_eq!(config.fetch.request_timeout_secs, 300);
        assert!(config.sink_config.is_none());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("worker.toml");

        fs::write(
            &config_path,
            r#"
sink_config = "/etc/subunit2sql.toml"

[queue]
host = "gearman.example.org"
port = 4731
worker_id = "ci-logs-pusher"

[fetch]
request_timeout_secs = 60
            "#,
        )
        .unwrap();

        let config = load_from_sources(&config_path).unwrap();
        assert_eq!(config.queue.host, "gearman.example.org");
        assert_eq!(config.queue.port, 4731);
        assert_eq!(config.queue.worker_id(), "ci-logs-pusher");
        assert_eq!(config.fetch.request_timeout_secs, 60);
        assert_eq!(config.fetch.connect_timeout_secs, 10);
        assert_eq!(
            config.sink_config,
            Some(PathBuf::from("/etc/subunit2sql.toml"))
        );
    }

    #[test]
    fn test_load_from_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("worker.yaml");

        fs::write(
            &config_path,
            "queue:\n  host: gearman.internal\n  reconnect_delay_ms: 250\nsink_config: sink.yaml\n",
        )
        .unwrap();

        let config = load_from_sources(&config_path).unwrap();
        assert_eq!(config.queue.host, "gearman.internal");
        assert_eq!(config.queue.reconnect_delay_ms, 250);
        assert_eq!(config.sink_config, Some(PathBuf::from("sink.yaml")));
    }

    #[test]
    fn test_load_sink() {
        let temp_dir = TempDir::new().unwrap();
        let sink_path = temp_dir.path().join("sink.toml");

        fs::write(
            &sink_path,
            r#"
[parser]
program = "subunit2json"
args = ["--strict"]

[storage]
provider = "memory"
prefix = "nightly"
            "#,
        )
        .unwrap();

        let sink = load_sink(&sink_path).unwrap();
        assert_eq!(sink.parser.program.as_deref(), Some("subunit2json"));
        assert_eq!(sink.parser.args, vec!["--strict"]);
        assert_eq!(sink.storage.provider, StorageProvider::Memory);
        assert_eq!(sink.storage.prefix, "nightly");
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = config_path(Some(PathBuf::from("/tmp/explicit.toml")));
        assert_eq!(path, PathBuf::from("/tmp/explicit.toml"));
    }

    fn env(pairs: &[(&str, &str)]) -> Option<Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_env_overrides_worker_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("worker.toml");
        fs::write(
            &config_path,
            "[queue]\nhost = \"gearman.example.org\"\nport = 4731\n",
        )
        .unwrap();

        let config: Config = load_layered(
            &config_path,
            ENV_PREFIX,
            env(&[
                ("SUBUNIT_PUSHER__QUEUE__PORT", "4799"),
                ("SUBUNIT_PUSHER__FETCH__REQUEST_TIMEOUT_SECS", "45"),
                ("SUBUNIT_SINK__STORAGE__ROOT", "/ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(config.queue.port, 4799u16);
        assert_eq!(config.queue.host, "gearman.example.org");
        assert_eq!(config.fetch.request_timeout_secs, 45);
    }

    #[test]
    fn test_env_overrides_sink_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink_path = temp_dir.path().join("sink.yaml");
        fs::write(
            &sink_path,
            "parser:\n  program: subunit2json\nstorage:\n  root: /srv/runs\n",
        )
        .unwrap();

        let sink: SinkConfig = load_layered(
            &sink_path,
            SINK_ENV_PREFIX,
            env(&[
                ("SUBUNIT_SINK__STORAGE__ROOT", "/data/override"),
                ("SUBUNIT_PUSHER__QUEUE__PORT", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(sink.storage.root, PathBuf::from("/data/override"));
        assert_eq!(sink.parser.program.as_deref(), Some("subunit2json"));
    }
}
