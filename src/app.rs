use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use subunit_pusher::config::{Config, SinkConfig, StorageProvider};
use subunit_pusher::queue::GearmanWorker;
use subunit_pusher::sink::{CommandParser, ObjectStoreSink};
use subunit_pusher::storage::StorageClient;
use subunit_pusher::worker::{EventProcessor, HttpFetcher, Worker, WorkerConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub async fn run(config_path: Option<PathBuf>) -> Result<(), BoxError> {
    let config = Config::load(config_path)?;
    let sink_config = config.load_sink()?;

    let processor = build_processor(&config, &sink_config)?;

    let worker_id = config.queue.worker_id();
    let mut queue = GearmanWorker::new(config.queue.host.clone(), config.queue.port, worker_id);
    queue.register_function(config.queue.function.clone());

    let mut worker = Worker::new(
        queue,
        processor,
        WorkerConfig {
            reconnect_delay: config.queue.reconnect_delay(),
        },
    );
    let metrics = worker.metrics();

    info!(
        host = %config.queue.host,
        port = config.queue.port,
        function = %config.queue.function,
        "Starting worker"
    );

    tokio::select! {
        _ = worker.run() => {},
        _ = shutdown_signal() => {},
    }

    let snapshot = metrics.snapshot();
    info!(
        received = snapshot.jobs_received,
        completed = snapshot.jobs_completed,
        failed = snapshot.jobs_failed,
        panicked = snapshot.jobs_panicked,
        queue_errors = snapshot.queue_errors,
        "Worker stopped"
    );

    Ok(())
}

pub fn check_config(config_path: Option<PathBuf>) -> Result<(), BoxError> {
    let config = Config::load(config_path)?;
    let sink_config = config.load_sink()?;

    println!(
        "worker {} serving {} on {}:{}",
        config.queue.worker_id(),
        config.queue.function,
        config.queue.host,
        config.queue.port
    );
    println!(
        "sink parser {} storing under {:?} ({:?})",
        sink_config.parser.program.as_deref().unwrap_or_default(),
        sink_config.storage.root,
        sink_config.storage.provider
    );

    Ok(())
}

fn build_processor(config: &Config, sink_config: &SinkConfig) -> Result<EventProcessor, BoxError> {
    let fetcher = HttpFetcher::new(config.fetch.to_http_config())?;

    let program = sink_config.parser.program.clone().unwrap_or_default();
    let parser = CommandParser::new(program, sink_config.parser.args.clone());

    let storage = match sink_config.storage.provider {
        StorageProvider::Local => StorageClient::local(&sink_config.storage.root)?,
        StorageProvider::Memory => StorageClient::in_memory(),
    };
    let sink = ObjectStoreSink::new(storage, sink_config.storage.prefix.clone());

    Ok(EventProcessor::new(
        Arc::new(fetcher),
        Arc::new(parser),
        Arc::new(sink),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
