//! Video generation worker binary.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shopreel_queue::{JobKind, QueueRegistry};
use shopreel_worker::{JobExecutor, ProcessingContext, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("shopreel=info".parse().unwrap())
        .add_directive("aws_config=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting shopreel-worker");

    // Optional Prometheus endpoint
    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        match addr.parse::<std::net::SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()
                {
                    error!("Failed to install metrics exporter: {}", e);
                }
            }
            Err(e) => error!("Invalid METRICS_ADDR: {}", e),
        }
    }

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // The queue registry is built exactly once and handed to everything
    // that needs it; there are no global queue singletons
    let registry = match QueueRegistry::from_env() {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to create queue registry: {}", e);
            std::process::exit(1);
        }
    };

    let ctx = match ProcessingContext::from_env(config, registry.clone()).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build processing context: {}", e);
            std::process::exit(1);
        }
    };

    // One executor (with its own small worker pool) per job stream
    let executors: Vec<Arc<JobExecutor>> = JobKind::all()
        .into_iter()
        .map(|kind| Arc::new(JobExecutor::new(ctx.clone(), registry.queue(kind))))
        .collect();

    let mut handles = Vec::new();
    for executor in &executors {
        let executor = Arc::clone(executor);
        handles.push(tokio::spawn(async move {
            if let Err(e) = executor.run().await {
                error!("Executor error: {}", e);
            }
        }));
    }

    // Propagate ctrl-c to every executor
    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    for executor in &executors {
        executor.shutdown();
    }

    for handle in handles {
        handle.await.ok();
    }

    info!("Worker shutdown complete");
}
