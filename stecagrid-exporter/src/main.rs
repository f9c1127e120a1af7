//! Prometheus exporter for StecaGrid solar inverters.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use stecagrid_exporter::{ExporterConfig, Fetcher, HttpServer, Poller, SinkRegistry, init_tracing};

/// Prometheus exporter for StecaGrid solar inverters.
#[derive(Parser, Debug)]
#[command(name = "stecagrid-exporter")]
#[command(about = "Export StecaGrid inverter measurements as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, env = "STECAGRID_CONFIG")]
    config: Option<PathBuf>,

    /// StecaGrid IP address or host name (overrides config).
    #[arg(long = "steca-ip", env = "STECAGRID_HOST")]
    steca_ip: Option<String>,

    /// StecaGrid measurements path (overrides config).
    #[arg(long = "steca-path", env = "STECAGRID_PATH")]
    steca_path: Option<String>,

    /// Polling frequency in seconds (overrides config).
    #[arg(long, env = "STECAGRID_FREQUENCY")]
    frequency: Option<u64>,

    /// Address to listen on for telemetry (overrides config).
    #[arg(long = "web.listen-address", env = "STECAGRID_LISTEN")]
    listen_address: Option<String>,

    /// Path under which to expose metrics (overrides config).
    #[arg(long = "web.telemetry-path", env = "STECAGRID_METRICS_PATH")]
    telemetry_path: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "STECAGRID_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Apply command-line overrides on top of the file configuration.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(host) = self.steca_ip {
            config.device.host = host;
        }
        if let Some(path) = self.steca_path {
            config.device.path = path;
        }
        if let Some(frequency) = self.frequency {
            config.polling.interval_secs = frequency;
        }
        if let Some(listen) = self.listen_address {
            config.prometheus.listen = listen;
        }
        if let Some(path) = self.telemetry_path {
            config.prometheus.path = path;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();

    // Load configuration
    let mut config = match args.config.take() {
        Some(path) => ExporterConfig::load_from_file(&path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ExporterConfig::default(),
    };

    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting StecaGrid exporter");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = Arc::new(SinkRegistry::new(&config.prometheus.prefix));
    let fetcher = Fetcher::new(&config.device).context("Failed to create device client")?;

    if config.device.accept_invalid_certs {
        info!("TLS certificate verification disabled for the inverter connection");
    }

    let listen_addr: SocketAddr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Binding failure is fatal.
    let http_server = HttpServer::bind(
        registry.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    )
    .await?;

    let poller = Poller::new(fetcher, registry.clone(), config.polling.interval());

    let poller_shutdown = shutdown_rx.clone();
    let poller_task = tokio::spawn(async move {
        poller.run(poller_shutdown).await;
    });

    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = poller_task.await;
        let _ = http_task.await;
    })
    .await;

    let stats = registry.stats();
    info!(
        polls_total = stats.polls_total,
        polls_succeeded = stats.polls_succeeded,
        fetch_errors = stats.fetch_errors,
        parse_errors = stats.parse_errors,
        conversion_errors = stats.conversion_errors,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
