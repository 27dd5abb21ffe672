//! NetBackup Prometheus exporter.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use nbu_api::MetricsApi;
use nbu_client::{Context, LogTracer, Transport, TransportConfig};
use nbu_observe::logger_init;
use nbu_prometheus::NbuCollector;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;

/// Prometheus exporter for NetBackup primary servers
#[derive(Parser, Debug)]
#[command(name = "nbu-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", env = "NBU_EXPORTER_CONFIG")]
    config: PathBuf,

    /// Listen address (overrides server.host)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides server.port)
    #[arg(long)]
    port: Option<u16>,

    /// Log filter directive (overrides server.log_level)
    #[arg(long)]
    log_level: Option<String>,

    /// Fixed NetBackup API version, disables negotiation (overrides nbuserver.api_version)
    #[arg(long)]
    api_version: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(level) = &self.log_level {
            config.server.log_level = level.clone();
        }
        if let Some(version) = &self.api_version {
            config.nbuserver.api_version = version.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    if cli.check_config {
        println!("{}: configuration is valid", cli.config.display());
        return Ok(());
    }

    logger_init(&config.logger_config()).context("failed to initialize logger")?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "starting nbu-exporter"
    );

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let mut transport_config = TransportConfig::new(config.base_url(), config.nbuserver.api_key.clone())
        .insecure_skip_verify(config.nbuserver.insecure_skip_verify);
    if config.nbuserver.trace_requests {
        transport_config = transport_config.tracer(Arc::new(LogTracer));
    }
    if config.nbuserver.insecure_skip_verify {
        warn!("TLS certificate verification is disabled for the NetBackup API");
    }

    let transport = Transport::new(transport_config).context("failed to build HTTP client")?;
    let collector = Arc::new(NbuCollector::new(transport, config.collector_options()?)?);

    let router = MetricsApi::new(Arc::clone(&collector), config.server.scrape_timeout)
        .router(&config.server.uri);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        path = %config.server.uri,
        upstream = %config.base_url(),
        "serving metrics"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!(timeout = ?config.server.shutdown_timeout, "shutting down");
    let ctx = Context::background().with_timeout(config.server.shutdown_timeout);
    collector
        .close_with_context(&ctx)
        .await
        .context("collector did not shut down cleanly")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
