use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use courier::adapters::hyper_server::bind_listener;
use courier::adapters::{MonitoringServer, ProxyServer};
use courier::config::ProxyConfig;
use courier::ports::TrackingPort;

#[derive(Parser, Debug)]
#[clap(version = courier::VERSION, about = "Forward HTTP/HTTPS proxy")]
pub struct Opts {
    /// Path to the TOML settings file
    #[clap(long, short = 'c', env = "COURIER_CONFIG", default_value = "courier.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[clap(long, env = "COURIER_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opts.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ProxyConfig::load(&opts.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => info!("Open file limit set to {}", limit),
        Err(e) => warn!("Could not raise open file limit: {}", e),
    }

    info!("courier {} starting", courier::VERSION);

    let proxy = ProxyServer::new(config.clone());
    let proxy_listener = match proxy.bind() {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.listen_addr, e);
            return ExitCode::FAILURE;
        }
    };
    let monitoring_listener = match bind_listener(config.monitoring_addr) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.monitoring_addr, e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let tracker: Arc<dyn TrackingPort> = proxy.tracker();
    let monitoring = MonitoringServer::new(tracker, proxy.buffer_pool());
    let monitoring_shutdown = shutdown.clone();
    let monitoring_task = tokio::spawn(async move {
        monitoring
            .serve(monitoring_listener, monitoring_shutdown.cancelled_owned())
            .await
    });

    let result = proxy.serve(proxy_listener, shutdown.clone().cancelled_owned()).await;
    shutdown.cancel();

    if let Ok(Err(e)) = monitoring_task.await {
        warn!("Monitoring server failed: {}", e);
    }

    match result {
        Ok(()) => {
            info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Proxy server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received ctrl-c");
    }

    shutdown.cancel();
}
