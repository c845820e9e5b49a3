//! nodewatch Server Entry Point

use clap::Parser;
use nodewatch::config::MonitorConfig;
use nodewatch::monitor::Monitor;
use nodewatch::probe::{GrpcProber, Prober};
use nodewatch::source::registry::RegistryEndpointSource;
use nodewatch::source::EndpointSource;
use nodewatch::store::StatusStore;
use nodewatch::{api, logging, AppState};
use std::sync::Arc;
use tracing::info;

/// コマンドライン引数
#[derive(Parser, Debug)]
#[command(name = "nodewatch", version, about = "Distributed node status monitor")]
struct Cli {
    /// バインドするホスト
    #[arg(long, env = "NODEWATCH_HOST", default_value = "0.0.0.0")]
    host: String,

    /// バインドするポート
    #[arg(long, env = "NODEWATCH_PORT", default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init().expect("failed to initialize logging");
    info!("Starting nodewatch v{}", env!("CARGO_PKG_VERSION"));

    let config = match MonitorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let client = reqwest::Client::new();
    let source: Arc<dyn EndpointSource> = Arc::new(RegistryEndpointSource::new(
        client,
        config.rpc_url.clone(),
        config.registry_contract.clone(),
    ));
    let prober: Arc<dyn Prober> = Arc::new(GrpcProber::new(
        config.probe_timeout,
        config.version_timeout,
    ));

    let store = StatusStore::new();
    info!(
        registry = %config.registry_contract,
        poll_interval = ?config.poll_interval,
        concurrency = config.probe_concurrency,
        "Monitor configured"
    );
    Monitor::new(source, prober, store.clone(), config).start();

    let app = api::create_app(AppState { store });
    let bind_addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));
    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
