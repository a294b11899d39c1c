use clap::Parser;
use kv_node::Node;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Cluster node for the distributed key-value store")]
struct Cli {
    /// Path to the node's TOML configuration file.
    #[arg(short, long, default_value = "/etc/kv-store/node.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let cli = Cli::parse();

    info!(version = env!("CARGO_PKG_VERSION"), "node starting");

    let config = match kv_node::config::load_config_from_path(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let node = match Node::bind(config).await {
        Ok(node) => node,
        Err(e) => {
            eprintln!("FATAL: failed to bind node: {e}");
            std::process::exit(1);
        }
    };
    let listen_addr = node.local_addr().expect("bound node has a local addr");
    info!(addr = %listen_addr, "node listening");

    node.run_until_shutdown(shutdown_signal()).await;
    info!("node shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
