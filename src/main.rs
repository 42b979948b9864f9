//! origin-dispatch reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http server ──▶ routing ──▶ BackendServiceClient (per application)
//!                                                │   rewrite, retry loop
//!                                                ▼
//!                                  load balancer chain over OriginsInventory
//!                                                │
//!                                                ▼
//!                                 HostHttpClient ──▶ connection pool ──▶ Origin
//!
//!     Cross-cutting: config + watcher, health monitor, origins bus + admin API,
//!                    tracing, Prometheus metrics, lifecycle/shutdown
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use origin_dispatch::config::{load_config, ConfigWatcher};
use origin_dispatch::lifecycle::{spawn_signal_handler, Proxy, Shutdown};
use origin_dispatch::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "origin-dispatch", version, about = "Reverse proxy dispatching to backend origins")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?args.config,
        applications = config.applications.len(),
        "origin-dispatch starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let admin_listener = if config.admin.enabled {
        Some(TcpListener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };

    let shutdown = Shutdown::new();
    let (watcher, updates) = ConfigWatcher::new(&args.config);
    spawn_signal_handler(shutdown.clone(), args.config.clone(), watcher.sender());

    // Keeps the file watch alive until main returns.
    let _watch = if args.no_watch {
        None
    } else {
        match watcher.run() {
            Ok(watch) => Some(watch),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start, reload only on SIGHUP");
                None
            }
        }
    };

    let proxy = Arc::new(Proxy::build(config)?);
    proxy.run(listener, admin_listener, shutdown, Some(updates)).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
