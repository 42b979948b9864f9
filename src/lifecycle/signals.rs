//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - A second SIGTERM/SIGINT exits immediately
//! - SIGHUP reloads the config file and feeds it to the same channel as the watcher

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{load_config, ProxyConfig};
use crate::lifecycle::shutdown::Shutdown;

enum Signal {
    Shutdown,
    Reload,
}

/// Handle OS signals until the process exits.
pub fn spawn_signal_handler(
    shutdown: Shutdown,
    config_path: PathBuf,
    updates: mpsc::UnboundedSender<ProxyConfig>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut signals = match Signals::new() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        let mut requested = false;
        loop {
            match signals.next().await {
                Signal::Reload => {
                    tracing::info!(path = ?config_path, "SIGHUP received, reloading config");
                    match load_config(&config_path) {
                        Ok(config) => {
                            let _ = updates.send(config);
                        }
                        Err(e) => tracing::error!(error = %e, "Reload failed, keeping current configuration"),
                    }
                }
                Signal::Shutdown if requested => {
                    tracing::warn!("Second shutdown signal, exiting immediately");
                    std::process::exit(1);
                }
                Signal::Shutdown => {
                    tracing::info!("Shutdown signal received");
                    requested = true;
                    shutdown.trigger();
                }
            }
        }
    })
}

#[cfg(unix)]
struct Signals {
    terminate: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn next(&mut self) -> Signal {
        tokio::select! {
            _ = self.terminate.recv() => Signal::Shutdown,
            _ = self.interrupt.recv() => Signal::Shutdown,
            _ = self.hangup.recv() => Signal::Reload,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Signal {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Shutdown,
            Err(e) => {
                tracing::error!(error = %e, "Ctrl+C handler failed");
                std::future::pending().await
            }
        }
    }
}
