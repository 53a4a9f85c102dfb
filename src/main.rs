//! Hostsync daemon entry point.
//!
//! Keeps the hosts file in sync with the containers attached to one Docker
//! network: stale entries are purged, running containers are scanned, then
//! attach/detach events are applied until the event stream goes away.

use log::{error, info};
use tokio::signal;

mod config;
mod error;
mod hosts;
mod reconciler;
mod runtime;
mod types;
mod watcher;

use config::Config;
use hosts::HostsFile;
use reconciler::Reconciler;
use runtime::DockerRuntime;
use watcher::{describe, Watcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let cfg = Config::load()?;

    // Initialize logging
    let default_filter = if cfg.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    info!("Starting hostsync with config: {:?}", cfg);

    // Container Runtime (Docker)
    let runtime = DockerRuntime::connect(cfg.endpoint.as_deref(), cfg.network.clone())?;

    let hosts = HostsFile::new(&cfg.hosts_path);
    let watcher = Watcher::new(Reconciler::new(hosts), cfg.verbose);

    let run = async {
        watcher.clean().await;
        let synced = watcher.bootstrap(&runtime).await?;
        info!("Initial sync wrote entries for {} containers", synced);
        watcher.listen(&runtime).await
    };

    tokio::select! {
        result = run => {
            if let Err(e) = result {
                error!(
                    "{} (check the Docker endpoint setting HOSTSYNC_ENDPOINT)",
                    describe(&e, cfg.verbose)
                );
                std::process::exit(1);
            }
        }
        res = signal::ctrl_c() => {
            match res {
                Ok(()) => info!("Received Ctrl+C, shutting down..."),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        }
    }
    Ok(())
}
