//! repgridd: the RepGrid daemon.
//!
//! Connects to the configuration store and the workload API, then keeps
//! every replication controller at its desired pod count until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! repgridd run --config /etc/repgrid/repgridd.toml
//! repgridd run --etcd http://127.0.0.1:4001 --api-server http://127.0.0.1:8080 --sync-period 10s
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use repgrid_client::{EtcdClient, HttpTransport, HttpWorkloadClient};
use repgrid_controller::ReplicationManager;

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(name = "repgridd", about = "RepGrid replication controller daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the replication manager until interrupted.
    Run {
        /// Path to repgridd.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Configuration store endpoint (overrides etcd.endpoint).
        #[arg(long)]
        etcd: Option<String>,

        /// Workload API server (overrides api.server).
        #[arg(long)]
        api_server: Option<String>,

        /// Full sync period, e.g. "10s" (overrides sync.period).
        #[arg(long)]
        sync_period: Option<String>,

        /// Log as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,repgridd=debug,repgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            etcd,
            api_server,
            sync_period,
            log_json,
        } => {
            let mut cfg = DaemonConfig::load(config.as_deref())?;
            if let Some(endpoint) = etcd {
                cfg.etcd.endpoint = endpoint;
            }
            if let Some(server) = api_server {
                cfg.api.server = server;
            }
            if let Some(period) = sync_period {
                cfg.sync.period = period;
            }
            cfg.log.json |= log_json;

            init_tracing(cfg.log.json);
            run(cfg).await
        }
    }
}

async fn run(cfg: DaemonConfig) -> anyhow::Result<()> {
    let period = cfg.sync_period()?;
    let timeout = cfg.api_timeout()?;
    info!(etcd = %cfg.etcd.endpoint, api = %cfg.api.server, ?period, "repgridd starting");

    // ── Clients ────────────────────────────────────────────────

    let store = EtcdClient::new(&cfg.etcd.endpoint)
        .with_context(|| format!("invalid etcd endpoint {}", cfg.etcd.endpoint))?;

    let transport = HttpTransport::new(&cfg.api.server)
        .with_context(|| format!("invalid api server {}", cfg.api.server))?
        .with_timeout(Some(timeout));
    let api = HttpWorkloadClient::new(&cfg.api.server)?
        .with_transport(transport)
        .with_prefix(cfg.api.prefix.clone());

    let manager = ReplicationManager::new(Arc::new(store), Arc::new(api));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    manager.run(period, shutdown_rx).await;

    info!("repgridd stopped");
    Ok(())
}
