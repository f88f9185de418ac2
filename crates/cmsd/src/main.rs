//! cmsd — the Cloud Monitor exporter daemon.
//!
//! Loads the exporter config, builds one rate-limited client per account
//! and serves the Prometheus exposition. Every scrape of `/metrics` polls
//! the monitoring API afresh; nothing is cached between scrapes.
//!
//! # Usage
//!
//! ```text
//! cmsd serve --config /etc/cmsd/exporter.yaml --port 9527
//! cmsd namespaces
//! cmsd meta --config /etc/cmsd/exporter.yaml --account prod acs_ecs_dashboard
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cms_client::{CloudMetricClient, NamespaceCatalog};
use cms_config::Config;
use cms_metrics::Exporter;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,cmsd=debug,cms=debug";

#[derive(Parser)]
#[command(name = "cmsd", about = "Cloud Monitor exporter daemon")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the Prometheus exposition.
    Serve {
        /// Exporter config file (YAML).
        #[arg(long, short)]
        config: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value = "9527")]
        port: u16,

        /// API requests per second, per account.
        #[arg(long, default_value = "10")]
        rate_limit: u32,

        /// Metric family name prefix.
        #[arg(long, default_value = "cloudmonitor")]
        prefix: String,
    },

    /// Print the supported namespaces.
    Namespaces,

    /// List discoverable metrics for an account as JSON.
    Meta {
        #[arg(long, short)]
        config: PathBuf,

        /// Account identifier from the config.
        #[arg(long)]
        account: String,

        #[arg(long, default_value = "10")]
        rate_limit: u32,

        /// Namespaces to list; none or `all` lists every namespace.
        namespaces: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve {
            config,
            port,
            rate_limit,
            prefix,
        } => run_serve(&config, port, rate_limit, &prefix).await,
        Command::Namespaces => {
            for (name, description) in NamespaceCatalog::builtin().all() {
                println!("{name:<34} {description}");
            }
            Ok(())
        }
        Command::Meta {
            config,
            account,
            rate_limit,
            namespaces,
        } => run_meta(&config, &account, rate_limit, &namespaces).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::from_file(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    for warning in config.validate() {
        warn!(%warning, "config");
    }
    info!(
        accounts = config.credentials.len(),
        metrics = config.metric_count(),
        "config loaded"
    );
    Ok(config)
}

async fn run_serve(config: &Path, port: u16, rate_limit: u32, prefix: &str) -> anyhow::Result<()> {
    info!("cmsd starting");

    let config = load_config(config)?;
    let catalog = NamespaceCatalog::builtin();
    let exporter = Arc::new(Exporter::from_config(&config, rate_limit, catalog, prefix)?);

    let router = cms_api::build_router(exporter);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "exporter listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("cmsd stopped");
    Ok(())
}

async fn run_meta(
    config: &Path,
    account: &str,
    rate_limit: u32,
    namespaces: &[String],
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let credential = config
        .credentials
        .get(account)
        .with_context(|| format!("account {account} is not configured"))?;

    let client =
        CloudMetricClient::connect(account, credential, rate_limit, NamespaceCatalog::builtin())?;
    let meta = client.describe_metric_meta_list(namespaces).await?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}
