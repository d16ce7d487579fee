//! Entry point: CLI parsing, config bootstrap, logging, and the top-level
//! run loop with graceful shutdown (spec §11/§12).

mod health;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dispatch_config::Config;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use health::Metrics;

#[derive(Parser, Debug)]
#[command(name = "mission-dispatch", about = "Cloud-side VDA5050/MQTT robot-fleet mission controller")]
struct Cli {
    /// Path to a TOML config file; overrides the standard search locations.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the fully resolved configuration and exit without connecting
    /// to anything.
    #[arg(long)]
    show_config: bool,
}

fn init_tracing(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (config, sources) = match Config::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::from(1);
        }
    };

    if cli.show_config {
        println!("{}", config.to_toml());
        for file in &sources.files {
            println!("# loaded from: {}", file.display());
        }
        for env in &sources.env_overrides {
            println!("# env override: {env}");
        }
        return ExitCode::SUCCESS;
    }

    init_tracing(&config.ambient.log_filter);
    info!(files = sources.files.len(), env_overrides = sources.env_overrides.len(), "configuration loaded");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "mission-dispatch exited with an error");
            ExitCode::from(2)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let metrics = Arc::new(Metrics::default());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            signal_token.cancel();
        }
    });

    let health_bind = config.ambient.health_bind_addr.clone();
    let health_metrics = metrics.clone();
    let health_shutdown = shutdown.clone();
    let health_task = tokio::spawn(async move {
        if let Err(err) = health::serve(&health_bind, health_metrics, health_shutdown).await {
            error!(error = %err, "health server failed");
        }
    });

    let fleet_result = server::run(config, metrics, shutdown.clone()).await;
    shutdown.cancel();
    let _ = health_task.await;
    fleet_result
}
