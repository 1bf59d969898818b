//! meshgwd - Mesh gateway coordination daemon
//!
//! Follows gateway status on the broker, requests the sink configuration
//! of gateways that come online and hands the results to the storage sink
//! and the gateway status read model.
//!
//! Usage:
//!   meshgwd [--config settings.toml] [--log-level filter]
//!
//! If no settings file is provided, the loopback broker is used.

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod config;

use app::App;
use config::{ConfigError, Settings};

const DEFAULT_FILTER: &str = "meshgwd=info,meshgw_mediator=debug,meshgw_daemon=info";

#[derive(Parser, Debug)]
#[command(name = "meshgwd")]
#[command(version, about = "Mesh gateway coordination daemon")]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, env = "MESHGW_CONFIG")]
    config: Option<String>,

    /// Log filter, e.g. "info" or "meshgw_mediator=trace"
    /// MESHGW_LOG takes precedence when set
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(log_level: Option<&str>) {
    let filter = EnvFilter::try_from_env("MESHGW_LOG").unwrap_or_else(|_| {
        EnvFilter::try_new(log_level.unwrap_or(DEFAULT_FILTER))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_settings(args: &Args) -> Result<Settings, ConfigError> {
    let settings = match &args.config {
        Some(path) => {
            info!("Loading settings from: {}", path);
            Settings::load(path)?
        }
        None => {
            info!("No settings file provided, using loopback broker");
            Settings::default()
        }
    };

    if let Err(e) = settings.validate() {
        if let ConfigError::Invalid(problems) = &e {
            for problem in problems {
                error!(section = %problem.section, "{}", problem.reason);
                error!("{}", settings.dump(problem.section));
            }
        }
        return Err(e);
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    info!("Starting meshgwd");

    let settings = load_settings(&args)?;
    info!(
        gateway_id = %settings.filter.gateway_id,
        sink_id = %settings.filter.sink_id,
        network_id = %settings.filter.network_id,
        "Subscription filter"
    );

    let mut app = App::build(&settings)?;
    app.daemon
        .start(settings.daemon.gate_after_all_running)
        .await?;

    let refresher = settings
        .read_model
        .refresh_secs
        .map(|secs| app.spawn_refresh(Duration::from_secs(secs)));

    if let Some(loopback) = &app.loopback {
        loopback.announce_all();
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown requested");
        }
        failure = app.daemon.failure() => {
            error!(error = %failure, "Task failed, shutting down");
        }
    }

    if let Some(refresher) = refresher {
        refresher.abort();
    }
    let result = app.daemon.shutdown().await;

    for entry in app.view.list() {
        info!(
            gateway_id = %entry.record.gateway_id,
            status = %entry.status,
            sinks = entry.record.configs.len(),
            updates = entry.updates,
            "Final gateway status"
        );
    }

    result?;
    Ok(())
}
