use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use swarmkeeper::net::{InventoryConfig, RancherInventory};
use swarmkeeper::runtime::{default_runtime, periodically};
use swarmkeeper::{ReconcileConfig, Reconciler};
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "swarmkeeper", version)]
#[command(about = "Keeps a container-daemon swarm in line with the host inventory")]
struct Cli {
    /// Log level, used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile cluster membership periodically
    #[command(visible_alias = "o")]
    Orchestrate(OrchestrateArgs),
}

#[derive(Args)]
struct OrchestrateArgs {
    /// Inventory API URL
    #[arg(long, env = "CATTLE_URL", default_value = "")]
    cattle_url: String,

    /// Inventory API access key
    #[arg(long, env = "CATTLE_ACCESS_KEY", default_value = "")]
    cattle_access_key: String,

    /// Inventory API secret key
    #[arg(long, env = "CATTLE_SECRET_KEY", default_value = "", hide_env_values = true)]
    cattle_secret_key: String,

    /// Desired number of managers (normalized to an odd count between 1 and 9)
    #[arg(long, env = "SWARMKEEPER_MANAGERS", default_value_t = 3, allow_negative_numbers = true)]
    managers: i64,

    /// Seconds between the end of one cycle and the start of the next
    #[arg(long, env = "SWARMKEEPER_RECONCILE_PERIOD", default_value_t = 15)]
    reconcile_period: u64,

    /// Run a single cycle and exit with its result
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Command::Orchestrate(args) => orchestrate(args).await,
    }
}

async fn orchestrate(args: OrchestrateArgs) -> Result<()> {
    for (name, value) in [
        ("CATTLE_URL", &args.cattle_url),
        ("CATTLE_ACCESS_KEY", &args.cattle_access_key),
        ("CATTLE_SECRET_KEY", &args.cattle_secret_key),
    ] {
        if value.is_empty() {
            warn!("{name} is not set");
        }
    }

    let inventory = RancherInventory::new(InventoryConfig::new(
        args.cattle_url,
        args.cattle_access_key,
        args.cattle_secret_key,
    ))
    .context("failed to build inventory client")?;

    let config = ReconcileConfig::builder()
        .managers(args.managers)
        .reconcile_period(Duration::from_secs(args.reconcile_period))
        .build();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        managers = config.manager_target.get(),
        period = ?config.reconcile_period,
        "starting swarmkeeper"
    );

    let reconciler = Reconciler::with_defaults(Arc::new(inventory), config);

    if args.once {
        let report = reconciler.run_once().await?;
        info!(decision = %report.decision, "cycle complete");
        return Ok(());
    }

    let (stop, stopped) = oneshot::channel();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, stopping after the current cycle");
            let _ = stop.send(());
        }
    });

    let runtime = default_runtime();
    let period = reconciler.config().reconcile_period;
    let cycles = periodically(
        &runtime,
        period,
        async {
            let _ = stopped.await;
        },
        || reconciler.run_once(),
    )
    .await;

    info!(cycles, "stopped");
    Ok(())
}
