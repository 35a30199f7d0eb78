use clap::Parser;
use sector_engine::application::SystemOrchestrator;
use sector_engine::config::EngineConfig;
use sector_engine::domain::agent::Role;
use sector_engine::infrastructure::oracle::RuleBasedOracle;
use std::sync::Arc;
use tracing::info;

/// Minimal smoke-wiring around `SystemOrchestrator`. Not a transport: there
/// is no HTTP surface or subcommand set here, just enough to stand the
/// engine up against the rule-based oracle and watch it tick.
#[derive(Parser, Debug)]
#[command(name = "sector-engine")]
struct Cli {
    /// Override STORAGE_DIR from the environment.
    #[arg(long)]
    storage_dir: Option<String>,

    /// Seconds to run before shutting the drivers down.
    #[arg(long, default_value_t = 30)]
    run_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }

    info!(storage_dir = %config.storage_dir, "starting sector deliberation engine");

    let orchestrator = Arc::new(SystemOrchestrator::new(config, Arc::new(RuleBasedOracle)));
    seed_demo_data(&orchestrator).await?;

    orchestrator.start();
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(cli.run_seconds)) => {
            info!("run duration elapsed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
    orchestrator.stop().await;

    Ok(())
}

/// Creates a handful of sectors and agents so the drivers have something to
/// chew on. Real deployments drive `SystemOrchestrator`'s create_* methods
/// from whatever owns sector/agent lifecycle decisions.
async fn seed_demo_data(orchestrator: &SystemOrchestrator) -> anyhow::Result<()> {
    let energy = orchestrator.create_sector("Energy".to_string(), None).await?;
    orchestrator.create_agent("momentum trader", Some(energy.id), Some(Role::Trader)).await?;
    orchestrator.create_agent("fundamentals analyst", Some(energy.id), Some(Role::Analyst)).await?;
    orchestrator.create_agent("sector manager", Some(energy.id), Some(Role::Manager)).await?;
    Ok(())
}
