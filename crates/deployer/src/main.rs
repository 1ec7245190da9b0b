// Command-line entry point: one subcommand per deployment stage

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::error;

use v3_deployer::commands::{self, Stage, StageContext, StageReport};
use v3_deployer::logging::init_logging;
use v3_deployer::{DeployerConfig, RunMode};

#[derive(Parser)]
#[command(name = "v3-deployer")]
#[command(about = "Deploys and bootstraps a Uniswap V3 exchange", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "deployer.toml")]
    config: PathBuf,

    /// Network to target (defaults to the configured default_network)
    #[arg(short, long)]
    network: Option<String>,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy WETH9, the factory, the router and the position manager
    Core {
        /// Redeploy contracts already present in the registry
        #[arg(long)]
        force: bool,
    },

    /// Deploy the test tokens and mint a supply to the deployer
    Tokens,

    /// Create and initialize the configured pools
    Pools,

    /// Mint a liquidity position
    Mint,

    /// Swap an exact input amount
    Swap,
}

impl Commands {
    fn stage(&self) -> Stage {
        match self {
            Commands::Core { .. } => Stage::Core,
            Commands::Tokens => Stage::Tokens,
            Commands::Pools => Stage::Pools,
            Commands::Mint => Stage::Mint,
            Commands::Swap => Stage::Swap,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(report) => {
            report.print();
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("[ERROR] {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<StageReport> {
    let mut config = DeployerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;

    let network = cli
        .network
        .unwrap_or_else(|| config.default_network.clone());
    let stage = cli.command.stage();

    let mut ctx = StageContext::connect(config, &network)
        .await
        .with_context(|| format!("Failed to prepare {} stage on {}", stage, network))?;

    let report = match cli.command {
        Commands::Core { force } => {
            let mode = if force {
                RunMode::Force
            } else {
                RunMode::ReuseExisting
            };
            commands::core::run(&mut ctx, mode).await
        }
        Commands::Tokens => commands::tokens::run(&mut ctx).await,
        Commands::Pools => commands::pools::run(&mut ctx).await,
        Commands::Mint => commands::mint::run(&mut ctx).await,
        Commands::Swap => commands::swap::run(&mut ctx).await,
    }
    .with_context(|| format!("{} stage failed on {}", stage, network))?;

    Ok(report)
}
