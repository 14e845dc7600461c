//! # chaos-stack
//!
//! CLI for the chaos-stack environment.
//!
//! ## Commands
//!
//! - `synth`: Print or write the deployment template
//! - `validate`: Build the stack and check every invariant
//! - `order`: Show creation waves and teardown order
//! - `simulate`: Apply, run the experiment and tear down against a simulated cloud
//!
//! ## Example
//!
//! ```bash
//! # Render the template
//! chaos-stack synth --output template.json
//!
//! # Dry-run the experiment with a breached stop condition
//! chaos-stack simulate --breach
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{order, simulate, synth, validate};
use config::Config;

const DEFAULT_CONFIG_FILE: &str = "chaos-stack.toml";

/// CLI for the chaos-stack environment.
#[derive(Parser, Debug)]
#[command(name = "chaos-stack")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: chaos-stack.toml, if present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the target account
    #[arg(long, global = true)]
    account: Option<String>,

    /// Override the target region
    #[arg(long, global = true)]
    region: Option<String>,

    /// Override the log filter
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the deployment template
    Synth {
        /// Write the template to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Build the stack and check every invariant
    Validate,

    /// Show creation waves and teardown order
    Order,

    /// Apply, run the experiment and tear down against a simulated cloud
    Simulate {
        /// Breach the stop condition before the experiment starts
        #[arg(long)]
        breach: bool,

        /// Leave the stack provisioned at the end
        #[arg(long)]
        keep: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Write the provisioning state to a file
        #[arg(long)]
        state_out: Option<PathBuf>,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.exists() {
                Config::from_file(&path)?
            } else {
                Config::default()
            }
        }
    };

    if let Some(account) = &cli.account {
        config.environment.account = account.clone();
    }
    if let Some(region) = &cli.region {
        config.environment.region = region.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging.level);

    // The simulated cloud runs on virtual time.
    let paused = matches!(cli.command, Commands::Simulate { .. });
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(paused)
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Synth { output } => synth::run(&config, output.as_deref()).await,
            Commands::Validate => validate::run(&config),
            Commands::Order => order::run(&config),
            Commands::Simulate {
                breach,
                keep,
                json,
                state_out,
            } => {
                let options = simulate::SimulateOptions {
                    breach,
                    keep,
                    json,
                    state_out,
                };
                simulate::run(&config, options).await
            }
        }
    })
}
