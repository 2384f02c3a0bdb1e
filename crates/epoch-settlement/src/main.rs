mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Commands;
use epoch_settlement::settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "epoch-settlement",
    about = "Epoch reward settlement over a JSON chain-state file",
    version,
    author,
    after_help = r#"Configuration:
    Configuration can be provided via:
    1. Environment variables with SETTLE__ prefix (e.g., SETTLE__TOKENOMICS__TOTAL_SUBSIDY_SUPPLY)
    2. .env file in the current directory
    3. Config file with -c option (see example.config.toml)

Examples:
    # Settle epoch 12 without writing the state back
    epoch-settlement settle --state chain.json --epoch 12 --dry-run

    # Settle with an explicit previous epoch and export CSV
    epoch-settlement settle --state chain.json --epoch 12 --previous 11 --output csv

    # Show outstanding settle amounts for one participant
    epoch-settlement inspect --state chain.json --participant <ADDRESS>

    # Compare the critical-value table with the exact binomial bound
    epoch-settlement critical-values --max-total 100"#
)]
pub struct Cli {
    /// Path to the configuration file (TOML format)
    ///
    /// If not provided, will attempt to load from environment variables
    #[clap(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let settings = if let Some(config_path) = &self.config {
            Settings::from_path(config_path)?
        } else {
            Settings::from_env()?
        };
        init_logging(&settings.log_level)?;
        tracing::debug!("{}", settings);

        cli::handle(&settings, self.command)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}

fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
