use anyhow::{Context, Result};
use clap::Subcommand;
use epoch_settlement::{
    report::{CriticalValueListing, Exportable, OutputFormat, ParticipantListing},
    settings::{Settings, validation::validate_state},
    settlement::{EpochSettler, SettlementContext},
    stats::{CriticalValueTable, TABLE_MAX_TOTAL},
    store::ChainState,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Settle one epoch: mint the pool and write settle amounts
    Settle {
        /// Chain-state JSON file
        #[arg(short, long, value_name = "FILE")]
        state: PathBuf,

        /// Epoch being closed
        #[arg(short, long, value_name = "EPOCH")]
        epoch: u64,

        /// Previous epoch; settle amounts older than it expire (defaults to epoch - 1)
        #[arg(short, long, value_name = "EPOCH")]
        previous: Option<u64>,

        /// Compute and print without saving the state file
        #[arg(long)]
        dry_run: bool,

        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },
    /// Show participants, settle amounts and claim history
    Inspect {
        /// Chain-state JSON file
        #[arg(short, long, value_name = "FILE")]
        state: PathBuf,

        /// Restrict output to one participant
        #[arg(long, value_name = "ADDRESS")]
        participant: Option<String>,

        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },
    /// Print the missed-validation critical values next to the exact binomial bound
    CriticalValues {
        #[arg(long, value_name = "N", default_value_t = TABLE_MAX_TOTAL)]
        max_total: u64,

        #[arg(short, long, default_value = "table")]
        output: OutputFormat,
    },
}

pub fn handle(settings: &Settings, command: Commands) -> Result<()> {
    match command {
        Commands::Settle {
            state,
            epoch,
            previous,
            dry_run,
            output,
        } => settle(settings, &state, epoch, previous, dry_run, output),
        Commands::Inspect {
            state,
            participant,
            output,
        } => {
            let chain = ChainState::load(&state)?;
            let listing = ParticipantListing::from_store(&chain.store, participant.as_deref());
            println!("{}", listing.export(output)?);
            Ok(())
        }
        Commands::CriticalValues { max_total, output } => {
            let listing = CriticalValueListing::build(max_total)?;
            println!("{}", listing.export(output)?);
            Ok(())
        }
    }
}

fn settle(
    settings: &Settings,
    state_path: &Path,
    epoch: u64,
    previous: Option<u64>,
    dry_run: bool,
    output: OutputFormat,
) -> Result<()> {
    let mut chain = ChainState::load(state_path)?;
    validate_state(&chain.tokenomics)?;

    let governance = settings.governance();
    let stat_test = CriticalValueTable;
    let settler = EpochSettler::new(&governance, &stat_test);
    let previous = previous.unwrap_or_else(|| epoch.saturating_sub(1));

    let mut ctx = SettlementContext {
        store: &mut chain.store,
        ledger: &mut chain.ledger,
        slasher: &mut chain.collateral,
    };
    let report = settler
        .settle_epoch(&mut ctx, &mut chain.tokenomics, epoch, previous)
        .with_context(|| format!("Failed to settle epoch {epoch}"))?;

    let Some(report) = report else {
        info!("Nothing settled for epoch {}", epoch);
        return Ok(());
    };
    println!("{}", report.export(output)?);

    // the settled epoch becomes claimable
    let next = epoch.saturating_add(1);
    if chain.store.current_epoch.is_none_or(|current| current < next) {
        chain.store.current_epoch = Some(next);
    }

    if dry_run {
        info!("DRY RUN: state file {:?} left unchanged", state_path);
        return Ok(());
    }
    chain.save(state_path)?;
    info!("Saved chain state to {:?}", state_path);
    Ok(())
}
