// src/main.rs
//
// =============================================================================
// PIPETLAB: COMMANDER & ENTRY POINT (v 0.1 )
// =============================================================================
//
// Command-line front end for the liquid handling engine.
//
// Modes:
// 1. INSPECT:  Decode a deck file and print its layout.
// 2. DRY-RUN:  Validate a workflow in simulation mode; state is rolled back.
// 3. SIMULATE: Execute a workflow against the recording simulator.
//
// Ctrl-C requests an abort; the engine homes the arm at its next checkpoint.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use pipetlab::codec;
use pipetlab::config::PipettorConfig;
use pipetlab::deck::Deck;
use pipetlab::drivers::{MotorDriver, SimulatedDriver};
use pipetlab::labware::{GridContainer, Labware};
use pipetlab::logs::OperationJournal;
use pipetlab::pipettor::LiquidHandler;
use pipetlab::workflow::{ExecutionResult, Workflow, WorkflowExecutor};
use pipetlab::ContentHolder;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::signal;

// ============================================================================
// 1. CLI DEFINITION
// ============================================================================

#[derive(Parser)]
#[command(name = "pipetlab", version, about = "Liquid handling engine for robotic pipettors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct RunArgs {
    /// Deck JSON produced by the persistence codec.
    #[arg(long)]
    deck: PathBuf,

    /// Workflow YAML.
    #[arg(long)]
    workflow: PathBuf,

    /// Pipettor config YAML (defaults when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tip volume in µL (must have a tip length in the config).
    #[arg(long, default_value_t = 1000)]
    tip_volume: u32,

    /// Use the multichannel head.
    #[arg(long)]
    multichannel: bool,

    /// Swap tips before every transfer.
    #[arg(long)]
    change_tips: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the layout and contents of a deck file.
    Inspect {
        #[arg(long)]
        deck: PathBuf,
    },

    /// Validate a workflow without touching state.
    DryRun {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Execute a workflow against the simulator.
    Simulate {
        #[command(flatten)]
        run: RunArgs,

        /// Write the resulting deck here.
        #[arg(long)]
        save_deck: Option<PathBuf>,

        /// Write the operation journal here.
        #[arg(long)]
        journal: Option<PathBuf>,
    },
}

// ============================================================================
// 2. ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli.command {
        Commands::Inspect { deck } => inspect(&deck),
        Commands::DryRun { run } => run_workflow(run, true, None, None).await,
        Commands::Simulate {
            run,
            save_deck,
            journal,
        } => run_workflow(run, false, save_deck, journal).await,
    }
}

fn load_deck(path: &Path) -> Result<Deck> {
    let src = fs::read_to_string(path).with_context(|| format!("reading deck {}", path.display()))?;
    codec::decode_deck(&src).with_context(|| format!("decoding deck {}", path.display()))
}

// ============================================================================
// 3. INSPECT
// ============================================================================

fn inspect(path: &Path) -> Result<()> {
    let deck = load_deck(path)?;
    println!(
        "Deck '{}'  x {:.1}..{:.1}  y {:.1}..{:.1}  z {:.1}",
        deck.id,
        deck.range_x.lo(),
        deck.range_x.hi(),
        deck.range_y.lo(),
        deck.range_y.hi(),
        deck.range_z
    );
    for slot in deck.slots() {
        println!(
            "  slot '{}'  x {:.1}..{:.1}  y {:.1}..{:.1}",
            slot.id,
            slot.range_x.lo(),
            slot.range_x.hi(),
            slot.range_y.lo(),
            slot.range_y.hi()
        );
        for entry in slot.entries() {
            let lw = &entry.labware;
            println!(
                "    {:<24} {:<22} z {:.1}..{:.1}  {}",
                lw.id(),
                lw.class_name(),
                entry.min_z,
                entry.max_z,
                describe_contents(lw)
            );
        }
    }
    Ok(())
}

fn describe_contents(lw: &Labware) -> String {
    match lw {
        Labware::Plate(p) => {
            format!("{}x{} wells, {:.1}µL total", p.columns, p.rows, p.total_volume())
        }
        Labware::ReservoirHolder(h) => h
            .reservoirs
            .iter()
            .map(|r| format!("[{:?} {}]", r.hook_ids, r.content_summary()))
            .collect::<Vec<_>>()
            .join(" "),
        Labware::PipetteHolder(h) => format!(
            "{}/{} tips",
            h.occupied_positions().len(),
            h.grid_columns() * h.grid_rows()
        ),
        Labware::Well(w) => w.content_summary(),
        Labware::Reservoir(r) => r.content_summary(),
        _ => String::new(),
    }
}

// ============================================================================
// 4. RUNTIME: WORKFLOW EXECUTION
// ============================================================================

async fn run_workflow(
    run: RunArgs,
    dry: bool,
    save_deck: Option<PathBuf>,
    journal_path: Option<PathBuf>,
) -> Result<()> {
    let deck = load_deck(&run.deck)?;
    let workflow = Workflow::from_yaml_file(&run.workflow)
        .with_context(|| format!("loading workflow {}", run.workflow.display()))?;
    let config = match &run.config {
        Some(p) => PipettorConfig::from_yaml_file(p)
            .with_context(|| format!("loading config {}", p.display()))?,
        None => PipettorConfig::default(),
    };

    let driver = SimulatedDriver::new(f64::from(run.tip_volume));
    let mut handler = LiquidHandler::new(deck, driver, &config, run.tip_volume, run.multichannel)?;
    handler.change_tips = run.change_tips;

    // Operator interrupt -> abort at the next checkpoint.
    let control = handler.control();
    tokio::spawn(async move {
        signal::ctrl_c().await.ok();
        log::warn!("🛑 Interrupt received. Requesting abort...");
        control.request_abort();
    });

    let journal = OperationJournal::default();
    let executor = WorkflowExecutor::new(journal.clone());

    type Finished = (ExecutionResult, LiquidHandler<SimulatedDriver>);
    let (result, handler) = tokio::task::spawn_blocking(move || -> Result<Finished> {
        let result = if dry {
            executor.dry_run(&mut handler, &workflow)?
        } else {
            executor.execute(&mut handler, &workflow)
        };
        Ok((result, handler))
    })
    .await
    .context("engine task panicked")??;

    if !dry {
        for cmd in handler.driver().commands() {
            println!("{}", serde_json::to_string(cmd)?);
        }
        let head = handler.driver().position();
        log::info!("head parked at ({:.2}, {:.2}, {:.2})", head.x, head.y, head.z);
    }
    println!(
        "{:?}: {}/{} operation(s) completed",
        result.status, result.operations_completed, result.total_operations
    );

    if let Some(path) = journal_path {
        fs::write(&path, journal.lines().join("\n"))
            .with_context(|| format!("writing journal {}", path.display()))?;
    }
    if let Some(path) = save_deck {
        let encoded = codec::encode_deck(handler.deck())?;
        fs::write(&path, encoded).with_context(|| format!("writing deck {}", path.display()))?;
        log::info!("deck saved to {}", path.display());
    }

    match (result.failed_operation_index, result.error_message) {
        (Some(i), Some(msg)) => Err(anyhow!("operation #{i} failed: {msg}")),
        (None, Some(msg)) => Err(anyhow!("workflow rejected: {msg}")),
        _ => Ok(()),
    }
}
