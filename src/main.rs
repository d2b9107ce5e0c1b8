//! sweep - Selection and bulk-operation orchestration.
//!
//! Usage:
//!   sweep modes                       List operating modes and their phrases
//!   sweep simulate --confirm DELETE   Run a bulk operation against the simulator
//!   sweep --help                      Show help

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

use sweep_core::{
    BridgeConfig, DEFAULT_POLL_INTERVAL_MS, MessagePurgeOptions, Mode, OperationStatus, Processor,
    TimeRange,
};
use sweep_ops::{
    EventBridge, OperationController, OperationSnapshot, SelectionCoordinator, ToggleOutcome,
};
use sweep_sim::{Catalog, SimConfig, SimulatedProcessor};

#[derive(Parser)]
#[command(
    name = "sweep",
    version,
    about = "Select containers and items, then run a confirmed bulk operation",
    long_about = "sweep drives the selection and operation control engine against an \
                  in-memory catalog and a simulated processor.\n\n\
                  Every run must be confirmed with the phrase of its mode; \
                  see `sweep modes`."
)]
struct Cli {
    /// Log engine activity to stderr
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List operating modes and their confirmation phrases
    Modes {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Select from a generated catalog and run an operation on the simulator
    Simulate(SimulateArgs),
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// Operating mode
    #[arg(short, long, default_value = "messages")]
    mode: Mode,

    /// Confirmation phrase for the mode
    #[arg(short, long)]
    confirm: String,

    /// Number of containers in the catalog
    #[arg(long, default_value = "2")]
    containers: usize,

    /// Children per container
    #[arg(long, default_value = "3")]
    children: usize,

    /// Make fetching this container fail (1-based, repeatable)
    #[arg(long, value_name = "N")]
    fail_fetch: Vec<usize>,

    /// Request a pause once this many targets are processed, then resume
    #[arg(long, value_name = "N")]
    pause_after: Option<u64>,

    /// Abort once this many targets are processed
    #[arg(long, value_name = "N")]
    abort_after: Option<u64>,

    /// Simulated time per target in milliseconds
    #[arg(long, default_value = "250")]
    step_ms: u64,

    /// Status poll interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_ms: u64,

    /// Fail the run at this target (1-based)
    #[arg(long, value_name = "N")]
    fail_at: Option<u64>,

    /// Drop the completion event so only the status poll can end the run
    #[arg(long)]
    drop_complete: bool,

    /// Message time window: 24h, 7d or all
    #[arg(long, default_value = "all")]
    time_range: TimeRange,

    /// Only match messages containing this text
    #[arg(long)]
    search: Option<String>,

    /// Count matches without removing anything
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Modes { format } => run_modes(format)?,
        Command::Simulate(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            let result = rt.block_on(run_simulate(args));
            rt.shutdown_timeout(Duration::from_millis(100));
            result?;
        }
    }

    Ok(())
}

/// Print every mode with its phrase.
fn run_modes(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!();
            println!(" {:<10} {:<8} {}", "Mode", "Phrase", "Counts");
            println!("{}", "─".repeat(40));
            for mode in Mode::all() {
                let spec = mode.spec();
                println!(" {:<10} {:<8} {}", mode, spec.phrase, spec.affected_label);
            }
            println!();
        }
        OutputFormat::Json => {
            let modes: Vec<_> = Mode::all()
                .map(|mode| {
                    serde_json::json!({
                        "mode": mode,
                        "phrase": mode.required_phrase(),
                        "action": mode.spec().action,
                        "affected_label": mode.spec().affected_label,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&modes)?);
        }
    }
    Ok(())
}

/// Select, confirm and run one operation against the simulator.
async fn run_simulate(args: SimulateArgs) -> Result<()> {
    let text = args.format == OutputFormat::Text;

    let catalog = Catalog::demo(args.containers, args.children);
    let ids = catalog.container_ids();
    for n in &args.fail_fetch {
        let id = n
            .checked_sub(1)
            .and_then(|i| ids.get(i))
            .ok_or_else(|| eyre!("No container {n} to fail"))?;
        catalog.fail_fetch(id, "Missing Access");
    }

    let selection = SelectionCoordinator::new(catalog);
    let parameters = match args.mode {
        Mode::Messages => {
            for id in &ids {
                match selection.toggle_container(id).await {
                    Ok(ToggleOutcome::Selected { children }) if text => {
                        let name = selection
                            .source()
                            .container(id)
                            .map_or(id.as_str(), |c| c.name.as_str());
                        eprintln!(" + {name} ({children} items)");
                    }
                    Ok(_) => {}
                    Err(err) if text => eprintln!(" ! {err}"),
                    Err(_) => {}
                }
            }
            selection.select_all_children();
            let mut options = MessagePurgeOptions::default()
                .with_time_range(args.time_range)
                .with_simulation(args.dry_run);
            if let Some(query) = &args.search {
                options = options.with_search_query(query.as_str());
            }
            selection.message_parameters(options)
        }
        Mode::Servers => {
            selection.select_all_leave(&ids);
            selection.server_parameters()
        }
        Mode::Identity => {
            selection.select_all_relationships(selection.source().relationships());
            selection.identity_parameters()
        }
    };

    let mut sim = SimConfig::default().with_step(Duration::from_millis(args.step_ms));
    if let Some(target) = args.fail_at {
        sim = sim.with_fail_at(target);
    }
    if args.drop_complete {
        sim = sim.without_complete();
    }

    let bridge_config = BridgeConfig::builder()
        .poll_interval_ms(args.poll_ms)
        .build()
        .map_err(|err| eyre!("{err}"))?;

    let ops = Arc::new(OperationController::new(Arc::new(SimulatedProcessor::new(sim))));
    let bridge = EventBridge::mount(Arc::clone(&ops), bridge_config);

    ops.start(parameters, &args.confirm)
        .await
        .context("Operation not started")?;

    let controls = Controls {
        pause_after: args.pause_after,
        abort_after: args.abort_after,
        print: text,
    };
    follow(&ops, &controls).await?;

    let last = ops.acknowledge()?;
    bridge.unmount().await;
    report(&args, &selection, &last)?;

    if last.status == OperationStatus::Failed {
        bail!(last.summary());
    }
    Ok(())
}

/// When to interject while following a run.
struct Controls {
    pause_after: Option<u64>,
    abort_after: Option<u64>,
    print: bool,
}

/// Follow a started operation until it is terminal, pausing, resuming or
/// aborting per `controls`.
///
/// A control request refused because the run already ended is logged and
/// the run is followed to its terminal status.
async fn follow<P: Processor>(ops: &OperationController<P>, controls: &Controls) -> Result<()> {
    let mut changes = ops.watch();
    let mut pause_sent = false;
    let mut resume_sent = false;
    let mut last_line = String::new();

    loop {
        let snapshot = changes.borrow_and_update().clone();

        if controls.print {
            let line = snapshot.summary();
            if line != last_line {
                eprintln!(" {line}");
                last_line = line;
            }
        }
        if snapshot.status.is_terminal() {
            break;
        }

        let processed = snapshot.progress.as_ref().map_or(0, |p| p.processed);
        match snapshot.status {
            OperationStatus::Running
                if controls.abort_after.is_some_and(|n| processed >= n) =>
            {
                if let Err(err) = ops.abort().await {
                    warn!(error = %err, "Abort not applied");
                }
                continue;
            }
            OperationStatus::Running
                if !pause_sent && controls.pause_after.is_some_and(|n| processed >= n) =>
            {
                pause_sent = true;
                if let Err(err) = ops.pause().await {
                    warn!(error = %err, "Pause not applied");
                }
            }
            OperationStatus::Paused if !resume_sent => {
                resume_sent = true;
                if let Err(err) = ops.resume().await {
                    warn!(error = %err, "Resume not applied");
                }
            }
            _ => {}
        }

        changes
            .changed()
            .await
            .context("Operation controller dropped")?;
    }

    Ok(())
}

/// Print the final outcome.
fn report(
    args: &SimulateArgs,
    selection: &SelectionCoordinator<Catalog>,
    last: &OperationSnapshot,
) -> Result<()> {
    match args.format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {} {}", last.mode.unwrap_or(args.mode), last.summary());
            println!(" {:.1}% of {} targets", last.percentage(), last.target_count);
            println!("{}", "─".repeat(60));
        }
        OutputFormat::Json => {
            let out = serde_json::json!({
                "selection": selection.snapshot(),
                "operation": last,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::{ItemId, ModeParameters, PushEvent, Stamped};
    use sweep_ops::Signal;

    #[tokio::test(start_paused = true)]
    async fn test_follow_survives_pause_after_processor_finished() {
        let sim = SimConfig::default().with_step(Duration::from_millis(10));
        let ops = Arc::new(OperationController::new(Arc::new(SimulatedProcessor::new(sim))));
        let parameters = ModeParameters::messages(
            [ItemId::new("ch-1")],
            MessagePurgeOptions::default(),
        );
        let generation = ops.start(parameters, "DELETE").await.unwrap();

        // The processor is done, but nothing has told the controller yet.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!ops.processor().is_running());
        assert_eq!(ops.status(), OperationStatus::Running);

        let controls = Controls {
            pause_after: Some(0),
            abort_after: None,
            print: false,
        };
        let follower = tokio::spawn({
            let ops = Arc::clone(&ops);
            async move { follow(&ops, &controls).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ops.snapshot().pause_requested);

        let done = Stamped::new(generation, Signal::Push(PushEvent::Complete));
        ops.apply(done, &sweep_ops::Reconciler::default());

        let result = tokio::time::timeout(Duration::from_secs(5), follower)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(ops.status(), OperationStatus::Completed);
    }
}
