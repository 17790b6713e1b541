//! stagepilot - Main entry point
//!
//! Thin command-line front end over the staged-workflow engine.

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use stagepilot::cli::{resolve_workflow, Cli, Commands};
use stagepilot::{
    ActionDispatcher, BuiltinWorkflow, CalibrationOptions, CaptureEvent, CaptureSource,
    DryRunDispatcher, FileStore, ThreadSleeper, Workflow, WorkflowDefinition,
};

/// Initialize the logger with appropriate settings
fn init_logger(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    // Allows RUST_LOG env var to override
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main application entry point
fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    info!("stagepilot starting up");

    // An interrupt aborts the whole program; every mutation is already flushed
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!("\nInterrupted; keeping the last saved configuration");
        std::process::exit(130);
    }) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }
    debug!("Signal handler initialized");

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::List => {
            for workflow in BuiltinWorkflow::all() {
                println!("{:<16} {}", workflow.to_string(), workflow.description());
            }
            Ok(())
        }
        Commands::Init {
            workflow,
            default_delay,
            force,
        } => {
            let definition = resolve_workflow(workflow)?;
            let store = cli.store_for(&definition);
            if store.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    store.config_path().display()
                );
            }
            let path = store.config_path().to_path_buf();
            Workflow::initialize(definition, store, *default_delay)?;
            println!("✓ Configuration written to {}", path.display());
            Ok(())
        }
        Commands::Status { workflow, json } => {
            let workflow = open(cli, workflow)?;
            print_status(&workflow, *json)
        }
        Commands::Reset { workflow } => {
            let mut workflow = open(cli, workflow)?;
            workflow.reset().context("Failed to reset positions")?;
            println!("✓ All positions reset; previous positions logged");
            Ok(())
        }
        Commands::Capture {
            workflow,
            name,
            x,
            y,
            keyboard,
        } => {
            let mut workflow = open(cli, workflow)?;
            let (x, y) = match (x, y) {
                (Some(x), Some(y)) => (*x, *y),
                _ => match live_capture_source(*keyboard)?.wait_for_capture(name, None)? {
                    Some(CaptureEvent::Captured { x, y }) => (x, y),
                    _ => bail!("No position captured for '{}'", name),
                },
            };
            workflow
                .capture(name, x, y)
                .with_context(|| format!("Failed to capture '{}'", name))?;
            println!("✓ Position '{}' captured: ({}, {})", name, x, y);
            Ok(())
        }
        Commands::Calibrate {
            workflow,
            all,
            timeout,
            keyboard,
        } => {
            let mut workflow = open(cli, workflow)?;
            let timeout = timeout
                .map(Duration::try_from_secs_f64)
                .transpose()
                .context("--timeout must be a non-negative number of seconds")?;
            let options = CalibrationOptions {
                recalibrate_all: *all,
                timeout,
            };
            let mut source = live_capture_source(*keyboard)?;
            let report = workflow.calibrate(source.as_mut(), options)?;

            for name in &report.captured {
                println!("✓ {}", name);
            }
            for name in &report.skipped {
                println!("- {} (skipped)", name);
            }
            if report.cancelled {
                println!("Calibration cancelled; captured positions were saved");
            }
            if workflow.is_fully_configured() {
                println!("✓ All positions are set");
            } else {
                println!("Still unset: {}", workflow.status().unset.join(", "));
            }
            Ok(())
        }
        Commands::Run { workflow } => {
            let workflow = open(cli, workflow)?;
            let mut dispatcher = dispatcher(cli.dry_run)?;
            println!("🚀 Starting workflow '{}'...", workflow.definition().name);
            match workflow.execute(dispatcher.as_mut(), &mut ThreadSleeper) {
                Ok(report) => {
                    println!(
                        "✓ Workflow completed successfully ({} stage(s))",
                        report.completed_stages.len()
                    );
                    Ok(())
                }
                Err(failure) => {
                    if failure.is_precondition() {
                        eprintln!("Run `stagepilot calibrate` to set the missing positions");
                    }
                    Err(failure.into())
                }
            }
        }
    }
}

fn open(cli: &Cli, workflow: &str) -> Result<Workflow<FileStore>> {
    let definition: WorkflowDefinition = resolve_workflow(workflow)?;
    let store = cli.store_for(&definition);
    info!("Loading configuration from {}", store.config_path().display());
    Workflow::open(definition, store).with_context(|| {
        format!(
            "Could not load workflow '{}' (run `stagepilot init {}` first?)",
            workflow, workflow
        )
    })
}

fn print_status(workflow: &Workflow<FileStore>, json: bool) -> Result<()> {
    let status = workflow.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!(
        "Workflow: {} (default delay {}s)",
        status.workflow, status.default_delay
    );
    println!("Positions:");
    for position in &status.positions {
        println!("  {:<20} {}", position.name, position.coordinates);
    }
    println!("Stages:");
    for stage in &status.stages {
        let marker = if stage.ready { "✓" } else { "✗" };
        println!("  {} {}", marker, stage.name);
    }
    if status.fully_configured {
        println!("✓ Fully configured");
    } else {
        println!("✗ Unset: {}", status.unset.join(", "));
    }
    Ok(())
}

fn dispatcher(dry_run: bool) -> Result<Box<dyn ActionDispatcher>> {
    if dry_run {
        info!("Dry-run mode: UI actions are logged, not injected");
        return Ok(Box::new(DryRunDispatcher::new()));
    }
    live_dispatcher()
}

#[cfg(feature = "desktop")]
fn live_dispatcher() -> Result<Box<dyn ActionDispatcher>> {
    Ok(Box::new(stagepilot::EnigoBackend::new()?))
}

#[cfg(not(feature = "desktop"))]
fn live_dispatcher() -> Result<Box<dyn ActionDispatcher>> {
    bail!("Built without the `desktop` feature; use --dry-run or rebuild with --features desktop")
}

#[cfg(feature = "desktop")]
fn live_capture_source(keyboard: bool) -> Result<Box<dyn CaptureSource>> {
    if keyboard {
        let locator = stagepilot::EnigoBackend::new()?;
        return Ok(Box::new(stagepilot::TerminalCaptureSource::new(locator)));
    }
    Ok(Box::new(stagepilot::ClickCaptureSource::new(
        stagepilot::GlobalPointer::new(),
    )))
}

#[cfg(not(feature = "desktop"))]
fn live_capture_source(_keyboard: bool) -> Result<Box<dyn CaptureSource>> {
    bail!("Live capture needs the `desktop` feature; pass --x and --y instead")
}
