//! # Fleet Rotor CLI
//!
//! Runs the batch scheduler over a worker file, previews the batch plan,
//! validates inputs, or stops every environment of the fleet.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use fleet_rotor::config::{ConfigLoader, RotorConfig};
use fleet_rotor::events::ConsoleReporter;
use fleet_rotor::execution::{DockerDriver, ExecutionDriver, SimulatedDriver};
use fleet_rotor::logging;
use fleet_rotor::models::WorkerStore;
use fleet_rotor::orchestration::{listen_for_shutdown, partition, total_batches, BatchScheduler};
use fleet_rotor::{ConfigurationError, FleetError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "fleet-rotor")]
#[command(about = "Rotate a fleet of proxied workers through fixed-size batches")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "FLEET_ROTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the scheduler until the last batch (or forever with --infinite)
    Run(FleetArgs),
    /// Stop every environment of the fleet
    Cleanup(FleetArgs),
    /// Print the batch partition without starting anything
    Plan(FleetArgs),
    /// Validate the worker file and configuration
    Validate(FleetArgs),
}

#[derive(Debug, Args)]
struct FleetArgs {
    /// Worker file: `identity|egress_uri[|concurrency_limit]` lines, or a .json array
    #[arg(short, long, env = "FLEET_ROTOR_WORKERS")]
    workers: PathBuf,

    /// Workers per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Dwell time per batch in seconds
    #[arg(short = 't', long)]
    batch_timeout: Option<u64>,

    /// Restart from the first batch after the last one
    #[arg(long)]
    infinite: bool,

    /// Worker image passed to the container runtime
    #[arg(long)]
    image: Option<String>,

    /// Use the in-memory driver instead of the container runtime
    #[arg(long)]
    dry_run: bool,
}

impl Commands {
    fn fleet_args(&self) -> &FleetArgs {
        match self {
            Self::Run(args) | Self::Cleanup(args) | Self::Plan(args) | Self::Validate(args) => args,
        }
    }
}

impl FleetArgs {
    fn apply(&self, config: &mut RotorConfig) {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(timeout) = self.batch_timeout {
            config.batch_timeout_seconds = timeout;
        }
        if self.infinite {
            config.infinite_mode = true;
        }
        if let Some(image) = &self.image {
            config.driver.image = image.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "fleet-rotor failed");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    let code = if let Some(fleet_error) = error.downcast_ref::<FleetError>() {
        fleet_error.exit_code()
    } else if error.downcast_ref::<ConfigurationError>().is_some() {
        2
    } else {
        1
    };
    u8::try_from(code).unwrap_or(1)
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let args = cli.command.fleet_args();
    let config = load_config(cli.config.as_ref(), args)?;
    let store = WorkerStore::load(&args.workers)
        .with_context(|| format!("loading workers from {}", args.workers.display()))?;

    match &cli.command {
        Commands::Plan(_) => {
            print_plan(&config, &store);
            Ok(())
        }
        Commands::Validate(_) => {
            println!(
                "{} workers valid; batch size {}, {} batches per cycle",
                store.len(),
                config.batch_size,
                total_batches(store.len(), config.batch_size)
            );
            Ok(())
        }
        Commands::Cleanup(_) => {
            let driver = driver(&config, args.dry_run);
            cleanup(config, store, driver).await
        }
        Commands::Run(_) => {
            let driver = driver(&config, args.dry_run);
            run(config, store, driver).await
        }
    }
}

fn load_config(path: Option<&PathBuf>, args: &FleetArgs) -> Result<RotorConfig, ConfigurationError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    let mut config = loader.load()?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn driver(config: &RotorConfig, dry_run: bool) -> Arc<dyn ExecutionDriver> {
    if dry_run {
        info!("Dry run: using the in-memory driver");
        Arc::new(SimulatedDriver::new())
    } else {
        Arc::new(DockerDriver::new(config.driver.clone(), config.remove_on_stop))
    }
}

fn print_plan(config: &RotorConfig, store: &WorkerStore) {
    let batches = partition(store.records(), config.batch_size);
    println!(
        "{} workers, batch size {}, {} batches, dwell {}s{}",
        store.len(),
        config.batch_size,
        batches.len(),
        config.batch_timeout_seconds,
        if config.infinite_mode { ", cycling" } else { "" }
    );
    for batch in &batches {
        let ids: Vec<String> = batch.worker_ids().iter().map(ToString::to_string).collect();
        println!("  batch {}: {}", batch.index + 1, ids.join(", "));
    }
}

async fn run(
    config: RotorConfig,
    store: WorkerStore,
    driver: Arc<dyn ExecutionDriver>,
) -> anyhow::Result<()> {
    let mut scheduler = BatchScheduler::new(config, store, driver)?;
    let reporter = ConsoleReporter::spawn(scheduler.publisher().subscribe());
    let token = scheduler.shutdown_token();
    let listener = tokio::spawn(listen_for_shutdown(token.clone()));

    let result = scheduler.run().await;

    listener.abort();
    drop(scheduler);
    // Detached output fetches may still hold the publisher briefly
    let _ = tokio::time::timeout(Duration::from_secs(5), reporter).await;

    let summary = result?;
    info!(
        run_id = %summary.run_id,
        cycles = summary.cycles_completed,
        batches = summary.batches_processed,
        workers = summary.workers_processed,
        started = summary.workers_started,
        failed = summary.workers_failed,
        "Run finished"
    );
    Ok(())
}

async fn cleanup(
    config: RotorConfig,
    store: WorkerStore,
    driver: Arc<dyn ExecutionDriver>,
) -> anyhow::Result<()> {
    driver.ping().await.map_err(FleetError::from)?;
    let scheduler = BatchScheduler::new(config, store, driver)?;
    let report = scheduler.cleanup_fleet().await;

    println!(
        "stopped {}, already stopped {}, failed {}",
        report.stopped, report.already_stopped, report.failed
    );
    if !report.is_clean() {
        anyhow::bail!("{} workers could not be stopped", report.failed);
    }
    Ok(())
}
