//! hostwatch Binary Entry Point
//!
//! Runs the agent in the foreground, or registers it as a background service.
//! Core functionality is provided by the `hostwatch` library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hostwatch::{
    collector::Domain,
    collector::battery::BatterySource,
    collector::disk::DiskSource,
    collector::inventory::InventorySource,
    collector::memory::MemorySource,
    collector::processor::ProcessorSource,
    config::{AppConfig, DEFAULT_CONFIG_PATH, Overrides, parse_duration},
    eventlog::{EventLogScanner, PowerShellEventLog, ScanBackoff},
    scheduler::{EventLogJob, InventoryJob, MetricSampler, Scheduler},
    service::{InstallOptions, ServiceManager},
    sink::{Dispatcher, InfluxSink, PayloadAssembler},
    storage::{CheckpointStore, open_checkpoint_store},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// hostwatch - Host Telemetry Agent
#[derive(Parser, Debug)]
#[command(name = "hostwatch", version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent in the foreground (default)
    Run(RunArgs),
    /// Register and start the agent as a background service
    Install(RunArgs),
    /// Stop and remove the background service
    Uninstall,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "HOSTWATCH_CONFIG")]
    config: PathBuf,

    /// Enabled collectors, comma separated (overrides config file)
    #[arg(long, value_delimiter = ',')]
    collectors: Option<Vec<String>>,

    /// Sampling interval, e.g. `3s` (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Samples per aggregation window (overrides config file)
    #[arg(long)]
    aggregation_count: Option<usize>,

    /// Checkpoint database path (overrides config file)
    #[arg(long, env = "HOSTWATCH_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Sink API token (overrides config file)
    #[arg(long, env = "HOSTWATCH_SINK_TOKEN", hide_env_values = true)]
    sink_token: Option<String>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            collectors: self.collectors.clone(),
            interval: self.interval,
            aggregation_count: self.aggregation_count,
            db_path: self.db_path.clone(),
            sink_token: self.sink_token.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hostwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        None => run(cli.run).await,
        Some(Commands::Run(args)) => run(args).await,
        Some(Commands::Install(args)) => install(args),
        Some(Commands::Uninstall) => uninstall(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "hostwatch failed");
            ExitCode::FAILURE
        }
    }
}

/// Run the agent until Ctrl+C or SIGTERM.
async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("hostwatch - Host Telemetry Agent");

    // Load configuration (CLI > ENV > config file > defaults)
    let config = AppConfig::load_or_default(&args.config).finalize(args.overrides())?;
    tracing::info!(
        collectors = ?config.sampling.domains(),
        interval = ?config.sampling.interval,
        aggregation_count = config.sampling.aggregation_count,
        sink = %config.sink.url,
        "Configuration ready"
    );

    let host = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
    let assembler = PayloadAssembler::new(host, config.host_tags.clone());
    let dispatcher = Dispatcher::new(Arc::new(InfluxSink::new(&config.sink)?));
    let mut scheduler = Scheduler::new(dispatcher.clone());

    // Metric sampling
    let mut sampler = MetricSampler::new(
        config.sampling.interval,
        config.sampling.aggregation_count,
        assembler.clone(),
        dispatcher.clone(),
    );
    for domain in config.sampling.domains() {
        sampler = match domain {
            Domain::Battery => sampler.with_source(BatterySource::new()),
            Domain::Memory => sampler.with_source(MemorySource::new()),
            Domain::Processor => sampler.with_source(ProcessorSource::new()),
            Domain::Disk => sampler.with_source(match &config.sampling.disk_mount {
                Some(mount) => DiskSource::new(mount),
                None => DiskSource::system_volume(),
            }),
            Domain::Inventory => sampler,
        };
    }
    if sampler.lane_count() > 0 {
        scheduler.spawn(sampler, false);
    } else {
        tracing::warn!("No collectors enabled, metric sampling disabled");
    }

    // Inventory
    scheduler.spawn(
        InventoryJob::new(
            InventorySource::new(),
            config.inventory.interval,
            assembler.clone(),
            dispatcher.clone(),
        ),
        true,
    );

    // Event log
    let store = start_event_log(&config, &mut scheduler, &assembler, &dispatcher).await;

    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    tracing::info!("Shutting down triggers...");
    let report = scheduler.shutdown().await;
    if !report.triggers_stopped || !report.sink_drained {
        tracing::warn!(?report, "Shutdown incomplete");
    }

    if let Some(store) = store {
        store.close().await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Spawn the event-log trigger where the platform has an event log.
async fn start_event_log(
    config: &AppConfig,
    scheduler: &mut Scheduler,
    assembler: &PayloadAssembler,
    dispatcher: &Dispatcher,
) -> Option<Arc<dyn CheckpointStore>> {
    if !config.event_log.enabled {
        tracing::info!("Event log scanning disabled");
        return None;
    }
    if !cfg!(windows) {
        tracing::info!("Event log scanning is only available on Windows");
        return None;
    }

    let kinds = config.event_log.kinds();
    if kinds.is_empty() {
        tracing::warn!("No event kinds configured, event log scanning disabled");
        return None;
    }

    let store = open_checkpoint_store(&config.database.path).await;
    let scanner = EventLogScanner::new(
        Arc::new(PowerShellEventLog::new()),
        Arc::clone(&store),
        kinds,
    )
    .with_lookback(config.event_log.lookback);
    let backoff = ScanBackoff::new(
        config.event_log.interval,
        config.event_log.slow_scan_threshold,
        config.event_log.max_interval,
        config.event_log.decay,
    );

    scheduler.spawn(
        EventLogJob::new(scanner, backoff, assembler.clone(), dispatcher.clone()),
        true,
    );
    Some(store)
}

/// Register the agent with the OS service manager.
fn install(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = std::path::absolute(&args.config)?;
    if !config.exists() {
        tracing::warn!(path = %config.display(), "Config file does not exist yet");
    }

    let options = InstallOptions {
        exe: std::env::current_exe()?,
        config,
        collectors: args.collectors,
        interval: args.interval,
        aggregation_count: args.aggregation_count,
    };
    tracing::info!(command = %options.command_line(), "Installing service");
    ServiceManager::native()?.install(&options)?;
    Ok(())
}

/// Remove the agent from the OS service manager.
fn uninstall() -> Result<(), Box<dyn std::error::Error>> {
    ServiceManager::native()?.uninstall()?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
