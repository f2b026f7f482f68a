//! vsphere-problem-detector CLI.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use check_engine::{CancellationToken, ClusterState, Collaborators};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use problem_detector::checks::{self, BUILTIN_CHECKS};
use problem_detector::cluster_state::{KubeClusterState, StaticClusterState};
use problem_detector::inventory::StaticInventory;
use problem_detector::logging::{self, LogFormat};
use problem_detector::render::{self, OutputFormat};
use problem_detector::{detect, exit_code, DetectorConfig, EXIT_FATAL};

/// Diagnose vSphere configuration problems of a Kubernetes cluster.
#[derive(Parser)]
#[command(name = "vsphere-problem-detector")]
#[command(about = "Run vSphere configuration checks against a cluster")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "VPD_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every enabled check once and print the report
    Run {
        /// Detector configuration file
        #[arg(long, env = "VPD_CONFIG")]
        config: PathBuf,

        /// Inventory snapshot to diagnose
        #[arg(long, env = "VPD_INVENTORY")]
        inventory: PathBuf,

        /// Cluster state snapshot (nodes, storage classes, PVs, infrastructure)
        #[arg(long, conflicts_with = "kube")]
        cluster_state: Option<PathBuf>,

        /// Read cluster state from the Kubernetes API
        #[arg(long)]
        kube: bool,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Per-check timeout in seconds, overriding the config file
        #[arg(long, env = "VPD_CHECK_TIMEOUT")]
        timeout: Option<u64>,

        /// Maximum number of checks running at once, overriding the config file
        #[arg(long, env = "VPD_WORKERS")]
        workers: Option<usize>,
    },

    /// List the checks a run would execute
    ListChecks {
        /// Apply the disabled list and timeout overrides of this config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    let result = match cli.command {
        Commands::Run {
            config,
            inventory,
            cluster_state,
            kube,
            output,
            timeout,
            workers,
        } => {
            run(RunArgs {
                config,
                inventory,
                cluster_state,
                kube,
                output,
                timeout,
                workers,
            })
            .await
        }
        Commands::ListChecks { config } => list_checks(config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %format!("{err:#}"), "Detector failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

struct RunArgs {
    config: PathBuf,
    inventory: PathBuf,
    cluster_state: Option<PathBuf>,
    kube: bool,
    output: OutputFormat,
    timeout: Option<u64>,
    workers: Option<usize>,
}

async fn run(args: RunArgs) -> Result<u8> {
    let mut config = DetectorConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    config.apply_overrides(args.timeout, args.workers);
    config.validate().context("Invalid command-line overrides")?;

    let inventory = Arc::new(
        StaticInventory::load(&args.inventory)
            .with_context(|| format!("Failed to load inventory {}", args.inventory.display()))?,
    );
    let cluster: Arc<dyn ClusterState> = if args.kube {
        Arc::new(
            KubeClusterState::try_default()
                .await
                .context("Failed to create Kubernetes client")?,
        )
    } else if let Some(path) = &args.cluster_state {
        Arc::new(
            StaticClusterState::load(path)
                .with_context(|| format!("Failed to load cluster state {}", path.display()))?,
        )
    } else {
        warn!("No cluster state given, cluster checks will see an empty cluster");
        Arc::new(StaticClusterState::default())
    };
    let collaborators = Collaborators::new(
        inventory.clone(),
        inventory,
        cluster,
        config.username.clone(),
    );

    let cancellation = CancellationToken::new();
    let interrupt = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, cancelling run");
                cancellation.cancel();
            }
        })
    };

    let report = detect(&config, collaborators, cancellation).await;
    interrupt.abort();
    let report = report.context("Check run failed")?;

    let rendered = render::render(&report, args.output).context("Failed to render report")?;
    println!("{rendered}");
    Ok(exit_code(report.summarize()))
}

fn list_checks(config: Option<PathBuf>) -> Result<u8> {
    match config {
        Some(path) => {
            let config = DetectorConfig::load(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            let default_timeout = config.checks.timeout_secs;
            let registry = checks::default_registry(&config)?;
            for (name, entry) in registry.iter() {
                let timeout = entry.timeout().map_or(default_timeout, |t| t.as_secs());
                println!("{name} (timeout {timeout}s)");
            }
        }
        None => {
            let mut names = BUILTIN_CHECKS.to_vec();
            names.sort_unstable();
            for name in names {
                println!("{name}");
            }
        }
    }
    Ok(0)
}
