use anyhow::{Context, Result};
use bqsweep::config::{self, Config};
use bqsweep::gcp::{auth, BqClient};
use bqsweep::ops;
use bqsweep::ops::export::{ExportMode, ExportOptions};
use bqsweep::ops::inventory::InventoryOptions;
use bqsweep::ops::loadgen::LoadgenOptions;
use bqsweep::ops::slots::SlotOptions;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::Level;

/// BigQuery estate sweep tool
#[derive(Parser, Debug)]
#[command(name = "bqsweep", version, about, long_about = None)]
struct Args {
    /// GCP project to use (defaults to the gcloud configuration)
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Log verbosity; RUST_LOG overrides this when set
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Write logs to this file instead of the console
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export dataset metadata, storage usage, and query history for one project
    Export {
        /// Directory the report tree is written under
        #[arg(long, default_value = "bq_export_results")]
        output_dir: PathBuf,

        /// Which export steps to run
        #[arg(long, value_enum, default_value = "all")]
        mode: ExportMode,

        /// Days of query history to export
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Drop this user's jobs from the query report
        #[arg(long)]
        exclude_user: Option<String>,
    },

    /// Copy recent job history from every reachable project into a central table
    Inventory {
        /// Parent scope to search, e.g. organizations/12345 or folders/67890
        #[arg(long)]
        parent: Option<String>,

        /// Destination table as project.dataset.table
        #[arg(long)]
        dest_table: Option<String>,

        /// Days of history to sync per run
        #[arg(long)]
        lookback: Option<u32>,

        /// Parallel project syncs
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Report hourly slot consumption for every project under a parent scope
    Slots {
        /// Parent scope to search, e.g. organizations/12345 or folders/67890
        #[arg(long)]
        parent: Option<String>,

        /// Regional qualifiers to analyze
        #[arg(
            long = "region",
            default_values_t = [String::from("region-us"), String::from("region-eu")]
        )]
        regions: Vec<String>,

        /// Days of job history to analyze
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// Output CSV path
        #[arg(long, default_value = "slot_usage_report.csv")]
        output: PathBuf,

        /// Parallel project analyses
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Submit repeated heavy queries to generate measurable slot load
    Loadgen {
        /// How many times to run the heavy query
        #[arg(long, default_value_t = 5)]
        iterations: u32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_level.as_str()));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }

            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file);

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .init();

            tracing::info!(path = %path.display(), "logging to file");
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level, args.log_file.as_deref())?;

    let config = Config::load()?;

    match args.command {
        Command::Export {
            output_dir,
            mode,
            days,
            exclude_user,
        } => {
            let client = connect(args.project.as_deref()).await?;
            let opts = ExportOptions {
                output_dir,
                mode,
                days,
                exclude_user,
            };
            ops::export::run(&client, &opts).await
        }

        Command::Inventory {
            parent,
            dest_table,
            lookback,
            concurrency,
        } => {
            let opts = inventory_options(&config, parent, dest_table, lookback, concurrency)?;
            let client = connect(args.project.as_deref()).await?;
            ops::inventory::run(&client, &opts).await?;
            Ok(())
        }

        Command::Slots {
            parent,
            regions,
            days,
            output,
            concurrency,
        } => {
            let parent = require_parent(parent, &config)?;
            let concurrency = config::resolve_or(
                concurrency,
                config::env_parse(config::ENV_CONCURRENCY),
                config::DEFAULT_CONCURRENCY,
            );
            let client = connect(args.project.as_deref()).await?;
            let opts = SlotOptions {
                parent,
                regions,
                lookback_days: days,
                output,
                concurrency,
                fallback_projects: config.fallback_projects.clone(),
            };
            ops::slots::run(&client, &opts).await
        }

        Command::Loadgen { iterations } => {
            let client = connect(args.project.as_deref()).await?;
            ops::loadgen::run(&client, &LoadgenOptions { iterations }).await
        }
    }
}

/// Build the API client, resolving the project id from the flag or the
/// local gcloud/ADC configuration.
async fn connect(project: Option<&str>) -> Result<BqClient> {
    let project_id = match project {
        Some(id) => id.to_string(),
        None => match auth::get_default_project() {
            Some(id) => {
                tracing::info!(project = %id, "detected project id");
                id
            }
            None => anyhow::bail!(
                "no GCP project configured; pass --project or set GOOGLE_CLOUD_PROJECT"
            ),
        },
    };

    Ok(BqClient::new(&project_id).await?)
}

fn require_parent(cli: Option<String>, config: &Config) -> Result<String> {
    config::resolve(
        cli,
        config::env_string(config::ENV_PARENT_ID),
        config.parent_id.clone(),
    )
    .ok_or_else(|| {
        anyhow::anyhow!("parent scope required via --parent, PARENT_ID, or the config file")
    })
}

fn inventory_options(
    config: &Config,
    parent: Option<String>,
    dest_table: Option<String>,
    lookback: Option<u32>,
    concurrency: Option<usize>,
) -> Result<InventoryOptions> {
    let parent = require_parent(parent, config)?;

    let dest_table = config::resolve(
        dest_table,
        config::env_string(config::ENV_DEST_TABLE),
        config.inventory_table.clone(),
    )
    .ok_or_else(|| {
        anyhow::anyhow!("destination table required via --dest-table, DEST_TABLE, or the config file")
    })?;

    Ok(InventoryOptions {
        parent,
        dest_table,
        lookback_days: config::resolve_or(
            lookback,
            config::env_parse(config::ENV_LOOKBACK),
            config::DEFAULT_LOOKBACK_DAYS,
        ),
        concurrency: config::resolve_or(
            concurrency,
            config::env_parse(config::ENV_CONCURRENCY),
            config::DEFAULT_CONCURRENCY,
        ),
        fallback_projects: config.fallback_projects.clone(),
    })
}
