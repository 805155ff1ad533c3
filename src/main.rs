//! Health Sentinel - health-check automation and self-healing engine
//!
//! # Usage
//!
//! ```bash
//! # Run the engine until Ctrl+C / SIGTERM
//! health-sentinel start
//!
//! # Signal a running engine to shut down
//! health-sentinel stop
//!
//! # One-off check (all modules, or one) with remediation
//! health-sentinel run-check database-health
//!
//! # Report for a custom range
//! health-sentinel generate-report --start 2026-03-02 --end 2026-03-09 --format csv
//! ```
//!
//! # Environment Variables
//!
//! - `HEALTH_SENTINEL_CONFIG`: Path to the engine configuration TOML
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use health_sentinel::config::{defaults, EngineConfig};
use health_sentinel::monitor::SysinfoSampler;
use health_sentinel::notify::LoggingDispatcher;
use health_sentinel::orchestrator::{Collaborators, ExportFormat, Orchestrator};
use health_sentinel::probe::CommandProvider;
use health_sentinel::remediation::CommandHandlers;
use health_sentinel::schedule::SystemClock;
use health_sentinel::storage::{ProcessLock, ResultStore, SledStore};
use health_sentinel::ReportFormat;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "health-sentinel")]
#[command(about = "Health-check automation and self-healing engine")]
#[command(version)]
struct CliArgs {
    /// Engine configuration file (overrides the standard search order)
    #[arg(short, long, env = defaults::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the engine until interrupted
    Start,

    /// Signal the running engine to shut down
    Stop,

    /// Check one module (or all) now, remediating failures
    RunCheck {
        /// Module name; all configured modules when omitted
        module: Option<String>,
    },

    /// Generate a report (default: the last 7 days)
    GenerateReport {
        /// Period start (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_time, requires = "end")]
        start: Option<DateTime<Utc>>,
        /// Period end, exclusive (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_time, requires = "start")]
        end: Option<DateTime<Utc>>,
        /// markdown, csv or json
        #[arg(long)]
        format: Option<ReportFormat>,
    },

    /// Latest status per module over the last 24 hours
    Status,

    /// Export persisted check results
    Export {
        /// json or csv
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Range start, inclusive (default: 7 days ago)
        #[arg(long, value_parser = parse_time)]
        start: Option<DateTime<Utc>>,
        /// Range end, inclusive (default: now)
        #[arg(long, value_parser = parse_time)]
        end: Option<DateTime<Utc>>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List remediation rules
    Rules,
}

/// Accepts RFC 3339 timestamps or plain dates (midnight UTC).
fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| format!("'{value}' is neither RFC 3339 nor YYYY-MM-DD"))
}

// ============================================================================
// Engine Assembly
// ============================================================================

/// Engine plus the resources that must outlive it
struct Runtime {
    orchestrator: Orchestrator,
    store: Arc<SledStore>,
    _process_lock: ProcessLock,
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load_from_file(p).with_context(|| format!("Failed to load {}", p.display()))?,
        None => EngineConfig::load(),
    };
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

fn init_runtime(config: &EngineConfig) -> Result<Runtime> {
    let data_dir = &config.paths.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    let process_lock = ProcessLock::acquire(data_dir).context("Failed to acquire process lock")?;

    let db_path = config.paths.database_path();
    let store = Arc::new(
        SledStore::open(&db_path).with_context(|| format!("Failed to open result store at {}", db_path.display()))?,
    );
    info!(path = %db_path.display(), backend = store.backend_name(), "Result store opened");

    let orchestrator = Orchestrator::new(
        config,
        Collaborators {
            provider: Arc::new(CommandProvider::new(config.probes.clone())),
            handlers: Arc::new(CommandHandlers::new(&config.remediation)),
            store: store.clone(),
            dispatcher: Arc::new(LoggingDispatcher::new(store.clone())),
            sampler: Arc::new(SysinfoSampler::new()),
            clock: Arc::new(SystemClock),
        },
    );

    if config.administrators.is_empty() {
        warn!("No administrators configured, alerts and reports will reach nobody");
    }

    Ok(Runtime {
        orchestrator,
        store,
        _process_lock: process_lock,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C");
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let config = load_config(args.config.as_ref())?;

    if let SubCommand::Stop = args.command {
        return match ProcessLock::signal_running(&config.paths.data_dir)? {
            Some(pid) => {
                info!(pid, "Shutdown signal sent");
                Ok(())
            }
            None => {
                warn!("No running engine found");
                Ok(())
            }
        };
    }

    let runtime = init_runtime(&config)?;
    let orchestrator = &runtime.orchestrator;

    match args.command {
        SubCommand::Start => {
            orchestrator.start().await;
            info!("Health Sentinel running, press Ctrl+C to stop");
            wait_for_shutdown().await;
            orchestrator.stop();
        }
        SubCommand::Stop => {}
        SubCommand::RunCheck { module } => {
            let outcomes = orchestrator.run_manual_check_with_remediation(module.as_deref()).await;
            print_json(&outcomes)?;
        }
        SubCommand::GenerateReport { start, end, format } => {
            let range = start.zip(end);
            let report = orchestrator
                .generate_report(range, format)
                .await
                .context("Report generation failed, see the audit log")?;
            println!("{}", report.path.display());
        }
        SubCommand::Status => {
            print_json(&orchestrator.system_status())?;
        }
        SubCommand::Export {
            format,
            start,
            end,
            out,
        } => {
            let end = end.unwrap_or_else(Utc::now);
            let start = start.unwrap_or_else(|| end - Duration::days(defaults::DEFAULT_REPORT_DAYS));
            let body = orchestrator.export_data(format, start, end)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "Export written");
                }
                None => println!("{body}"),
            }
        }
        SubCommand::Rules => {
            print_json(&orchestrator.remediation().rules())?;
        }
    }

    runtime.store.flush().context("Failed to flush result store")?;
    info!("Health Sentinel shutdown complete");
    Ok(())
}
