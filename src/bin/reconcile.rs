//! Reconcile CLI - Command-line interface for Health Reconcile
//!
//! Commands:
//! - payload: Reconcile one day into 24 hourly buckets
//! - dashboard: Day totals for the reconciled buckets
//! - debug: Full debug snapshot or its summary lines
//! - audit: Per-record audit log with trust decisions
//! - policy: Print the effective configuration

use chrono::{Local, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::executor::block_on;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use health_reconcile::adapters::{HealthConnectAdapter, HealthKitAdapter, RecordAdapter};
use health_reconcile::buckets::parse_utc_offset;
use health_reconcile::encoder::{format_records, OutputFormat as RecordFormat};
use health_reconcile::pipeline::ReconcileRun;
use health_reconcile::source::MemorySource;
use health_reconcile::{
    DayWindow, ReconcileConfig, ReconcileError, Reconciler, PRODUCER_NAME, RECONCILE_VERSION,
};

/// Reconcile - Trusted hourly activity from raw health-store records
#[derive(Parser)]
#[command(name = "reconcile")]
#[command(author = "Synheart AI Inc")]
#[command(version = RECONCILE_VERSION)]
#[command(about = "Reconcile health records into trusted hourly buckets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one day into 24 hourly buckets
    Payload(DayArgs),

    /// Day totals for the reconciled buckets
    Dashboard(DayArgs),

    /// Debug snapshot of the run
    Debug {
        #[command(flatten)]
        day: DayArgs,

        /// Print the summary lines instead of the full snapshot
        #[arg(long)]
        summary: bool,
    },

    /// Per-record audit log with trust decisions
    Audit(DayArgs),

    /// Print the effective configuration
    Policy {
        /// Configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Accept manually entered records
        #[arg(long)]
        allow_manual: bool,
    },
}

#[derive(Args)]
struct DayArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Input document layout
    #[arg(long, value_enum, default_value = "health-connect")]
    source: InputSource,

    /// Local calendar date, YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<String>,

    /// UTC offset of the local day, e.g. +07:00 (default: system offset)
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<String>,

    /// Configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Accept manually entered records
    #[arg(long)]
    allow_manual: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "json-pretty")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputSource {
    /// Health Connect readRecords output keyed by record type
    HealthConnect,
    /// HealthKit quantity samples keyed by type identifier
    Healthkit,
}

impl InputSource {
    /// Configuration used when no --config file is given
    fn default_config(self) -> ReconcileConfig {
        match self {
            InputSource::HealthConnect => ReconcileConfig::default(),
            InputSource::Healthkit => ReconcileConfig::healthkit(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

impl From<OutputFormat> for RecordFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => RecordFormat::Json,
            OutputFormat::JsonPretty => RecordFormat::JsonPretty,
            OutputFormat::Ndjson => RecordFormat::Ndjson,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("health_reconcile=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), ReconcileCliError> {
    match cli.command {
        Commands::Payload(args) => {
            let run = reconcile_day(&args)?;
            print!("{}", format_records(&run.payload(), args.format.into())?);
        }

        Commands::Dashboard(args) => {
            let run = reconcile_day(&args)?;
            let report = run.into_report(Utc::now());
            print_value(&report.dashboard, args.format)?;
        }

        Commands::Debug { day, summary } => {
            let run = reconcile_day(&day)?;
            if summary {
                for line in run.debug.summary_lines() {
                    println!("{line}");
                }
            } else {
                print_value(&run.debug, day.format)?;
            }
        }

        Commands::Audit(args) => {
            let run = reconcile_day(&args)?;
            print!("{}", format_records(&run.debug.audit_log, args.format.into())?);
        }

        Commands::Policy { config, allow_manual } => {
            let config = load_config(config.as_deref(), ReconcileConfig::default(), allow_manual)?;
            println!("{}", config.to_json()?);
        }
    }

    Ok(())
}

fn reconcile_day(args: &DayArgs) -> Result<ReconcileRun, ReconcileCliError> {
    let config = load_config(args.config.as_deref(), args.source.default_config(), args.allow_manual)?;
    let day = resolve_day(args.date.as_deref(), args.utc_offset.as_deref())?;

    let input_data = read_input(&args.input)?;
    let records = match args.source {
        InputSource::HealthConnect => HealthConnectAdapter.parse(&input_data)?,
        InputSource::Healthkit => HealthKitAdapter.parse(&input_data)?,
    };
    debug!(
        producer = PRODUCER_NAME,
        version = RECONCILE_VERSION,
        records = records.len(),
        "Parsed input records"
    );

    let mut reconciler = Reconciler::new(MemorySource::new(records), config);
    let run = block_on(reconciler.run(&day));

    info!(
        date = %day.date(),
        run_id = %run.debug.run_id,
        accepted = run.debug.stats.records_accepted,
        read = run.debug.stats.records_read,
        "Reconciled day"
    );

    Ok(run)
}

fn load_config(
    path: Option<&Path>,
    fallback: ReconcileConfig,
    allow_manual: bool,
) -> Result<ReconcileConfig, ReconcileCliError> {
    let mut config = match path {
        Some(path) => ReconcileConfig::from_json(&fs::read_to_string(path)?)?,
        None => fallback,
    };

    // The flag can only widen what the file allows
    if allow_manual {
        config.allow_manual = true;
    }
    Ok(config)
}

fn resolve_day(date: Option<&str>, utc_offset: Option<&str>) -> Result<DayWindow, ReconcileCliError> {
    let offset = match utc_offset {
        Some(raw) => parse_utc_offset(raw)?,
        None => *Local::now().offset(),
    };

    let date = match date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| ReconcileError::InvalidDate(format!("{raw}: {e}")))?,
        None => Utc::now().with_timezone(&offset).date_naive(),
    };

    Ok(DayWindow::new(date, offset)?)
}

fn read_input(input: &Path) -> Result<String, ReconcileCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn print_value<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<(), ReconcileCliError> {
    let output = match format {
        OutputFormat::Json | OutputFormat::Ndjson => serde_json::to_string(value)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(value)?,
    };
    println!("{output}");
    Ok(())
}

// Error types

#[derive(Debug)]
enum ReconcileCliError {
    Io(io::Error),
    Reconcile(ReconcileError),
    Json(serde_json::Error),
}

impl From<io::Error> for ReconcileCliError {
    fn from(e: io::Error) -> Self {
        ReconcileCliError::Io(e)
    }
}

impl From<ReconcileError> for ReconcileCliError {
    fn from(e: ReconcileError) -> Self {
        ReconcileCliError::Reconcile(e)
    }
}

impl From<serde_json::Error> for ReconcileCliError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ReconcileCliError> for CliError {
    fn from(e: ReconcileCliError) -> Self {
        match e {
            ReconcileCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ReconcileCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ReconcileCliError::Reconcile(e) => {
                let (code, hint) = match &e {
                    ReconcileError::NotReady(_) => ("NOT_READY", "Grant health permissions and retry"),
                    ReconcileError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    ReconcileError::ParseError(_) => {
                        ("PARSE_ERROR", "Ensure input matches the selected --source layout")
                    }
                    ReconcileError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'reconcile policy' to see the expected shape")
                    }
                    ReconcileError::InvalidDate(_) => {
                        ("INVALID_DATE", "Use --date YYYY-MM-DD and --utc-offset +HH:MM")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
        }
    }
}
