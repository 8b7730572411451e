//! Pixel CLI - Command-line interface for Synheart Pixel
//!
//! Commands:
//! - replay: Drive an agent through a recorded page session
//! - validate: Validate a recorded page session
//! - device-id: Resolve (and persist) the device id kept in a store file
//! - doctor: Diagnose configuration and storage

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use url::Url;

use synheart_pixel::config::{is_diagnostic, STORAGE_KEY};
use synheart_pixel::delivery::Diagnostics;
use synheart_pixel::host::{FileStore, MemoryStore, PersistentStore, ScriptLog, StaticPage};
use synheart_pixel::identity::IdentityStore;
use synheart_pixel::replay::{run_session, ReplayAdapter, ReplayRecord, ReplaySummary};
use synheart_pixel::transport::RelayRequest;
use synheart_pixel::{
    AgentConfig, Capabilities, HttpTransport, MemoryTransport, PixelAgent, PixelError, Transport,
    AGENT_NAME, PIXEL_VERSION,
};

/// Pixel - client-side event telemetry agent
#[derive(Parser)]
#[command(name = "pixel")]
#[command(author = "Synheart AI Inc")]
#[command(version = PIXEL_VERSION)]
#[command(about = "Replay page sessions through the telemetry pixel", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive an agent through a recorded page session
    Replay {
        /// Agent configuration (JSON with tracking_url, api_key, optional relay_endpoint)
        #[arg(short, long)]
        config: PathBuf,

        /// Recorded session (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Initial page state (JSON); overrides --url and --title
        #[arg(long)]
        page: Option<PathBuf>,

        /// Page URL the session starts on
        #[arg(long, default_value = "https://example.com/")]
        url: String,

        /// Page title the session starts with
        #[arg(long, default_value = "")]
        title: String,

        /// Device store file; an in-memory store is used when omitted
        #[arg(long)]
        store: Option<PathBuf>,

        /// Post requests to the relay instead of printing them
        #[arg(long)]
        send: bool,

        /// Seconds to wait for in-flight requests when sending
        #[arg(long, default_value = "10")]
        timeout_secs: u64,

        /// Output format for captured requests
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Validate a recorded page session
    Validate {
        /// Recorded session (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve the device id kept in a store file, creating one if needed
    DeviceId {
        /// Device store file
        #[arg(long)]
        store: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and storage
    Doctor {
        /// Agent configuration to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Page URL to check for diagnostic mode
        #[arg(long)]
        url: Option<String>,

        /// Device store file to check
        #[arg(long)]
        store: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one request per line)
    Ndjson,
    /// JSON array of requests
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

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

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), PixelCliError> {
    match cli.command {
        Commands::Replay {
            config,
            input,
            input_format,
            page,
            url,
            title,
            store,
            send,
            timeout_secs,
            output_format,
        } => {
            let page = match page {
                Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
                None => StaticPage::new(parse_url(&url)?).with_title(title),
            };
            let options = ReplayOptions {
                store,
                send,
                timeout: Duration::from_secs(timeout_secs),
                output_format,
            };
            cmd_replay(&config, &input, input_format, page, options)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::DeviceId { store, json } => cmd_device_id(&store, json),

        Commands::Doctor {
            config,
            url,
            store,
            json,
        } => cmd_doctor(config.as_deref(), url.as_deref(), store.as_deref(), json),
    }
}

struct ReplayOptions {
    store: Option<PathBuf>,
    send: bool,
    timeout: Duration,
    output_format: OutputFormat,
}

fn cmd_replay(
    config: &Path,
    input: &Path,
    input_format: InputFormat,
    page: StaticPage,
    options: ReplayOptions,
) -> Result<(), PixelCliError> {
    let config = AgentConfig::from_json(&fs::read_to_string(config)?)?;
    let records = read_session(input, input_format)?;

    if records.is_empty() {
        return Err(PixelCliError::NoRecords);
    }
    let issues = ReplayAdapter::validate(&records);
    if !issues.is_empty() {
        return Err(PixelCliError::ValidationFailed(issues.len()));
    }

    let capabilities = match options.store {
        Some(path) => Capabilities::with_store(FileStore::new(path)),
        None => Capabilities::with_store(MemoryStore::new()),
    };
    let scripts = Arc::new(ScriptLog::new());

    if options.send {
        let runtime = tokio::runtime::Runtime::new()?;
        let transport = Arc::new(HttpTransport::new(runtime.handle().clone()));
        let dyn_transport: Arc<dyn Transport> = transport.clone();

        let mut agent = PixelAgent::start(&config, page, capabilities, dyn_transport, scripts.clone())?;
        let summary = run_session(&mut agent, &records, Instant::now())?;
        tracing::info!(records = summary.records_replayed, "session replayed, waiting for relay");

        runtime.block_on(transport.drain(options.timeout));
        print_summary(&summary, &scripts)?;
    } else {
        let transport = MemoryTransport::new();
        let mut agent = PixelAgent::start(
            &config,
            page,
            capabilities,
            Arc::new(transport.clone()),
            scripts.clone(),
        )?;
        let summary = run_session(&mut agent, &records, Instant::now())?;
        tracing::info!(
            records = summary.records_replayed,
            requests = transport.requests().len(),
            "session replayed"
        );

        print!("{}", format_output(&transport.requests(), &options.output_format)?);
    }

    Ok(())
}

fn print_summary(summary: &ReplaySummary, scripts: &ScriptLog) -> Result<(), PixelCliError> {
    let report = serde_json::json!({
        "summary": summary,
        "scripts_injected": scripts.scripts().len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), PixelCliError> {
    let records = read_session(input, input_format)?;
    let issues = ReplayAdapter::validate(&records);

    let report = ValidationReport {
        total_records: records.len(),
        invalid_records: issues.len(),
        errors: issues
            .iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                error: issue.reason.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:  {}", report.total_records);
        println!("Issues:         {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Record {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(PixelCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_device_id(store: &Path, json: bool) -> Result<(), PixelCliError> {
    let mut identity = IdentityStore::new(
        Capabilities::with_store(FileStore::new(store)),
        Diagnostics::new(true),
    );
    let device_id = identity.resolve();

    if json {
        let report = serde_json::json!({
            "device_id": device_id,
            "store": store.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", device_id);
    }

    Ok(())
}

fn cmd_doctor(
    config: Option<&Path>,
    url: Option<&str>,
    store: Option<&Path>,
    json: bool,
) -> Result<(), PixelCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck::ok(
        "pixel_version",
        format!("Pixel version {}", PIXEL_VERSION),
    ));

    if let Some(config_path) = config {
        checks.extend(check_config(config_path));
    }

    if let Some(url) = url {
        match Url::parse(url) {
            Ok(location) if is_diagnostic(&location) => checks.push(DoctorCheck::warning(
                "diagnostic_mode",
                format!("{} runs in diagnostic mode (keepalive off, debug logging on)", location),
            )),
            Ok(location) => checks.push(DoctorCheck::ok(
                "diagnostic_mode",
                format!("{} runs in production mode", location),
            )),
            Err(e) => checks.push(DoctorCheck::error(
                "diagnostic_mode",
                format!("Invalid page URL {}: {}", url, e),
            )),
        }
    }

    if let Some(store_path) = store {
        checks.push(check_store(store_path));
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck::ok("stdin", "stdin is a TTY (interactive mode)".to_string())
    } else {
        DoctorCheck::ok("stdin", "stdin is a pipe (replay input ready)".to_string())
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        agent: AGENT_NAME.to_string(),
        version: PIXEL_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pixel Doctor Report");
        println!("===================");
        println!("Agent:    {}", report.agent);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PixelCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn check_config(path: &Path) -> Vec<DoctorCheck> {
    let config = match fs::read_to_string(path)
        .map_err(PixelError::from)
        .and_then(|content| AgentConfig::from_json(&content))
    {
        Ok(config) => config,
        Err(e) => return vec![DoctorCheck::error("config", format!("Cannot load config: {}", e))],
    };

    match config.resolve() {
        Ok(resolved) => {
            let mut checks = vec![
                DoctorCheck::ok("config", format!("Relay endpoint {}", resolved.relay_endpoint)),
                DoctorCheck::ok("tracking_id", format!("Tracking id {}", resolved.tracking_id)),
            ];
            if !resolved.bootstrap_enabled() {
                checks.push(DoctorCheck::warning(
                    "api_key",
                    "API key is empty; the bootstrap call will be skipped".to_string(),
                ));
            }
            checks
        }
        Err(e) => vec![DoctorCheck::error("config", e.to_string())],
    }
}

fn check_store(path: &Path) -> DoctorCheck {
    let store = FileStore::new(path);
    match store.get(STORAGE_KEY) {
        Ok(Some(device_id)) if !device_id.is_empty() => {
            DoctorCheck::ok("store", format!("Device id {} stored in {}", device_id, path.display()))
        }
        Ok(_) => DoctorCheck::warning(
            "store",
            format!("No device id in {}; one is created on first use", path.display()),
        ),
        Err(e) => DoctorCheck::error("store", format!("Cannot read {}: {}", path.display(), e)),
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, PixelCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_session(input: &Path, input_format: InputFormat) -> Result<Vec<ReplayRecord>, PixelCliError> {
    let input_data = read_input(input)?;
    let records = match input_format {
        InputFormat::Ndjson => ReplayAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => ReplayAdapter::parse_array(&input_data)?,
    };
    Ok(records)
}

fn parse_url(url: &str) -> Result<Url, PixelCliError> {
    Url::parse(url).map_err(|e| PixelCliError::Pixel(PixelError::InvalidPageUrl(format!("{}: {}", url, e))))
}

fn format_output(requests: &[RelayRequest], format: &OutputFormat) -> Result<String, PixelCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for request in requests {
                lines.push(serde_json::to_string(request)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(requests)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(requests)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum PixelCliError {
    Io(io::Error),
    Pixel(PixelError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PixelCliError {
    fn from(e: io::Error) -> Self {
        PixelCliError::Io(e)
    }
}

impl From<PixelError> for PixelCliError {
    fn from(e: PixelError) -> Self {
        PixelCliError::Pixel(e)
    }
}

impl From<serde_json::Error> for PixelCliError {
    fn from(e: serde_json::Error) -> Self {
        PixelCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PixelCliError> for CliError {
    fn from(e: PixelCliError) -> Self {
        match e {
            PixelCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PixelCliError::Pixel(e) => {
                let hint = match &e {
                    PixelError::ReplayParse(_) | PixelError::InvalidReplayRecord { .. } => {
                        "Run 'pixel validate' for details"
                    }
                    PixelError::InvalidPageUrl(_) => "Pass an absolute URL such as https://example.com/",
                    _ => "Run 'pixel doctor --config <file>' to check the configuration",
                };
                CliError {
                    code: "PIXEL_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PixelCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PixelCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PixelCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} session records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PixelCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    agent: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

impl DoctorCheck {
    fn ok(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message,
        }
    }

    fn warning(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message,
        }
    }

    fn error(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message,
        }
    }
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
