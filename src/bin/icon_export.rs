use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use icon_export::app::App;
use icon_export::config::{ConfigLoader, Overrides, ResolvedConfig};
use icon_export::domain::{FileKey, Manifest, SourceSelection};
use icon_export::error::ExportError;
use icon_export::mirror::{MirrorClient, MirrorHttpClient, RegistryEntry};
use icon_export::optimize::SvgOptimizer;
use icon_export::output::{ConsoleOutput, JsonOutput, OutputMode};
use icon_export::primary::{PrimaryClient, PrimaryHttpClient};

#[derive(Parser)]
#[command(name = "icon-export")]
#[command(about = "Export a design file's icons into optimized SVGs and a JSON manifest")]
#[command(version)]
struct Cli {
    /// Path to the local config file
    #[arg(long)]
    config: Option<String>,

    /// Destination directory
    #[arg(long)]
    out: Option<String>,

    /// Maximum number of concurrent downloads
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Deadline for the whole run in seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Retries per request on transient network failures
    #[arg(long)]
    retries: Option<usize>,

    /// Fail instead of overwriting when two components share a name
    #[arg(long)]
    fail_on_duplicate: bool,

    /// Print the result as JSON instead of progress lines
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ExportError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ExportError) -> u8 {
    match error {
        ExportError::Config(_)
        | ExportError::MissingFileKey(_)
        | ExportError::ConfigRead(_)
        | ExportError::ConfigParse(_) => 2,
        ExportError::Http { .. }
        | ExportError::HttpStatus { .. }
        | ExportError::BatchExport(_)
        | ExportError::CanvasNotFound(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::load(cli.config.as_deref())?;
    let overrides = Overrides {
        output: cli.out,
        concurrency: cli.concurrency,
        request_timeout_secs: cli.timeout_secs,
        deadline_secs: cli.deadline_secs,
        retries: cli.retries,
        fail_on_duplicate: cli.fail_on_duplicate,
    };
    let resolved = ConfigLoader::resolve(config, overrides)?;

    match &resolved.selection {
        SourceSelection::Primary { token, domain, .. } => {
            let primary = PrimaryHttpClient::new(token, domain, resolved.http)?;
            run_export(App::new(primary, NopMirror, SvgOptimizer), &resolved, output_mode)
        }
        SourceSelection::Mirror { .. } => {
            let mirror = MirrorHttpClient::new(resolved.http)?;
            run_export(App::new(NopPrimary, mirror, SvgOptimizer), &resolved, output_mode)
        }
    }
}

fn run_export<P: PrimaryClient, M: MirrorClient>(
    app: App<P, M, SvgOptimizer>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.export(config, &JsonOutput)?;
            JsonOutput::print_export(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.export(config, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&result);
        }
    }
    Ok(())
}

struct NopPrimary;
struct NopMirror;

impl PrimaryClient for NopPrimary {
    fn fetch_document(&self, _file_key: &FileKey) -> Result<Value, ExportError> {
        Err(ExportError::Config("primary source not configured".to_string()))
    }

    fn fetch_export_urls(&self, _file_key: &FileKey, _ids: &[String]) -> Result<Value, ExportError> {
        Err(ExportError::Config("primary source not configured".to_string()))
    }

    fn download_markup(&self, _url: &str) -> Result<String, ExportError> {
        Err(ExportError::Config("primary source not configured".to_string()))
    }
}

impl MirrorClient for NopMirror {
    fn fetch_registry(&self, _base_url: &str) -> Result<RegistryEntry, ExportError> {
        Err(ExportError::Config("mirror not configured".to_string()))
    }

    fn fetch_manifest(&self, _base_url: &str) -> Result<Manifest, ExportError> {
        Err(ExportError::Config("mirror not configured".to_string()))
    }

    fn fetch_asset(&self, _base_url: &str, _path: &str) -> Result<Vec<u8>, ExportError> {
        Err(ExportError::Config("mirror not configured".to_string()))
    }
}
