use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use inspection_report::{
    FsObjectStore, InspectionRecord, LogFormat, MemoryAgencyDirectory, ReportConfig, ReportError,
    ReportGenerator, display_name, inspect_pdf_path, telemetry,
};

#[derive(Parser, Debug)]
#[command(
    name = "inspection-report",
    version,
    about = "Render property inspections into PDF reports",
    long_about = None
)]
struct Cli {
    /// TOML configuration file; absent keys keep their defaults.
    #[arg(long, global = true, env = "INSPECTION_REPORT_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, env = "INSPECTION_REPORT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Override the output bucket.
    #[arg(long, global = true, env = "INSPECTION_REPORT_BUCKET")]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render an inspection record to a PDF file or publish it to the store
    Render(RenderArgs),
    /// Print a time-limited URL for a published report
    Url(UrlArgs),
    /// Print version, page count and size of a PDF
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Inspection record (JSON).
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Agency name printed on page one; looked up by agency id otherwise.
    #[arg(long)]
    agency_name: Option<String>,

    /// Write the PDF here (`-` for stdout) instead of publishing it.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Root of the filesystem object store (`<dir>/<bucket>/<key>`).
    #[arg(long, env = "INSPECTION_REPORT_STORE_DIR", value_name = "DIR", default_value = ".")]
    store_dir: PathBuf,

    /// Per-image fetch timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    fetch_timeout_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct UrlArgs {
    #[arg(long, env = "INSPECTION_REPORT_STORE_DIR", value_name = "DIR")]
    store_dir: PathBuf,

    #[arg(long)]
    agency: String,

    #[arg(long)]
    property: String,

    #[arg(long)]
    inspection: String,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// PDF file to inspect.
    path: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ReportError> {
    let mut config = match cli.config.as_deref() {
        Some(path) => ReportConfig::from_path(path)?,
        None => ReportConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if let Some(bucket) = cli.bucket {
        config.bucket = bucket;
    }
    telemetry::init(&config.logging)?;

    match cli.command {
        Commands::Render(args) => render(config, args).await,
        Commands::Url(args) => url(config, args).await,
        Commands::Inspect(args) => inspect(&args.path),
    }
}

async fn render(mut config: ReportConfig, args: RenderArgs) -> Result<(), ReportError> {
    if let Some(ms) = args.fetch_timeout_ms {
        config.fetch_timeout = Duration::from_millis(ms);
    }
    let input = tokio::fs::read(&args.input).await?;
    let record = InspectionRecord::from_json(&input)?;

    let agencies = Arc::new(MemoryAgencyDirectory::new());
    if let Some(name) = args.agency_name.as_deref() {
        agencies.insert(record.agency_id.as_str(), name).await;
    }
    let generator = ReportGenerator::builder()
        .config(config)
        .object_store(Arc::new(FsObjectStore::new(&args.store_dir)))
        .agency_directory(agencies.clone())
        .build()?;

    let Some(output) = args.output else {
        match generator.generate(&record).await? {
            Some(generated) => println!(
                "{}/{} ({} pages, {} bytes)",
                generated.bucket, generated.key, generated.page_count, generated.byte_len
            ),
            None => println!("skipped: inspection {} is not done", record.inspection_id),
        }
        return Ok(());
    };

    if !record.is_done() {
        warn!(status = ?record.status, "rendering an inspection that is not done");
    }
    let agency_name = display_name(agencies.as_ref(), &record.agency_id).await;
    let rendered = generator.render(&record.report, &agency_name).await?;
    write_output(&output, &rendered.bytes).await?;
    info!(
        path = %output.display(),
        pages = rendered.page_count,
        bytes = rendered.bytes.len(),
        "report written"
    );
    Ok(())
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()?;
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn url(config: ReportConfig, args: UrlArgs) -> Result<(), ReportError> {
    let generator = ReportGenerator::builder()
        .config(config)
        .object_store(Arc::new(FsObjectStore::new(&args.store_dir)))
        .build()?;
    let url = generator
        .report_url(&args.agency, &args.property, &args.inspection)
        .await?;
    println!("{url}");
    Ok(())
}

fn inspect(path: &Path) -> Result<(), ReportError> {
    let report = inspect_pdf_path(path).map_err(|err| ReportError::invalid_input(err.to_string()))?;
    println!(
        "PDF {}: {} page(s), {} bytes",
        report.pdf_version, report.page_count, report.file_size_bytes
    );
    if let Some(title) = report.title {
        println!("title: {title}");
    }
    Ok(())
}
