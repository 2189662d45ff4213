use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use s3_sql_downloader::app::Downloader;
use s3_sql_downloader::blob::S3HttpClient;
use s3_sql_downloader::config::{ConfigLoader, Overrides};
use s3_sql_downloader::domain::{DownloadOutcome, ItemStatus, SelectQuery};
use s3_sql_downloader::error::DownloaderError;
use s3_sql_downloader::output::{JsonOutput, OutputMode};
use s3_sql_downloader::query::SqliteQuerySource;
use s3_sql_downloader::tui::Tui;

const EXIT_ITEM_FAILURES: u8 = 4;

#[derive(Parser)]
#[command(name = "s3sql")]
#[command(about = "Download every S3 object referenced by a SQL query")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        name = "download-sql",
        about = "Execute a SELECT query and download the files it references"
    )]
    DownloadSql(DownloadArgs),
}

#[derive(Args, Clone)]
struct DownloadArgs {
    /// The SQL SELECT query. Must return 'id' and 'filename' columns.
    query: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    bucket: Option<String>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    region: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    /// Exit with a non-zero status when any file failed to download.
    #[arg(long)]
    fail_on_error: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<DownloaderError>() {
                return ExitCode::from(map_exit_code(err));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &DownloaderError) -> u8 {
    match error {
        DownloaderError::EmptyQuery
        | DownloaderError::NotReadOnly(_)
        | DownloaderError::MissingBucket
        | DownloaderError::ConfigRead(_)
        | DownloaderError::ConfigParse(_)
        | DownloaderError::InvalidEndpoint(_) => 2,
        DownloaderError::QueryExecution(_)
        | DownloaderError::BlobNotFound { .. }
        | DownloaderError::BlobAccessDenied { .. }
        | DownloaderError::BlobStatus { .. }
        | DownloaderError::BlobHttp(_)
        | DownloaderError::UnaddressableKey { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(output_mode.log_writer())
        .init();

    match cli.command {
        Commands::DownloadSql(args) => run_download(args, output_mode),
    }
}

fn run_download(args: DownloadArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let query: SelectQuery = args.query.parse()?;
    let overrides = Overrides {
        bucket: args.bucket,
        database: args.database,
        endpoint: args.endpoint,
        region: args.region,
        output_dir: args.output_dir,
    };
    let config = ConfigLoader::resolve(args.config.as_deref(), overrides)?;

    let query_source = SqliteQuerySource::open(config.database.clone())?;
    let blob_store = S3HttpClient::new(config.s3_settings())?;
    let downloader = Downloader::new(
        query_source,
        blob_store,
        config.bucket.clone(),
        config.output_dir.clone(),
    );

    let outcome = match output_mode {
        OutputMode::NonInteractive => {
            let outcome = downloader.run(query.as_str(), &JsonOutput)?;
            JsonOutput::print_outcome(&outcome).into_diagnostic()?;
            outcome
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(config.bucket.clone());
            let outcome = tui.run(move |sink| downloader.run(query.as_str(), sink))?;
            print_summary(&outcome);
            outcome
        }
    };

    if args.fail_on_error && outcome.failed > 0 {
        return Ok(ExitCode::from(EXIT_ITEM_FAILURES));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(outcome: &DownloadOutcome) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!("{cyan}S3SQL summary{reset}");
    if outcome.total() == 0 {
        println!("{yellow}Query returned 0 results.{reset}");
        return;
    }
    println!("{green}Downloaded: {}{reset}", outcome.succeeded);
    let failed_color = if outcome.failed > 0 { red } else { yellow };
    println!("{failed_color}Failed: {}{reset}", outcome.failed);

    for item in &outcome.items {
        match item.status {
            ItemStatus::Downloaded => {
                if let Some(path) = &item.path {
                    println!("{green}  + {} -> {path}{reset}", item.id);
                }
            }
            ItemStatus::Failed => {
                let error = item.error.as_deref().unwrap_or("unknown error");
                println!("{red}  x {} ({error}){reset}", item.id);
            }
        }
    }
}
