use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use air_downloader::app::{App, RunOptions};
use air_downloader::config::{ClientConfig, DEFAULT_PRE_FETCH_DELAY};
use air_downloader::error::AirError;
use air_downloader::fetch::HttpAssetClient;
use air_downloader::output::{ConsoleOutput, JsonOutput, OutputMode};
use air_downloader::paths::PathResolver;

#[derive(Parser)]
#[command(name = "air-dl")]
#[command(about = "Download assets listed in a metadata JSON, routed into directories by their AIR identifiers")]
#[command(version, author)]
struct Cli {
    /// Metadata document; download records are written back into it.
    meta_json: Utf8PathBuf,

    /// Root directory; files land in <ROOT_DIR>/<type>/ or <ROOT_DIR>/default/.
    root_dir: Utf8PathBuf,

    /// Pause before every download, in seconds.
    #[arg(long, default_value_t = DEFAULT_PRE_FETCH_DELAY.as_secs())]
    delay_secs: u64,

    #[arg(long)]
    user_agent: Option<String>,

    /// Probe and resolve file names only.
    #[arg(long)]
    dry_run: bool,

    /// Skip URLs that already have a download record.
    #[arg(long)]
    skip_recorded: bool,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<AirError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &AirError) -> u8 {
    match error {
        AirError::MissingCredential(_)
        | AirError::DocumentRead { .. }
        | AirError::DocumentParse(_) => 2,
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
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    let mut config = ClientConfig::from_env()?
        .with_pre_fetch_delay(Duration::from_secs(cli.delay_secs));
    if let Some(user_agent) = cli.user_agent {
        config = config.with_user_agent(user_agent);
    }
    let root = PathResolver::prepare_root(&cli.root_dir)?;
    let client = HttpAssetClient::new(&config)?;
    tracing::debug!(?config, root = %root, "starting run");

    let mut app = App::new(client, PathResolver::new(root));
    let options = RunOptions {
        dry_run: cli.dry_run,
        skip_recorded: cli.skip_recorded,
    };

    match output_mode {
        OutputMode::Console => {
            let summary = app.run(&cli.meta_json, options, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&summary);
        }
        OutputMode::Json => {
            let summary = app.run(&cli.meta_json, options, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}
