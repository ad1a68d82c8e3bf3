use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use fcst_verify::{
    cds::{CdsClient, CdsCredentials, RetrieveRequest},
    logging::init_logging,
};

fn main() -> ExitCode {
    let clargs = Cli::parse();
    if let Err(e) = init_logging(clargs.verbosity.log_level_filter()) {
        eprintln!("WARNING: could not set up logging: {e}");
    }

    if let Err(e) = main_inner(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner(clargs: Cli) -> error_stack::Result<(), CliError> {
    match clargs.command {
        Some(Commands::Template(template_cli)) => {
            RetrieveRequest::write_template(&template_cli.template_file).change_context_lazy(|| {
                CliError::context(format!(
                    "Error writing request template to {}",
                    template_cli.template_file.display()
                ))
            })
        }
        None => download(clargs.download),
    }
}

fn download(cli: DownloadCli) -> error_stack::Result<(), CliError> {
    let mut request = if let Some(request_file) = cli.request.as_deref() {
        RetrieveRequest::from_toml_file(request_file).change_context_lazy(|| {
            CliError::context(format!("Error loading request from {}", request_file.display()))
        })?
    } else {
        RetrieveRequest::default()
    };

    if let Some(output) = cli.output {
        request.output = output;
    }

    log::info!("downloading {} data from CDS...", request.dataset);
    let credentials = CdsCredentials::from_env_or_rc().change_context(CliError::Download)?;
    let client = CdsClient::new(credentials)
        .change_context(CliError::Download)?
        .with_poll_interval(Duration::from_secs(cli.poll_interval))
        .with_max_wait(Duration::from_secs(cli.max_wait));

    let nbytes = client.retrieve(&request).change_context(CliError::Download)?;
    println!(
        "SUCCESS: Downloaded {} ({nbytes} bytes)",
        request.output.display()
    );
    Ok(())
}

/// Download a dataset from the Copernicus Climate Data Store.
///
/// With no arguments, this retrieves 6-hourly ERA5 2 m temperature over Europe
/// for 1-16 January 2026 into era5_data.nc. CDS API credentials are read from
/// the CDSAPI_URL and CDSAPI_KEY environment variables or ~/.cdsapirc.
#[derive(Debug, Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(flatten)]
    download: DownloadCli,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Write an example request file, which can be edited and passed to --request
    Template(TemplateCli),
}

#[derive(Debug, Clone, Args)]
struct DownloadCli {
    /// TOML file describing the request. If omitted, the ERA5 request
    /// described above is used.
    #[clap(short, long)]
    request: Option<PathBuf>,

    /// File to write the download to, overriding the request's output
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Seconds to wait between checks of the request's status
    #[clap(long, default_value_t = 5)]
    poll_interval: u64,

    /// Give up if the CDS has not finished the request after this many seconds
    #[clap(long, default_value_t = 3 * 60 * 60)]
    max_wait: u64,
}

#[derive(Debug, Clone, Args)]
struct TemplateCli {
    /// Path to write the template to
    template_file: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Failed to download data. Make sure you have a valid CDS API key configured.")]
    Download,

    /// Wrapper type used to add information to an inner error.
    #[error("{0}")]
    Context(String),
}

impl CliError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}
