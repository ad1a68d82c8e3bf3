use std::process::ExitCode;

use clap::Parser;
use error_stack::ResultExt;
use fcst_verify::{
    comparison::{run_comparison, ComparisonError},
    config::ComparisonConfig,
    logging::init_logging,
    plotting::render_metrics,
};

mod cli;

fn main() -> ExitCode {
    let clargs = cli::Cli::parse();
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

fn main_inner(clargs: cli::Cli) -> error_stack::Result<(), CliError> {
    match clargs.command {
        Some(cli::Commands::Run(run_cli)) => compare_driver(run_cli),
        Some(cli::Commands::ConfigTemplate(template_cli)) => {
            ComparisonConfig::write_template(&template_cli.template_file).change_context_lazy(|| {
                CliError::context(format!(
                    "Error writing configuration template to {}",
                    template_cli.template_file.display()
                ))
            })
        }
        Some(cli::Commands::DebugConfig(run_cli)) => {
            let config = load_config(&run_cli)?;
            println!("Configuration:\n\n{config:#?}");
            Ok(())
        }
        None => compare_driver(clargs.run),
    }
}

/// Compute the metrics, print their summary, and plot them.
fn compare_driver(run_cli: cli::RunCli) -> error_stack::Result<(), CliError> {
    let config = load_config(&run_cli)?;
    let results = run_comparison(&config).map_err(CliError::from_comparison)?;

    println!("{}", results.summary_table());
    let plot_file = render_metrics(&results, &config).change_context(CliError::Plot)?;
    println!("Done! Plot saved to {}", plot_file.display());
    Ok(())
}

fn load_config(run_cli: &cli::RunCli) -> error_stack::Result<ComparisonConfig, CliError> {
    ComparisonConfig::load(run_cli.config.as_deref()).change_context_lazy(|| {
        let src = run_cli
            .config
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        CliError::context(format!("Error loading configuration ({src})"))
    })
}

/// Program error type
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// One or more input files do not exist.
    #[error("Required input files are missing")]
    MissingInput,

    /// An input file exists but could not be read as a gridded dataset.
    #[error("Failed to load datasets")]
    Load,

    /// The comparison itself could not be carried out.
    #[error("Comparison failed")]
    Compare,

    /// The metrics were computed but the plot could not be written.
    #[error("Failed to save the plot")]
    Plot,

    /// Wrapper type used to add information to an inner error.
    #[error("{0}")]
    Context(String),
}

impl CliError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }

    fn from_comparison(err: ComparisonError) -> error_stack::Report<Self> {
        let ctx = match &err {
            ComparisonError::MissingFiles(_) => Self::MissingInput,
            ComparisonError::Load { .. } => Self::Load,
            _ => Self::Compare,
        };
        error_stack::Report::new(err).change_context(ctx)
    }
}
