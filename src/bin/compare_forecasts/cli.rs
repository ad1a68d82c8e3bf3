//! Command line interface definitions
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Score forecasts against a ground truth dataset.
///
/// Computes the MAE, RMSE, and R² of each forecast at every time it shares with
/// the truth, after interpolating it to the truth's grid, and plots them. With
/// no arguments, compares IFS_forecast_europe.nc and AIFS_forecast_europe.nc
/// against era5_data.nc in the current directory and saves part1_results.png.
#[derive(Debug, Parser)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) command: Option<Commands>,

    #[clap(flatten)]
    pub(crate) run: RunCli,

    #[command(flatten)]
    pub(crate) verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Commands {
    /// Run the comparison (the default if no subcommand is given)
    Run(RunCli),
    /// Create an example of the configuration file
    ConfigTemplate(TemplateCli),
    /// Print out the configuration that would be used, after merging any
    /// configuration file with the defaults.
    DebugConfig(RunCli),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RunCli {
    /// TOML file with settings that override the defaults.
    /// Use the config-template subcommand to see the available settings.
    #[clap(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub(crate) struct TemplateCli {
    /// Path to write the template to
    pub(crate) template_file: PathBuf,
}
