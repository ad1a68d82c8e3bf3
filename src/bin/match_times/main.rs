use std::{
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use chrono::NaiveDateTime;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use fcst_verify::{
    comparison::check_required_files,
    logging::init_logging,
    nc_utils::read_time_coordinate,
    time_coords::format_timestamp,
    time_match::{require_common_times, write_times},
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
    check_required_files(&[&clargs.first_file, &clargs.second_file])
        .change_context(CliError::MissingInput)?;

    let times1 = load_times(&clargs.first_file)?;
    let times2 = load_times(&clargs.second_file)?;
    log::info!("File 1 has {} time steps.", times1.len());
    log::info!("File 2 has {} time steps.", times2.len());

    let name1 = clargs.first_file.display().to_string();
    let name2 = clargs.second_file.display().to_string();
    let matches = require_common_times(&[
        (name1.as_str(), times1.as_slice()),
        (name2.as_str(), times2.as_slice()),
    ])
    .change_context_lazy(|| CliError::context("Cannot write matching times"))?;

    log::info!("Found {} matching times!", matches.len());
    println!("{}", "-".repeat(30));
    for t in matches.iter() {
        println!("{}", format_timestamp(t));
    }

    save_times(&clargs.output, &matches)?;
    println!("Saved matching times to: {}", clargs.output.display());
    Ok(())
}

fn load_times(nc_file: &Path) -> error_stack::Result<Vec<NaiveDateTime>, CliError> {
    read_time_coordinate(nc_file).change_context_lazy(|| {
        CliError::context(format!("Failed to load times from {}", nc_file.display()))
    })
}

fn save_times(output: &Path, times: &[NaiveDateTime]) -> error_stack::Result<(), CliError> {
    let ctx = || CliError::context(format!("Error writing matching times to {}", output.display()));
    let f = std::fs::File::create(output).change_context_lazy(ctx)?;
    let mut writer = BufWriter::new(f);
    write_times(&mut writer, times).change_context_lazy(ctx)?;
    writer.flush().change_context_lazy(ctx)?;
    Ok(())
}

/// Find the times present in both of two netCDF files and write them to a
/// text file, one per line.
#[derive(Debug, Parser)]
struct Cli {
    /// First netCDF file
    #[clap(default_value = "IFS_forecast_europe.nc")]
    first_file: PathBuf,

    /// Second netCDF file
    #[clap(default_value = "AIFS_forecast_europe.nc")]
    second_file: PathBuf,

    /// Path to write the matching times to
    #[clap(short, long, default_value = "matching_times.txt")]
    output: PathBuf,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Input file check failed")]
    MissingInput,

    /// Wrapper type used to add information to an inner error.
    #[error("{0}")]
    Context(String),
}

impl CliError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}
