//! The forecast comparison pipeline: validate inputs, align the forecasts to
//! the ground truth in time and space, and score them at each timestep.
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use itertools::Itertools;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::ComparisonConfig;
use crate::dataset::GriddedDataset;
use crate::error::DatasetError;
use crate::metrics::{nan_mean, MetricSeries, MetricsError};
use crate::regrid::{regrid_like, RegridError};
use crate::schema::{check_variable, SchemaCheck};
use crate::time_match::{find_common_times, subset_to_times, TimeMatchError};

#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("Required file(s) not found: {}", .0.iter().map(|p| p.display()).join(", "))]
    MissingFiles(Vec<PathBuf>),
    #[error("Failed to load {}", .path.display())]
    Load {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Variable '{variable}' not found in {dataset} data! Available variables: {}", .available.join(", "))]
    MissingVariable {
        dataset: String,
        variable: String,
        available: Vec<String>,
    },
    #[error("No forecast datasets were given")]
    NoForecasts,
    #[error(transparent)]
    TimeMatch(#[from] TimeMatchError),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("Could not align the {dataset} grid to the {truth} grid")]
    Regrid {
        dataset: String,
        truth: String,
        source: RegridError,
    },
    #[error("Error computing metrics for {dataset}")]
    Metrics {
        dataset: String,
        source: MetricsError,
    },
}

/// Check that every path exists, listing all of the missing ones in the error.
pub fn check_required_files<P: AsRef<Path>>(paths: &[P]) -> Result<(), ComparisonError> {
    let missing: Vec<PathBuf> = paths
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.exists())
        .map(|p| p.to_path_buf())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ComparisonError::MissingFiles(missing))
    }
}

fn require_variable(ds: &GriddedDataset, variable: &str) -> Result<(), ComparisonError> {
    match check_variable(ds, variable) {
        SchemaCheck::Present => Ok(()),
        SchemaCheck::Missing {
            variable,
            available,
        } => Err(ComparisonError::MissingVariable {
            dataset: ds.name().to_string(),
            variable,
            available,
        }),
    }
}

/// Metrics of every forecast product over the analyzed timesteps
#[derive(Debug, Clone)]
pub struct ComparisonResults {
    pub truth: String,
    pub variable: String,
    pub times: Vec<NaiveDateTime>,
    pub series: Vec<MetricSeries>,
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Product")]
    product: String,
    #[tabled(rename = "Timesteps")]
    timesteps: usize,
    #[tabled(rename = "Mean MAE")]
    mae: String,
    #[tabled(rename = "Mean RMSE")]
    rmse: String,
    #[tabled(rename = "Mean R²")]
    r2: String,
}

impl ComparisonResults {
    /// A table of the mean of each metric over time, one row per forecast product.
    ///
    /// Timesteps where a metric is NaN are left out of its mean.
    pub fn summary_table(&self) -> String {
        let rows = self.series.iter().map(|s| SummaryRow {
            product: s.product.clone(),
            timesteps: s.records.len(),
            mae: format!("{:.4}", nan_mean(&s.mae())),
            rmse: format!("{:.4}", nan_mean(&s.rmse())),
            r2: format!("{:.4}", nan_mean(&s.r2())),
        });
        Table::new(rows).with(Style::modern()).to_string()
    }
}

/// Compare already-loaded forecasts against the ground truth.
///
/// The truth dataset has the configured aliases applied; every dataset must
/// then contain `config.variable`. The times analyzed depend on
/// `config.alignment`, and each forecast is interpolated onto the truth grid
/// before scoring.
pub fn compare_datasets(
    mut truth: GriddedDataset,
    forecasts: Vec<GriddedDataset>,
    config: &ComparisonConfig,
) -> Result<ComparisonResults, ComparisonError> {
    if forecasts.is_empty() {
        return Err(ComparisonError::NoForecasts);
    }

    config.aliases.normalize(&mut truth);

    let variable = config.variable.as_str();
    require_variable(&truth, variable)?;
    for fc in forecasts.iter() {
        require_variable(fc, variable)?;
    }

    let times = find_common_times(&truth, &forecasts, config.alignment)?;
    log::info!("analyzing {} common time steps.", times.len());

    let truth = subset_to_times(&truth, &times)?;
    let forecasts = forecasts
        .iter()
        .map(|fc| subset_to_times(fc, &times))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!("aligning forecast grids to {} data...", truth.name());
    let aligned = forecasts
        .iter()
        .map(|fc| {
            regrid_like(fc, &truth).map_err(|source| ComparisonError::Regrid {
                dataset: fc.name().to_string(),
                truth: truth.name().to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let truth_field = truth.require_field(variable)?;

    let mut series = Vec::with_capacity(aligned.len());
    for fc in aligned.iter() {
        log::info!("computing metrics for {}...", fc.name());
        let fc_field = fc.require_field(variable)?;
        let s = MetricSeries::compute(fc.name(), fc_field, truth_field, &times).map_err(|source| {
            ComparisonError::Metrics {
                dataset: fc.name().to_string(),
                source,
            }
        })?;
        series.push(s);
    }

    Ok(ComparisonResults {
        truth: truth.name().to_string(),
        variable: variable.to_string(),
        times,
        series,
    })
}

/// Load the truth and forecast files named in `config`, named as configured.
#[cfg(feature = "netcdf")]
pub fn load_datasets(
    config: &ComparisonConfig,
) -> Result<(GriddedDataset, Vec<GriddedDataset>), ComparisonError> {
    use crate::nc_utils::read_gridded_dataset;

    let load = |name: &str, path: &Path| {
        read_gridded_dataset(path, name).map_err(|e| ComparisonError::Load {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    };

    let truth = load(&config.truth.name, &config.truth.path)?;
    let forecasts = config
        .forecasts
        .iter()
        .map(|f| load(&f.name, &f.path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((truth, forecasts))
}

/// Run the whole comparison described by `config`, from the file check to the metrics.
#[cfg(feature = "netcdf")]
pub fn run_comparison(config: &ComparisonConfig) -> Result<ComparisonResults, ComparisonError> {
    check_required_files(&config.input_paths())?;
    log::info!("loading...");
    let (truth, forecasts) = load_datasets(config)?;
    compare_datasets(truth, forecasts, config)
}
