//! Configuration of the forecast comparison.
//!
//! Every setting has a default, so the comparison runs without any
//! configuration file, reading `era5_data.nc` as the ground truth and
//! `IFS_forecast_europe.nc` / `AIFS_forecast_europe.nc` as the forecasts from
//! the current directory. A [TOML](https://toml.io/en/) file given with
//! `--config` is merged over those defaults, so it only needs the settings
//! that differ. For example, to compare a single forecast stored elsewhere:
//!
//! ```toml
//! [[forecasts]]
//! name = "IFS"
//! path = "/data/ifs/IFS_forecast_europe.nc"
//! color = "blue"
//! marker = "circle"
//! ```
//!
//! Note that `forecasts` is an array, so giving it in the file replaces the
//! whole default list rather than adding to it.
//!
//! The `alignment` key selects which datasets must share a timestamp for it to
//! be analyzed: `"all-datasets"` (the default) requires the truth and every
//! forecast to have it; `"reference-pair"` only requires the truth and the first
//! forecast, and any later forecast missing one of those times is an error.
use std::io::Write;
use std::path::{Path, PathBuf};

use figment::providers::{Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::schema::Aliases;
use crate::time_match::AlignmentMode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error(transparent)]
    Figment(#[from] figment::Error),
    #[error("At least one forecast must be configured")]
    NoForecasts,
    #[error("Could not write configuration template to {}: {source}", .path.display())]
    WriteTemplate {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level comparison settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonConfig {
    /// Name of the variable to compare, after alias normalization
    pub variable: String,
    /// Which datasets contribute to the common timestamps
    pub alignment: AlignmentMode,
    /// The ground truth dataset
    pub truth: DatasetSpec,
    /// The forecast products to evaluate against the truth
    pub forecasts: Vec<ForecastSpec>,
    /// Alias renames applied to the ground truth dataset
    pub aliases: Aliases,
    pub output: OutputConfig,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            variable: "t2m".to_string(),
            alignment: AlignmentMode::default(),
            truth: DatasetSpec {
                name: "ERA5".to_string(),
                path: PathBuf::from("era5_data.nc"),
            },
            forecasts: vec![
                ForecastSpec {
                    name: "IFS".to_string(),
                    path: PathBuf::from("IFS_forecast_europe.nc"),
                    color: "blue".to_string(),
                    marker: MarkerShape::Circle,
                },
                ForecastSpec {
                    name: "AIFS".to_string(),
                    path: PathBuf::from("AIFS_forecast_europe.nc"),
                    color: "red".to_string(),
                    marker: MarkerShape::X,
                },
            ],
            aliases: Aliases::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ComparisonConfig {
    /// Build the configuration from the defaults, merged with `config_file` if given.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            log::debug!("Merging configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        let config: Self = figment.extract()?;
        if config.forecasts.is_empty() {
            return Err(ConfigError::NoForecasts);
        }
        Ok(config)
    }

    /// All input files, truth first
    pub fn input_paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.truth.path.as_path()];
        paths.extend(self.forecasts.iter().map(|f| f.path.as_path()));
        paths
    }

    /// Write the default configuration, with explanatory comments, to `path`.
    pub fn write_template(path: &Path) -> Result<(), ConfigError> {
        let comments = [
            "Configuration for compare_forecasts. Every key is optional; anything left",
            "out takes the value shown here.",
            "",
            "variable: the name of the field to compare in every dataset.",
            "alignment: \"all-datasets\" analyzes times present in the truth and every",
            "  forecast; \"reference-pair\" analyzes times present in the truth and the",
            "  first forecast, and fails if a later forecast lacks one of them.",
            "[truth]: the ground truth dataset. Alias renames only apply to it.",
            "[[forecasts]]: one table per forecast product. The color is any CSS color",
            "  and the marker one of circle, x, cross, square, diamond, triangle-up.",
            "[aliases]: maps of alternate name = canonical name.",
            "[output]: where to write the plot and its size in pixels.",
        ];

        let to_io_err = |source| ConfigError::WriteTemplate {
            path: path.to_path_buf(),
            source,
        };
        let mut f = std::fs::File::create(path).map_err(to_io_err)?;
        for line in comments {
            writeln!(f, "# {line}").map_err(to_io_err)?;
        }
        let s = toml::to_string_pretty(&Self::default())
            .expect("The default configuration should be able to be serialized (this is a bug)");
        write!(f, "\n{s}").map_err(to_io_err)?;
        Ok(())
    }
}

/// Where to find a dataset and what to call it in messages and plots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub path: PathBuf,
}

/// A forecast dataset plus how to draw it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastSpec {
    pub name: String,
    pub path: PathBuf,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub marker: MarkerShape,
}

fn default_color() -> String {
    "black".to_string()
}

/// Marker drawn at each timestep of a forecast's line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerShape {
    #[default]
    Circle,
    X,
    Cross,
    Square,
    Diamond,
    TriangleUp,
}

/// Plot output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub plot: PathBuf,
    pub title: String,
    pub width: usize,
    pub height: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plot: PathBuf::from("part1_results.png"),
            title: "Forecast Error Metrics vs ERA5 Ground Truth".to_string(),
            width: 1000,
            height: 1500,
        }
    }
}
