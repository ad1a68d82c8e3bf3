//! Rendering of the per-timestep metric time series.
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use plotly::{
    common::{Marker, MarkerSymbol, Mode, Title},
    layout::Axis,
    ImageFormat, Layout, Plot, Scatter,
};

use crate::comparison::ComparisonResults;
use crate::config::{ComparisonConfig, ForecastSpec, MarkerShape};
use crate::metrics::MetricSeries;

#[derive(Debug, thiserror::Error)]
pub enum PlotError {
    #[error("Could not remove the previous plot at {}", .path.display())]
    RemoveStale {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Exporting the plot to {} failed: {reason}", .path.display())]
    Export { path: PathBuf, reason: String },
    #[error("The plot was not written to {}", .0.display())]
    NotWritten(PathBuf),
}

/// The three stacked panels, top to bottom: y-axis label, plotly axis id, and
/// the extractor for that metric.
const PANELS: [(&str, &str, fn(&MetricSeries) -> Vec<f64>); 3] = [
    ("MAE (Kelvin)", "y", MetricSeries::mae),
    ("RMSE (Kelvin)", "y2", MetricSeries::rmse),
    ("R² Score", "y3", MetricSeries::r2),
];

/// Vertical extent of each panel, as fractions of the figure height.
const PANEL_DOMAINS: [[f64; 2]; 3] = [[0.70, 1.0], [0.36, 0.64], [0.0, 0.30]];

impl From<MarkerShape> for MarkerSymbol {
    fn from(value: MarkerShape) -> Self {
        match value {
            MarkerShape::Circle => MarkerSymbol::Circle,
            MarkerShape::X => MarkerSymbol::X,
            MarkerShape::Cross => MarkerSymbol::Cross,
            MarkerShape::Square => MarkerSymbol::Square,
            MarkerShape::Diamond => MarkerSymbol::Diamond,
            MarkerShape::TriangleUp => MarkerSymbol::TriangleUp,
        }
    }
}

fn style_for<'c>(config: &'c ComparisonConfig, product: &str) -> Option<&'c ForecastSpec> {
    config.forecasts.iter().find(|f| f.name == product)
}

/// Build the three-panel figure (MAE, RMSE, R²) sharing one time axis.
///
/// Each forecast product gets one line per panel, drawn with the color and
/// marker configured for it; only the top panel's lines appear in the legend.
pub fn build_plot(results: &ComparisonResults, config: &ComparisonConfig) -> Plot {
    let mut plot = Plot::new();

    for series in results.series.iter() {
        let times: Vec<String> = series
            .times()
            .iter()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .collect();
        let mut marker = Marker::new().size(8);
        if let Some(style) = style_for(config, &series.product) {
            marker = marker
                .color(style.color.clone())
                .symbol(MarkerSymbol::from(style.marker));
        }

        for (ipanel, (_, axis_id, metric)) in PANELS.iter().enumerate() {
            let trace = Scatter::new(times.clone(), metric(series))
                .name(&series.product)
                .legend_group(&series.product)
                .show_legend(ipanel == 0)
                .mode(Mode::LinesMarkers)
                .marker(marker.clone())
                .x_axis("x")
                .y_axis(axis_id);
            plot.add_trace(trace);
        }
    }

    let panel_axis = |ipanel: usize| {
        let (label, _, _) = PANELS[ipanel];
        Axis::new()
            .title(Title::new(label))
            .domain(&PANEL_DOMAINS[ipanel])
            .anchor("x")
            .show_grid(true)
    };

    let layout = Layout::new()
        .title(Title::new(&config.output.title))
        .show_legend(true)
        .x_axis(
            Axis::new()
                .title(Title::new("Forecast Valid Time"))
                .anchor("y3")
                .show_grid(true),
        )
        .y_axis(panel_axis(0))
        .y_axis2(panel_axis(1))
        .y_axis3(panel_axis(2));
    plot.set_layout(layout);
    plot
}

/// Build the metrics figure and write it as a PNG to the configured output path.
///
/// Returns the path of the written image. Any existing file there is removed
/// first, so a failed export never leaves an older plot looking current.
pub fn render_metrics(
    results: &ComparisonResults,
    config: &ComparisonConfig,
) -> Result<PathBuf, PlotError> {
    let plot = build_plot(results, config);
    write_png(&plot, &config.output.plot, config.output.width, config.output.height)
}

fn write_png(plot: &Plot, path: &Path, width: usize, height: usize) -> Result<PathBuf, PlotError> {
    // The image exporter always gives the file the extension of the format
    let dest = path.with_extension("png");
    if dest.exists() {
        std::fs::remove_file(&dest).map_err(|source| PlotError::RemoveStale {
            path: dest.clone(),
            source,
        })?;
    }

    log::debug!("Writing {width} x {height} plot to {}", dest.display());
    // The exporter panics if it cannot run or write the image
    let export = std::panic::catch_unwind(AssertUnwindSafe(|| {
        plot.write_image(path, ImageFormat::PNG, width, height, 1.0)
    }));
    if let Err(payload) = export {
        let reason = payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(PlotError::Export { path: dest, reason });
    }

    check_written(&dest)?;
    Ok(dest)
}

/// Confirm that the exporter produced a non-empty file at `path`.
fn check_written(path: &Path) -> Result<(), PlotError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(PlotError::NotWritten(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRecord;
    use crate::test_utils::hourly_times;

    fn results() -> ComparisonResults {
        let times = hourly_times(2, 6);
        let series = ["IFS", "AIFS"]
            .into_iter()
            .map(|product| MetricSeries {
                product: product.to_string(),
                records: times
                    .iter()
                    .map(|&time| MetricRecord {
                        time,
                        mae: 1.0,
                        rmse: 1.5,
                        r2: 0.9,
                        n_valid: 4,
                    })
                    .collect(),
            })
            .collect();
        ComparisonResults {
            truth: "ERA5".to_string(),
            variable: "t2m".to_string(),
            times,
            series,
        }
    }

    #[test]
    fn test_build_plot_layout() {
        let config = ComparisonConfig::default();
        let json = build_plot(&results(), &config).to_json();

        for label in ["MAE (Kelvin)", "RMSE (Kelvin)", "R² Score", "Forecast Valid Time"] {
            assert!(json.contains(label), "missing axis label {label}");
        }
        assert!(json.contains("Forecast Error Metrics vs ERA5 Ground Truth"));
        assert!(json.contains("\"y3\""));
        assert!(json.contains("2026-01-01 06:00:00"));
        assert!(json.contains("\"blue\""));
        assert!(json.contains("\"red\""));
    }

    #[test]
    fn test_check_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part1_results.png");
        assert!(matches!(check_written(&path), Err(PlotError::NotWritten(_))));

        std::fs::write(&path, b"").unwrap();
        assert!(matches!(check_written(&path), Err(PlotError::NotWritten(_))));

        std::fs::write(&path, b"\x89PNG").unwrap();
        assert!(check_written(&path).is_ok());
    }

    #[test]
    fn test_render_to_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the output directory should be
        let blocker = dir.path().join("plots");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut config = ComparisonConfig::default();
        config.output.plot = blocker.join("part1_results.png");
        assert!(render_metrics(&results(), &config).is_err());
    }
}
