//! Builders for small synthetic datasets shared by the unit tests.
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ndarray::{Array1, Array3};

use crate::dataset::GriddedDataset;

/// `n` times starting at 2026-01-01 00:00, `step_hours` apart
pub(crate) fn hourly_times(n: usize, step_hours: i64) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2026, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| start + TimeDelta::hours(step_hours * i as i64))
        .collect()
}

/// Build a dataset with a single field whose value at (time, lat, lon) is
/// given by `f(it, ilat, ilon)`.
pub(crate) fn dataset_from_fn<F>(
    name: &str,
    times: Vec<NaiveDateTime>,
    latitudes: Array1<f64>,
    longitudes: Array1<f64>,
    variable: &str,
    f: F,
) -> GriddedDataset
where
    F: Fn(usize, usize, usize) -> f64,
{
    let shape = (times.len(), latitudes.len(), longitudes.len());
    let values = Array3::from_shape_fn(shape, |(it, iy, ix)| f(it, iy, ix));
    GriddedDataset::new(name, times, latitudes, longitudes)
        .with_field(variable, values)
        .expect("shape built from the grid should match")
}

/// A 2x2 dataset (descending latitude, like ERA5) with distinct, finite
/// values in every cell.
pub(crate) fn ramp_dataset(
    name: &str,
    times: Vec<NaiveDateTime>,
    variable: &str,
) -> GriddedDataset {
    dataset_from_fn(
        name,
        times,
        Array1::from(vec![45.0, 44.0]),
        Array1::from(vec![5.0, 6.0]),
        variable,
        |it, iy, ix| 270.0 + it as f64 + 0.5 * iy as f64 + 0.25 * ix as f64,
    )
}
