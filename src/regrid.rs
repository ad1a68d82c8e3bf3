//! Bilinear regridding of one dataset's fields onto another dataset's
//! latitude/longitude grid.
use ndarray::{Array3, ArrayView1, ArrayView3};

use crate::dataset::GriddedDataset;
use crate::error::DatasetError;
use crate::interpolation::{check_monotonic, Bracket, InterpolationError};

#[derive(Debug, thiserror::Error)]
pub enum RegridError {
    #[error("The {axis} axis of the {dataset} grid is invalid: {source}")]
    BadAxis {
        dataset: String,
        axis: &'static str,
        source: InterpolationError,
    },
    #[error("The {dataset} grid has an empty {axis} axis")]
    EmptyAxis { dataset: String, axis: &'static str },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Brackets for every target coordinate; `None` where the target lies outside the source axis.
fn axis_brackets(source: ArrayView1<f64>, target: ArrayView1<f64>) -> Vec<Option<Bracket>> {
    let source = source.to_vec();
    target.iter().map(|&x| Bracket::find(&source, x)).collect()
}

/// Interpolate a (time, lat, lon) field onto new latitude and longitude coordinates.
///
/// Each target cell is the bilinear combination of the four surrounding
/// source cells. Target cells outside the source grid, and cells whose
/// contributing neighbors include a NaN, are NaN. Neighbors with zero weight
/// (e.g. when a target coordinate coincides with a source coordinate) do not
/// contribute. The source axes may be ascending or descending.
pub fn regrid_field(
    field: ArrayView3<f64>,
    src_lat: ArrayView1<f64>,
    src_lon: ArrayView1<f64>,
    dst_lat: ArrayView1<f64>,
    dst_lon: ArrayView1<f64>,
) -> Array3<f64> {
    let lat_brackets = axis_brackets(src_lat, dst_lat);
    let lon_brackets = axis_brackets(src_lon, dst_lon);
    let ntime = field.len_of(ndarray::Axis(0));

    Array3::from_shape_fn((ntime, dst_lat.len(), dst_lon.len()), |(it, iy, ix)| {
        let (Some(by), Some(bx)) = (lat_brackets[iy], lon_brackets[ix]) else {
            return f64::NAN;
        };
        let lower_row = bx.apply(field[[it, by.lower, bx.lower]], field[[it, by.lower, bx.upper]]);
        if by.lower == by.upper || by.weight == 0.0 {
            return lower_row;
        }
        let upper_row = bx.apply(field[[it, by.upper, bx.lower]], field[[it, by.upper, bx.upper]]);
        by.apply(lower_row, upper_row)
    })
}

fn check_axis(
    dataset: &str,
    axis: &'static str,
    values: ArrayView1<f64>,
) -> Result<(), RegridError> {
    if values.is_empty() {
        return Err(RegridError::EmptyAxis {
            dataset: dataset.to_string(),
            axis,
        });
    }
    check_monotonic(&values.to_vec()).map_err(|source| RegridError::BadAxis {
        dataset: dataset.to_string(),
        axis,
        source,
    })
}

/// Interpolate every field of `source` onto the latitude/longitude grid of `target`.
///
/// The time axis is left untouched; align the times first with
/// [`crate::time_match::subset_to_times`].
pub fn regrid_like(
    source: &GriddedDataset,
    target: &GriddedDataset,
) -> Result<GriddedDataset, RegridError> {
    check_axis(source.name(), "latitude", source.latitudes())?;
    check_axis(source.name(), "longitude", source.longitudes())?;
    check_axis(target.name(), "latitude", target.latitudes())?;
    check_axis(target.name(), "longitude", target.longitudes())?;

    let mut out = source.empty_on_grid(
        target.latitudes().to_owned(),
        target.longitudes().to_owned(),
    );
    for (name, field) in source.fields() {
        let regridded = regrid_field(
            field,
            source.latitudes(),
            source.longitudes(),
            target.latitudes(),
            target.longitudes(),
        );
        out.add_field(name, regridded)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dataset_from_fn, hourly_times};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    /// A field linear in lat and lon is reproduced exactly by bilinear interpolation
    fn plane(lat: f64, lon: f64, it: usize) -> f64 {
        280.0 + 0.5 * lat - 0.25 * lon + it as f64
    }

    #[test]
    fn test_regrid_linear_field() {
        let src_lat = array![50.0, 49.0, 48.0];
        let src_lon = array![0.0, 1.0, 2.0];
        let (la, lo) = (src_lat.clone(), src_lon.clone());
        let source = dataset_from_fn(
            "IFS",
            hourly_times(2, 6),
            src_lat,
            src_lon,
            "t2m",
            |it, iy, ix| plane(la[iy], lo[ix], it),
        );

        let dst_lat = array![49.75, 48.5];
        let dst_lon = array![0.25, 1.0, 1.9];
        let target = dataset_from_fn(
            "ERA5",
            hourly_times(2, 6),
            dst_lat.clone(),
            dst_lon.clone(),
            "t2m",
            |_, _, _| 0.0,
        );

        let out = regrid_like(&source, &target).unwrap();
        let field = out.field("t2m").unwrap();
        assert_eq!(field.dim(), (2, 2, 3));
        assert_eq!(out.name(), "IFS");
        for it in 0..2 {
            for (iy, &lat) in dst_lat.iter().enumerate() {
                for (ix, &lon) in dst_lon.iter().enumerate() {
                    assert_abs_diff_eq!(field[[it, iy, ix]], plane(lat, lon, it), epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_regrid_outside_domain_is_nan() {
        let field = Array3::from_elem((1, 2, 2), 1.0);
        let out = regrid_field(
            field.view(),
            array![0.0, 1.0].view(),
            array![0.0, 1.0].view(),
            array![0.5, 1.5].view(),
            array![0.5].view(),
        );
        assert_abs_diff_eq!(out[[0, 0, 0]], 1.0);
        assert!(out[[0, 1, 0]].is_nan());
    }

    #[test]
    fn test_regrid_nan_neighbors() {
        let mut field = Array3::from_elem((1, 2, 2), 2.0);
        field[[0, 1, 1]] = f64::NAN;
        let lat = array![0.0, 1.0];
        let lon = array![0.0, 1.0];

        // On the source grid points, only the NaN point itself is NaN
        let out = regrid_field(field.view(), lat.view(), lon.view(), lat.view(), lon.view());
        assert_abs_diff_eq!(out[[0, 0, 0]], 2.0);
        assert_abs_diff_eq!(out[[0, 0, 1]], 2.0);
        assert_abs_diff_eq!(out[[0, 1, 0]], 2.0);
        assert!(out[[0, 1, 1]].is_nan());

        // Between points, a NaN neighbor propagates
        let out = regrid_field(
            field.view(),
            lat.view(),
            lon.view(),
            array![0.5].view(),
            array![0.5].view(),
        );
        assert!(out[[0, 0, 0]].is_nan());
    }

    #[test]
    fn test_regrid_rejects_bad_axis() {
        let source = dataset_from_fn(
            "AIFS",
            hourly_times(1, 6),
            Array1::from(vec![1.0, 3.0, 2.0]),
            Array1::from(vec![0.0, 1.0]),
            "t2m",
            |_, _, _| 0.0,
        );
        let target = source.clone();
        let err = regrid_like(&source, &target).unwrap_err();
        assert!(matches!(err, RegridError::BadAxis { axis: "latitude", .. }));
    }
}
