//! Forecast verification metrics: MAE, RMSE, and R².
//!
//! Metrics are computed per timestep on 2D (lat, lon) slices. Before
//! comparing, both slices are flattened and every position where either the
//! forecast or the truth is NaN is dropped (e.g. when one product masks the
//! ocean and the other does not).
//!
//! Degenerate slices never cause a panic:
//!
//! - with no valid positions, MAE, RMSE, and R² are all NaN;
//! - with one valid position, MAE and RMSE are defined but R² is NaN;
//! - if the truth is constant over two or more valid positions, R² is 1 for a
//!   perfect forecast and 0 otherwise.
use chrono::NaiveDateTime;
use ndarray::{ArrayView2, ArrayView3, Axis};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Forecast slice has shape {forecast:?} but truth slice has shape {truth:?}")]
    ShapeMismatch {
        forecast: Vec<usize>,
        truth: Vec<usize>,
    },
    #[error("Expected {expected} timesteps in both fields, got {forecast} (forecast) and {truth} (truth)")]
    TimeLengthMismatch {
        expected: usize,
        forecast: usize,
        truth: usize,
    },
}

/// Paired forecast and truth values at positions where both are defined
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidPairs {
    pub forecast: Vec<f64>,
    pub truth: Vec<f64>,
}

impl ValidPairs {
    pub fn len(&self) -> usize {
        self.truth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.truth.is_empty()
    }
}

/// Flatten two slices and keep only positions where neither is NaN.
pub fn mask_valid(
    forecast: ArrayView2<f64>,
    truth: ArrayView2<f64>,
) -> Result<ValidPairs, MetricsError> {
    if forecast.shape() != truth.shape() {
        return Err(MetricsError::ShapeMismatch {
            forecast: forecast.shape().to_vec(),
            truth: truth.shape().to_vec(),
        });
    }

    let mut pairs = ValidPairs::default();
    for (&f, &t) in forecast.iter().zip(truth.iter()) {
        if !f.is_nan() && !t.is_nan() {
            pairs.forecast.push(f);
            pairs.truth.push(t);
        }
    }
    Ok(pairs)
}

/// Mean of |f - t|; NaN for empty input.
pub fn mean_absolute_error(forecast: &[f64], truth: &[f64]) -> f64 {
    if truth.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = forecast.iter().zip(truth).map(|(f, t)| (f - t).abs()).sum();
    sum / truth.len() as f64
}

/// Square root of the mean of (f - t)²; NaN for empty input.
pub fn root_mean_square_error(forecast: &[f64], truth: &[f64]) -> f64 {
    if truth.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = forecast.iter().zip(truth).map(|(f, t)| (f - t).powi(2)).sum();
    (sum / truth.len() as f64).sqrt()
}

/// Coefficient of determination, 1 - SS_res / SS_tot, with SS_tot taken about
/// the mean of the truth.
///
/// NaN for fewer than two values. When SS_tot is zero the score is 1 for a
/// perfect forecast and 0 otherwise.
pub fn r2_score(forecast: &[f64], truth: &[f64]) -> f64 {
    let n = truth.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = truth.iter().sum::<f64>() / n as f64;
    let ss_res: f64 = forecast.iter().zip(truth).map(|(f, t)| (t - f).powi(2)).sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Verification scores for one forecast product at one time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricRecord {
    pub time: NaiveDateTime,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Number of positions where both forecast and truth were defined
    pub n_valid: usize,
}

/// Compute the scores for a single pair of (lat, lon) slices.
pub fn slice_metrics(
    time: NaiveDateTime,
    forecast: ArrayView2<f64>,
    truth: ArrayView2<f64>,
) -> Result<MetricRecord, MetricsError> {
    let pairs = mask_valid(forecast, truth)?;
    if pairs.len() < 2 {
        log::warn!(
            "Only {} valid grid cell(s) at {time}, some metrics will be NaN",
            pairs.len()
        );
    }
    Ok(MetricRecord {
        time,
        mae: mean_absolute_error(&pairs.forecast, &pairs.truth),
        rmse: root_mean_square_error(&pairs.forecast, &pairs.truth),
        r2: r2_score(&pairs.forecast, &pairs.truth),
        n_valid: pairs.len(),
    })
}

/// Lazily compute one [`MetricRecord`] per timestep of two (time, lat, lon) fields.
///
/// Both fields must have one entry along the time axis per element of `times`.
pub fn iter_metrics<'a>(
    forecast: ArrayView3<'a, f64>,
    truth: ArrayView3<'a, f64>,
    times: &'a [NaiveDateTime],
) -> Result<impl Iterator<Item = Result<MetricRecord, MetricsError>> + 'a, MetricsError> {
    let (nf, nt) = (forecast.len_of(Axis(0)), truth.len_of(Axis(0)));
    if nf != times.len() || nt != times.len() {
        return Err(MetricsError::TimeLengthMismatch {
            expected: times.len(),
            forecast: nf,
            truth: nt,
        });
    }

    Ok(times.iter().enumerate().map(move |(i, &t)| {
        slice_metrics(
            t,
            forecast.index_axis_move(Axis(0), i),
            truth.index_axis_move(Axis(0), i),
        )
    }))
}

/// All per-timestep scores for one forecast product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub product: String,
    pub records: Vec<MetricRecord>,
}

impl MetricSeries {
    /// Compute the series for `product` by evaluating [`iter_metrics`] to completion.
    pub fn compute<'a, S: ToString>(
        product: S,
        forecast: ArrayView3<'a, f64>,
        truth: ArrayView3<'a, f64>,
        times: &'a [NaiveDateTime],
    ) -> Result<Self, MetricsError> {
        let records = iter_metrics(forecast, truth, times)?.collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            product: product.to_string(),
            records,
        })
    }

    pub fn times(&self) -> Vec<NaiveDateTime> {
        self.records.iter().map(|r| r.time).collect()
    }

    pub fn mae(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.mae).collect()
    }

    pub fn rmse(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.rmse).collect()
    }

    pub fn r2(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.r2).collect()
    }
}

/// Mean of the non-NaN values, or NaN if there are none.
pub fn nan_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::hourly_times;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array3};
    use rstest::rstest;

    #[rstest]
    #[case(&[1.0, 2.0, 3.0, 4.0], &[1.5, 1.0, 3.0, 6.0])]
    #[case(&[273.0, 274.5, 280.0], &[272.0, 276.0, 279.5])]
    #[case(&[0.0, 0.0, 0.0, 0.0, 10.0], &[1.0, 1.0, 1.0, 1.0, 1.0])]
    #[case(&[-3.0, 2.0], &[3.0, -2.0])]
    fn test_rmse_at_least_mae(#[case] forecast: &[f64], #[case] truth: &[f64]) {
        let mae = mean_absolute_error(forecast, truth);
        let rmse = root_mean_square_error(forecast, truth);
        assert!(mae >= 0.0);
        assert!(rmse >= 0.0);
        assert!(rmse >= mae - 1e-12, "RMSE ({rmse}) < MAE ({mae})");
    }

    #[test]
    fn test_rmse_at_least_mae_generated() {
        let mut state: u64 = 88172645463325252;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 10_000) as f64 / 100.0
        };
        for n in 1..50 {
            let f: Vec<f64> = (0..n).map(|_| next()).collect();
            let t: Vec<f64> = (0..n).map(|_| next()).collect();
            let mae = mean_absolute_error(&f, &t);
            let rmse = root_mean_square_error(&f, &t);
            assert!(mae >= 0.0 && rmse >= 0.0);
            assert!(rmse >= mae - 1e-12, "RMSE ({rmse}) < MAE ({mae}) for n = {n}");
        }
    }

    #[test]
    fn test_r2_perfect_forecast() {
        let t = [271.2, 275.9, 268.4, 280.0];
        assert_eq!(r2_score(&t, &t), 1.0);
    }

    #[test]
    fn test_r2_hand_computed() {
        // mean = 2.5, SS_tot = 2.25 + 0.25 + 0.25 + 2.25 = 5, SS_res = 0.25 + 0 + 1 + 0 = 1.25
        let t = [1.0, 2.0, 3.0, 4.0];
        let f = [1.5, 2.0, 2.0, 4.0];
        assert_abs_diff_eq!(r2_score(&f, &t), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_slices() {
        assert!(mean_absolute_error(&[], &[]).is_nan());
        assert!(root_mean_square_error(&[], &[]).is_nan());
        assert!(r2_score(&[], &[]).is_nan());

        assert_abs_diff_eq!(mean_absolute_error(&[2.0], &[1.0]), 1.0);
        assert_abs_diff_eq!(root_mean_square_error(&[2.0], &[1.0]), 1.0);
        assert!(r2_score(&[2.0], &[1.0]).is_nan());

        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2_score(&[5.0, 6.0], &[5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_mask_excludes_union_of_nans() {
        let nan = f64::NAN;
        // truth NaN at 0 and 4, forecast NaN at 4 and 7: union is {0, 4, 7}
        let truth =
            Array2::from_shape_vec((3, 3), vec![nan, 1.0, 2.0, 3.0, nan, 5.0, 6.0, 7.0, 8.0])
                .unwrap();
        let forecast =
            Array2::from_shape_vec((3, 3), vec![0.5, 1.5, 2.5, 3.5, nan, 5.5, 6.5, nan, 8.5])
                .unwrap();

        let pairs = mask_valid(forecast.view(), truth.view()).unwrap();
        assert_eq!(pairs.len(), 9 - 3);
        assert_eq!(pairs.truth, vec![1.0, 2.0, 3.0, 5.0, 6.0, 8.0]);
        assert_eq!(pairs.forecast, vec![1.5, 2.5, 3.5, 5.5, 6.5, 8.5]);

        let rec = slice_metrics(hourly_times(1, 6)[0], forecast.view(), truth.view()).unwrap();
        assert_eq!(rec.n_valid, 6);
        assert_abs_diff_eq!(rec.mae, 0.5);
    }

    #[test]
    fn test_all_masked_slice_gives_nan() {
        let truth = Array2::from_elem((2, 2), f64::NAN);
        let forecast = Array2::from_elem((2, 2), 1.0);
        let rec = slice_metrics(hourly_times(1, 6)[0], forecast.view(), truth.view()).unwrap();
        assert_eq!(rec.n_valid, 0);
        assert!(rec.mae.is_nan() && rec.rmse.is_nan() && rec.r2.is_nan());
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            mask_valid(a.view(), b.view()),
            Err(MetricsError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_series_constant_offset() {
        let times = hourly_times(2, 6);
        let truth = Array3::from_shape_vec(
            (2, 2, 2),
            vec![270.0, 272.0, 274.0, 276.0, 271.0, 273.0, 275.0, 277.0],
        )
        .unwrap();
        let forecast = &truth + 1.0;

        let series = MetricSeries::compute("IFS", forecast.view(), truth.view(), &times).unwrap();
        assert_eq!(series.times(), times);
        for rec in series.records.iter() {
            assert_abs_diff_eq!(rec.mae, 1.0);
            assert_abs_diff_eq!(rec.rmse, 1.0);
            // SS_tot = 9 + 1 + 1 + 9 = 20, SS_res = 4
            assert_abs_diff_eq!(rec.r2, 0.8, epsilon = 1e-12);
        }
    }

    /// Views borrowed from owners with unrelated lifetimes, as in the comparison pipeline
    fn score_views<'a>(
        forecast: ArrayView3<'a, f64>,
        truth: ArrayView3<'a, f64>,
        times: &'a [NaiveDateTime],
    ) -> MetricSeries {
        MetricSeries::compute("AIFS", forecast, truth, times).unwrap()
    }

    #[test]
    fn test_series_from_independent_borrows() {
        let truth = Array3::from_elem((2, 2, 2), 275.0);
        let series = {
            let times = hourly_times(2, 6);
            let forecast = Array3::from_elem((2, 2, 2), 273.0);
            score_views(forecast.view(), truth.view(), &times)
        };
        assert_eq!(series.records.len(), 2);
        assert_abs_diff_eq!(series.records[0].mae, 2.0);
        assert_abs_diff_eq!(series.records[1].rmse, 2.0);
    }

    #[test]
    fn test_iter_metrics_length_check() {
        let times = hourly_times(3, 6);
        let field = Array3::<f64>::zeros((2, 2, 2));
        assert!(matches!(
            iter_metrics(field.view(), field.view(), &times),
            Err(MetricsError::TimeLengthMismatch { expected: 3, .. })
        ));
    }

    #[test]
    fn test_nan_mean() {
        assert_abs_diff_eq!(nan_mean(&[1.0, f64::NAN, 3.0]), 2.0);
        assert!(nan_mean(&[f64::NAN]).is_nan());
        assert!(nan_mean(&[]).is_nan());
    }
}
