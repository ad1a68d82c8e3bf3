use num_traits::Float;

/// Target coordinates this close to either end of a source axis are treated
/// as lying on it. Grids from different providers often disagree in the last
/// few bits of their edge coordinates.
const EDGE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum InterpolationError {
    #[error("Input coordinate is not strictly monotonic at index {index}")]
    NotMonotonic { index: usize },
}

/// Verify that `axis` is strictly increasing or strictly decreasing.
pub fn check_monotonic<F: Float>(axis: &[F]) -> Result<(), InterpolationError> {
    if axis.len() < 2 {
        return Ok(());
    }
    let ascending = axis[1] > axis[0];
    for (i, w) in axis.windows(2).enumerate() {
        let ok = if ascending { w[1] > w[0] } else { w[1] < w[0] };
        if !ok {
            return Err(InterpolationError::NotMonotonic { index: i + 1 });
        }
    }
    Ok(())
}

/// The two neighbors of a point on a monotonic axis and the weight of the upper one.
///
/// The interpolated value is `(1 - weight) * y[lower] + weight * y[upper]`.
/// A point that falls exactly on an axis value has `lower == upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

impl Bracket {
    /// Locate `x` on `axis`, which must be strictly monotonic (ascending or descending).
    ///
    /// Returns `None` if `x` is NaN, the axis is empty, or `x` is outside the axis.
    pub fn find(axis: &[f64], x: f64) -> Option<Self> {
        let n = axis.len();
        if n == 0 || x.is_nan() {
            return None;
        }

        let (lo, hi) = if axis[0] <= axis[n - 1] {
            (axis[0], axis[n - 1])
        } else {
            (axis[n - 1], axis[0])
        };
        if x < lo - EDGE_TOLERANCE || x > hi + EDGE_TOLERANCE {
            return None;
        }
        let x = x.clamp(lo, hi);

        let ascending = n < 2 || axis[1] > axis[0];
        // First index at or past x, in the direction the axis runs
        let idx = if ascending {
            axis.partition_point(|&v| v < x)
        } else {
            axis.partition_point(|&v| v > x)
        };

        if idx < n && (axis[idx] - x).abs() <= EDGE_TOLERANCE {
            return Some(Self {
                lower: idx,
                upper: idx,
                weight: 0.0,
            });
        }

        // Since x is clamped inside the axis and not equal to axis[idx], 0 < idx < n
        let lower = idx - 1;
        let upper = idx;
        let weight = (x - axis[lower]) / (axis[upper] - axis[lower]);
        Some(Self {
            lower,
            upper,
            weight,
        })
    }

    /// Combine the values at the lower and upper neighbors.
    ///
    /// A neighbor with zero weight does not contribute, so a NaN there does not
    /// make the result NaN.
    pub fn apply(&self, y_lower: f64, y_upper: f64) -> f64 {
        if self.lower == self.upper || self.weight == 0.0 {
            y_lower
        } else if self.weight == 1.0 {
            y_upper
        } else {
            (1.0 - self.weight) * y_lower + self.weight * y_upper
        }
    }
}
