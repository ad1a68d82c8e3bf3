//! Common errors across the fcst-verify crate

/// Errors related to decoding and working with datetimes
#[derive(Debug, thiserror::Error)]
pub enum DateTimeError {
    #[error("'{0}' is not a CF time units string (expected '<unit> since <reference date>')")]
    InvalidUnits(String),
    #[error("Unknown time unit '{0}', expected seconds, minutes, hours, or days")]
    UnknownTimeUnit(String),
    #[error("Could not parse '{0}' as a reference date")]
    InvalidReference(String),
    #[error("Time offset {offset} {unit} cannot be represented as a datetime")]
    OutOfRange { offset: f64, unit: String },
}

/// Errors constructing or subsetting a [`crate::dataset::GriddedDataset`]
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Field '{variable}' has shape {got:?}, but the {dataset} grid is (time, lat, lon) = {expected:?}")]
    ShapeMismatch {
        dataset: String,
        variable: String,
        expected: (usize, usize, usize),
        got: Vec<usize>,
    },
    #[error("Time {time} is not present in the {dataset} dataset")]
    MissingTimestamp {
        dataset: String,
        time: chrono::NaiveDateTime,
    },
    #[error("Variable '{variable}' not found in the {dataset} dataset")]
    MissingVariable { dataset: String, variable: String },
}
