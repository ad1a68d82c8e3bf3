//! Matching timestamps across datasets.
use std::collections::BTreeSet;
use std::io::Write;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::dataset::GriddedDataset;
use crate::error::DatasetError;
use crate::time_coords::{format_timestamp, format_timestamp_list};

#[derive(Debug, thiserror::Error)]
pub enum TimeMatchError {
    #[error("No matching times found between the {} datasets!\n{}", dataset_names(.datasets), dump_times(.datasets))]
    NoCommonTimes {
        datasets: Vec<(String, Vec<NaiveDateTime>)>,
    },
    #[error("Time {time} is shared by the reference datasets but missing from the {dataset} dataset")]
    MissingTimestamp { dataset: String, time: NaiveDateTime },
}

fn dataset_names(datasets: &[(String, Vec<NaiveDateTime>)]) -> String {
    let names: Vec<&str> = datasets.iter().map(|(n, _)| n.as_str()).collect();
    match names.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn dump_times(datasets: &[(String, Vec<NaiveDateTime>)]) -> String {
    datasets
        .iter()
        .map(|(name, times)| format!("  {name} times: {}", format_timestamp_list(times)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Which datasets contribute to the set of common timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AlignmentMode {
    /// Intersect the timestamps of the ground truth and every forecast.
    #[default]
    AllDatasets,
    /// Intersect only the ground truth and the first forecast. The remaining
    /// forecasts are subset to those times and must contain all of them.
    ReferencePair,
}

/// The sorted, duplicate-free intersection of two timestamp sequences.
pub fn intersect_times(a: &[NaiveDateTime], b: &[NaiveDateTime]) -> Vec<NaiveDateTime> {
    let a: BTreeSet<_> = a.iter().copied().collect();
    let b: BTreeSet<_> = b.iter().copied().collect();
    a.intersection(&b).copied().collect()
}

/// The sorted, duplicate-free intersection of any number of timestamp sequences.
///
/// An empty iterator yields an empty intersection.
pub fn intersect_many<'a, I>(sequences: I) -> Vec<NaiveDateTime>
where
    I: IntoIterator<Item = &'a [NaiveDateTime]>,
{
    let mut it = sequences.into_iter();
    let Some(first) = it.next() else {
        return vec![];
    };
    let mut common: BTreeSet<NaiveDateTime> = first.iter().copied().collect();
    for seq in it {
        let other: BTreeSet<_> = seq.iter().copied().collect();
        common.retain(|t| other.contains(t));
    }
    common.into_iter().collect()
}

/// Compute the intersection of the named timestamp sequences, failing if it is empty.
///
/// The error carries every input sequence so that the caller can report them.
pub fn require_common_times(
    named: &[(&str, &[NaiveDateTime])],
) -> Result<Vec<NaiveDateTime>, TimeMatchError> {
    let common = intersect_many(named.iter().map(|(_, t)| *t));
    if common.is_empty() {
        return Err(TimeMatchError::NoCommonTimes {
            datasets: named
                .iter()
                .map(|(n, t)| (n.to_string(), t.to_vec()))
                .collect(),
        });
    }
    Ok(common)
}

/// Find the timestamps to analyze for a truth dataset and its forecasts.
pub fn find_common_times(
    truth: &GriddedDataset,
    forecasts: &[GriddedDataset],
    mode: AlignmentMode,
) -> Result<Vec<NaiveDateTime>, TimeMatchError> {
    let contributors = match mode {
        AlignmentMode::AllDatasets => forecasts,
        AlignmentMode::ReferencePair => &forecasts[..forecasts.len().min(1)],
    };

    let mut named = vec![(truth.name(), truth.times())];
    named.extend(contributors.iter().map(|f| (f.name(), f.times())));
    require_common_times(&named)
}

/// Subset a dataset to `times`, reporting a missing timestamp as a [`TimeMatchError`].
pub fn subset_to_times(
    ds: &GriddedDataset,
    times: &[NaiveDateTime],
) -> Result<GriddedDataset, TimeMatchError> {
    ds.select_times(times).map_err(|e| match e {
        DatasetError::MissingTimestamp { dataset, time } => {
            TimeMatchError::MissingTimestamp { dataset, time }
        }
        other => unreachable!("select_times only fails on missing timestamps, got {other}"),
    })
}

/// Write timestamps one per line with [`format_timestamp`].
pub fn write_times<W: Write>(writer: &mut W, times: &[NaiveDateTime]) -> std::io::Result<()> {
    for t in times {
        writeln!(writer, "{}", format_timestamp(t))?;
    }
    Ok(())
}
