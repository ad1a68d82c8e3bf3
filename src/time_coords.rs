//! Decoding and formatting of CF-convention time coordinates.
//!
//! Time coordinates in netCDF files are stored as numeric offsets from a
//! reference date, described by a `units` attribute such as
//! `"hours since 1900-01-01 00:00:00.0"` or `"seconds since 1970-01-01"`.
//! [`CfTimeUnits`] parses that attribute and converts offsets into
//! [`NaiveDateTime`]s, which are always interpreted as UTC.
use std::{fmt::Display, str::FromStr};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;

use crate::error::DateTimeError;

/// Format used when writing timestamps to text files.
///
/// This is ISO-8601 with nanosecond precision, e.g. `2026-01-01T06:00:00.000000000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";

/// Format a timestamp for output with [`TIMESTAMP_FORMAT`]
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Format a list of timestamps on a single line, for diagnostic messages.
pub fn format_timestamp_list(times: &[NaiveDateTime]) -> String {
    let inner = times
        .iter()
        .map(format_timestamp)
        .collect::<Vec<_>>()
        .join(" ");
    format!("[{inner}]")
}

/// The unit of a CF time offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
            TimeUnit::Days => 86400,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = DateTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "second" | "seconds" | "sec" | "secs" | "s" => Ok(Self::Seconds),
            "minute" | "minutes" | "min" | "mins" => Ok(Self::Minutes),
            "hour" | "hours" | "hr" | "hrs" | "h" => Ok(Self::Hours),
            "day" | "days" | "d" => Ok(Self::Days),
            _ => Err(DateTimeError::UnknownTimeUnit(s.to_string())),
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        write!(f, "{s}")
    }
}

/// A parsed CF time `units` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfTimeUnits {
    pub unit: TimeUnit,
    pub reference: NaiveDateTime,
}

impl CfTimeUnits {
    /// Parse a units string of the form `<unit> since <reference>`.
    ///
    /// The reference may be a bare date or a date and time separated by a space
    /// or `T`, with optional fractional seconds and an optional UTC designator
    /// (`Z`, `UTC`, or `+00:00`).
    pub fn parse(units: &str) -> Result<Self, DateTimeError> {
        let re = Regex::new(r"^\s*([A-Za-z]+)\s+since\s+(.+?)\s*$")
            .expect("CF units regex should be valid");
        let caps = re
            .captures(units)
            .ok_or_else(|| DateTimeError::InvalidUnits(units.to_string()))?;
        let unit = caps[1].parse::<TimeUnit>()?;
        let reference = parse_reference(&caps[2])?;
        Ok(Self { unit, reference })
    }

    /// Convert one offset into a datetime.
    ///
    /// The whole part of the offset is applied exactly; any fractional part
    /// is rounded to the nearest nanosecond.
    pub fn decode(&self, offset: f64) -> Result<NaiveDateTime, DateTimeError> {
        let out_of_range = || DateTimeError::OutOfRange {
            offset,
            unit: self.unit.to_string(),
        };

        if !offset.is_finite() {
            return Err(out_of_range());
        }

        let whole = offset.trunc();
        let frac = offset - whole;
        if whole.abs() > (i64::MAX / self.unit.seconds()) as f64 {
            return Err(out_of_range());
        }

        let whole_delta = TimeDelta::try_seconds(whole as i64 * self.unit.seconds())
            .ok_or_else(out_of_range)?;
        let frac_delta =
            TimeDelta::nanoseconds((frac * self.unit.seconds() as f64 * 1e9).round() as i64);

        self.reference
            .checked_add_signed(whole_delta)
            .and_then(|t| t.checked_add_signed(frac_delta))
            .ok_or_else(out_of_range)
    }

    /// Convert a sequence of offsets into datetimes, stopping at the first failure.
    pub fn decode_all(&self, offsets: &[f64]) -> Result<Vec<NaiveDateTime>, DateTimeError> {
        offsets.iter().map(|&o| self.decode(o)).collect()
    }
}

fn parse_reference(s: &str) -> Result<NaiveDateTime, DateTimeError> {
    let mut cleaned = s.trim();
    for suffix in [" UTC", "UTC", "Z", "+00:00", "+0000", " +00:00"] {
        if let Some(stripped) = cleaned.strip_suffix(suffix) {
            cleaned = stripped.trim_end();
            break;
        }
    }
    let cleaned = cleaned.replacen('T', " ", 1);

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return Ok(t);
        }
    }

    NaiveDate::parse_from_str(&cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| DateTimeError::InvalidReference(s.to_string()))
}
