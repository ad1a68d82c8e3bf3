//! Normalization of coordinate/variable names and checks that required
//! variables are present.
//!
//! Different data providers name the same quantity differently: the CDS
//! netCDF files call the time coordinate `valid_time` and 2-meter temperature
//! may be `2t` rather than `t2m`. [`Aliases`] maps such names onto the
//! canonical ones, and [`check_variable`] reports whether a dataset exposes a
//! required variable once normalized.
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::GriddedDataset;

/// Alias → canonical name mappings for coordinates and data variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aliases {
    #[serde(default)]
    pub coordinates: IndexMap<String, String>,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

impl Default for Aliases {
    fn default() -> Self {
        Self {
            coordinates: IndexMap::from([("valid_time".to_string(), "time".to_string())]),
            variables: IndexMap::from([("2t".to_string(), "t2m".to_string())]),
        }
    }
}

/// A single rename carried out by [`Aliases::normalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
    pub is_coordinate: bool,
}

impl Aliases {
    /// Rename any aliased coordinates and variables in `ds` to their canonical names.
    ///
    /// Returns the renames that were applied. An alias whose canonical name is
    /// already taken by another variable is left alone (with a warning), so the
    /// existing variable is never overwritten. Applying this twice gives the same
    /// result as applying it once.
    pub fn normalize(&self, ds: &mut GriddedDataset) -> Vec<Rename> {
        let mut renames = vec![];

        for (alias, canonical) in self.coordinates.iter() {
            if alias == canonical || !ds.has_coordinate(alias) {
                continue;
            }
            if ds.has_coordinate(canonical) {
                log::warn!(
                    "{} dataset has both '{alias}' and '{canonical}' coordinates, not renaming",
                    ds.name()
                );
                continue;
            }
            ds.rename_coordinate(alias, canonical);
            renames.push(Rename {
                from: alias.clone(),
                to: canonical.clone(),
                is_coordinate: true,
            });
        }

        for (alias, canonical) in self.variables.iter() {
            if alias == canonical || !ds.has_variable(alias) {
                continue;
            }
            if ds.rename_variable(alias, canonical) {
                renames.push(Rename {
                    from: alias.clone(),
                    to: canonical.clone(),
                    is_coordinate: false,
                });
            } else {
                log::warn!(
                    "{} dataset has both '{alias}' and '{canonical}' variables, not renaming",
                    ds.name()
                );
            }
        }

        for r in renames.iter() {
            let kind = if r.is_coordinate { "coordinate" } else { "variable" };
            log::debug!("Renamed {kind} '{}' to '{}' in {} dataset", r.from, r.to, ds.name());
        }

        renames
    }
}

/// Outcome of checking a dataset for a required variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCheck {
    Present,
    Missing {
        variable: String,
        available: Vec<String>,
    },
}

impl SchemaCheck {
    pub fn is_present(&self) -> bool {
        matches!(self, SchemaCheck::Present)
    }
}

/// Check whether `ds` exposes `variable` by exactly that name.
pub fn check_variable(ds: &GriddedDataset, variable: &str) -> SchemaCheck {
    if ds.has_variable(variable) {
        SchemaCheck::Present
    } else {
        SchemaCheck::Missing {
            variable: variable.to_string(),
            available: ds.variable_names().into_iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{hourly_times, ramp_dataset};

    fn era5_like() -> GriddedDataset {
        ramp_dataset("ERA5", hourly_times(2, 6), "2t").with_coordinate_names(
            "valid_time",
            "latitude",
            "longitude",
        )
    }

    #[test]
    fn test_normalize_era5_names() {
        let mut ds = era5_like();
        let renames = Aliases::default().normalize(&mut ds);
        assert_eq!(renames.len(), 2);
        assert_eq!(ds.coordinate_names(), ["time", "latitude", "longitude"]);
        assert_eq!(ds.variable_names(), vec!["t2m"]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let aliases = Aliases::default();
        let mut once = era5_like();
        aliases.normalize(&mut once);
        let mut twice = once.clone();
        let renames = aliases.normalize(&mut twice);
        assert!(renames.is_empty());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_canonical_dataset_unchanged() {
        let original = ramp_dataset("IFS", hourly_times(2, 6), "t2m");
        let mut ds = original.clone();
        let renames = Aliases::default().normalize(&mut ds);
        assert!(renames.is_empty());
        assert_eq!(ds, original);
    }

    #[test]
    fn test_normalize_does_not_clobber() {
        let mut ds = era5_like()
            .with_field("t2m", ndarray::Array3::zeros((2, 2, 2)))
            .unwrap();
        Aliases::default().normalize(&mut ds);
        assert_eq!(ds.variable_names(), vec!["2t", "t2m"]);
    }

    #[test]
    fn test_check_variable() {
        let ds = era5_like();
        assert_eq!(
            check_variable(&ds, "t2m"),
            SchemaCheck::Missing {
                variable: "t2m".to_string(),
                available: vec!["2t".to_string()]
            }
        );
        assert!(check_variable(&ds, "2t").is_present());
    }

    #[test]
    fn test_aliases_from_toml() {
        let s = r#"
            [coordinates]
            valid_time = "time"
            lat = "latitude"

            [variables]
            "2t" = "t2m"
        "#;
        let aliases: Aliases = toml::from_str(s).unwrap();
        assert_eq!(aliases.coordinates.get("lat").map(|s| s.as_str()), Some("latitude"));
        assert_eq!(aliases.variables.get("2t").map(|s| s.as_str()), Some("t2m"));
    }
}
