//! In-memory representation of a gridded (time, latitude, longitude) dataset.
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use ndarray::{Array1, Array3, ArrayView1, ArrayView3, Axis};

use crate::error::DatasetError;

/// A labeled cube of scalar fields sharing one time axis and one regular
/// latitude/longitude grid.
///
/// Every field has shape `(ntime, nlat, nlon)`. Undefined cells are `NaN`.
/// The coordinate names are kept as they were found in the source file
/// (e.g. `valid_time`) so that they can be normalized later; see
/// [`crate::schema::Aliases`].
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedDataset {
    name: String,
    time_name: String,
    lat_name: String,
    lon_name: String,
    times: Vec<NaiveDateTime>,
    latitudes: Array1<f64>,
    longitudes: Array1<f64>,
    fields: IndexMap<String, Array3<f64>>,
}

impl GriddedDataset {
    /// Create a dataset with no fields and the canonical coordinate names
    /// `time`, `latitude`, and `longitude`.
    pub fn new<S: ToString>(
        name: S,
        times: Vec<NaiveDateTime>,
        latitudes: Array1<f64>,
        longitudes: Array1<f64>,
    ) -> Self {
        Self {
            name: name.to_string(),
            time_name: "time".to_string(),
            lat_name: "latitude".to_string(),
            lon_name: "longitude".to_string(),
            times,
            latitudes,
            longitudes,
            fields: IndexMap::new(),
        }
    }

    /// Override the coordinate names, e.g. to record that the source file used `valid_time`.
    pub fn with_coordinate_names<S: ToString>(mut self, time: S, lat: S, lon: S) -> Self {
        self.time_name = time.to_string();
        self.lat_name = lat.to_string();
        self.lon_name = lon.to_string();
        self
    }

    /// Add (or replace) a field. Its shape must match the dataset's grid.
    pub fn add_field<S: ToString>(
        &mut self,
        name: S,
        values: Array3<f64>,
    ) -> Result<(), DatasetError> {
        let expected = self.shape();
        if values.dim() != expected {
            return Err(DatasetError::ShapeMismatch {
                dataset: self.name.clone(),
                variable: name.to_string(),
                expected,
                got: values.shape().to_vec(),
            });
        }
        self.fields.insert(name.to_string(), values);
        Ok(())
    }

    /// Builder form of [`GriddedDataset::add_field`]
    pub fn with_field<S: ToString>(
        mut self,
        name: S,
        values: Array3<f64>,
    ) -> Result<Self, DatasetError> {
        self.add_field(name, values)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shape every field must have, `(ntime, nlat, nlon)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.times.len(), self.latitudes.len(), self.longitudes.len())
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn latitudes(&self) -> ArrayView1<'_, f64> {
        self.latitudes.view()
    }

    pub fn longitudes(&self) -> ArrayView1<'_, f64> {
        self.longitudes.view()
    }

    /// Names of the time, latitude, and longitude coordinates, in that order
    pub fn coordinate_names(&self) -> [&str; 3] {
        [&self.time_name, &self.lat_name, &self.lon_name]
    }

    pub fn has_coordinate(&self, name: &str) -> bool {
        self.coordinate_names().contains(&name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Names of the data variables, in the order they were added.
    pub fn variable_names(&self) -> Vec<&str> {
        self.fields.keys().map(|k| k.as_str()).collect()
    }

    pub fn field(&self, name: &str) -> Option<ArrayView3<'_, f64>> {
        self.fields.get(name).map(|f| f.view())
    }

    /// Like [`GriddedDataset::field`], but missing variables are an error.
    pub fn require_field(&self, name: &str) -> Result<ArrayView3<'_, f64>, DatasetError> {
        self.field(name).ok_or_else(|| DatasetError::MissingVariable {
            dataset: self.name.clone(),
            variable: name.to_string(),
        })
    }

    /// Rename a coordinate. Returns `true` if `old` was one of this dataset's coordinates.
    pub fn rename_coordinate(&mut self, old: &str, new: &str) -> bool {
        let slot = if self.time_name == old {
            &mut self.time_name
        } else if self.lat_name == old {
            &mut self.lat_name
        } else if self.lon_name == old {
            &mut self.lon_name
        } else {
            return false;
        };
        *slot = new.to_string();
        true
    }

    /// Rename a data variable, keeping its position. Returns `true` if `old` existed.
    ///
    /// If `new` already exists, nothing is changed and `false` is returned.
    pub fn rename_variable(&mut self, old: &str, new: &str) -> bool {
        if self.fields.contains_key(new) {
            return false;
        }
        let Some(idx) = self.fields.get_index_of(old) else {
            return false;
        };
        let (_, values) = self
            .fields
            .shift_remove_index(idx)
            .expect("index came from get_index_of");
        self.fields.insert(new.to_string(), values);
        let last = self.fields.len() - 1;
        self.fields.move_index(last, idx);
        true
    }

    /// Position of `time` on the time axis, if present
    pub fn time_index(&self, time: &NaiveDateTime) -> Option<usize> {
        self.times.iter().position(|t| t == time)
    }

    /// Create a new dataset containing only the given times, in the given order.
    ///
    /// Every requested time must exist in this dataset; a missing one is an
    /// error rather than being skipped.
    pub fn select_times(&self, times: &[NaiveDateTime]) -> Result<Self, DatasetError> {
        let indices = times
            .iter()
            .map(|t| {
                self.time_index(t).ok_or_else(|| DatasetError::MissingTimestamp {
                    dataset: self.name.clone(),
                    time: *t,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fields = self
            .fields
            .iter()
            .map(|(name, values)| (name.clone(), values.select(Axis(0), &indices)))
            .collect();

        Ok(Self {
            name: self.name.clone(),
            time_name: self.time_name.clone(),
            lat_name: self.lat_name.clone(),
            lon_name: self.lon_name.clone(),
            times: times.to_vec(),
            latitudes: self.latitudes.clone(),
            longitudes: self.longitudes.clone(),
            fields,
        })
    }

    /// Create a dataset with the same name and times as this one, but on a new grid.
    /// The caller is responsible for adding fields of the new shape.
    pub(crate) fn empty_on_grid(&self, latitudes: Array1<f64>, longitudes: Array1<f64>) -> Self {
        Self {
            name: self.name.clone(),
            time_name: self.time_name.clone(),
            lat_name: self.lat_name.clone(),
            lon_name: self.lon_name.clone(),
            times: self.times.clone(),
            latitudes,
            longitudes,
            fields: IndexMap::new(),
        }
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = (&str, ArrayView3<'_, f64>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{hourly_times, ramp_dataset};
    use ndarray::array;

    #[test]
    fn test_add_field_shape_check() {
        let mut ds = GriddedDataset::new(
            "test",
            hourly_times(2, 6),
            array![10.0, 20.0],
            array![0.0, 1.0, 2.0],
        );
        ds.add_field("ok", Array3::zeros((2, 2, 3))).unwrap();
        let err = ds.add_field("bad", Array3::zeros((2, 3, 2))).unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
        assert_eq!(ds.variable_names(), vec!["ok"]);
    }

    #[test]
    fn test_rename_variable_keeps_order() {
        let mut ds = ramp_dataset("test", hourly_times(1, 6), "a")
            .with_field("b", Array3::zeros((1, 2, 2)))
            .unwrap()
            .with_field("c", Array3::zeros((1, 2, 2)))
            .unwrap();
        assert!(ds.rename_variable("b", "renamed"));
        assert_eq!(ds.variable_names(), vec!["a", "renamed", "c"]);

        // Neither a missing source nor an existing destination changes anything
        assert!(!ds.rename_variable("missing", "x"));
        assert!(!ds.rename_variable("a", "c"));
        assert_eq!(ds.variable_names(), vec!["a", "renamed", "c"]);
    }

    #[test]
    fn test_require_field() {
        let ds = ramp_dataset("ERA5", hourly_times(1, 6), "t2m");
        assert_eq!(ds.require_field("t2m").unwrap(), ds.field("t2m").unwrap());
        match ds.require_field("2t").unwrap_err() {
            DatasetError::MissingVariable { dataset, variable } => {
                assert_eq!(dataset, "ERA5");
                assert_eq!(variable, "2t");
            }
            other => panic!("Expected MissingVariable, got {other:?}"),
        }
    }

    #[test]
    fn test_rename_coordinate() {
        let mut ds = ramp_dataset("test", hourly_times(1, 6), "t2m")
            .with_coordinate_names("valid_time", "lat", "lon");
        assert!(ds.rename_coordinate("valid_time", "time"));
        assert!(!ds.rename_coordinate("valid_time", "time"));
        assert_eq!(ds.coordinate_names(), ["time", "lat", "lon"]);
    }

    #[test]
    fn test_select_times() {
        let times = hourly_times(3, 6);
        let ds = ramp_dataset("test", times.clone(), "t2m");
        let sub = ds.select_times(&[times[2], times[0]]).unwrap();
        assert_eq!(sub.times(), &[times[2], times[0]]);

        let full = ds.field("t2m").unwrap();
        let part = sub.field("t2m").unwrap();
        assert_eq!(part.index_axis(Axis(0), 0), full.index_axis(Axis(0), 2));
        assert_eq!(part.index_axis(Axis(0), 1), full.index_axis(Axis(0), 0));
    }

    #[test]
    fn test_select_missing_time() {
        let times = hourly_times(2, 6);
        let ds = ramp_dataset("AIFS", times.clone(), "t2m");
        let extra = times[1] + chrono::TimeDelta::hours(6);
        let err = ds.select_times(&[times[0], extra]).unwrap_err();
        match err {
            DatasetError::MissingTimestamp { dataset, time } => {
                assert_eq!(dataset, "AIFS");
                assert_eq!(time, extra);
            }
            other => panic!("Expected MissingTimestamp, got {other:?}"),
        }
    }
}
