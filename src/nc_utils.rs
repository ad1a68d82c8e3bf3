//! Reading gridded (time, latitude, longitude) datasets from netCDF files.
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use ndarray::{Array1, Array3, ArrayD, Ix1};
use netcdf::{
    types::{FloatType, IntType, NcVariableType},
    AttributeValue, Extents,
};

use crate::dataset::GriddedDataset;
use crate::error::{DatasetError, DateTimeError};
use crate::time_coords::CfTimeUnits;

/// Names recognized for the time coordinate, in order of preference
pub const TIME_NAMES: &[&str] = &["time", "valid_time"];
/// Names recognized for the latitude coordinate, in order of preference
pub const LATITUDE_NAMES: &[&str] = &["latitude", "lat"];
/// Names recognized for the longitude coordinate, in order of preference
pub const LONGITUDE_NAMES: &[&str] = &["longitude", "lon"];

#[derive(Debug, thiserror::Error)]
pub enum NcReadError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Could not open {} as a netCDF file", .path.display())]
    Open {
        path: PathBuf,
        source: netcdf::Error,
    },
    #[error("No {kind} coordinate found in {} (looked for {})", .path.display(), .candidates.join(", "))]
    MissingCoordinate {
        path: PathBuf,
        kind: &'static str,
        candidates: Vec<&'static str>,
    },
    #[error("Coordinate '{variable}' must be one-dimensional, but has {ndim} dimensions")]
    NotOneDimensional { variable: String, ndim: usize },
    #[error("Variable '{variable}' is missing the '{attribute}' attribute")]
    MissingAttribute { variable: String, attribute: String },
    #[error("Error reading variable '{variable}'")]
    Read {
        variable: String,
        source: netcdf::Error,
    },
    #[error("Variable '{variable}' has type {vartype}, which cannot be read as numeric data")]
    NonNumeric { variable: String, vartype: String },
    #[error("Could not decode the '{variable}' time coordinate")]
    Time {
        variable: String,
        source: DateTimeError,
    },
    #[error("Variable '{variable}' could not be reshaped")]
    Shape {
        variable: String,
        source: ndarray::ShapeError,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl NcReadError {
    fn read(variable: &str, source: netcdf::Error) -> Self {
        Self::Read {
            variable: variable.to_string(),
            source,
        }
    }

    fn shape(variable: &str, source: ndarray::ShapeError) -> Self {
        Self::Shape {
            variable: variable.to_string(),
            source,
        }
    }
}

/// A type that can hold the numeric arrays that might be stored in a netCDF
/// file. It is best created by reading from a netCDF variable with its
/// `get_from` method.
pub enum NcArray {
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

impl NcArray {
    /// Retrieve data from a netCDF variable in its stored type.
    ///
    /// Character, string, and user-defined types are an error.
    pub fn get_from(var: &netcdf::Variable) -> Result<Self, NcReadError> {
        let name = var.name();
        let err = |e| NcReadError::read(&name, e);
        let arr = match var.vartype() {
            NcVariableType::Int(IntType::I8) => {
                Self::I8(var.get::<i8, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::I16) => {
                Self::I16(var.get::<i16, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::I32) => {
                Self::I32(var.get::<i32, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::I64) => {
                Self::I64(var.get::<i64, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::U8) => {
                Self::U8(var.get::<u8, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::U16) => {
                Self::U16(var.get::<u16, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::U32) => {
                Self::U32(var.get::<u32, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Int(IntType::U64) => {
                Self::U64(var.get::<u64, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Float(FloatType::F32) => {
                Self::F32(var.get::<f32, _>(Extents::All).map_err(err)?)
            }
            NcVariableType::Float(FloatType::F64) => {
                Self::F64(var.get::<f64, _>(Extents::All).map_err(err)?)
            }
            other => {
                return Err(NcReadError::NonNumeric {
                    variable: var.name(),
                    vartype: format!("{other:?}"),
                })
            }
        };
        Ok(arr)
    }

    /// Convert to `f64`. 64-bit integers beyond 2^53 lose precision.
    pub fn into_f64(self) -> ArrayD<f64> {
        match self {
            NcArray::I8(a) => a.mapv(f64::from),
            NcArray::I16(a) => a.mapv(f64::from),
            NcArray::I32(a) => a.mapv(f64::from),
            NcArray::I64(a) => a.mapv(|v| v as f64),
            NcArray::U8(a) => a.mapv(f64::from),
            NcArray::U16(a) => a.mapv(f64::from),
            NcArray::U32(a) => a.mapv(f64::from),
            NcArray::U64(a) => a.mapv(|v| v as f64),
            NcArray::F32(a) => a.mapv(f64::from),
            NcArray::F64(a) => a,
        }
    }
}

/// Get the first value of a numeric attribute as `f64`.
///
/// Returns `None` if the attribute is absent, unreadable, or not numeric.
pub fn attribute_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    let value = var.attribute_value(name)?.ok()?;
    match value {
        AttributeValue::Schar(v) => Some(v.into()),
        AttributeValue::Uchar(v) => Some(v.into()),
        AttributeValue::Short(v) => Some(v.into()),
        AttributeValue::Ushort(v) => Some(v.into()),
        AttributeValue::Int(v) => Some(v.into()),
        AttributeValue::Uint(v) => Some(v.into()),
        AttributeValue::Longlong(v) => Some(v as f64),
        AttributeValue::Ulonglong(v) => Some(v as f64),
        AttributeValue::Float(v) => Some(v.into()),
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Schars(v) => v.first().map(|&x| x.into()),
        AttributeValue::Uchars(v) => v.first().map(|&x| x.into()),
        AttributeValue::Shorts(v) => v.first().map(|&x| x.into()),
        AttributeValue::Ushorts(v) => v.first().map(|&x| x.into()),
        AttributeValue::Ints(v) => v.first().map(|&x| x.into()),
        AttributeValue::Uints(v) => v.first().map(|&x| x.into()),
        AttributeValue::Longlongs(v) => v.first().map(|&x| x as f64),
        AttributeValue::Ulonglongs(v) => v.first().map(|&x| x as f64),
        AttributeValue::Floats(v) => v.first().map(|&x| x.into()),
        AttributeValue::Doubles(v) => v.first().copied(),
        _ => None,
    }
}

/// Get a string attribute; `None` if absent or not a string.
pub fn attribute_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        AttributeValue::Strs(v) => v.into_iter().next(),
        _ => None,
    }
}

/// Read a variable as `f64`, converting fill/missing values to NaN then
/// applying `scale_factor` and `add_offset` if present.
pub fn read_masked(var: &netcdf::Variable) -> Result<ArrayD<f64>, NcReadError> {
    let raw = NcArray::get_from(var)?.into_f64();
    let fill = attribute_f64(var, "_FillValue");
    let missing = attribute_f64(var, "missing_value");
    let scale = attribute_f64(var, "scale_factor").unwrap_or(1.0);
    let offset = attribute_f64(var, "add_offset").unwrap_or(0.0);

    Ok(raw.mapv(|v| {
        if Some(v) == fill || Some(v) == missing {
            f64::NAN
        } else {
            v * scale + offset
        }
    }))
}

fn open(path: &Path) -> Result<netcdf::File, NcReadError> {
    if !path.exists() {
        return Err(NcReadError::NotFound(path.to_path_buf()));
    }
    netcdf::open(path).map_err(|source| NcReadError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// The first of `candidates` that is a one-dimensional variable, falling back
/// on the first that exists at all so that the caller can report its shape.
fn find_coordinate<'f>(
    file: &'f netcdf::File,
    path: &Path,
    kind: &'static str,
    candidates: &[&'static str],
) -> Result<netcdf::Variable<'f>, NcReadError> {
    let mut found: Vec<netcdf::Variable<'f>> = candidates
        .iter()
        .filter_map(|name| file.variable(name))
        .collect();

    // GRIB conversions can carry a scalar `time` alongside the real `valid_time(step)` axis
    if let Some(i) = found.iter().position(|v| v.dimensions().len() == 1) {
        return Ok(found.swap_remove(i));
    }
    found
        .into_iter()
        .next()
        .ok_or_else(|| NcReadError::MissingCoordinate {
            path: path.to_path_buf(),
            kind,
            candidates: candidates.to_vec(),
        })
}

fn coordinate_dim(var: &netcdf::Variable) -> Result<String, NcReadError> {
    match var.dimensions() {
        [dim] => Ok(dim.name()),
        dims => Err(NcReadError::NotOneDimensional {
            variable: var.name(),
            ndim: dims.len(),
        }),
    }
}

fn read_axis(var: &netcdf::Variable) -> Result<Array1<f64>, NcReadError> {
    coordinate_dim(var)?;
    read_masked(var)?
        .into_dimensionality::<Ix1>()
        .map_err(|e| NcReadError::shape(&var.name(), e))
}

/// Decode a CF time coordinate variable into datetimes.
pub fn decode_time_variable(var: &netcdf::Variable) -> Result<Vec<NaiveDateTime>, NcReadError> {
    let name = var.name();
    let units = attribute_string(var, "units").ok_or_else(|| NcReadError::MissingAttribute {
        variable: name.clone(),
        attribute: "units".to_string(),
    })?;
    let time_err = |source| NcReadError::Time {
        variable: name.clone(),
        source,
    };
    let units = CfTimeUnits::parse(&units).map_err(time_err)?;

    coordinate_dim(var)?;
    let offsets: Vec<f64> = NcArray::get_from(var)?.into_f64().into_iter().collect();
    units.decode_all(&offsets).map_err(time_err)
}

/// Read only the time coordinate (`time` or `valid_time`) of a netCDF file.
pub fn read_time_coordinate(path: &Path) -> Result<Vec<NaiveDateTime>, NcReadError> {
    let file = open(path)?;
    let var = find_coordinate(&file, path, "time", TIME_NAMES)?;
    decode_time_variable(&var)
}

/// Load every (time, latitude, longitude) variable of a netCDF file.
///
/// Coordinates are looked up by the names in [`TIME_NAMES`], [`LATITUDE_NAMES`],
/// and [`LONGITUDE_NAMES`]; the dataset keeps whichever names the file used.
/// Length-1 dimensions other than the three coordinates (such as `number` or
/// `expver`) are dropped. Variables that do not span exactly the three
/// coordinate dimensions after that, including the coordinates themselves,
/// are skipped.
pub fn read_gridded_dataset(path: &Path, name: &str) -> Result<GriddedDataset, NcReadError> {
    let file = open(path)?;
    let time_var = find_coordinate(&file, path, "time", TIME_NAMES)?;
    let lat_var = find_coordinate(&file, path, "latitude", LATITUDE_NAMES)?;
    let lon_var = find_coordinate(&file, path, "longitude", LONGITUDE_NAMES)?;

    let times = decode_time_variable(&time_var)?;
    let lats = read_axis(&lat_var)?;
    let lons = read_axis(&lon_var)?;
    let coord_dims = [
        coordinate_dim(&time_var)?,
        coordinate_dim(&lat_var)?,
        coordinate_dim(&lon_var)?,
    ];
    let coord_vars = [time_var.name(), lat_var.name(), lon_var.name()];

    let mut ds = GriddedDataset::new(name, times, lats, lons).with_coordinate_names(
        &coord_vars[0],
        &coord_vars[1],
        &coord_vars[2],
    );

    for var in file.variables() {
        let var_name = var.name();
        if coord_vars.contains(&var_name) {
            continue;
        }

        let dims: Vec<(String, usize)> = var
            .dimensions()
            .iter()
            .map(|d| (d.name(), d.len()))
            .collect();
        let kept: Vec<String> = dims
            .iter()
            .filter(|(n, len)| *len != 1 || coord_dims.contains(n))
            .map(|(n, _)| n.clone())
            .collect();
        if kept != coord_dims {
            log::debug!(
                "Skipping {name} variable '{var_name}' with dimensions ({})",
                dims.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", ")
            );
            continue;
        }

        let values = match read_masked(&var) {
            Ok(v) => v,
            Err(NcReadError::NonNumeric { .. }) => {
                log::debug!("Skipping non-numeric {name} variable '{var_name}'");
                continue;
            }
            Err(e) => return Err(e),
        };
        let shape = ds.shape();
        let field: Array3<f64> = values
            .into_shape((shape.0, shape.1, shape.2))
            .map_err(|_| DatasetError::ShapeMismatch {
                dataset: name.to_string(),
                variable: var_name.clone(),
                expected: shape,
                got: dims.iter().map(|(_, len)| *len).collect(),
            })?;
        ds.add_field(&var_name, field)?;
    }

    log::debug!(
        "Loaded {name} from {}: {} times, {} x {} grid, variables: {}",
        path.display(),
        ds.times().len(),
        ds.latitudes().len(),
        ds.longitudes().len(),
        ds.variable_names().join(", ")
    );
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    /// Write an ERA5-style file: `valid_time` in seconds since 1970, descending
    /// latitude, a singleton `number` dimension, and packed int16 `t2m` data.
    fn write_era5_like(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("valid_time", 2).unwrap();
        file.add_dimension("latitude", 2).unwrap();
        file.add_dimension("longitude", 3).unwrap();
        file.add_dimension("number", 1).unwrap();

        let mut time = file.add_variable::<i64>("valid_time", &["valid_time"]).unwrap();
        time.put_attribute("units", "seconds since 1970-01-01").unwrap();
        time.put(array![1_767_225_600i64, 1_767_247_200].into_dyn().view(), Extents::All)
            .unwrap();

        let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
        lat.put(array![75.0, 74.75].into_dyn().view(), Extents::All).unwrap();

        let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
        lon.put(array![-25.0, -24.75, -24.5].into_dyn().view(), Extents::All)
            .unwrap();

        let mut t2m = file
            .add_variable::<i16>("t2m", &["number", "valid_time", "latitude", "longitude"])
            .unwrap();
        t2m.put_attribute("_FillValue", -32767i16).unwrap();
        t2m.put_attribute("scale_factor", 0.01f64).unwrap();
        t2m.put_attribute("add_offset", 273.15f64).unwrap();
        let packed = Array3::from_shape_vec(
            (2, 2, 3),
            vec![0i16, 100, -100, 5, -32767, 10, 1, 2, 3, 4, 5, 6],
        )
        .unwrap()
        .insert_axis(ndarray::Axis(0));
        t2m.put(packed.into_dyn().view(), Extents::All).unwrap();
    }

    #[test]
    fn test_read_era5_like() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("era5_data.nc");
        write_era5_like(&path);

        let ds = read_gridded_dataset(&path, "ERA5").unwrap();
        assert_eq!(ds.name(), "ERA5");
        assert_eq!(ds.coordinate_names(), ["valid_time", "latitude", "longitude"]);
        assert_eq!(ds.shape(), (2, 2, 3));
        assert_eq!(ds.times()[0].to_string(), "2026-01-01 00:00:00");
        assert_eq!(ds.times()[1].to_string(), "2026-01-01 06:00:00");
        assert_eq!(ds.latitudes().to_vec(), vec![75.0, 74.75]);
        assert_eq!(ds.variable_names(), vec!["t2m"]);

        let t2m = ds.field("t2m").unwrap();
        assert_abs_diff_eq!(t2m[[0, 0, 0]], 273.15, epsilon = 1e-9);
        assert_abs_diff_eq!(t2m[[0, 0, 1]], 274.15, epsilon = 1e-9);
        assert_abs_diff_eq!(t2m[[0, 0, 2]], 272.15, epsilon = 1e-9);
        assert!(t2m[[0, 1, 1]].is_nan());
        assert_abs_diff_eq!(t2m[[1, 1, 2]], 273.21, epsilon = 1e-9);
    }

    #[test]
    fn test_read_time_coordinate_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("era5_data.nc");
        write_era5_like(&path);
        let times = read_time_coordinate(&path).unwrap();
        assert_eq!(times.len(), 2);
    }

    /// A cfgrib-style forecast: scalar `time` (the run start) and `valid_time(step)`.
    fn write_grib_converted(path: &Path) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("step", 2).unwrap();
        file.add_dimension("latitude", 2).unwrap();
        file.add_dimension("longitude", 2).unwrap();

        let mut run = file.add_variable::<i64>("time", &[]).unwrap();
        run.put_attribute("units", "hours since 2026-01-01").unwrap();

        let mut valid = file.add_variable::<i64>("valid_time", &["step"]).unwrap();
        valid.put_attribute("units", "hours since 2026-01-01").unwrap();
        valid.put(array![6i64, 12].into_dyn().view(), Extents::All).unwrap();

        let mut lat = file.add_variable::<f64>("latitude", &["latitude"]).unwrap();
        lat.put(array![45.0, 44.0].into_dyn().view(), Extents::All).unwrap();
        let mut lon = file.add_variable::<f64>("longitude", &["longitude"]).unwrap();
        lon.put(array![5.0, 6.0].into_dyn().view(), Extents::All).unwrap();

        let mut t2m = file
            .add_variable::<f32>("t2m", &["step", "latitude", "longitude"])
            .unwrap();
        t2m.put(Array3::<f32>::from_elem((2, 2, 2), 280.5).into_dyn().view(), Extents::All)
            .unwrap();
    }

    #[test]
    fn test_prefers_one_dimensional_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IFS_forecast_europe.nc");
        write_grib_converted(&path);

        let times = read_time_coordinate(&path).unwrap();
        assert_eq!(times[0].to_string(), "2026-01-01 06:00:00");
        assert_eq!(times[1].to_string(), "2026-01-01 12:00:00");

        let ds = read_gridded_dataset(&path, "IFS").unwrap();
        assert_eq!(ds.coordinate_names(), ["valid_time", "latitude", "longitude"]);
        assert_eq!(ds.variable_names(), vec!["t2m"]);
        assert_abs_diff_eq!(ds.field("t2m").unwrap()[[1, 1, 1]], 280.5);
    }

    #[test]
    fn test_only_scalar_time_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalar_time.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            let mut run = file.add_variable::<i64>("time", &[]).unwrap();
            run.put_attribute("units", "hours since 2026-01-01").unwrap();
        }

        let err = read_time_coordinate(&path).unwrap_err();
        assert!(
            matches!(err, NcReadError::NotOneDimensional { ndim: 0, .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_missing_time_coordinate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_time.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("step", 2).unwrap();
            let mut step = file.add_variable::<f64>("step", &["step"]).unwrap();
            step.put(array![0.0, 6.0].into_dyn().view(), Extents::All).unwrap();
        }

        let err = read_time_coordinate(&path).unwrap_err();
        assert!(
            matches!(err, NcReadError::MissingCoordinate { kind: "time", .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_missing_file() {
        let err = read_gridded_dataset(Path::new("/nonexistent/IFS_forecast_europe.nc"), "IFS")
            .unwrap_err();
        assert!(matches!(err, NcReadError::NotFound(_)));
    }
}
