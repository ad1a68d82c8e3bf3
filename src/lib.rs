pub mod error;
pub mod logging;
pub mod time_coords;
pub mod dataset;
pub mod schema;
pub mod time_match;
pub mod interpolation;
pub mod regrid;
pub mod metrics;
pub mod config;
pub mod comparison;
pub mod cds;
#[cfg(feature = "netcdf")]
pub mod nc_utils;
#[cfg(feature = "plotting")]
pub mod plotting;

#[cfg(test)]
pub(crate) mod test_utils;
