//! Command-line and environment configuration shared by the binaries.
//!
//! Both `home-sales` and `home-sales-server` flatten [`DataArgs`] so the data
//! directory and file names are spelled the same way everywhere.

use crate::choropleth::MapMetric;
use crate::dataset::DataSource;
use crate::filter::{SalesFilter, SQFT_DEFAULT};
use crate::geometry::GeometryOptions;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Location of the sales CSV and the block group geometry.
#[derive(Debug, Clone, Args)]
pub struct DataArgs {
    /// Directory holding the input files.
    #[arg(long = "data-dir", env = "HOME_SALES_DATA_DIR", default_value = "Data")]
    pub data_dir: PathBuf,

    /// Sales CSV, relative to the data directory.
    #[arg(long = "sales-file", default_value = "sales_file.csv")]
    pub sales_file: PathBuf,

    /// Block group geometry (.gpkg or .geojson), relative to the data directory.
    #[arg(long = "geometry-file", default_value = "blockGroups.gpkg")]
    pub geometry_file: PathBuf,

    /// Geometry attribute holding the block group id.
    #[arg(long = "geoid-column", default_value = "GEOID")]
    pub geoid_column: String,

    /// GeoPackage layer name; the first feature layer when omitted.
    #[arg(long = "layer")]
    pub layer: Option<String>,
}

impl DataArgs {
    pub fn source(&self) -> DataSource {
        DataSource {
            sales_path: self.data_dir.join(&self.sales_file),
            geometry_path: self.data_dir.join(&self.geometry_file),
            geometry: GeometryOptions {
                id_column: self.geoid_column.clone(),
                layer: self.layer.clone(),
            },
        }
    }
}

/// Filter thresholds as flags; defaults match the dashboard sliders.
#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Smallest square footage kept.
    #[arg(long = "sqft-min", default_value_t = SQFT_DEFAULT.0)]
    pub sqft_min: i64,

    /// Largest square footage kept.
    #[arg(long = "sqft-max", default_value_t = SQFT_DEFAULT.1)]
    pub sqft_max: i64,

    /// Minimum number of bedrooms.
    #[arg(long = "bedrooms", default_value_t = 0)]
    pub bedrooms: i64,

    /// Minimum number of bathrooms (half steps).
    #[arg(long = "bathrooms", default_value_t = 0.0)]
    pub bathrooms: f64,

    /// Only keep sales in this county.
    #[arg(long = "county")]
    pub county: Option<String>,

    /// Map metric: total_sales, median_priceSF or median_SF.
    #[arg(long = "metric", default_value = "total_sales")]
    pub metric: String,
}

impl FilterArgs {
    /// Validated filter and metric
    pub fn resolve(&self) -> Result<(SalesFilter, MapMetric)> {
        let filter = SalesFilter {
            sqft_min: self.sqft_min,
            sqft_max: self.sqft_max,
            min_bedrooms: self.bedrooms,
            min_bathrooms: self.bathrooms,
            county: self.county.clone(),
        };
        filter.validate()?;
        let metric = self.metric.parse()?;
        Ok((filter, metric))
    }
}

/// Web server settings.
#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Address the HTTP server binds to.
    #[arg(long = "bind", env = "HOME_SALES_BIND", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// Mapbox access token for the street basemap; OpenStreetMap tiles are
    /// used when unset.
    #[arg(long = "mapbox-token", env = "MAPBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub mapbox_token: Option<String>,

    /// Directory served under /static.
    #[arg(long = "web-dir", default_value = "web")]
    pub web_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        filter: FilterArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();

        let source = cli.data.source();
        assert_eq!(source.sales_path, PathBuf::from("Data/sales_file.csv"));
        assert_eq!(source.geometry_path, PathBuf::from("Data/blockGroups.gpkg"));
        assert_eq!(source.geometry.id_column, "GEOID");

        let (filter, metric) = cli.filter.resolve().unwrap();
        assert_eq!(filter, SalesFilter::default());
        assert_eq!(metric, MapMetric::TotalSales);
    }

    #[test]
    fn test_flags_override() {
        let cli = TestCli::try_parse_from([
            "test",
            "--data-dir",
            "/srv/data",
            "--geometry-file",
            "bg.geojson",
            "--sqft-min",
            "500",
            "--bathrooms",
            "1.5",
            "--metric",
            "median_SF",
        ])
        .unwrap();

        assert_eq!(
            cli.data.source().geometry_path,
            PathBuf::from("/srv/data/bg.geojson")
        );
        let (filter, metric) = cli.filter.resolve().unwrap();
        assert_eq!(filter.sqft_min, 500);
        assert_eq!(filter.min_bathrooms, 1.5);
        assert_eq!(metric, MapMetric::MedianSquareFootage);
    }

    #[test]
    fn test_invalid_filter_flags() {
        let cli = TestCli::try_parse_from(["test", "--bedrooms", "9"]).unwrap();
        assert!(cli.filter.resolve().is_err());
    }
}
