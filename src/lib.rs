// Home Sales Map - Core Library
// Exposes the load -> filter -> aggregate -> join -> render pipeline for the
// CLI, the TUI and the web server.

pub mod sales;
pub mod counties;
pub mod filter;
pub mod aggregate;
pub mod geometry;     // GeoPackage + GeoJSON block group polygons
pub mod choropleth;   // Join + color scale
pub mod dataset;      // Both inputs together, reloadable
pub mod pages;
pub mod config;
pub mod logging;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use sales::{load_sales, read_sales, write_sales, SaleRecord};
pub use counties::{County, CountyRegistry};
pub use filter::SalesFilter;
pub use aggregate::{aggregate_by_block_group, median, BlockGroupAggregate};
pub use geometry::{load_geometry, read_geometry, BlockGroupGeometry, GeometryError, GeometryOptions};
pub use choropleth::{build_map, join, ChoroplethMap, ColorScale, MapMetric, MapView};
pub use dataset::{DataSource, Dataset, DatasetInfo, SharedDataset};
pub use pages::{navigation, Page};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
