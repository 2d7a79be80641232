// Dataset - both input files loaded together, plus a shared handle for reloads
//
// Each load is fingerprinted (SHA-256 over both files) so clients can tell
// whether the data behind a map changed.

use crate::aggregate::{aggregate_by_block_group, BlockGroupAggregate};
use crate::choropleth::{build_map, ChoroplethMap, MapMetric};
use crate::counties::CountyRegistry;
use crate::filter::SalesFilter;
use crate::geometry::{read_geometry, BlockGroupGeometry, GeometryOptions};
use crate::sales::{read_sales, SaleRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Where the two input files live
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub sales_path: PathBuf,
    pub geometry_path: PathBuf,
    pub geometry: GeometryOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub sales_rows: usize,
    pub block_groups: usize,

    /// Hex SHA-256 over the sales file then the geometry file
    pub fingerprint: String,
    pub loaded_at: DateTime<Utc>,
}

pub struct Dataset {
    pub sales: Vec<SaleRecord>,
    pub geometries: Vec<BlockGroupGeometry>,
    pub counties: CountyRegistry,
    pub info: DatasetInfo,
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Hex SHA-256 over the given file contents, in order
fn fingerprint(contents: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for bytes in contents {
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}

impl Dataset {
    /// Read each file once; parsing and the fingerprint see the same bytes
    pub fn load(source: &DataSource) -> Result<Self> {
        let sales_bytes = read_file(&source.sales_path)?;
        let geometry_bytes = read_file(&source.geometry_path)?;

        let sales = read_sales(&sales_bytes[..]).with_context(|| {
            format!("Failed to load sales from {}", source.sales_path.display())
        })?;
        let geometries =
            read_geometry(&source.geometry_path, &geometry_bytes, &source.geometry)?;
        let fingerprint = fingerprint(&[sales_bytes.as_slice(), geometry_bytes.as_slice()]);

        tracing::info!(
            sales = sales.len(),
            block_groups = geometries.len(),
            fingerprint = %&fingerprint[..12],
            "dataset loaded"
        );

        Ok(Self::from_parts(sales, geometries, fingerprint))
    }

    /// Build from already-loaded parts
    pub fn from_parts(
        sales: Vec<SaleRecord>,
        geometries: Vec<BlockGroupGeometry>,
        fingerprint: String,
    ) -> Self {
        let info = DatasetInfo {
            sales_rows: sales.len(),
            block_groups: geometries.len(),
            fingerprint,
            loaded_at: Utc::now(),
        };

        Dataset {
            sales,
            geometries,
            counties: CountyRegistry::new(),
            info,
        }
    }

    pub fn filtered_sales(&self, filter: &SalesFilter) -> Vec<SaleRecord> {
        filter.apply(&self.sales, &self.counties)
    }

    pub fn aggregates(&self, filter: &SalesFilter) -> Vec<BlockGroupAggregate> {
        aggregate_by_block_group(&self.filtered_sales(filter), &self.counties)
    }

    pub fn map(&self, filter: &SalesFilter, metric: MapMetric) -> Result<ChoroplethMap> {
        build_map(
            &self.sales,
            &self.geometries,
            &self.counties,
            filter,
            metric,
        )
    }
}

/// Dataset behind a lock; readers take a cheap snapshot
#[derive(Clone)]
pub struct SharedDataset {
    source: DataSource,
    current: Arc<RwLock<Arc<Dataset>>>,
}

impl SharedDataset {
    pub fn new(source: DataSource, dataset: Dataset) -> Self {
        SharedDataset {
            source,
            current: Arc::new(RwLock::new(Arc::new(dataset))),
        }
    }

    pub fn load(source: DataSource) -> Result<Self> {
        let dataset = Dataset::load(&source)?;
        Ok(Self::new(source, dataset))
    }

    pub fn snapshot(&self) -> Arc<Dataset> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-read both files; the old snapshot stays live if loading fails
    pub fn reload(&self) -> Result<DatasetInfo> {
        let dataset = Dataset::load(&self.source)?;
        let info = dataset.info.clone();

        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(dataset);

        Ok(info)
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SALES: &str = "address,price,price_sf,square_footage,bedrooms,bathrooms,latitude,longitude,BG_ID\n\
        1 A St,300000,150,2000,3,2,34.5,-83.5,131370001001\n\
        2 B St,200000,100,2000,3,2,34.5,-83.5,131370001001\n";

    const GEOJSON: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"GEOID":"131370001001"},
         "geometry":{"type":"Polygon","coordinates":[[[-83.6,34.5],[-83.5,34.5],[-83.5,34.6],[-83.6,34.5]]]}}
    ]}"#;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn source(dir: &TempDir) -> DataSource {
        DataSource {
            sales_path: write(dir, "sales_file.csv", SALES),
            geometry_path: write(dir, "blockGroups.geojson", GEOJSON),
            geometry: GeometryOptions::default(),
        }
    }

    #[test]
    fn test_load_and_map() {
        let dir = TempDir::new().unwrap();
        let dataset = Dataset::load(&source(&dir)).unwrap();

        assert_eq!(dataset.info.sales_rows, 2);
        assert_eq!(dataset.info.block_groups, 1);
        assert_eq!(dataset.info.fingerprint.len(), 64);

        let map = dataset.map(&SalesFilter::default(), MapMetric::TotalSales).unwrap();
        assert_eq!(map.features.features.len(), 1);
        assert_eq!(map.filtered_sales, 2);
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let shared = SharedDataset::load(source(&dir)).unwrap();
        let before = shared.snapshot().info.fingerprint.clone();

        write(
            &dir,
            "sales_file.csv",
            &format!("{}3 C St,100000,50,2000,3,2,34.5,-83.5,131370001001\n", SALES),
        );
        let info = shared.reload().unwrap();

        assert_eq!(info.sales_rows, 3);
        assert_ne!(info.fingerprint, before);
        assert_eq!(shared.snapshot().info.sales_rows, 3);
    }

    #[test]
    fn test_failed_reload_keeps_old_snapshot() {
        let dir = TempDir::new().unwrap();
        let shared = SharedDataset::load(source(&dir)).unwrap();

        write(&dir, "sales_file.csv", "address,price\nbroken,not-a-number\n");

        assert!(shared.reload().is_err());
        assert_eq!(shared.snapshot().info.sales_rows, 2);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = TempDir::new().unwrap();
        let mut source = source(&dir);
        source.sales_path = dir.path().join("missing.csv");

        let err = Dataset::load(&source).err().unwrap();

        assert!(format!("{:#}", err).contains("missing.csv"));
    }

    #[test]
    fn test_fingerprint_covers_loaded_bytes() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);
        let dataset = Dataset::load(&source).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(SALES.as_bytes());
        hasher.update(GEOJSON.as_bytes());

        assert_eq!(dataset.info.fingerprint, format!("{:x}", hasher.finalize()));
    }
}
