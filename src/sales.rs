// Sales records - CSV in, CSV out
//
// One row per closed residential sale. Numeric columns arrive as text and are
// coerced the same way every time: floats parsed as-is, counts parsed as floats
// and truncated toward zero.

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::io;
use std::path::Path;

/// A single residential sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub address: String,

    pub price: f64,

    pub price_sf: f64,

    #[serde(deserialize_with = "truncated_int")]
    pub square_footage: i64,

    #[serde(deserialize_with = "truncated_int")]
    pub bedrooms: i64,

    pub bathrooms: f64,

    pub latitude: f64,

    pub longitude: f64,

    /// Census block group id (county FIPS prefix + tract + group)
    #[serde(rename = "BG_ID", deserialize_with = "trimmed_string")]
    pub bg_id: String,
}

impl SaleRecord {
    /// First five characters of the block group id, if it has that many
    pub fn county_fips(&self) -> Option<&str> {
        county_prefix(&self.bg_id)
    }

    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

/// County FIPS prefix of any block group id
pub fn county_prefix(bg_id: &str) -> Option<&str> {
    bg_id.get(..5)
}

// Counts are stored as floats upstream ("3.0"), so go through f64 first
fn truncated_int<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(de::Error::custom(format!(
            "cannot convert non-finite value {} to an integer",
            value
        )));
    }
    Ok(value.trunc() as i64)
}

fn trimmed_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().to_string())
}

/// Load every sale from a CSV file.
///
/// A malformed row fails the whole load; the error names the data row and column.
pub fn load_sales(csv_path: &Path) -> Result<Vec<SaleRecord>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open sales CSV {}", csv_path.display()))?;
    read_sales(file).with_context(|| format!("Failed to load sales from {}", csv_path.display()))
}

/// Read sales from any CSV source
pub fn read_sales<R: io::Read>(reader: R) -> Result<Vec<SaleRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .context("Failed to read sales CSV header")?
        .clone();

    let mut records = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let record: SaleRecord = result.map_err(|err| {
            let context = row_context(&err, &headers, index + 1);
            anyhow::Error::new(err).context(context)
        })?;
        records.push(record);
    }

    tracing::debug!(rows = records.len(), "sales CSV parsed");

    Ok(records)
}

// Row number, plus the header name when the failure is in one field
fn row_context(err: &csv::Error, headers: &csv::StringRecord, row: usize) -> String {
    let column = match err.kind() {
        csv::ErrorKind::Deserialize { err, .. } => err
            .field()
            .and_then(|field| headers.get(field as usize)),
        _ => None,
    };

    match column {
        Some(column) => format!("Failed to parse sales row {} column {}", row, column),
        None => format!("Failed to parse sales row {}", row),
    }
}

/// Write records back out with the same column names they were read with
pub fn write_sales<W: io::Write>(writer: W, records: &[SaleRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record).context("Failed to write sales row")?;
    }
    wtr.flush().context("Failed to flush sales CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "address,price,price_sf,square_footage,bedrooms,bathrooms,latitude,longitude,BG_ID\n";

    #[test]
    fn test_counts_are_truncated_floats() {
        let csv = format!(
            "{}12 Oak St,310000,155.5,2000.9,3.0,2.5,34.6,-83.5,131370001001\n",
            HEADER
        );

        let records = read_sales(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 1);
        let sale = &records[0];
        assert_eq!(sale.square_footage, 2000);
        assert_eq!(sale.bedrooms, 3);
        assert_eq!(sale.bathrooms, 2.5);
        assert_eq!(sale.price_sf, 155.5);
        assert_eq!(sale.bg_id, "131370001001");
    }

    #[test]
    fn test_extra_columns_and_order_are_ignored() {
        let csv = "BG_ID,zip,address,bedrooms,bathrooms,square_footage,price,price_sf,latitude,longitude\n\
                   130110101002,30510,9 Elm Rd,4,3,2400,400000,166.7,34.3,-83.4\n";

        let records = read_sales(csv.as_bytes()).unwrap();

        assert_eq!(records[0].address, "9 Elm Rd");
        assert_eq!(records[0].county_fips(), Some("13011"));
    }

    #[test]
    fn test_malformed_number_names_row() {
        let csv = format!(
            "{}A,1,1,1000,2,1,34,-83,131370001001\nB,1,1,big,2,1,34,-83,131370001001\n",
            HEADER
        );

        let err = read_sales(csv.as_bytes()).unwrap_err();
        let message = format!("{:#}", err);

        assert!(message.contains("row 2"));
        assert!(message.contains("column square_footage"));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("no_sales.csv");

        let err = load_sales(&path).unwrap_err();

        assert!(format!("{:#}", err).contains("no_sales.csv"));
    }

    #[test]
    fn test_nan_count_is_rejected() {
        let csv = format!("{}A,1,1,NaN,2,1,34,-83,131370001001\n", HEADER);

        assert!(read_sales(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_write_keeps_column_names() {
        let csv = format!("{}12 Oak St,310000,155.5,2000,3,2.5,34.6,-83.5,131370001001\n", HEADER);
        let records = read_sales(csv.as_bytes()).unwrap();

        let mut out = Vec::new();
        write_sales(&mut out, &records).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with(HEADER.trim_end()));
        assert_eq!(read_sales(text.as_bytes()).unwrap(), records);
    }

    #[test]
    fn test_short_block_group_has_no_prefix() {
        assert_eq!(county_prefix("1313"), None);
        assert_eq!(county_prefix("13137"), Some("13137"));
    }
}
