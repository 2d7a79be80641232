// Block group aggregation - group filtered sales by BG_ID
//
// Per block group: number of sales, median price, median price per square
// foot and median home size, plus the county name derived from the id.

use crate::counties::CountyRegistry;
use crate::sales::SaleRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockGroupAggregate {
    #[serde(rename = "BG_ID")]
    pub bg_id: String,

    /// Sales with a non-empty address
    pub total_sales: usize,

    pub median_price: Option<f64>,

    #[serde(rename = "median_priceSF")]
    pub median_price_sf: Option<f64>,

    #[serde(rename = "median_SF")]
    pub median_sf: Option<f64>,

    pub county_name: Option<String>,
}

/// Median that skips NaN; even-sized inputs average the two middle values
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }

    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[derive(Default)]
struct Group {
    addresses: usize,
    prices: Vec<f64>,
    prices_sf: Vec<f64>,
    sizes: Vec<f64>,
}

/// Group sales by block group, sorted by block group id
pub fn aggregate_by_block_group(
    records: &[SaleRecord],
    counties: &CountyRegistry,
) -> Vec<BlockGroupAggregate> {
    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();

    for record in records {
        let group = groups.entry(record.bg_id.as_str()).or_default();
        if record.has_address() {
            group.addresses += 1;
        }
        group.prices.push(record.price);
        group.prices_sf.push(record.price_sf);
        group.sizes.push(record.square_footage as f64);
    }

    groups
        .into_iter()
        .map(|(bg_id, group)| BlockGroupAggregate {
            bg_id: bg_id.to_string(),
            total_sales: group.addresses,
            median_price: median(&group.prices),
            median_price_sf: median(&group.prices_sf),
            median_sf: median(&group.sizes),
            county_name: counties.county_for_block_group(bg_id).map(str::to_string),
        })
        .collect()
}

/// Totals across every block group, for status lines
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateTotals {
    pub block_groups: usize,
    pub total_sales: usize,
    pub median_price: Option<f64>,
}

pub fn totals(records: &[SaleRecord], aggregates: &[BlockGroupAggregate]) -> AggregateTotals {
    let prices: Vec<f64> = records.iter().map(|r| r.price).collect();
    AggregateTotals {
        block_groups: aggregates.len(),
        total_sales: aggregates.iter().map(|a| a.total_sales).sum(),
        median_price: median(&prices),
    }
}
