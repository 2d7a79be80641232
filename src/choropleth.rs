// Choropleth - join block group aggregates to polygons and color them
//
// The join is an inner join on GEOID == BG_ID. Colors come from a sequential
// "Blues" scale stretched over the selected metric's range; drawing the tiles
// and polygons is left to the browser map library.

use crate::aggregate::{aggregate_by_block_group, BlockGroupAggregate};
use crate::counties::CountyRegistry;
use crate::filter::SalesFilter;
use crate::geometry::{bounds, BlockGroupGeometry};
use crate::sales::SaleRecord;
use anyhow::{bail, Result};
use geojson::{Feature, FeatureCollection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// MAP METRIC
// ============================================================================

/// Column used to color the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MapMetric {
    #[default]
    #[serde(rename = "total_sales")]
    TotalSales,

    #[serde(rename = "median_priceSF")]
    MedianPriceSf,

    #[serde(rename = "median_SF")]
    MedianSquareFootage,
}

impl MapMetric {
    pub const ALL: [MapMetric; 3] = [
        MapMetric::TotalSales,
        MapMetric::MedianPriceSf,
        MapMetric::MedianSquareFootage,
    ];

    /// Label shown next to the radio button
    pub fn label(&self) -> &'static str {
        match self {
            MapMetric::TotalSales => "Total sales",
            MapMetric::MedianPriceSf => "Median price/SF",
            MapMetric::MedianSquareFootage => "Median home size",
        }
    }

    /// Aggregate column name
    pub fn column(&self) -> &'static str {
        match self {
            MapMetric::TotalSales => "total_sales",
            MapMetric::MedianPriceSf => "median_priceSF",
            MapMetric::MedianSquareFootage => "median_SF",
        }
    }

    pub fn value(&self, aggregate: &BlockGroupAggregate) -> Option<f64> {
        match self {
            MapMetric::TotalSales => Some(aggregate.total_sales as f64),
            MapMetric::MedianPriceSf => aggregate.median_price_sf,
            MapMetric::MedianSquareFootage => aggregate.median_sf,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            MapMetric::TotalSales => MapMetric::MedianPriceSf,
            MapMetric::MedianPriceSf => MapMetric::MedianSquareFootage,
            MapMetric::MedianSquareFootage => MapMetric::TotalSales,
        }
    }
}

impl FromStr for MapMetric {
    type Err = anyhow::Error;

    /// Accepts either the column name or the label
    fn from_str(s: &str) -> Result<Self> {
        MapMetric::ALL
            .into_iter()
            .find(|metric| metric.column() == s || metric.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown map metric '{}' (expected total_sales, median_priceSF or median_SF)",
                    s
                )
            })
    }
}

// ============================================================================
// COLOR SCALE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    fn lerp(a: Rgb, b: Rgb, t: f64) -> Rgb {
        let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
        Rgb(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
    }
}

/// Evenly spaced color stops, interpolated linearly
#[derive(Debug, Clone)]
pub struct ColorScale {
    name: &'static str,
    stops: Vec<Rgb>,
}

impl ColorScale {
    /// ColorBrewer sequential Blues, light to dark
    pub fn blues() -> Self {
        ColorScale {
            name: "Blues",
            stops: vec![
                Rgb(247, 251, 255),
                Rgb(222, 235, 247),
                Rgb(198, 219, 239),
                Rgb(158, 202, 225),
                Rgb(107, 174, 214),
                Rgb(66, 146, 198),
                Rgb(33, 113, 181),
                Rgb(8, 81, 156),
                Rgb(8, 48, 107),
            ],
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Color at position `t` in [0, 1]; out-of-range values are clamped
    pub fn at(&self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let last = self.stops.len() - 1;
        let scaled = t * last as f64;
        let lower = (scaled.floor() as usize).min(last);
        let upper = (lower + 1).min(last);
        Rgb::lerp(self.stops[lower], self.stops[upper], scaled - lower as f64)
    }

    /// Color for `value` within `[min, max]`; a degenerate range maps to the middle
    pub fn color_for(&self, value: f64, min: f64, max: f64) -> Rgb {
        if max > min {
            self.at((value - min) / (max - min))
        } else {
            self.at(0.5)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendStop {
    pub value: f64,
    pub color: String,
}

fn legend(scale: &ColorScale, range: Option<(f64, f64)>, steps: usize) -> Vec<LegendStop> {
    let Some((min, max)) = range else {
        return Vec::new();
    };
    if max <= min {
        return vec![LegendStop {
            value: min,
            color: scale.at(0.5).hex(),
        }];
    }
    (0..steps)
        .map(|i| {
            let t = i as f64 / (steps - 1) as f64;
            LegendStop {
                value: min + (max - min) * t,
                color: scale.at(t).hex(),
            }
        })
        .collect()
}

// ============================================================================
// MAP VIEW
// ============================================================================

/// Initial camera and frame of the map widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub height: u32,
    pub style: String,
}

impl Default for MapView {
    fn default() -> Self {
        MapView {
            center_lat: 34.54,
            center_lon: -83.50661343131297,
            zoom: 8.5,
            height: 480,
            style: "streets".to_string(),
        }
    }
}

// ============================================================================
// JOIN
// ============================================================================

/// A polygon with its aggregate row
#[derive(Debug, Clone)]
pub struct JoinedBlockGroup<'a> {
    pub geometry: &'a BlockGroupGeometry,
    pub aggregate: &'a BlockGroupAggregate,
}

#[derive(Debug, Clone)]
pub struct JoinResult<'a> {
    pub joined: Vec<JoinedBlockGroup<'a>>,

    /// Block groups with sales but no polygon
    pub unmatched: Vec<String>,
}

/// Inner join in geometry order
pub fn join<'a>(
    geometries: &'a [BlockGroupGeometry],
    aggregates: &'a [BlockGroupAggregate],
) -> JoinResult<'a> {
    let by_id: HashMap<&str, &BlockGroupAggregate> = aggregates
        .iter()
        .map(|aggregate| (aggregate.bg_id.as_str(), aggregate))
        .collect();

    let joined: Vec<JoinedBlockGroup> = geometries
        .iter()
        .filter_map(|geometry| {
            by_id
                .get(geometry.geoid.as_str())
                .copied()
                .map(|aggregate| JoinedBlockGroup {
                    geometry,
                    aggregate,
                })
        })
        .collect();

    let matched: std::collections::HashSet<&str> = joined
        .iter()
        .map(|j| j.aggregate.bg_id.as_str())
        .collect();

    let unmatched = aggregates
        .iter()
        .filter(|aggregate| !matched.contains(aggregate.bg_id.as_str()))
        .map(|aggregate| aggregate.bg_id.clone())
        .collect();

    JoinResult { joined, unmatched }
}

// ============================================================================
// CHOROPLETH MAP
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChoroplethMap {
    pub metric: MapMetric,
    pub metric_label: &'static str,
    pub color_scale: &'static str,

    /// `[min, max]` of the metric across joined block groups
    pub range: Option<(f64, f64)>,
    pub legend: Vec<LegendStop>,

    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub bounds: Option<[f64; 4]>,
    pub view: MapView,

    pub filtered_sales: usize,
    pub unmatched_block_groups: Vec<String>,

    pub features: FeatureCollection,
}

fn feature_for(joined: &JoinedBlockGroup, fill_color: Option<String>) -> Feature {
    let aggregate = joined.aggregate;

    let mut feature = Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(
            &joined.geometry.geometry,
        ))),
        id: Some(geojson::feature::Id::String(joined.geometry.geoid.clone())),
        properties: None,
        foreign_members: None,
    };
    feature.set_property("GEOID", joined.geometry.geoid.clone());
    feature.set_property("total_sales", aggregate.total_sales);
    feature.set_property("median_price", aggregate.median_price);
    feature.set_property("median_priceSF", aggregate.median_price_sf);
    feature.set_property("median_SF", aggregate.median_sf);
    feature.set_property("county_name", aggregate.county_name.clone());
    feature.set_property("fill_color", fill_color);
    feature
}

/// Color joined block groups by `metric`
pub fn render(
    geometries: &[BlockGroupGeometry],
    aggregates: &[BlockGroupAggregate],
    metric: MapMetric,
    filtered_sales: usize,
) -> ChoroplethMap {
    let scale = ColorScale::blues();
    let JoinResult { joined, unmatched } = join(geometries, aggregates);

    let range = joined
        .iter()
        .filter_map(|j| metric.value(j.aggregate))
        .fold(None, |acc: Option<(f64, f64)>, value| match acc {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        });

    let features: FeatureCollection = joined
        .iter()
        .map(|j| {
            let color = match (metric.value(j.aggregate), range) {
                (Some(value), Some((min, max))) => Some(scale.color_for(value, min, max).hex()),
                _ => None,
            };
            feature_for(j, color)
        })
        .collect();

    if !unmatched.is_empty() {
        tracing::debug!(count = unmatched.len(), "block groups without geometry");
    }

    ChoroplethMap {
        metric,
        metric_label: metric.label(),
        color_scale: scale.name(),
        range,
        legend: legend(&scale, range, 5),
        bounds: bounds(joined.iter().map(|j| &j.geometry.geometry)),
        view: MapView::default(),
        filtered_sales,
        unmatched_block_groups: unmatched,
        features,
    }
}

/// Whole pipeline: filter -> aggregate -> join -> color
pub fn build_map(
    sales: &[SaleRecord],
    geometries: &[BlockGroupGeometry],
    counties: &CountyRegistry,
    filter: &SalesFilter,
    metric: MapMetric,
) -> Result<ChoroplethMap> {
    if let Err(err) = filter.validate() {
        bail!("invalid filter: {}", err);
    }

    let filtered = filter.apply(sales, counties);
    let aggregates = aggregate_by_block_group(&filtered, counties);

    Ok(render(geometries, &aggregates, metric, filtered.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn block(geoid: &str, x: f64) -> BlockGroupGeometry {
        BlockGroupGeometry {
            geoid: geoid.to_string(),
            geometry: MultiPolygon(vec![polygon![
                (x: x, y: 34.0),
                (x: x + 0.1, y: 34.0),
                (x: x + 0.1, y: 34.1),
                (x: x, y: 34.0),
            ]]),
        }
    }

    fn aggregate(bg_id: &str, total: usize, price_sf: f64) -> BlockGroupAggregate {
        BlockGroupAggregate {
            bg_id: bg_id.to_string(),
            total_sales: total,
            median_price: Some(price_sf * 2000.0),
            median_price_sf: Some(price_sf),
            median_sf: Some(2000.0),
            county_name: None,
        }
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(MapMetric::default(), MapMetric::TotalSales);
        assert_eq!("median_priceSF".parse::<MapMetric>().unwrap(), MapMetric::MedianPriceSf);
        assert_eq!("Median home size".parse::<MapMetric>().unwrap(), MapMetric::MedianSquareFootage);
        assert!("median_price".parse::<MapMetric>().is_err());
        assert_eq!(
            serde_json::to_string(&MapMetric::MedianSquareFootage).unwrap(),
            "\"median_SF\""
        );
    }

    #[test]
    fn test_scale_endpoints() {
        let scale = ColorScale::blues();

        assert_eq!(scale.at(0.0).hex(), "#f7fbff");
        assert_eq!(scale.at(1.0).hex(), "#08306b");
        assert_eq!(scale.at(0.5), Rgb(107, 174, 214));
        assert_eq!(scale.at(-3.0), scale.at(0.0));
        assert_eq!(scale.color_for(5.0, 5.0, 5.0), scale.at(0.5));
    }

    #[test]
    fn test_join_is_inner_and_reports_unmatched() {
        let geometries = vec![block("A", -83.6), block("B", -83.5), block("C", -83.4)];
        let aggregates = vec![aggregate("B", 2, 100.0), aggregate("C", 1, 150.0), aggregate("Z", 4, 90.0)];

        let result = join(&geometries, &aggregates);

        let ids: Vec<&str> = result.joined.iter().map(|j| j.geometry.geoid.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert_eq!(result.unmatched, vec!["Z".to_string()]);
    }

    #[test]
    fn test_render_colors_by_metric() {
        let geometries = vec![block("A", -83.6), block("B", -83.5)];
        let aggregates = vec![aggregate("A", 1, 100.0), aggregate("B", 5, 200.0)];

        let map = render(&geometries, &aggregates, MapMetric::TotalSales, 6);

        assert_eq!(map.range, Some((1.0, 5.0)));
        assert_eq!(map.features.features.len(), 2);

        let light = map.features.features[0].property("fill_color").unwrap();
        let dark = map.features.features[1].property("fill_color").unwrap();
        assert_eq!(light, "#f7fbff");
        assert_eq!(dark, "#08306b");
        assert_eq!(map.legend.len(), 5);
        assert_eq!(map.legend[0].value, 1.0);

        let bbox = map.bounds.unwrap();
        assert!((bbox[0] - -83.6).abs() < 1e-9);
        assert!((bbox[2] - -83.4).abs() < 1e-9);
    }

    #[test]
    fn test_render_with_nothing_joined() {
        let map = render(&[block("A", -83.6)], &[], MapMetric::MedianPriceSf, 0);

        assert!(map.features.features.is_empty());
        assert_eq!(map.range, None);
        assert!(map.legend.is_empty());
        assert_eq!(map.bounds, None);
    }

    #[test]
    fn test_feature_id_and_properties() {
        let geometries = vec![block("131370001001", -83.6)];
        let aggregates = vec![aggregate("131370001001", 3, 120.0)];

        let map = render(&geometries, &aggregates, MapMetric::MedianPriceSf, 3);
        let feature = &map.features.features[0];

        assert_eq!(
            feature.id,
            Some(geojson::feature::Id::String("131370001001".to_string()))
        );
        assert_eq!(feature.property("total_sales").unwrap(), 3);
        assert_eq!(feature.property("median_priceSF").unwrap(), 120.0);
        assert!(feature.property("county_name").unwrap().is_null());
    }
}
