// Sales filter - three numeric thresholds plus an optional county
//
// The controls mirror the dashboard sliders: a square-footage range, a minimum
// bedroom count and a minimum bathroom count (half-bath steps).

use crate::counties::CountyRegistry;
use crate::sales::SaleRecord;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONTROL BOUNDS
// ============================================================================

pub const SQFT_MIN: i64 = 0;
pub const SQFT_MAX: i64 = 6000;
pub const SQFT_STEP: i64 = 500;
pub const SQFT_DEFAULT: (i64, i64) = (1000, 2500);

pub const BEDROOMS_MIN: i64 = 0;
pub const BEDROOMS_MAX: i64 = 6;

pub const BATHROOMS_MIN: f64 = 0.0;
pub const BATHROOMS_MAX: f64 = 6.0;
pub const BATHROOMS_STEP: f64 = 0.5;

/// Slider description handed to front-ends
#[derive(Debug, Clone, Serialize)]
pub struct SliderBounds {
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

pub fn slider_bounds() -> Vec<SliderBounds> {
    vec![
        SliderBounds {
            label: "Home square footage",
            min: SQFT_MIN as f64,
            max: SQFT_MAX as f64,
            step: SQFT_STEP as f64,
        },
        SliderBounds {
            label: "Minimum number of bedrooms",
            min: BEDROOMS_MIN as f64,
            max: BEDROOMS_MAX as f64,
            step: 1.0,
        },
        SliderBounds {
            label: "Minimum number of bathrooms",
            min: BATHROOMS_MIN,
            max: BATHROOMS_MAX,
            step: BATHROOMS_STEP,
        },
    ]
}

// ============================================================================
// FILTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesFilter {
    pub sqft_min: i64,
    pub sqft_max: i64,
    pub min_bedrooms: i64,
    pub min_bathrooms: f64,

    /// Restrict to one county by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

impl Default for SalesFilter {
    fn default() -> Self {
        SalesFilter {
            sqft_min: SQFT_DEFAULT.0,
            sqft_max: SQFT_DEFAULT.1,
            min_bedrooms: BEDROOMS_MIN,
            min_bathrooms: BATHROOMS_MIN,
            county: None,
        }
    }
}

impl SalesFilter {
    /// Check the thresholds against the slider ranges
    pub fn validate(&self) -> Result<()> {
        if self.sqft_min < SQFT_MIN || self.sqft_max > SQFT_MAX {
            bail!(
                "square footage must be within {}..={}, got {}..={}",
                SQFT_MIN,
                SQFT_MAX,
                self.sqft_min,
                self.sqft_max
            );
        }
        if self.sqft_min > self.sqft_max {
            bail!(
                "square footage range is reversed: {} > {}",
                self.sqft_min,
                self.sqft_max
            );
        }
        if !(BEDROOMS_MIN..=BEDROOMS_MAX).contains(&self.min_bedrooms) {
            bail!(
                "minimum bedrooms must be within {}..={}, got {}",
                BEDROOMS_MIN,
                BEDROOMS_MAX,
                self.min_bedrooms
            );
        }
        if !(BATHROOMS_MIN..=BATHROOMS_MAX).contains(&self.min_bathrooms) {
            bail!(
                "minimum bathrooms must be within {:.1}..={:.1}, got {}",
                BATHROOMS_MIN,
                BATHROOMS_MAX,
                self.min_bathrooms
            );
        }
        if (self.min_bathrooms / BATHROOMS_STEP).fract() != 0.0 {
            bail!(
                "minimum bathrooms must be a multiple of {:.1}, got {}",
                BATHROOMS_STEP,
                self.min_bathrooms
            );
        }
        Ok(())
    }

    /// True when the record satisfies every threshold (inclusive)
    pub fn matches(&self, record: &SaleRecord) -> bool {
        record.square_footage >= self.sqft_min
            && record.square_footage <= self.sqft_max
            && record.bedrooms >= self.min_bedrooms
            && record.bathrooms >= self.min_bathrooms
    }

    /// Filter records, keeping their order.
    ///
    /// The county restriction only applies when the name resolves through the
    /// registry; an unknown county matches nothing.
    pub fn apply(&self, records: &[SaleRecord], counties: &CountyRegistry) -> Vec<SaleRecord> {
        let county_fips = self
            .county
            .as_deref()
            .map(|name| counties.fips_for_name(name));

        records
            .iter()
            .filter(|record| self.matches(record))
            .filter(|record| match county_fips {
                None => true,
                Some(None) => false,
                Some(Some(fips)) => record.county_fips() == Some(fips),
            })
            .cloned()
            .collect()
    }

    // ========================================================================
    // STEPPING (keyboard controls)
    // ========================================================================

    pub fn step_sqft_min(&mut self, steps: i64) {
        self.sqft_min = (self.sqft_min + steps * SQFT_STEP)
            .min(self.sqft_max)
            .max(SQFT_MIN);
    }

    pub fn step_sqft_max(&mut self, steps: i64) {
        self.sqft_max = (self.sqft_max + steps * SQFT_STEP)
            .max(self.sqft_min)
            .min(SQFT_MAX);
    }

    pub fn step_bedrooms(&mut self, steps: i64) {
        self.min_bedrooms = (self.min_bedrooms + steps).clamp(BEDROOMS_MIN, BEDROOMS_MAX);
    }

    pub fn step_bathrooms(&mut self, steps: i64) {
        self.min_bathrooms = (self.min_bathrooms + steps as f64 * BATHROOMS_STEP)
            .clamp(BATHROOMS_MIN, BATHROOMS_MAX);
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{}-{} sq ft, {}+ bd, {:.1}+ ba",
            self.sqft_min, self.sqft_max, self.min_bedrooms, self.min_bathrooms
        );
        if let Some(county) = &self.county {
            text.push_str(&format!(", {} County", county));
        }
        text
    }
}
