// County lookup - FIPS prefix of a block group id -> county name
//
// The dashboard covers a fixed set of Georgia counties. Every block group id
// starts with the 5-digit county FIPS code (2 state + 3 county), so the county
// name never has to be stored with the sales data.

use crate::sales::county_prefix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct County {
    pub name: String,

    /// 5-digit state + county FIPS code
    pub fips: String,
}

/// Name <-> FIPS lookup in both directions
#[derive(Debug, Clone)]
pub struct CountyRegistry {
    by_fips: BTreeMap<String, String>,
}

impl Default for CountyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CountyRegistry {
    /// Registry with the counties covered by the sales data
    pub fn new() -> Self {
        let mut registry = CountyRegistry {
            by_fips: BTreeMap::new(),
        };

        registry.register("Habersham", "13137");
        registry.register("Banks", "13011");

        registry
    }

    /// Add or rename a county
    pub fn register(&mut self, name: &str, fips: &str) {
        self.by_fips.insert(fips.to_string(), name.to_string());
    }

    pub fn name_for_fips(&self, fips: &str) -> Option<&str> {
        self.by_fips.get(fips).map(String::as_str)
    }

    pub fn fips_for_name(&self, name: &str) -> Option<&str> {
        self.by_fips
            .iter()
            .find(|(_, county)| county.eq_ignore_ascii_case(name))
            .map(|(fips, _)| fips.as_str())
    }

    /// County name for a block group id; `None` for short or unknown ids
    pub fn county_for_block_group(&self, bg_id: &str) -> Option<&str> {
        county_prefix(bg_id).and_then(|fips| self.name_for_fips(fips))
    }

    pub fn counties(&self) -> Vec<County> {
        self.by_fips
            .iter()
            .map(|(fips, name)| County {
                name: name.clone(),
                fips: fips.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_fips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fips.is_empty()
    }
}
