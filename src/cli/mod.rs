//! Operator commands behind the `inventory` binary.

pub mod clear_cache;
pub mod details;
pub mod facets;
pub mod fetch;
pub mod weight;

use anyhow::{anyhow, Result};

use crate::facets::{Facet, FilterState};

/// Parse `facet=value` pairs (e.g. `color=Blue Pearl`, `PColor=Blue Pearl`) into a filter state.
pub fn parse_filters(pairs: &[String], search: Option<&str>) -> Result<FilterState> {
    let mut filters = FilterState::new();
    for pair in pairs {
        let (field, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("filter `{pair}` must look like facet=value"))?;
        let facet: Facet = field.parse()?;
        filters.set(facet, value);
    }
    if let Some(text) = search {
        filters.set_query(text);
    }
    Ok(filters)
}
