//! Facet values and compound filtering over the in-memory dataset.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::InventoryRecord;

/// A record field whose distinct values form a filter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Type,
    Color,
    Design,
    Finish,
    Size,
    Location,
}

impl Facet {
    pub const ALL: [Facet; 6] = [
        Facet::Type,
        Facet::Color,
        Facet::Design,
        Facet::Finish,
        Facet::Size,
        Facet::Location,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Type => "type",
            Facet::Color => "color",
            Facet::Design => "design",
            Facet::Finish => "finish",
            Facet::Size => "size",
            Facet::Location => "location",
        }
    }

    /// Query parameter the proxy understands for this facet. Location narrows `locid` instead.
    pub fn upstream_param(&self) -> Option<&'static str> {
        match self {
            Facet::Type => Some("ptype"),
            Facet::Color => Some("pcolor"),
            Facet::Design => Some("pdesign"),
            Facet::Finish => Some("pfinish"),
            Facet::Size => Some("psize"),
            Facet::Location => None,
        }
    }

    pub fn value_of<'a>(&self, record: &'a InventoryRecord) -> &'a str {
        match self {
            Facet::Type => &record.product_type,
            Facet::Color => &record.color,
            Facet::Design => &record.design,
            Facet::Finish => &record.finish,
            Facet::Size => &record.size,
            Facet::Location => &record.location,
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFacet(pub String);

impl fmt::Display for UnknownFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown facet `{}` (expected type, color, design, finish, size or location)",
            self.0
        )
    }
}

impl std::error::Error for UnknownFacet {}

impl FromStr for Facet {
    type Err = UnknownFacet;

    /// Accepts record field names and upstream spellings in any casing (`PColor`, `Locationname`).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "type" | "ptype" | "producttype" => Ok(Facet::Type),
            "color" | "colour" | "pcolor" => Ok(Facet::Color),
            "design" | "pdesign" => Ok(Facet::Design),
            "finish" | "pfinish" => Ok(Facet::Finish),
            "size" | "psize" => Ok(Facet::Size),
            "location" | "locationname" | "locid" => Ok(Facet::Location),
            _ => Err(UnknownFacet(raw.to_string())),
        }
    }
}

/// Current facet selections plus the free-text query. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    selections: BTreeMap<Facet, String>,
    query: String,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `value` for `facet`; a blank value clears the facet.
    pub fn set(&mut self, facet: Facet, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            self.selections.remove(&facet);
        } else {
            self.selections.insert(facet, value.to_string());
        }
    }

    pub fn with(mut self, facet: Facet, value: &str) -> Self {
        self.set(facet, value);
        self
    }

    pub fn selection(&self, facet: Facet) -> Option<&str> {
        self.selections.get(&facet).map(String::as_str)
    }

    pub fn selections(&self) -> &BTreeMap<Facet, String> {
        &self.selections
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, text: &str) {
        self.query = text.trim().to_string();
    }

    pub fn clear(&mut self) {
        self.selections.clear();
        self.query.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.selections.is_empty() || !self.query.is_empty()
    }

    /// Facet selections the proxy can apply server-side.
    pub fn upstream_params(&self) -> Vec<(String, String)> {
        self.selections
            .iter()
            .filter_map(|(facet, value)| {
                facet
                    .upstream_param()
                    .map(|param| (param.to_string(), value.clone()))
            })
            .collect()
    }

    pub fn matches(&self, record: &InventoryRecord) -> bool {
        let facets_match = self
            .selections
            .iter()
            .all(|(facet, wanted)| facet_matches(*facet, record, wanted));
        if !facets_match {
            return false;
        }
        if self.query.is_empty() {
            return true;
        }
        record.search_text().contains(&self.query.to_lowercase())
    }
}

/// A location selection may name the location or give its id.
fn facet_matches(facet: Facet, record: &InventoryRecord, wanted: &str) -> bool {
    if facet.value_of(record).trim().eq_ignore_ascii_case(wanted) {
        return true;
    }
    facet == Facet::Location && !record.location_id.is_empty() && record.location_id == wanted
}

/// Distinct non-blank values of `facet`, sorted case-insensitively.
///
/// Values differing only by case collapse to the first spelling seen.
pub fn facet_values(records: &[InventoryRecord], facet: Facet) -> Vec<String> {
    let mut distinct: BTreeMap<String, String> = BTreeMap::new();
    for record in records {
        let value = facet.value_of(record).trim();
        if value.is_empty() {
            continue;
        }
        distinct
            .entry(value.to_lowercase())
            .or_insert_with(|| value.to_string());
    }
    distinct.into_values().collect()
}

/// Records passing every selected facet and the search text. Order is preserved.
pub fn apply_filter<'a>(records: &'a [InventoryRecord], filters: &FilterState) -> Vec<&'a InventoryRecord> {
    if !filters.is_active() {
        return records.iter().collect();
    }
    records.iter().filter(|r| filters.matches(r)).collect()
}
