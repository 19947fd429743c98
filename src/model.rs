//! Core data shapes shared by the fetcher, cache, facet engine and session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One upstream warehouse contributing its own paginated record stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
}

impl Location {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name used when neither configuration nor the upstream record supplies one.
    pub fn fallback_name(id: &str) -> String {
        format!("Location {id}")
    }
}

/// One stockable end-product line, normalized once at ingestion.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub product_code: String,
    pub description: String,
    pub product_type: String,
    pub color: String,
    pub design: String,
    pub finish: String,
    /// Free-text dimension string, e.g. `2-6 X 1-2 X 0-6`.
    pub size: String,
    pub quantity: u32,
    pub location: String,
    /// Id of the configured location whose stream produced the row.
    #[serde(default)]
    pub location_id: String,
    /// Authoritative weight in pounds when the upstream row carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Upstream keys without a dedicated field; searched but never faceted.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, String>,
}

impl InventoryRecord {
    /// Lowercased concatenation of every field value, used for free-text search.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![
            self.product_code.as_str(),
            self.description.as_str(),
            self.product_type.as_str(),
            self.color.as_str(),
            self.design.as_str(),
            self.finish.as_str(),
            self.size.as_str(),
            self.location.as_str(),
        ];
        let quantity = self.quantity.to_string();
        parts.push(&quantity);
        let weight = self.weight.map(|w| w.to_string()).unwrap_or_default();
        parts.push(&weight);
        if let Some(unit) = self.unit.as_deref() {
            parts.push(unit);
        }
        parts.extend(self.extras.values().map(String::as_str));
        parts.join(" ").to_lowercase()
    }
}

/// How a single location's pagination loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// The upstream signalled the end (empty page, short page, declared total reached).
    Complete,
    /// A page failed or timed out; the batch holds whatever arrived before that.
    Aborted { kind: String, reason: String },
    /// The owning session was closed mid-flight.
    Cancelled,
}

/// Result of exhausting pagination for one location. Discarded after merge.
#[derive(Debug, Clone)]
pub struct LocationBatch {
    pub location: Location,
    pub records: Vec<InventoryRecord>,
    /// Total declared by the first page; authoritative stop signal.
    pub declared_total: Option<u64>,
    pub pages_requested: u32,
    pub status: BatchStatus,
}

impl LocationBatch {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, BatchStatus::Complete)
    }
}

/// Concatenation of every location's records; the unit that is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDataset {
    pub records: Vec<InventoryRecord>,
    pub captured_at: DateTime<Utc>,
    /// Set when the records are synthetic placeholders rather than stock.
    #[serde(default)]
    pub diagnostic: bool,
}

impl MergedDataset {
    pub fn new(records: Vec<InventoryRecord>, captured_at: DateTime<Utc>) -> Self {
        Self {
            records,
            captured_at,
            diagnostic: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records fetched from `location`. Rows without a location id match on name.
    pub fn records_for_location<'a>(
        &'a self,
        location: &'a Location,
    ) -> impl Iterator<Item = &'a InventoryRecord> + 'a {
        self.records.iter().filter(move |r| {
            if r.location_id.is_empty() {
                r.location.eq_ignore_ascii_case(&location.name)
            } else {
                r.location_id == location.id
            }
        })
    }

    /// First record carrying `product_code`. Codes are only unique within one batch.
    pub fn find_by_code(&self, product_code: &str) -> Option<&InventoryRecord> {
        self.records
            .iter()
            .find(|r| r.product_code.eq_ignore_ascii_case(product_code))
    }

    /// Synthetic render target used when no location produced any record.
    pub fn diagnostic(reason: &str, locations: &[Location], captured_at: DateTime<Utc>) -> Self {
        let (location_id, location) = locations
            .first()
            .map(|l| (l.id.clone(), l.name.clone()))
            .unwrap_or_else(|| (String::new(), "Unknown".to_string()));
        let record = InventoryRecord {
            product_code: "DIAGNOSTIC-001".to_string(),
            description: format!("Inventory unavailable: {reason}"),
            product_type: "Diagnostic".to_string(),
            color: "N/A".to_string(),
            design: "N/A".to_string(),
            finish: "N/A".to_string(),
            size: "N/A".to_string(),
            quantity: 0,
            location,
            location_id,
            ..InventoryRecord::default()
        };
        Self {
            records: vec![record],
            captured_at,
            diagnostic: true,
        }
    }
}

/// Persisted dataset plus its expiry instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub dataset: MergedDataset,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Fine-grained sub-record (one physical stone) of an inventory line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoneDetail {
    pub container: Option<String>,
    pub crate_no: Option<String>,
    pub location_name: Option<String>,
    pub sublocation_name: Option<String>,
    pub status: Option<String>,
    pub stock_id: Option<String>,
    pub comments: Option<String>,
    /// Authoritative weight in pounds.
    pub weight: Option<f64>,
    pub unit: Option<String>,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub dimensions: Option<String>,
}

/// Product image found for a design code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub path: String,
    pub name: String,
    pub category: String,
}
