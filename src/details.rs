//! On-demand stone details and design-code image association, memoized per session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::InventoryResult;
use crate::inventory::InventorySource;
use crate::model::{ImageAsset, InventoryRecord, StoneDetail};
use crate::normalization::{estimate_weight, WeightEstimate};

fn design_code_re() -> &'static Regex {
    static DESIGN_RE: OnceLock<Regex> = OnceLock::new();
    DESIGN_RE.get_or_init(|| Regex::new(r"(?i)\b(AG|AS)-?\d+\b").expect("static design pattern"))
}

/// First `AG-123` / `AS123` style code in `text`, upper-cased.
pub fn extract_design_code(text: &str) -> Option<String> {
    design_code_re()
        .find(text)
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// Design code of a record: the design field first, then the description.
pub fn design_code_for(record: &InventoryRecord) -> Option<String> {
    extract_design_code(&record.design).or_else(|| extract_design_code(&record.description))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoneView {
    #[serde(flatten)]
    pub stone: StoneDetail,
    pub weight: Option<WeightEstimate>,
    pub weight_label: Option<String>,
}

impl From<StoneDetail> for StoneView {
    fn from(stone: StoneDetail) -> Self {
        let weight = estimate_weight(&stone);
        Self {
            weight_label: weight.map(|w| w.label()),
            weight,
            stone,
        }
    }
}

/// Everything shown for one selected row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    pub product_code: String,
    pub design_code: Option<String>,
    pub stones: Vec<StoneView>,
    pub images: Vec<ImageAsset>,
    /// Set when the stone lookup failed; images may still be present.
    pub error: Option<String>,
}

type Memo<T> = Mutex<HashMap<String, Arc<OnceCell<Vec<T>>>>>;

/// Per-session memo over the detail and image endpoints.
///
/// Stone lookups are retried after a failure; image lookups cache failures as empty.
pub struct DetailLookup {
    source: Arc<dyn InventorySource>,
    details: Memo<StoneDetail>,
    images: Memo<ImageAsset>,
}

impl DetailLookup {
    pub fn new(source: Arc<dyn InventorySource>) -> Self {
        Self {
            source,
            details: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
        }
    }

    fn cell<T>(memo: &Memo<T>, key: &str) -> Arc<OnceCell<Vec<T>>> {
        let mut map = match memo.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(key.to_string()).or_default().clone()
    }

    /// Stone records for `product_code`; one upstream request per code, concurrent callers share it.
    pub async fn get_details(&self, product_code: &str) -> InventoryResult<Vec<StoneDetail>> {
        let code = product_code.trim();
        let cell = Self::cell(&self.details, code);
        if cell.initialized() {
            debug!(product_code = %code, "stone details from memo");
        }
        let stones = cell
            .get_or_try_init(|| async { self.source.fetch_details(code).await })
            .await?;
        Ok(stones.clone())
    }

    /// Images for `design_code`. Empty and failed searches are remembered as empty.
    pub async fn find_images(&self, design_code: &str) -> Vec<ImageAsset> {
        let code = design_code.trim().to_ascii_uppercase();
        let cell = Self::cell(&self.images, &code);
        cell.get_or_init(|| async {
            match self.source.search_images(&code).await {
                Ok(images) => images,
                Err(err) => {
                    warn!(design_code = %code, error = %err, "image search failed; caching empty result");
                    Vec::new()
                }
            }
        })
        .await
        .clone()
    }

    pub async fn images_for(&self, record: &InventoryRecord) -> Vec<ImageAsset> {
        match design_code_for(record) {
            Some(code) => self.find_images(&code).await,
            None => Vec::new(),
        }
    }

    /// Stones and images for a selected row, looked up concurrently.
    pub async fn select(&self, record: &InventoryRecord) -> ItemDetail {
        let (stones, images) = tokio::join!(
            self.get_details(&record.product_code),
            self.images_for(record)
        );
        let (stones, error) = match stones {
            Ok(stones) => (stones.into_iter().map(StoneView::from).collect(), None),
            Err(err) => {
                warn!(product_code = %record.product_code, error = %err, "stone details unavailable");
                (Vec::new(), Some(err.to_string()))
            }
        };
        ItemDetail {
            product_code: record.product_code.clone(),
            design_code: design_code_for(record),
            stones,
            images,
            error,
        }
    }
}
