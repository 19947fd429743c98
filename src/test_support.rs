//! Scripted upstream and clock doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::cache::clock::Clock;
use crate::error::{InventoryError, InventoryResult};
use crate::inventory::{InventoryPage, InventorySource, PageQuery};
use crate::model::{ImageAsset, InventoryRecord, Location, StoneDetail};

#[derive(Debug, Clone)]
pub enum ScriptedPage {
    Page(InventoryPage),
    Fail(InventoryError),
    /// Never resolves; only a timeout or cancellation ends it.
    Hang,
}

pub fn record(location: &Location, code: &str) -> InventoryRecord {
    InventoryRecord {
        product_code: code.to_string(),
        description: format!("Serp Top {code}"),
        product_type: "Monument".into(),
        color: "Blue Pearl".into(),
        design: "Serp".into(),
        finish: "Polished".into(),
        size: "2-0 X 0-10 X 2-0".into(),
        quantity: 1,
        location: location.name.clone(),
        location_id: location.id.clone(),
        ..InventoryRecord::default()
    }
}

/// One page per entry in `sizes`; only the first page declares `total`.
pub fn full_pages(location: &Location, sizes: &[usize], total: Option<u64>) -> Vec<ScriptedPage> {
    sizes
        .iter()
        .enumerate()
        .map(|(page, &n)| {
            let records: Vec<InventoryRecord> = (0..n)
                .map(|i| record(location, &format!("{}-{}-{i}", location.id, page + 1)))
                .collect();
            ScriptedPage::Page(InventoryPage {
                received: records.len(),
                records,
                declared_total: if page == 0 { total } else { None },
            })
        })
        .collect()
}

/// In-memory [`InventorySource`] with per-location page scripts and request counters.
///
/// Pages past the end of a script come back empty.
#[derive(Default)]
pub struct FakeSource {
    scripts: Mutex<HashMap<String, Vec<ScriptedPage>>>,
    delays: Mutex<HashMap<String, Duration>>,
    requests: Mutex<HashMap<String, Vec<u32>>>,
    last_filters: Mutex<Vec<(String, String)>>,
    details: Mutex<HashMap<String, InventoryResult<Vec<StoneDetail>>>>,
    images: Mutex<HashMap<String, InventoryResult<Vec<ImageAsset>>>>,
    detail_delay: Mutex<Duration>,
    detail_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl FakeSource {
    pub fn script(&self, location_id: &str, pages: Vec<ScriptedPage>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(location_id.to_string(), pages);
    }

    /// Latency added before every page of `location_id` resolves.
    pub fn delay(&self, location_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(location_id.to_string(), delay);
    }

    pub fn details(&self, code: &str, result: InventoryResult<Vec<StoneDetail>>) {
        self.details.lock().unwrap().insert(code.to_string(), result);
    }

    pub fn detail_delay(&self, delay: Duration) {
        *self.detail_delay.lock().unwrap() = delay;
    }

    pub fn images(&self, term: &str, result: InventoryResult<Vec<ImageAsset>>) {
        self.images.lock().unwrap().insert(term.to_string(), result);
    }

    pub fn page_requests(&self, location_id: &str) -> usize {
        self.requested_pages(location_id).len()
    }

    pub fn requested_pages(&self, location_id: &str) -> Vec<u32> {
        self.requests
            .lock()
            .unwrap()
            .get(location_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_page_requests(&self) -> usize {
        self.requests.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn last_filters(&self) -> Vec<(String, String)> {
        self.last_filters.lock().unwrap().clone()
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InventorySource for FakeSource {
    async fn fetch_page(&self, query: &PageQuery) -> InventoryResult<InventoryPage> {
        let id = query.location.id.clone();
        self.requests
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .push(query.page);
        *self.last_filters.lock().unwrap() = query.filters.clone();

        let delay = self.delays.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|pages| pages.get(query.page as usize - 1).cloned());
        match scripted {
            Some(ScriptedPage::Page(page)) => Ok(page),
            Some(ScriptedPage::Fail(err)) => Err(err),
            Some(ScriptedPage::Hang) => std::future::pending().await,
            None => Ok(InventoryPage::default()),
        }
    }

    async fn fetch_details(&self, product_code: &str) -> InventoryResult<Vec<StoneDetail>> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.detail_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.details
            .lock()
            .unwrap()
            .get(product_code)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn search_images(&self, term: &str) -> InventoryResult<Vec<ImageAsset>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .unwrap()
            .get(term)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Starts at a fixed instant so expiry arithmetic is reproducible.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
