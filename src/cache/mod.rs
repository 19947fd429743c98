//! Merge & cache layer: serves the persisted dataset while fresh, otherwise fetches and merges.

pub mod clock;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{InventoryError, InventoryResult};
use crate::facets::{Facet, FilterState};
use crate::inventory::{FetchOutcome, Fetcher};
use crate::model::{CacheEntry, Location, MergedDataset};

pub use clock::{Clock, SystemClock};
pub use store::{FileStore, KeyValueStore, MemoryStore};

/// How a loaded dataset relates to upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Freshness {
    /// Served from a cache entry that has not expired.
    Cached,
    /// Every location completed.
    Live,
    /// Some locations failed and no cached records existed to stand in for them.
    Partial { failed: Vec<String> },
    /// Failed locations were filled from the last cache entry.
    StaleLocations { locations: Vec<String> },
    /// Nothing came back live; the whole last cache entry is served.
    StaleFallback { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataset {
    pub dataset: Arc<MergedDataset>,
    pub freshness: Freshness,
}

/// Typed outcome of [`DatasetCache::get`]. Every variant is renderable.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetResult {
    Loaded(LoadedDataset),
    /// No live data and no cache entry at all.
    Unavailable {
        reason: String,
        placeholder: Arc<MergedDataset>,
    },
}

impl DatasetResult {
    /// The dataset to render; the diagnostic placeholder when unavailable.
    pub fn dataset(&self) -> &Arc<MergedDataset> {
        match self {
            DatasetResult::Loaded(loaded) => &loaded.dataset,
            DatasetResult::Unavailable { placeholder, .. } => placeholder,
        }
    }

    pub fn freshness(&self) -> Option<&Freshness> {
        match self {
            DatasetResult::Loaded(loaded) => Some(&loaded.freshness),
            DatasetResult::Unavailable { .. } => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, DatasetResult::Unavailable { .. })
    }

    /// User-visible indicator, if the result is anything other than fresh.
    pub fn notice(&self) -> Option<String> {
        match self {
            DatasetResult::Loaded(loaded) => match &loaded.freshness {
                Freshness::Cached | Freshness::Live => None,
                Freshness::Partial { failed } => Some(format!(
                    "Some locations could not be loaded: {}",
                    failed.join(", ")
                )),
                Freshness::StaleLocations { .. } | Freshness::StaleFallback { .. } => {
                    Some("Could not refresh, showing last known data".to_string())
                }
            },
            DatasetResult::Unavailable { .. } => {
                Some("Inventory is unavailable right now. Retry to load it again.".to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub key: String,
    pub ttl: Duration,
    pub load_timeout: Duration,
    pub locations: Vec<Location>,
}

impl CacheSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            key: cfg.cache_key.clone(),
            ttl: cfg.cache_ttl,
            load_timeout: cfg.load_timeout,
            locations: cfg.locations.clone(),
        }
    }
}

/// Owns the single persisted [`CacheEntry`] and the refresh policy around it.
pub struct DatasetCache {
    fetcher: Fetcher,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    last_expiry: Mutex<Option<DateTime<Utc>>>,
}

impl DatasetCache {
    pub fn new(
        fetcher: Fetcher,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            clock,
            settings,
            last_expiry: Mutex::new(None),
        }
    }

    pub fn locations(&self) -> &[Location] {
        &self.settings.locations
    }

    /// Cached dataset while fresh and unfiltered; otherwise fetch, merge and (maybe) persist.
    ///
    /// The only error is [`InventoryError::Cancelled`]: a cancelled run writes nothing.
    pub async fn get(
        &self,
        filters: &FilterState,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> InventoryResult<DatasetResult> {
        let filters_active = filters.is_active();
        let stored = self.load_entry().await;

        if !force_refresh && !filters_active {
            match &stored {
                Some(entry) if entry.is_fresh(self.clock.now()) => {
                    debug!(
                        records = entry.dataset.len(),
                        expires_at = %entry.expires_at,
                        "cache hit"
                    );
                    return Ok(DatasetResult::Loaded(LoadedDataset {
                        dataset: Arc::new(entry.dataset.clone()),
                        freshness: Freshness::Cached,
                    }));
                }
                Some(entry) => info!(expires_at = %entry.expires_at, "cache entry expired; refetching"),
                None => debug!("cache miss"),
            }
        }

        let locations = self.narrowed_locations(filters);
        let params = filters.upstream_params();
        let outcome = match tokio::time::timeout(
            self.settings.load_timeout,
            self.fetcher.fetch_all(&locations, &params, cancel),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                let reason = format!("load budget of {:?} exhausted", self.settings.load_timeout);
                warn!(reason = %reason, "abandoning fetch run");
                FetchOutcome::abandoned(&locations, "timeout", &reason)
            }
        };

        if cancel.is_cancelled() || outcome.was_cancelled() {
            debug!("fetch finished after cancellation; dropping result");
            return Err(InventoryError::Cancelled);
        }

        Ok(self.settle(outcome, stored, filters_active).await)
    }

    /// Turn a finished fetch run into a result, persisting it when allowed.
    async fn settle(
        &self,
        outcome: FetchOutcome,
        stored: Option<CacheEntry>,
        filters_active: bool,
    ) -> DatasetResult {
        let captured_at = self.clock.now();

        if outcome.is_empty() {
            let reason = outcome.failure_reason();
            return match stored {
                Some(entry) => {
                    warn!(
                        reason = %reason,
                        records = entry.dataset.len(),
                        "refresh failed; serving last cached dataset"
                    );
                    DatasetResult::Loaded(LoadedDataset {
                        dataset: Arc::new(entry.dataset),
                        freshness: Freshness::StaleFallback { reason },
                    })
                }
                None => {
                    warn!(reason = %reason, "no live data and no cache entry");
                    DatasetResult::Unavailable {
                        placeholder: Arc::new(outcome.merge(captured_at)),
                        reason,
                    }
                }
            };
        }

        let mut records = Vec::with_capacity(outcome.total_records());
        let mut substituted = Vec::new();
        let mut failed = Vec::new();
        for batch in &outcome.batches {
            if !batch.is_complete() {
                let stale: Vec<_> = stored
                    .as_ref()
                    .map(|entry| {
                        entry
                            .dataset
                            .records_for_location(&batch.location)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if !stale.is_empty() {
                    warn!(
                        location = %batch.location.id,
                        live = batch.records.len(),
                        stale = stale.len(),
                        "location failed; using its records from the last cache entry"
                    );
                    substituted.push(batch.location.name.clone());
                    records.extend(stale);
                    continue;
                }
                failed.push(batch.location.name.clone());
            }
            records.extend(batch.records.iter().cloned());
        }

        let dataset = MergedDataset::new(records, captured_at);
        let freshness = if !substituted.is_empty() {
            Freshness::StaleLocations {
                locations: substituted,
            }
        } else if !failed.is_empty() {
            Freshness::Partial { failed }
        } else {
            Freshness::Live
        };

        // Only a run where every location completed is persisted.
        let persist = !filters_active && !dataset.diagnostic && freshness == Freshness::Live;
        if persist {
            self.write_entry(&dataset, stored.as_ref().map(|e| e.expires_at))
                .await;
        } else {
            debug!(filters_active, freshness = ?freshness, "result not persisted");
        }

        DatasetResult::Loaded(LoadedDataset {
            dataset: Arc::new(dataset),
            freshness,
        })
    }

    /// A location facet naming a configured location restricts the fetch to it.
    fn narrowed_locations(&self, filters: &FilterState) -> Vec<Location> {
        let all = &self.settings.locations;
        let Some(wanted) = filters.selection(Facet::Location) else {
            return all.clone();
        };
        let narrowed: Vec<Location> = all
            .iter()
            .filter(|l| l.name.eq_ignore_ascii_case(wanted) || l.id == wanted)
            .cloned()
            .collect();
        if narrowed.is_empty() {
            all.clone()
        } else {
            narrowed
        }
    }

    /// Current entry, fresh or not. Store failures read as a miss.
    pub async fn load_entry(&self) -> Option<CacheEntry> {
        let raw = match self.store.get(&self.settings.key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(error = %err, key = %self.settings.key, "cache read failed; treating as miss");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if !entry.dataset.diagnostic => Some(entry),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, key = %self.settings.key, "cache entry unreadable; treating as miss");
                None
            }
        }
    }

    /// Expiry is `captured_at + ttl`, nudged past every previously issued expiry.
    async fn write_entry(&self, dataset: &MergedDataset, stored_expiry: Option<DateTime<Utc>>) {
        let mut last = self.last_expiry.lock().await;
        let ttl = chrono::Duration::from_std(self.settings.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let mut expires_at = dataset.captured_at + ttl;
        if let Some(prev) = (*last).max(stored_expiry) {
            if expires_at <= prev {
                expires_at = prev + chrono::Duration::milliseconds(1);
            }
        }

        let entry = CacheEntry {
            dataset: dataset.clone(),
            expires_at,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "cache entry serialization failed; not persisted");
                return;
            }
        };
        match self.store.put(&self.settings.key, raw).await {
            Ok(()) => {
                *last = Some(expires_at);
                info!(records = dataset.len(), expires_at = %expires_at, "cache written");
            }
            Err(err) => warn!(error = %err, "cache write failed; continuing uncached"),
        }
    }

    pub async fn clear(&self) -> InventoryResult<()> {
        self.store.remove(&self.settings.key).await?;
        *self.last_expiry.lock().await = None;
        info!(key = %self.settings.key, "cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::inventory::FetchSettings;
    use crate::test_support::{full_pages, FakeSource, ManualClock, ScriptedPage};

    fn elberton() -> Location {
        Location::new("45555", "Elberton")
    }

    fn barre() -> Location {
        Location::new("45587", "Barre")
    }

    struct Harness {
        source: Arc<FakeSource>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        cache: DatasetCache,
    }

    fn harness_with_store(store: Arc<dyn KeyValueStore>, mem: Arc<MemoryStore>) -> Harness {
        let source = Arc::new(FakeSource::default());
        let clock = Arc::new(ManualClock::new());
        let fetcher = Fetcher::new(
            source.clone(),
            FetchSettings {
                page_size: 1000,
                max_pages: 10,
                page_timeout: Duration::from_secs(15),
                location_timeout: Duration::from_secs(120),
            },
        );
        let cache = DatasetCache::new(
            fetcher,
            store,
            clock.clone(),
            CacheSettings {
                key: "inventoryData".into(),
                ttl: Duration::from_secs(60),
                load_timeout: Duration::from_secs(180),
                locations: vec![elberton(), barre()],
            },
        );
        Harness {
            source,
            clock,
            store: mem,
            cache,
        }
    }

    fn harness() -> Harness {
        let mem = Arc::new(MemoryStore::new());
        harness_with_store(mem.clone(), mem)
    }

    fn script_both(h: &Harness, a: usize, b: usize) {
        h.source.script("45555", full_pages(&elberton(), &[a], None));
        h.source.script("45587", full_pages(&barre(), &[b], None));
    }

    async fn stored_entry(h: &Harness) -> Option<CacheEntry> {
        let raw = h.store.get("inventoryData").await.unwrap()?;
        Some(serde_json::from_str(&raw).unwrap())
    }

    fn unfiltered() -> FilterState {
        FilterState::new()
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_window_serves_cache_then_refetches() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 3, 2);

        let first = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(first.freshness(), Some(&Freshness::Live));
        assert_eq!(first.dataset().len(), 5);
        assert_eq!(h.source.total_page_requests(), 2);

        h.clock.advance(Duration::from_secs(30));
        let second = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(second.freshness(), Some(&Freshness::Cached));
        assert_eq!(second.dataset().records, first.dataset().records);
        assert_eq!(h.source.total_page_requests(), 2);

        h.clock.advance(Duration::from_secs(31));
        let third = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(third.freshness(), Some(&Freshness::Live));
        assert_eq!(h.source.total_page_requests(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_strictly_increases_across_writes() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 1, 1);

        h.cache.get(&unfiltered(), true, &cancel).await.unwrap();
        let first = stored_entry(&h).await.unwrap().expires_at;
        // Same instant: the computed expiry collides and must be nudged forward.
        h.cache.get(&unfiltered(), true, &cancel).await.unwrap();
        let second = stored_entry(&h).await.unwrap().expires_at;
        h.clock.advance(Duration::from_secs(5));
        h.cache.get(&unfiltered(), true, &cancel).await.unwrap();
        let third = stored_entry(&h).await.unwrap().expires_at;

        assert!(second > first);
        assert!(third > second);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_bypasses_a_fresh_entry() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 2, 2);
        h.cache.get(&unfiltered(), false, &cancel).await.unwrap();

        let refreshed = h.cache.get(&unfiltered(), true, &cancel).await.unwrap();
        assert_eq!(refreshed.freshness(), Some(&Freshness::Live));
        assert_eq!(h.source.total_page_requests(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn filtered_results_are_never_persisted() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 2, 2);
        let filters = FilterState::new().with(Facet::Color, "Blue Pearl");

        let result = h.cache.get(&filters, false, &cancel).await.unwrap();
        assert_eq!(result.freshness(), Some(&Freshness::Live));
        assert!(stored_entry(&h).await.is_none());
        assert_eq!(
            h.source.last_filters(),
            vec![("pcolor".to_string(), "Blue Pearl".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn location_facet_narrows_the_fetch() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 2, 3);
        let filters = FilterState::new().with(Facet::Location, "barre");

        let result = h.cache.get(&filters, false, &cancel).await.unwrap();
        assert_eq!(result.dataset().len(), 3);
        assert_eq!(h.source.page_requests("45555"), 0);
        assert_eq!(h.source.page_requests("45587"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_location_is_filled_from_the_stale_entry() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 3, 2);
        h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        let before = stored_entry(&h).await.unwrap();

        h.source.script("45555", full_pages(&elberton(), &[4], None));
        h.source.script("45587", vec![ScriptedPage::Hang]);
        let result = h.cache.get(&unfiltered(), true, &cancel).await.unwrap();

        assert_eq!(
            result.freshness(),
            Some(&Freshness::StaleLocations {
                locations: vec!["Barre".into()]
            })
        );
        let ds = result.dataset();
        assert_eq!(ds.records_for_location(&elberton()).count(), 4);
        assert_eq!(ds.records_for_location(&barre()).count(), 2);
        assert_eq!(
            result.notice().as_deref(),
            Some("Could not refresh, showing last known data")
        );
        // Mixed-age data is not persisted.
        assert_eq!(stored_entry(&h).await.unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_success_is_reported_but_not_persisted() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.source.script("45555", full_pages(&elberton(), &[3], None));
        h.source.script(
            "45587",
            vec![ScriptedPage::Fail(InventoryError::Network("refused".into()))],
        );

        let result = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(
            result.freshness(),
            Some(&Freshness::Partial {
                failed: vec!["Barre".into()]
            })
        );
        assert_eq!(result.dataset().len(), 3);
        assert!(stored_entry(&h).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn location_recovering_after_a_partial_run_is_fetched_again() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.source.script("45555", full_pages(&elberton(), &[3], None));
        h.source.script(
            "45587",
            vec![ScriptedPage::Fail(InventoryError::Network("refused".into()))],
        );
        h.cache.get(&unfiltered(), false, &cancel).await.unwrap();

        h.source.script("45587", full_pages(&barre(), &[2], None));
        h.clock.advance(Duration::from_secs(30));
        let second = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();

        assert_eq!(second.freshness(), Some(&Freshness::Live));
        assert!(second.notice().is_none());
        assert_eq!(second.dataset().records_for_location(&barre()).count(), 2);
        assert_eq!(stored_entry(&h).await.unwrap().dataset.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_serves_the_expired_entry() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 3, 2);
        h.cache.get(&unfiltered(), false, &cancel).await.unwrap();

        h.clock.advance(Duration::from_secs(120));
        for id in ["45555", "45587"] {
            h.source.script(
                id,
                vec![ScriptedPage::Fail(InventoryError::Timeout("page 1".into()))],
            );
        }
        let result = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert!(matches!(result.freshness(), Some(Freshness::StaleFallback { .. })));
        assert_eq!(result.dataset().len(), 5);
        assert!(result.notice().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_without_entry_is_unavailable_and_not_cached() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 0, 0);

        let result = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert!(result.is_unavailable());
        assert!(result.dataset().diagnostic);
        assert_eq!(result.dataset().len(), 1);
        assert!(result.notice().unwrap().contains("Retry"));
        assert!(stored_entry(&h).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_writes_nothing() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.source.script("45555", full_pages(&elberton(), &[3], None));
        h.source.script("45587", vec![ScriptedPage::Hang]);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });
        let err = h.cache.get(&unfiltered(), false, &cancel).await.unwrap_err();
        assert_eq!(err, InventoryError::Cancelled);
        assert!(stored_entry(&h).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn load_budget_abandons_the_run() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 3, 2);
        h.cache.get(&unfiltered(), false, &cancel).await.unwrap();

        h.source.delay("45555", Duration::from_secs(100));
        h.source.delay("45587", Duration::from_secs(100));
        let cache = DatasetCache {
            settings: CacheSettings {
                load_timeout: Duration::from_secs(10),
                ..h.cache.settings.clone()
            },
            ..h.cache
        };
        let result = cache.get(&unfiltered(), true, &cancel).await.unwrap();
        assert!(
            matches!(result.freshness(), Some(Freshness::StaleFallback { reason }) if reason.contains("budget"))
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> InventoryResult<Option<String>> {
            Err(InventoryError::CacheStore("quota exceeded".into()))
        }

        async fn put(&self, _key: &str, _value: String) -> InventoryResult<()> {
            Err(InventoryError::CacheStore("quota exceeded".into()))
        }

        async fn remove(&self, _key: &str) -> InventoryResult<()> {
            Err(InventoryError::CacheStore("quota exceeded".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn store_failures_behave_like_a_miss() {
        let h = harness_with_store(Arc::new(BrokenStore), Arc::new(MemoryStore::new()));
        let cancel = CancellationToken::new();
        script_both(&h, 2, 1);

        let first = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(first.freshness(), Some(&Freshness::Live));
        let second = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(second.freshness(), Some(&Freshness::Live));
        assert_eq!(h.source.total_page_requests(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn corrupt_entry_is_a_miss() {
        let h = harness();
        let cancel = CancellationToken::new();
        h.store
            .put("inventoryData", "{\"dataset\":".into())
            .await
            .unwrap();
        script_both(&h, 1, 1);

        let result = h.cache.get(&unfiltered(), false, &cancel).await.unwrap();
        assert_eq!(result.freshness(), Some(&Freshness::Live));
        assert!(stored_entry(&h).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_removes_the_entry() {
        let h = harness();
        let cancel = CancellationToken::new();
        script_both(&h, 1, 1);
        h.cache.get(&unfiltered(), false, &cancel).await.unwrap();

        h.cache.clear().await.unwrap();
        assert!(h.cache.load_entry().await.is_none());
    }
}
