use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::model::{BatchStatus, Location, LocationBatch, MergedDataset};

use super::provider::{InventorySource, PageQuery};

/// Pagination limits applied per location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchSettings {
    pub page_size: u32,
    pub max_pages: u32,
    pub page_timeout: Duration,
    pub location_timeout: Duration,
}

impl FetchSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            page_size: cfg.page_size.max(1),
            max_pages: cfg.max_pages.max(1),
            page_timeout: cfg.page_timeout,
            location_timeout: cfg.location_timeout,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Every location's batch from one fetch run, in configuration order.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub batches: Vec<LocationBatch>,
}

impl FetchOutcome {
    /// Outcome for a run abandoned as a whole, e.g. when the load budget ran out.
    pub fn abandoned(locations: &[Location], kind: &str, reason: &str) -> Self {
        Self {
            batches: locations
                .iter()
                .map(|location| LocationBatch {
                    location: location.clone(),
                    records: Vec::new(),
                    declared_total: None,
                    pages_requested: 0,
                    status: BatchStatus::Aborted {
                        kind: kind.to_string(),
                        reason: reason.to_string(),
                    },
                })
                .collect(),
        }
    }

    pub fn total_records(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    pub fn was_cancelled(&self) -> bool {
        self.batches
            .iter()
            .any(|b| matches!(b.status, BatchStatus::Cancelled))
    }

    /// Locations whose pagination ended on a failure or timeout.
    pub fn aborted(&self) -> impl Iterator<Item = &LocationBatch> {
        self.batches
            .iter()
            .filter(|b| matches!(b.status, BatchStatus::Aborted { .. }))
    }

    pub fn is_empty(&self) -> bool {
        self.total_records() == 0
    }

    /// Human-readable summary of why nothing usable came back.
    pub fn failure_reason(&self) -> String {
        let reasons: Vec<String> = self
            .aborted()
            .map(|b| match &b.status {
                BatchStatus::Aborted { reason, .. } => format!("{}: {reason}", b.location.name),
                _ => String::new(),
            })
            .collect();
        if reasons.is_empty() {
            "no location returned any records".to_string()
        } else {
            reasons.join("; ")
        }
    }

    /// Concatenate batches. With no records at all the result is the diagnostic placeholder.
    pub fn merge(&self, captured_at: DateTime<Utc>) -> MergedDataset {
        if self.is_empty() {
            let locations: Vec<Location> = self.batches.iter().map(|b| b.location.clone()).collect();
            warn!(
                locations = locations.len(),
                reason = %self.failure_reason(),
                "every location came back empty; using diagnostic dataset"
            );
            return MergedDataset::diagnostic(&self.failure_reason(), &locations, captured_at);
        }
        let records = self
            .batches
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect();
        MergedDataset::new(records, captured_at)
    }
}

/// Walks every location's pages concurrently; pages within a location are strictly sequential.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn InventorySource>,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(source: Arc<dyn InventorySource>, settings: FetchSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub async fn fetch_all(
        &self,
        locations: &[Location],
        filters: &[(String, String)],
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let runs = locations
            .iter()
            .map(|loc| self.fetch_location(loc.clone(), filters, cancel));
        FetchOutcome {
            batches: join_all(runs).await,
        }
    }

    /// Exhaust one location. Never fails: whatever arrived before an error is kept.
    pub async fn fetch_location(
        &self,
        location: Location,
        filters: &[(String, String)],
        cancel: &CancellationToken,
    ) -> LocationBatch {
        let loop_deadline = Instant::now() + self.settings.location_timeout;
        let page_size = self.settings.page_size;
        let mut records = Vec::new();
        let mut declared_total: Option<u64> = None;
        let mut pages_requested = 0u32;
        let mut page = 1u32;

        let status = loop {
            if page > self.settings.max_pages {
                warn!(
                    location = %location.id,
                    max_pages = self.settings.max_pages,
                    records = records.len(),
                    "page limit reached before upstream signalled the end"
                );
                break BatchStatus::Complete;
            }

            let query = PageQuery {
                location: location.clone(),
                page,
                page_size,
                filters: filters.to_vec(),
            };
            let page_deadline = Instant::now() + self.settings.page_timeout;
            let deadline = page_deadline.min(loop_deadline);
            pages_requested += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break BatchStatus::Cancelled,
                r = timeout_at(deadline, self.source.fetch_page(&query)) => r,
            };

            let fetched = match result {
                Err(_) => {
                    let reason = if deadline < page_deadline {
                        format!("location budget of {:?} exhausted on page {page}", self.settings.location_timeout)
                    } else {
                        format!("page {page} exceeded {:?}", self.settings.page_timeout)
                    };
                    break BatchStatus::Aborted {
                        kind: "timeout".into(),
                        reason,
                    };
                }
                Ok(Err(err)) => {
                    break BatchStatus::Aborted {
                        kind: err.kind().into(),
                        reason: err.to_string(),
                    }
                }
                Ok(Ok(fetched)) => fetched,
            };

            if page == 1 {
                declared_total = fetched.declared_total;
            }
            debug!(
                location = %location.id,
                page,
                received = fetched.received,
                accumulated = records.len() + fetched.records.len(),
                "page received"
            );

            if fetched.received == 0 {
                break BatchStatus::Complete;
            }
            records.extend(fetched.records);

            if let Some(total) = declared_total {
                if records.len() as u64 >= total {
                    records.truncate(total as usize);
                    break BatchStatus::Complete;
                }
            }
            if fetched.received < page_size as usize {
                break BatchStatus::Complete;
            }
            page += 1;
        };

        match &status {
            BatchStatus::Complete => info!(
                location = %location.id,
                name = %location.name,
                records = records.len(),
                pages = pages_requested,
                "location fetched"
            ),
            BatchStatus::Aborted { kind, reason } => warn!(
                location = %location.id,
                name = %location.name,
                kind = %kind,
                reason = %reason,
                kept = records.len(),
                "location aborted; keeping partial records"
            ),
            BatchStatus::Cancelled => debug!(location = %location.id, "location fetch cancelled"),
        }

        LocationBatch {
            location,
            records,
            declared_total,
            pages_requested,
            status,
        }
    }
}
