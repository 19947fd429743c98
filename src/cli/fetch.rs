use std::fmt::Write as _;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::{DatasetResult, Freshness};
use crate::config::EngineConfig;
use crate::model::{Location, MergedDataset};
use crate::session::SessionContext;

#[derive(Debug, Clone, Default)]
pub struct FetchConfig {
    /// Skip a fresh cache entry and go to upstream.
    pub force: bool,
    /// `facet=value` pairs.
    pub filters: Vec<String>,
    pub search: Option<String>,
}

pub async fn run(cfg: FetchConfig) -> Result<()> {
    let engine = EngineConfig::from_env()?;
    let filters = super::parse_filters(&cfg.filters, cfg.search.as_deref())?;
    let ctx = SessionContext::from_config(&engine).context("building inventory client")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling fetch");
            on_signal.cancel();
        }
    });

    info!(
        force = cfg.force,
        filters_active = filters.is_active(),
        locations = engine.locations.len(),
        "fetch: starting"
    );
    let result = ctx
        .cache
        .get(&filters, cfg.force, &cancel)
        .await
        .context("fetch cancelled")?;

    let matched = result
        .dataset()
        .records
        .iter()
        .filter(|r| filters.matches(r))
        .count();
    println!("{}", render_report(&result, ctx.cache.locations(), matched));
    Ok(())
}

pub fn render_report(result: &DatasetResult, locations: &[Location], matched: usize) -> String {
    let mut out = String::new();
    let dataset: &MergedDataset = result.dataset();

    writeln!(out, "INVENTORY FETCH SUMMARY:").ok();
    writeln!(out, "captured_at: {}", dataset.captured_at.to_rfc3339()).ok();
    let freshness = match result.freshness() {
        Some(Freshness::Cached) => "cached".to_string(),
        Some(Freshness::Live) => "live".to_string(),
        Some(Freshness::Partial { failed }) => format!("partial (failed: {})", failed.join(", ")),
        Some(Freshness::StaleLocations { locations }) => {
            format!("stale locations ({})", locations.join(", "))
        }
        Some(Freshness::StaleFallback { reason }) => format!("stale fallback ({reason})"),
        None => "unavailable".to_string(),
    };
    writeln!(out, "freshness: {freshness}").ok();
    for location in locations {
        let count = dataset.records_for_location(location).count();
        writeln!(out, "  {} [{}]: {count}", location.name, location.id).ok();
    }
    writeln!(out, "records: {} (matching filters: {matched})", dataset.len()).ok();
    if dataset.diagnostic {
        writeln!(out, "diagnostic placeholder: yes").ok();
    }
    if let Some(notice) = result.notice() {
        writeln!(out, "notice: {notice}").ok();
    }
    out
}
