use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::facets::{facet_values, Facet, FilterState};
use crate::session::SessionContext;

#[derive(Debug, Clone)]
pub struct FacetsConfig {
    /// Field name in any accepted spelling (`color`, `PColor`, ...).
    pub field: String,
}

pub async fn run(cfg: FacetsConfig) -> Result<()> {
    let facet: Facet = cfg.field.parse()?;
    let engine = EngineConfig::from_env()?;
    let ctx = SessionContext::from_config(&engine).context("building inventory client")?;

    let result = ctx
        .cache
        .get(&FilterState::new(), false, &CancellationToken::new())
        .await
        .context("facet load cancelled")?;
    if let Some(notice) = result.notice() {
        eprintln!("{notice}");
    }

    let values = facet_values(&result.dataset().records, facet);
    println!("{} ({} values):", facet, values.len());
    for value in values {
        println!("  {value}");
    }
    Ok(())
}
