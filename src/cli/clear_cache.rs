use anyhow::{Context, Result};
use tracing::info;

use crate::config::EngineConfig;
use crate::session::SessionContext;

#[derive(Debug, Clone, Default)]
pub struct ClearCacheConfig;

pub async fn run(_cfg: ClearCacheConfig) -> Result<()> {
    let engine = EngineConfig::from_env()?;
    let ctx = SessionContext::from_config(&engine).context("building inventory client")?;
    ctx.cache
        .clear()
        .await
        .with_context(|| format!("clearing cache at {}", engine.cache_path.display()))?;
    info!(path = %engine.cache_path.display(), key = %engine.cache_key, "cache entry removed");
    println!("cache cleared: {}", engine.cache_path.display());
    Ok(())
}
