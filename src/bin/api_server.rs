// HTTP API server binary: exposes one inventory session as UI events over HTTP

use anyhow::{Context, Result};
use stone_inventory::api::ApiServer;
use stone_inventory::config::EngineConfig;
use stone_inventory::session::{SessionContext, SessionHandle};
use stone_inventory::tracing::{init_tracing, LogFormat};
use stone_inventory::util::env as env_util;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load dotenv/env once (safe to call multiple times)
    env_util::init_env();
    init_tracing("info,actix_web=info", LogFormat::from_env())?;

    tracing::info!("Initializing stone inventory API server");

    let server = ApiServer::from_env()?;
    let engine = EngineConfig::from_env()?;
    let ctx = SessionContext::from_config(&engine).context("building inventory session")?;

    tracing::info!(
        locations = engine.locations.len(),
        cache = %engine.cache_path.display(),
        "Inventory session ready"
    );

    server.run(SessionHandle::spawn(ctx)).await?;

    Ok(())
}
