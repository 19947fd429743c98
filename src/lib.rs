pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod details;
pub mod error;
pub mod facets;
pub mod inventory;
pub mod model;
pub mod normalization;
pub mod session;
pub mod tracing;
pub mod view;

pub mod util {
    pub mod env;
}

#[cfg(test)]
mod test_support;

pub use cache::{DatasetCache, DatasetResult, Freshness};
pub use config::EngineConfig;
pub use error::{InventoryError, InventoryResult};
pub use session::{SessionContext, SessionHandle, SessionState, UiEvent};
