//! Upstream access: the proxy client and the multi-location paginated fetcher.

pub mod fetcher;
pub mod provider;

pub use fetcher::{FetchOutcome, FetchSettings, Fetcher};
pub use provider::{InventoryPage, InventorySource, PageQuery, ProxyProvider};
