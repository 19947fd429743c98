//! Engine configuration resolved from the environment (`.env` supported).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::model::Location;
use crate::util::env as env_util;

pub const DEFAULT_PROXY_URL: &str = "http://localhost:8000/inventory-proxy.php";
pub const DEFAULT_IMAGE_INDEX_URL: &str = "http://localhost:8000/get_directory_files.php";
pub const DEFAULT_LOCATIONS: &str = "45555:Elberton,45587:Barre";
pub const DEFAULT_CACHE_KEY: &str = "inventoryData";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub proxy_url: String,
    pub image_index_url: String,
    /// Passed through to the proxy verbatim.
    pub token: Option<String>,
    pub user_agent: String,
    pub locations: Vec<Location>,
    pub page_size: u32,
    pub max_pages: u32,
    pub page_timeout: Duration,
    pub location_timeout: Duration,
    pub load_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_path: PathBuf,
    pub cache_key: String,
    pub rows_per_page: usize,
    pub search_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            image_index_url: DEFAULT_IMAGE_INDEX_URL.to_string(),
            token: None,
            user_agent: "StoneInventory/1.0".to_string(),
            locations: parse_locations(DEFAULT_LOCATIONS),
            page_size: 1000,
            max_pages: 200,
            page_timeout: Duration::from_secs(15),
            location_timeout: Duration::from_secs(120),
            load_timeout: Duration::from_secs(180),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            cache_path: std::env::temp_dir().join("stone-inventory-cache.json"),
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            rows_per_page: 50,
            search_debounce: Duration::from_millis(150),
        }
    }
}

impl EngineConfig {
    /// Build from `INVENTORY_*` variables, falling back to [`EngineConfig::default`] per key.
    pub fn from_env() -> Result<Self> {
        env_util::init_env();
        let defaults = Self::default();

        let locations = match env_util::env_opt("INVENTORY_LOCATIONS") {
            Some(raw) => parse_locations(&raw),
            None => defaults.locations.clone(),
        };
        if locations.is_empty() {
            bail!("INVENTORY_LOCATIONS did not contain any location id");
        }

        let page_size = env_util::env_parse("INVENTORY_PAGE_SIZE", defaults.page_size).max(1);
        let max_pages = env_util::env_parse("INVENTORY_MAX_PAGES", defaults.max_pages).max(1);
        let ttl_minutes = env_util::env_parse("INVENTORY_CACHE_TTL_MINUTES", 1440u64).max(1);
        let rows_per_page =
            env_util::env_parse("INVENTORY_ROWS_PER_PAGE", defaults.rows_per_page).max(1);

        Ok(Self {
            proxy_url: env_util::env_opt("INVENTORY_PROXY_URL").unwrap_or(defaults.proxy_url),
            image_index_url: env_util::env_opt("INVENTORY_IMAGE_INDEX_URL")
                .unwrap_or(defaults.image_index_url),
            token: env_util::env_opt("INVENTORY_TOKEN"),
            user_agent: env_util::env_opt("INVENTORY_HTTP_USER_AGENT")
                .unwrap_or(defaults.user_agent),
            locations,
            page_size,
            max_pages,
            page_timeout: env_util::env_secs("INVENTORY_PAGE_TIMEOUT_SECS", 15),
            location_timeout: env_util::env_secs("INVENTORY_LOCATION_TIMEOUT_SECS", 120),
            load_timeout: env_util::env_secs("INVENTORY_LOAD_TIMEOUT_SECS", 180),
            cache_ttl: Duration::from_secs(ttl_minutes * 60),
            cache_path: env_util::env_opt("INVENTORY_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            cache_key: env_util::env_opt("INVENTORY_CACHE_KEY").unwrap_or(defaults.cache_key),
            rows_per_page,
            search_debounce: env_util::env_millis("INVENTORY_SEARCH_DEBOUNCE_MS", 150),
        })
    }

    /// Configured location whose name or id matches `needle` (case-insensitive).
    pub fn location_named(&self, needle: &str) -> Option<&Location> {
        let needle = needle.trim();
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(needle) || l.id == needle)
    }
}

/// Parse `id[:name]` pairs separated by commas. Missing names get `Location <id>`.
pub fn parse_locations(raw: &str) -> Vec<Location> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let (id, name) = match part.split_once(':') {
                Some((id, name)) => (id.trim(), name.trim()),
                None => (part, ""),
            };
            if id.is_empty() {
                return None;
            }
            let name = if name.is_empty() {
                Location::fallback_name(id)
            } else {
                name.to_string()
            };
            Some(Location::new(id, name))
        })
        .collect()
}
