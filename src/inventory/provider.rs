use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{InventoryError, InventoryResult};
use crate::model::{ImageAsset, InventoryRecord, Location, StoneDetail};
use crate::normalization::record::value_as_f64;
use crate::normalization::{normalize_record, normalize_stone};

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

/// One page request against the proxy for a single location.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    pub location: Location,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    /// Upstream facet parameters (`ptype`, `pcolor`, ...) forwarded verbatim.
    pub filters: Vec<(String, String)>,
}

/// Normalized content of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryPage {
    pub records: Vec<InventoryRecord>,
    /// Entries in the raw `Data` array, including ones that failed to normalize.
    pub received: usize,
    pub declared_total: Option<u64>,
}

/// Upstream seam used by the fetcher and the detail lookup.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> InventoryResult<InventoryPage>;

    /// Stone records behind one product code.
    async fn fetch_details(&self, product_code: &str) -> InventoryResult<Vec<StoneDetail>>;

    /// Image index search, deduplicated by path.
    async fn search_images(&self, term: &str) -> InventoryResult<Vec<ImageAsset>>;
}

/// Inventory proxy client.
///
/// Endpoints:
/// - GET  `<proxy>?page=&pageSize=&locid=&token=&ptype=...` - paged stock rows per location
/// - POST `<proxy>` form `action=getDetails&epcode=` - stone records for one product code
/// - GET  `<image index>?search=<design code>` - product imagery listing
#[derive(Debug, Clone)]
pub struct ProxyProvider {
    proxy_url: String,
    image_index_url: String,
    http: Client,
    token: Option<String>,
}

impl ProxyProvider {
    pub fn new(
        proxy_url: &str,
        image_index_url: &str,
        timeout_secs: Option<u64>,
        user_agent: Option<&str>,
    ) -> InventoryResult<Self> {
        let timeout_secs = timeout_secs.unwrap_or(15);
        let http = Client::builder()
            .user_agent(user_agent.unwrap_or("StoneInventory/1.0"))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            proxy_url: proxy_url.trim_end_matches('/').to_string(),
            image_index_url: image_index_url.trim_end_matches('/').to_string(),
            http,
            token: None,
        })
    }

    pub fn from_config(cfg: &EngineConfig) -> InventoryResult<Self> {
        Ok(Self::new(
            &cfg.proxy_url,
            &cfg.image_index_url,
            Some(cfg.page_timeout.as_secs().max(1)),
            Some(&cfg.user_agent),
        )?
        .with_token(cfg.token.clone()))
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|s| !s.trim().is_empty());
        self
    }

    async fn read_json(resp: reqwest::Response, what: &str, url: &str) -> InventoryResult<Value> {
        let status = resp.status();
        if !status.is_success() {
            let body = truncate_for_log(resp.text().await.unwrap_or_default(), 2000);
            return Err(InventoryError::Network(format!(
                "{what} failed: {status} url={url} body={body}"
            )));
        }
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            InventoryError::MalformedResponse(format!(
                "{what} returned invalid JSON: {e} body={}",
                truncate_for_log(text, 500)
            ))
        })
    }
}

#[async_trait]
impl InventorySource for ProxyProvider {
    async fn fetch_page(&self, query: &PageQuery) -> InventoryResult<InventoryPage> {
        let mut params: Vec<(String, String)> = vec![
            ("page".into(), query.page.to_string()),
            ("pageSize".into(), query.page_size.to_string()),
            ("locid".into(), query.location.id.clone()),
        ];
        if let Some(token) = self.token.as_deref() {
            params.push(("token".into(), token.to_string()));
        }
        params.extend(query.filters.iter().cloned());
        params.push(("timestamp".into(), Utc::now().timestamp_millis().to_string()));

        let resp = self
            .http
            .get(&self.proxy_url)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await?;
        let body = Self::read_json(resp, "inventory page", &self.proxy_url).await?;
        let page = parse_page(&body, &query.location)?;
        debug!(
            location = %query.location.id,
            page = query.page,
            received = page.received,
            declared_total = ?page.declared_total,
            "inventory page fetched"
        );
        Ok(page)
    }

    async fn fetch_details(&self, product_code: &str) -> InventoryResult<Vec<StoneDetail>> {
        let resp = self
            .http
            .post(&self.proxy_url)
            .header("Accept", "application/json")
            .form(&[("action", "getDetails"), ("epcode", product_code)])
            .send()
            .await?;
        let body = Self::read_json(resp, "stone details", &self.proxy_url).await?;
        parse_details(&body)
    }

    async fn search_images(&self, term: &str) -> InventoryResult<Vec<ImageAsset>> {
        let resp = self
            .http
            .get(&self.image_index_url)
            .header("Accept", "application/json")
            .query(&[("search", term)])
            .send()
            .await?;
        let body = Self::read_json(resp, "image search", &self.image_index_url).await?;
        parse_images(&body)
    }
}

/// `success:false` or a non-empty `error` field means the proxy rejected the call.
fn upstream_error(body: &Value) -> Option<String> {
    let error = body
        .get("error")
        .and_then(|e| match e {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Null | Value::Bool(false) => None,
            Value::String(_) => None,
            other => Some(other.to_string()),
        });
    if error.is_some() {
        return error;
    }
    match body.get("success") {
        Some(Value::Bool(false)) => Some(
            body.get("message")
                .and_then(Value::as_str)
                .unwrap_or("proxy reported success=false")
                .to_string(),
        ),
        _ => None,
    }
}

fn declared_total(body: &Value) -> Option<u64> {
    ["Total", "total", "totalItems"]
        .iter()
        .find_map(|k| body.get(*k))
        .or_else(|| body.get("pagination").and_then(|p| p.get("totalItems")))
        .and_then(value_as_f64)
        .filter(|t| *t > 0.0)
        .map(|t| t.round() as u64)
}

pub fn parse_page(body: &Value, location: &Location) -> InventoryResult<InventoryPage> {
    if !body.is_object() {
        return Err(InventoryError::MalformedResponse(
            "inventory page is not a JSON object".into(),
        ));
    }
    if let Some(err) = upstream_error(body) {
        return Err(InventoryError::Upstream(err));
    }
    let items = match body.get("Data").or_else(|| body.get("data")) {
        Some(Value::Array(items)) => items.as_slice(),
        Some(Value::Null) | None => &[],
        Some(_) => {
            return Err(InventoryError::MalformedResponse(
                "inventory page `Data` is not an array".into(),
            ))
        }
    };
    Ok(InventoryPage {
        records: items
            .iter()
            .filter_map(|raw| normalize_record(raw, location))
            .collect(),
        received: items.len(),
        declared_total: declared_total(body),
    })
}

pub fn parse_details(body: &Value) -> InventoryResult<Vec<StoneDetail>> {
    if let Some(err) = upstream_error(body) {
        return Err(InventoryError::Upstream(err));
    }
    let stones = match body.get("stones") {
        Some(Value::Array(stones)) => stones,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => {
            return Err(InventoryError::MalformedResponse(
                "details `stones` is not an array".into(),
            ))
        }
    };
    Ok(stones.iter().filter_map(normalize_stone).collect())
}

pub fn parse_images(body: &Value) -> InventoryResult<Vec<ImageAsset>> {
    if let Some(err) = upstream_error(body) {
        return Err(InventoryError::Upstream(err));
    }
    let Some(files) = body.get("files").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let field = |obj: &Value, key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for file in files {
        let path = field(file, "path");
        if path.is_empty() || !seen.insert(path.clone()) {
            continue;
        }
        let mut name = field(file, "name");
        if name.is_empty() {
            name = field(file, "fullname");
        }
        out.push(ImageAsset {
            name,
            category: field(file, "category"),
            path,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;
    use std::net::TcpListener;

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn elberton() -> Location {
        Location::new("45555", "Elberton")
    }

    #[test]
    fn parses_records_and_declared_total() {
        let body = json!({
            "success": true,
            "Total": "2",
            "Data": [
                { "EndProductCode": "EP-1", "Qty": 2 },
                { "EndProductCode": "EP-2", "Qty": 1, "Locationname": "Barre" },
                "garbage"
            ]
        });
        let page = parse_page(&body, &elberton()).unwrap();
        assert_eq!(page.received, 3);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.declared_total, Some(2));
        assert_eq!(page.records[0].location, "Elberton");
        assert_eq!(page.records[1].location, "Barre");
    }

    #[test]
    fn total_may_live_under_pagination() {
        let body = json!({ "data": [], "pagination": { "totalItems": 1400 } });
        let page = parse_page(&body, &elberton()).unwrap();
        assert_eq!(page.declared_total, Some(1400));
        assert!(page.records.is_empty());
    }

    #[test]
    fn proxy_errors_are_upstream_failures() {
        let err = parse_page(&json!({ "success": false }), &elberton()).unwrap_err();
        assert!(matches!(err, InventoryError::Upstream(_)));
        let err = parse_page(&json!({ "error": "bad token", "Data": [] }), &elberton()).unwrap_err();
        assert_eq!(err, InventoryError::Upstream("bad token".into()));
        let err = parse_page(&json!({ "Data": "nope" }), &elberton()).unwrap_err();
        assert!(matches!(err, InventoryError::MalformedResponse(_)));
    }

    #[test]
    fn images_are_deduplicated_by_path() {
        let body = json!({
            "success": true,
            "files": [
                { "path": "/img/AG-112.jpg", "name": "AG-112", "category": "serp" },
                { "path": "/img/AG-112.jpg", "name": "dup", "category": "serp" },
                { "path": "", "name": "blank" },
                { "path": "/img/AG-112-b.jpg", "name": "AG-112 b" },
                { "path": "/img/AG-112-c.jpg", "fullname": "AG-112-c.jpg" }
            ]
        });
        let images = parse_images(&body).unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(images[0].name, "AG-112");
        assert_eq!(images[1].category, "");
        assert_eq!(images[2].name, "AG-112-c.jpg");
    }

    #[tokio::test]
    async fn page_request_carries_location_paging_token_and_filters() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/inventory-proxy.php")
                    .query_param("page", "2")
                    .query_param("pageSize", "1000")
                    .query_param("locid", "45555")
                    .query_param("token", "t0k")
                    .query_param("pcolor", "Blue Pearl")
                    .query_param_exists("timestamp");
                then.status(200).json_body(json!({
                    "success": true,
                    "Total": 1001,
                    "Data": [{ "EndProductCode": "EP-1001", "PColor": "Blue Pearl" }]
                }));
            })
            .await;

        let provider = ProxyProvider::new(
            &server.url("/inventory-proxy.php"),
            &server.url("/get_directory_files.php"),
            Some(5),
            None,
        )
        .unwrap()
        .with_token(Some("t0k".into()));
        let page = provider
            .fetch_page(&PageQuery {
                location: elberton(),
                page: 2,
                page_size: 1000,
                filters: vec![("pcolor".into(), "Blue Pearl".into())],
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(page.records[0].product_code, "EP-1001");
        assert_eq!(page.declared_total, Some(1001));
    }

    #[tokio::test]
    async fn http_failure_and_bad_json_are_typed() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/down");
                then.status(502).body("bad gateway");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/garbled");
                then.status(200).body("<html>");
            })
            .await;

        let query = PageQuery {
            location: elberton(),
            page: 1,
            page_size: 10,
            filters: vec![],
        };
        let down = ProxyProvider::new(&server.url("/down"), &server.url("/img"), Some(5), None)
            .unwrap();
        let err = down.fetch_page(&query).await.unwrap_err();
        assert!(matches!(err, InventoryError::Network(msg) if msg.contains("502")));

        let garbled =
            ProxyProvider::new(&server.url("/garbled"), &server.url("/img"), Some(5), None)
                .unwrap();
        let err = garbled.fetch_page(&query).await.unwrap_err();
        assert!(matches!(err, InventoryError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn details_post_the_product_code() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/inventory-proxy.php")
                    .body_contains("action=getDetails")
                    .body_contains("epcode=EP-7");
                then.status(200).json_body(json!({
                    "stones": [
                        { "Container": "C1", "CrateNo": "12", "Weight": "1,250", "Status": "Available" }
                    ]
                }));
            })
            .await;

        let provider = ProxyProvider::new(
            &server.url("/inventory-proxy.php"),
            &server.url("/get_directory_files.php"),
            Some(5),
            None,
        )
        .unwrap();
        let stones = provider.fetch_details("EP-7").await.unwrap();
        mock.assert_async().await;
        assert_eq!(stones.len(), 1);
        assert_eq!(stones[0].weight, Some(1250.0));
        assert_eq!(stones[0].crate_no.as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn image_search_uses_the_search_param() {
        if !can_bind_localhost() {
            eprintln!("Skipping httpmock tests: cannot bind to localhost");
            return;
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/get_directory_files.php")
                    .query_param("search", "AG-112");
                then.status(200).json_body(json!({
                    "success": true,
                    "files": [{ "path": "/img/a.jpg", "name": "a", "category": "serp" }]
                }));
            })
            .await;

        let provider = ProxyProvider::new(
            &server.url("/inventory-proxy.php"),
            &server.url("/get_directory_files.php"),
            Some(5),
            None,
        )
        .unwrap();
        let images = provider.search_images("AG-112").await.unwrap();
        mock.assert_async().await;
        assert_eq!(images[0].path, "/img/a.jpg");
    }
}
