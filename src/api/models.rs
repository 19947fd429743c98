// Request and response bodies for the session API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::facets::Facet;
use crate::normalization::WeightEstimate;
use crate::session::SessionState;

/// Envelope shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub session: SessionState,
    pub uptime_seconds: u64,
}

/// `facet` accepts field names in any casing (`color`, `PColor`); a blank `value` clears it
#[derive(Debug, Serialize, Deserialize)]
pub struct FacetRequest {
    pub facet: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FacetValuesResponse {
    pub facet: Facet,
    pub values: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeightQuery {
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeightResponse {
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub weight: Option<WeightEstimate>,
    pub label: Option<String>,
}
