// HTTP request handlers: every session endpoint forwards one UI event and returns the status

use std::time::Instant;

use actix_web::{web, HttpResponse, Result};

use crate::api::models::*;
use crate::error::InventoryError;
use crate::facets::Facet;
use crate::model::InventoryRecord;
use crate::normalization::estimate_weight;
use crate::session::{SessionHandle, UiEvent};

/// Shared application state
pub struct ApiState {
    pub session: SessionHandle,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            started_at: Instant::now(),
        }
    }
}

fn error_response(err: &InventoryError) -> HttpResponse {
    let body = ApiResponse::<()>::error(err.to_string());
    match err {
        InventoryError::SessionClosed => HttpResponse::Conflict().json(body),
        InventoryError::Cancelled => HttpResponse::ServiceUnavailable().json(body),
        _ => HttpResponse::BadGateway().json(body),
    }
}

async fn respond_with_status(state: &ApiState) -> HttpResponse {
    match state.session.status().await {
        Ok(status) => HttpResponse::Ok().json(ApiResponse::success(status)),
        Err(err) => error_response(&err),
    }
}

async fn dispatch(state: &ApiState, event: UiEvent) -> HttpResponse {
    tracing::debug!(event = ?event, "ui event");
    match state.session.send(event).await {
        Ok(()) => respond_with_status(state).await,
        Err(err) => error_response(&err),
    }
}

fn parse_facet(raw: &str) -> std::result::Result<Facet, HttpResponse> {
    raw.parse::<Facet>()
        .map_err(|e| HttpResponse::BadRequest().json(ApiResponse::<()>::error(e.to_string())))
}

/// Health check endpoint
pub async fn health_check(state: web::Data<ApiState>) -> Result<HttpResponse> {
    let session = match state.session.status().await {
        Ok(status) => status.state,
        Err(err) => return Ok(error_response(&err)),
    };

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        session,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    });

    Ok(HttpResponse::Ok().json(response))
}

pub async fn session_status(state: web::Data<ApiState>) -> Result<HttpResponse> {
    Ok(respond_with_status(&state).await)
}

pub async fn open_session(state: web::Data<ApiState>) -> Result<HttpResponse> {
    Ok(dispatch(&state, UiEvent::Open).await)
}

pub async fn close_session(state: web::Data<ApiState>) -> Result<HttpResponse> {
    Ok(dispatch(&state, UiEvent::Close).await)
}

pub async fn refresh_session(state: web::Data<ApiState>) -> Result<HttpResponse> {
    Ok(dispatch(&state, UiEvent::ForceRefresh).await)
}

pub async fn reset_filters(state: web::Data<ApiState>) -> Result<HttpResponse> {
    Ok(dispatch(&state, UiEvent::ResetFilters).await)
}

pub async fn change_facet(
    payload: web::Json<FacetRequest>,
    state: web::Data<ApiState>,
) -> Result<HttpResponse> {
    let FacetRequest { facet, value } = payload.into_inner();
    let facet = match parse_facet(&facet) {
        Ok(facet) => facet,
        Err(resp) => return Ok(resp),
    };
    Ok(dispatch(&state, UiEvent::FacetChanged { facet, value }).await)
}

pub async fn change_search(
    payload: web::Json<SearchRequest>,
    state: web::Data<ApiState>,
) -> Result<HttpResponse> {
    let text = payload.into_inner().text;
    Ok(dispatch(&state, UiEvent::SearchChanged { text }).await)
}

pub async fn change_page(
    payload: web::Json<PageRequest>,
    state: web::Data<ApiState>,
) -> Result<HttpResponse> {
    let page = payload.into_inner().page;
    Ok(dispatch(&state, UiEvent::PageChanged { page }).await)
}

pub async fn select_row(path: web::Path<String>, state: web::Data<ApiState>) -> Result<HttpResponse> {
    let product_code = path.into_inner();
    tracing::info!(product_code = %product_code, "row selected");
    Ok(dispatch(&state, UiEvent::RowSelected { product_code }).await)
}

pub async fn facet_values(path: web::Path<String>, state: web::Data<ApiState>) -> Result<HttpResponse> {
    let facet = match parse_facet(&path.into_inner()) {
        Ok(facet) => facet,
        Err(resp) => return Ok(resp),
    };
    match state.session.facet_values(facet).await {
        Ok(values) => Ok(HttpResponse::Ok().json(ApiResponse::success(FacetValuesResponse {
            facet,
            values,
        }))),
        Err(err) => Ok(error_response(&err)),
    }
}

/// Run the estimator on ad-hoc size text
pub async fn estimate(query: web::Query<WeightQuery>) -> Result<HttpResponse> {
    let WeightQuery { size, unit } = query.into_inner();
    let probe = InventoryRecord {
        size: size.clone(),
        unit: unit.clone(),
        ..InventoryRecord::default()
    };
    let weight = estimate_weight(&probe);

    Ok(HttpResponse::Ok().json(ApiResponse::success(WeightResponse {
        size,
        unit,
        label: weight.map(|w| w.label()),
        weight,
    })))
}
