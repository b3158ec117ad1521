//! REST API handlers for ad serving, simulation, click tracking and
//! operational endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header::{REFERER, USER_AGENT};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use dco_core::error::DcoError;
use dco_core::event_bus::EventSink;
use dco_core::signals::{SignalContext, SignalValue};
use dco_core::sources::{RngSource, SystemClock};
use dco_core::types::{AbTestMode, ClickRecord, DeliveryEvent, TEMPLATE_NAMES};
use dco_engine::engine::{ServingEngine, SnapshotSource};
use dco_engine::schedule::EffectiveStatus;
use dco_engine::types::{ServeOutcome, SelectionResult, SimulationReport};
use dco_management::handlers::{error_response, ApiResult};
use dco_management::models::ErrorResponse;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

/// Query parameters carrying signal overrides use this prefix.
pub const SIGNAL_PREFIX: &str = "signal_";

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn SnapshotSource>,
    pub engine: ServingEngine,
    pub sink: Arc<dyn EventSink>,
    pub node_id: String,
    pub start_time: Instant,
}

/// Signals for one request: request headers first, then `signal_*` query
/// overrides on top.
pub fn request_signals(headers: &HeaderMap, query: &HashMap<String, String>) -> SignalContext {
    let mut signals = SignalContext::new();
    for (header, signal) in [(USER_AGENT, "user_agent"), (REFERER, "referer")] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            signals.insert(signal, value);
        }
    }
    signals.merge(signal_overrides(query));
    signals
}

/// Collect `signal_<name>=<value>` query parameters.
pub fn signal_overrides(query: &HashMap<String, String>) -> SignalContext {
    query
        .iter()
        .filter_map(|(key, raw)| {
            let name = key.strip_prefix(SIGNAL_PREFIX)?;
            (!name.is_empty()).then(|| (name.to_string(), SignalValue::parse_override(raw)))
        })
        .collect()
}

fn tracking_enabled(query: &HashMap<String, String>) -> bool {
    !matches!(
        query.get("track").map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("false" | "0" | "no")
    )
}

fn not_found(campaign_id: Uuid) -> (StatusCode, Json<ErrorResponse>) {
    error_response(DcoError::CampaignNotFound(campaign_id))
}

/// GET /ad/{campaign_id}: serve one ad decision as a render payload.
///
/// Fails closed: a snapshot failure is 503 with an empty body and any
/// "no ad" outcome is 204.
pub async fn serve_ad(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let signals = request_signals(&headers, &query);
    let track = tracking_enabled(&query);

    let outcome = state.engine.serve(
        state.source.as_ref(),
        campaign_id,
        signals,
        &SystemClock,
        &mut RngSource(rand::thread_rng()),
        track,
    );
    metrics::histogram!("serving.decision_us").record(started.elapsed().as_micros() as f64);

    match outcome {
        Ok(ServeOutcome::Served(ad)) => {
            debug!(
                %campaign_id,
                variant_id = %ad.payload.variant_id,
                path = ?ad.selection.path,
                "ad served"
            );
            Json(ad.payload).into_response()
        }
        Ok(ServeOutcome::NoAd { reason }) => {
            debug!(%campaign_id, ?reason, "no ad");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(error = %e, %campaign_id, "snapshot fetch failed; serving nothing");
            metrics::counter!("serving.errors").increment(1);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// GET /ad/{campaign_id}/simulate: full decision with trace, no analytics.
pub async fn simulate_ad(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<SimulationReport>> {
    let snapshot = state
        .source
        .load_snapshot(campaign_id)
        .map_err(error_response)?
        .ok_or_else(|| not_found(campaign_id))?;

    let report = state.engine.simulate(
        &snapshot,
        signal_overrides(&query),
        &SystemClock,
        &mut RngSource(rand::thread_rng()),
    );
    Ok(Json(report))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugResponse {
    pub campaign_id: Uuid,
    pub ab_test_mode: AbTestMode,
    pub effective_status: EffectiveStatus,
    pub signals: SignalContext,
    pub selection: SelectionResult,
    pub total_variants: usize,
    pub total_rules: usize,
    pub timing_us: u64,
}

/// GET /ad/{campaign_id}/debug: what this request would get, with counts
/// and decision timing.
pub async fn debug_ad(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Json<DebugResponse>> {
    let started = Instant::now();
    let snapshot = state
        .source
        .load_snapshot(campaign_id)
        .map_err(error_response)?
        .ok_or_else(|| not_found(campaign_id))?;

    let report = state.engine.simulate(
        &snapshot,
        request_signals(&headers, &query),
        &SystemClock,
        &mut RngSource(rand::thread_rng()),
    );

    Ok(Json(DebugResponse {
        campaign_id,
        ab_test_mode: snapshot.campaign.ab_test_mode,
        effective_status: report.effective_status,
        signals: report.signals,
        selection: report.selection,
        total_variants: snapshot.variants.len(),
        total_rules: snapshot.rules.len(),
        timing_us: started.elapsed().as_micros() as u64,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickQuery {
    pub url: Option<String>,
}

/// JSON body of `POST /api/analytics/click`.
#[derive(Debug, Deserialize)]
pub struct ClickEvent {
    pub campaign_id: Uuid,
    pub variant_id: Uuid,
    pub url: Option<String>,
}

/// GET /api/analytics/click/{campaign_id}/{variant_id}: record a click and
/// redirect to the destination.
pub async fn track_click(
    State(state): State<AppState>,
    Path((campaign_id, variant_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ClickQuery>,
) -> Response {
    let url = match query.url.filter(|u| !u.trim().is_empty()) {
        None => None,
        Some(raw) => match redirect_target(&raw) {
            Some(target) => Some(target),
            None => {
                warn!(%campaign_id, url = %raw, "refusing click redirect");
                metrics::counter!("api.validation_errors").increment(1);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: "invalid_redirect".to_string(),
                        message: "click url must be an absolute http or https url".to_string(),
                    }),
                )
                    .into_response();
            }
        },
    };

    record_click(&state, campaign_id, variant_id, url.as_ref().map(|u| u.to_string()));

    match url {
        Some(target) => Redirect::to(target.as_str()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Absolute http(s) URL with a host, or nothing.
fn redirect_target(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let web = matches!(parsed.scheme(), "http" | "https");
    (web && parsed.host_str().is_some_and(|h| !h.is_empty())).then_some(parsed)
}

/// POST /api/analytics/click: record a click reported by the ad tag.
pub async fn track_click_beacon(
    State(state): State<AppState>,
    Json(body): Json<ClickEvent>,
) -> StatusCode {
    record_click(&state, body.campaign_id, body.variant_id, body.url);
    StatusCode::ACCEPTED
}

fn record_click(state: &AppState, campaign_id: Uuid, variant_id: Uuid, url: Option<String>) {
    state.sink.emit(DeliveryEvent::Click(ClickRecord {
        event_id: Uuid::new_v4(),
        campaign_id,
        variant_id,
        url,
        timestamp: Utc::now(),
    }));
    metrics::counter!("serving.clicks").increment(1);
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplatesResponse {
    pub templates: Vec<String>,
}

/// GET /ad/templates: template names the renderer understands.
pub async fn list_templates() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: TEMPLATE_NAMES.iter().map(|t| t.to_string()).collect(),
    })
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready: Readiness probe for Kubernetes.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
