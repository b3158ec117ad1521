//! Axum REST handlers for the editor API.

use crate::models::*;
use crate::store::ManagementStore;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use dco_core::error::DcoError;
use dco_core::rules::{Rule, RuleDraft};
use dco_core::types::{Campaign, Pool, PoolSlot, Variant};
use dco_engine::generator::PoolGenerator;
use dco_engine::types::{GenerationResult, PoolPreview};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Shared management state.
#[derive(Clone)]
pub struct ManagementState {
    pub store: Arc<ManagementStore>,
    pub generator: PoolGenerator,
    pub preview_limit: usize,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP status and error code for a library error.
pub fn status_for(err: &DcoError) -> (StatusCode, &'static str) {
    match err {
        DcoError::InvalidRule(_) => (StatusCode::BAD_REQUEST, "invalid_rule"),
        DcoError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        DcoError::InvalidPoolSlot(_) => (StatusCode::BAD_REQUEST, "invalid_pool_slot"),
        DcoError::CampaignNotFound(_) => (StatusCode::NOT_FOUND, "campaign_not_found"),
        DcoError::VariantNotFound(_) => (StatusCode::NOT_FOUND, "variant_not_found"),
        DcoError::RuleNotFound(_) => (StatusCode::NOT_FOUND, "rule_not_found"),
        DcoError::ConcurrentGenerationConflict(_) => (StatusCode::CONFLICT, "generation_in_progress"),
        DcoError::PoolGenerationLimitExceeded { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "generation_limit_exceeded")
        }
        DcoError::NoPoolsDefined(_) => (StatusCode::UNPROCESSABLE_ENTITY, "no_pools_defined"),
        DcoError::Snapshot(_) => (StatusCode::SERVICE_UNAVAILABLE, "snapshot_unavailable"),
    }
}

pub fn error_response(err: DcoError) -> ApiError {
    let (status, code) = status_for(&err);
    if status.is_server_error() {
        warn!(error = %err, "management request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

// ─── Campaigns ─────────────────────────────────────────────────────────────

pub async fn list_campaigns(State(state): State<ManagementState>) -> Json<Vec<Campaign>> {
    Json(state.store.list_campaigns())
}

pub async fn get_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    state.store.get_campaign(id).map(Json).map_err(error_response)
}

pub async fn create_campaign(
    State(state): State<ManagementState>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    let campaign = state.store.create_campaign(req).map_err(error_response)?;
    metrics::counter!("management.campaigns.created").increment(1);
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn update_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCampaignRequest>,
) -> ApiResult<Json<Campaign>> {
    state
        .store
        .update_campaign(id, req)
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_campaign(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_campaign(id).map_err(error_response)?;
    metrics::counter!("management.campaigns.deleted").increment(1);
    Ok(StatusCode::NO_CONTENT)
}

// ─── Variants ──────────────────────────────────────────────────────────────

pub async fn list_variants(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Variant>>> {
    state.store.list_variants(id).map(Json).map_err(error_response)
}

pub async fn create_variant(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateVariantRequest>,
) -> ApiResult<(StatusCode, Json<Variant>)> {
    let variant = state.store.create_variant(id, req).map_err(error_response)?;
    metrics::counter!("management.variants.created").increment(1);
    Ok((StatusCode::CREATED, Json(variant)))
}

pub async fn update_variant(
    State(state): State<ManagementState>,
    Path((id, variant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateVariantRequest>,
) -> ApiResult<Json<Variant>> {
    state
        .store
        .update_variant(id, variant_id, req)
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_variant(
    State(state): State<ManagementState>,
    Path((id, variant_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .store
        .delete_variant(id, variant_id)
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Rules ─────────────────────────────────────────────────────────────────

pub async fn list_rules(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Rule>>> {
    state.store.list_rules(id).map(Json).map_err(error_response)
}

pub async fn create_rule(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult<(StatusCode, Json<Rule>)> {
    let rule = state.store.create_rule(id, draft).map_err(|e| {
        if matches!(e, DcoError::InvalidRule(_)) {
            metrics::counter!("management.rules.rejected").increment(1);
        }
        error_response(e)
    })?;
    metrics::counter!("management.rules.created").increment(1);
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<ManagementState>,
    Path((id, rule_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateRuleRequest>,
) -> ApiResult<Json<Rule>> {
    state
        .store
        .update_rule(id, rule_id, req)
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_rule(
    State(state): State<ManagementState>,
    Path((id, rule_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state.store.delete_rule(id, rule_id).map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Pools ─────────────────────────────────────────────────────────────────

pub async fn list_pools(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PoolsResponse>> {
    state.store.list_pools(id).map(Json).map_err(error_response)
}

pub async fn upsert_pool(
    State(state): State<ManagementState>,
    Path((id, slot)): Path<(Uuid, String)>,
    Json(req): Json<PoolUpsertRequest>,
) -> ApiResult<Json<Pool>> {
    let slot = PoolSlot::parse(&slot).map_err(error_response)?;
    state
        .store
        .upsert_pool(id, slot, req.values)
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_pool(
    State(state): State<ManagementState>,
    Path((id, slot)): Path<(Uuid, String)>,
) -> ApiResult<StatusCode> {
    let slot = PoolSlot::parse(&slot).map_err(error_response)?;
    state.store.delete_pool(id, slot).map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn preview_pools(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<Json<PoolPreview>> {
    let pools = state.store.pool_set(id).map_err(error_response)?;
    let limit = query.limit.unwrap_or(state.preview_limit);
    Ok(Json(state.generator.preview(&pools, limit)))
}

pub async fn generate_variants(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<GenerationResult>)> {
    let result = state
        .generator
        .generate(id, state.store.as_ref())
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(result)))
}
