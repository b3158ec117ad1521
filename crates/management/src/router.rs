//! Editor API router: mounts all management endpoints under /api/v1/management.

use crate::handlers::{self, ManagementState};
use axum::routing::{get, post, put};
use axum::Router;

/// Build the management router with all endpoints.
/// Returns a Router that should be merged into the main app.
pub fn management_router(state: ManagementState) -> Router {
    Router::new()
        // Campaigns
        .route("/api/v1/management/campaigns", get(handlers::list_campaigns).post(handlers::create_campaign))
        .route("/api/v1/management/campaigns/:id", get(handlers::get_campaign).put(handlers::update_campaign).delete(handlers::delete_campaign))
        // Variants
        .route("/api/v1/management/campaigns/:id/variants", get(handlers::list_variants).post(handlers::create_variant))
        .route("/api/v1/management/campaigns/:id/variants/:variant_id", put(handlers::update_variant).delete(handlers::delete_variant))
        // Rules
        .route("/api/v1/management/campaigns/:id/rules", get(handlers::list_rules).post(handlers::create_rule))
        .route("/api/v1/management/campaigns/:id/rules/:rule_id", put(handlers::update_rule).delete(handlers::delete_rule))
        // Pools
        .route("/api/v1/management/campaigns/:id/pools", get(handlers::list_pools))
        .route("/api/v1/management/campaigns/:id/pools/preview", get(handlers::preview_pools))
        .route("/api/v1/management/campaigns/:id/pools/generate", post(handlers::generate_variants))
        .route("/api/v1/management/campaigns/:id/pools/:slot", put(handlers::upsert_pool).delete(handlers::delete_pool))
        .with_state(state)
}
