//! API server: serving endpoints, the editor API, and the metrics exporter.

use crate::rest::{self, AppState};
use axum::routing::get;
use axum::Router;
use dco_core::config::AppConfig;
use dco_core::event_bus::EventSink;
use dco_engine::engine::ServingEngine;
use dco_engine::generator::PoolGenerator;
use dco_management::{management_router, ManagementState, ManagementStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Main API server: ad serving plus the campaign editor on one listener.
pub struct ApiServer {
    config: AppConfig,
    store: Arc<ManagementStore>,
    sink: Arc<dyn EventSink>,
}

impl ApiServer {
    pub fn new(config: AppConfig, store: Arc<ManagementStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { config, store, sink }
    }

    /// Full application router with middleware.
    pub fn router(&self) -> Router {
        let state = AppState {
            source: self.store.clone(),
            engine: ServingEngine::new(self.sink.clone(), self.config.serving.click_base_path.clone()),
            sink: self.sink.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };
        let management = ManagementState {
            store: self.store.clone(),
            generator: PoolGenerator::new(self.config.dco.generation_cap),
            preview_limit: self.config.dco.preview_limit,
        };

        Router::new()
            // Ad serving
            .route("/ad/templates", get(rest::list_templates))
            .route("/ad/:campaign_id", get(rest::serve_ad))
            .route("/ad/:campaign_id/simulate", get(rest::simulate_ad))
            .route("/ad/:campaign_id/debug", get(rest::debug_ad))
            // Click tracking
            .route("/api/analytics/click", axum::routing::post(rest::track_click_beacon))
            .route("/api/analytics/click/:campaign_id/:variant_id", get(rest::track_click))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .with_state(state)
            .merge(management_router(management))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = SocketAddr::new(
            self.config.api.host.parse()?,
            self.config.api.http_port,
        );

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
