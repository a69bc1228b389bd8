mod handlers;
mod state;

pub use state::AppState;

use axum::http::{header, HeaderValue};
use axum::routing::{delete, get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::config::AppEnvironment;
use crate::error::AppError;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/tenants/{id}/validate", post(handlers::validate))
        .route(
            "/api/tenants/{id}/configuration",
            get(handlers::get_configuration).put(handlers::put_configuration),
        )
        .route(
            "/api/tenants/{id}/neighborhoods",
            get(handlers::list_neighborhoods).post(handlers::add_neighborhood),
        )
        .route("/api/tenants/{id}/neighborhoods/bulk", post(handlers::bulk_add_neighborhoods))
        .route("/api/tenants/{id}/neighborhoods/{zone}", delete(handlers::deactivate_neighborhood))
        .route(
            "/api/tenants/{id}/radius",
            get(handlers::list_radius).post(handlers::add_radius),
        )
        .route("/api/tenants/{id}/radius/bulk", post(handlers::bulk_add_radius))
        .route("/api/tenants/{id}/radius/{tier}", delete(handlers::deactivate_radius))
        .route("/api/tenants/{id}/hybrid/setup", post(handlers::setup_hybrid))
        .route("/api/tenants/{id}/overview", get(handlers::overview))
        .route("/api/tenants/{id}/cache/stats", get(handlers::cache_stats))
        .route("/api/tenants/{id}/cache/invalidate", post(handlers::cache_invalidate))
        .route("/api/cache/cleanup", post(handlers::cache_cleanup))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(addr: SocketAddr, environment: AppEnvironment, state: Arc<AppState>) -> Result<(), AppError> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(?environment, %addr, "delivery eligibility server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
