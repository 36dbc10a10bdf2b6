pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use geonames_common::config::ServerSettings;
use serde_json::json;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;

use crate::error::AppError;
use crate::features::{self, FeatureState};
use crate::middleware;

/// Build the complete application router
pub fn create_router(state: FeatureState, server: &ServerSettings) -> Router {
    let db = state.db.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health).with_state(db))
        .merge(features::router(state))
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&server.cors_origins))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Geonames Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Database connectivity check
async fn health(State(db): State<PgPool>) -> Result<Response, AppError> {
    match geonames_ingest::db::health_check(&db).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(AppError::Unavailable("database unreachable".to_string()))
        },
    }
}
