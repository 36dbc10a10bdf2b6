//! Ingestion trigger API
//!
//! - `POST /download` - start a background ingestion run (`202 Accepted`),
//!   or `409 Conflict` while one is already running
//! - `GET /download` - whether a run is in progress

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use geonames_ingest::IngestPipeline;
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info};

use super::trigger::IngestTrigger;
use crate::api::response::ApiResponse;
use crate::error::AppError;

#[derive(Clone)]
pub struct IngestState {
    pub db: PgPool,
    pub trigger: IngestTrigger,
}

pub fn ingest_routes() -> Router<IngestState> {
    Router::new().route("/", get(download_status).post(start_download))
}

async fn start_download(State(state): State<IngestState>) -> Result<Response, AppError> {
    let Some(guard) = state.trigger.try_start() else {
        return Err(AppError::Conflict(
            "An ingestion run is already in progress".to_string(),
        ));
    };

    // Dropping the guard on this error path frees the slot again.
    let pipeline = IngestPipeline::new(state.trigger.settings().clone())
        .map_err(|e| AppError::Config(e.to_string()))?;

    let db = state.db.clone();
    let cancel = state.trigger.run_token();

    tokio::spawn(async move {
        let _guard = guard;
        match pipeline.run(&db, &cancel).await {
            Ok(report) => info!(
                records = report.records_written,
                batches = report.batches_committed,
                dropped = report.lines_dropped,
                "Background ingestion finished"
            ),
            Err(e) => error!(error = %e, "Background ingestion failed"),
        }
    });

    info!("Background ingestion started");

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(json!({ "status": "started" }))),
    )
        .into_response())
}

async fn download_status(State(state): State<IngestState>) -> impl IntoResponse {
    ApiResponse::success(json!({ "running": state.trigger.is_running() }))
}
