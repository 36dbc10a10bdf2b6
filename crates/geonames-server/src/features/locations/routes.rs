//! Location read API
//!
//! - `GET /locations` - page through all locations ordered by `geoname_id`
//! - `GET /locations/:country_code` - same, restricted to one country
//!
//! Both accept `limit` (default 100, max 1000) and `offset`.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use sqlx::PgPool;

use super::queries::{self, ListLocationsError, ListLocationsQuery};
use crate::api::response::{ApiResponse, PageMeta};
use crate::error::AppError;

pub fn locations_routes() -> Router<PgPool> {
    Router::new()
        .route("/", get(list_locations))
        .route("/:country_code", get(list_locations_by_country))
}

#[tracing::instrument(skip(pool))]
async fn list_locations(
    State(pool): State<PgPool>,
    Query(query): Query<ListLocationsQuery>,
) -> Result<Response, AppError> {
    let rows = queries::list(&pool, &query).await?;
    let meta = page_meta(&query, rows.len());
    Ok(ApiResponse::success_with_meta(rows, meta).into_response())
}

#[tracing::instrument(skip(pool))]
async fn list_locations_by_country(
    State(pool): State<PgPool>,
    Path(country_code): Path<String>,
    Query(query): Query<ListLocationsQuery>,
) -> Result<Response, AppError> {
    let rows = queries::list_by_country(&pool, &country_code, &query).await?;
    let meta = page_meta(&query, rows.len());
    Ok(ApiResponse::success_with_meta(rows, meta).into_response())
}

fn page_meta(query: &ListLocationsQuery, count: usize) -> PageMeta {
    PageMeta {
        limit: query.limit(),
        offset: query.offset(),
        count,
    }
}

impl From<ListLocationsError> for AppError {
    fn from(err: ListLocationsError) -> Self {
        match err {
            ListLocationsError::Database(e) => AppError::Database(e),
            other => AppError::Validation(other.to_string()),
        }
    }
}
