//! Geonames Server Library
//!
//! HTTP query API over the `locations` table filled by `geonames-ingest`.
//!
//! # Endpoints
//!
//! - `GET /health` - database connectivity
//! - `GET /locations` - paged list ordered by `geoname_id`
//! - `GET /locations/:country_code` - paged list for one country
//! - `POST /download` - start a background ingestion run
//! - `GET /download` - whether a run is in progress
//!
//! Errors are returned as `{"error": {"message": ..., "status": ...}}`.
//!
//! ## Framework Stack
//!
//! - **Axum**: routing and extractors
//! - **SQLx**: PostgreSQL access
//! - **Tower**: middleware (CORS, tracing, compression)

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod error;
pub mod features;
pub mod middleware;

pub use error::{AppError, AppResult};
