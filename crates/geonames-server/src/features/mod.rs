//! Feature modules implementing the query API
//!
//! - **locations**: paged reads of the `locations` table
//! - **ingest**: background ingestion trigger
//!
//! Each feature owns its routes and is mounted under its own prefix by
//! [`router`].

pub mod ingest;
pub mod locations;

use axum::Router;
use sqlx::PgPool;

use ingest::{routes::IngestState, IngestTrigger};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// PostgreSQL connection pool for database operations
    pub db: PgPool,
    pub trigger: IngestTrigger,
}

/// Mounts every feature:
/// - `/locations` - location reads
/// - `/download` - ingestion trigger
pub fn router(state: FeatureState) -> Router<()> {
    let ingest_state = IngestState {
        db: state.db.clone(),
        trigger: state.trigger,
    };

    Router::new()
        .nest("/locations", locations::locations_routes().with_state(state.db))
        .nest("/download", ingest::ingest_routes().with_state(ingest_state))
}
