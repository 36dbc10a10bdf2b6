pub mod routes;
pub mod trigger;

pub use routes::ingest_routes;
pub use trigger::{IngestTrigger, RunGuard};
