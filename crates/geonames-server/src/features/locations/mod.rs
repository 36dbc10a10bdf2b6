pub mod queries;
pub mod routes;

pub use queries::{ListLocationsError, ListLocationsQuery, DEFAULT_LIMIT, MAX_LIMIT};
pub use routes::locations_routes;
