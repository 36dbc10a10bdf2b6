//! Gazetteer record model

use serde::{Deserialize, Serialize};

/// One row of the `locations` relation
///
/// Field names match the column names, so the type doubles as the
/// `sqlx::FromRow` target for reads and the JSON shape served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationRecord {
    /// Conflict key for the upsert
    pub geoname_id: i64,
    pub name: String,
    pub ascii_name: String,
    /// Comma-separated, kept exactly as in the dump
    pub alternate_names: String,
    pub latitude: f64,
    pub longitude: f64,
    pub feature_class: String,
    pub feature_code: String,
    pub country_code: String,
    pub admin1_code: String,
    pub admin2_code: String,
    pub population: i64,
    pub elevation: Option<i32>,
    pub timezone: String,
    /// `yyyy-MM-dd`
    pub modification_date: String,
}

/// Column list shared by the upsert statement and the read queries
pub const LOCATION_COLUMNS: &str = "geoname_id, name, ascii_name, alternate_names, latitude, \
     longitude, feature_class, feature_code, country_code, admin1_code, admin2_code, \
     population, elevation, timezone, modification_date";
