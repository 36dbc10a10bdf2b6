use geonames_ingest::models::{LocationRecord, LOCATION_COLUMNS};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListLocationsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ListLocationsError {
    #[error("limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,
    #[error("offset must not be negative")]
    InvalidOffset,
    #[error("country code must be two ASCII letters, got '{0}'")]
    InvalidCountryCode(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ListLocationsQuery {
    pub fn validate(&self) -> Result<(), ListLocationsError> {
        if let Some(limit) = self.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(ListLocationsError::InvalidLimit);
            }
        }
        if let Some(offset) = self.offset {
            if offset < 0 {
                return Err(ListLocationsError::InvalidOffset);
            }
        }
        Ok(())
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

/// Upper-case a path country code, rejecting anything but two letters
pub fn normalize_country_code(raw: &str) -> Result<String, ListLocationsError> {
    let code = raw.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ListLocationsError::InvalidCountryCode(raw.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

pub async fn list(
    pool: &PgPool,
    query: &ListLocationsQuery,
) -> Result<Vec<LocationRecord>, ListLocationsError> {
    query.validate()?;

    let sql = format!(
        "SELECT {LOCATION_COLUMNS} FROM locations ORDER BY geoname_id LIMIT $1 OFFSET $2"
    );
    let rows = sqlx::query_as::<_, LocationRecord>(&sql)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

pub async fn list_by_country(
    pool: &PgPool,
    country_code: &str,
    query: &ListLocationsQuery,
) -> Result<Vec<LocationRecord>, ListLocationsError> {
    query.validate()?;
    let country_code = normalize_country_code(country_code)?;

    let sql = format!(
        "SELECT {LOCATION_COLUMNS} FROM locations WHERE country_code = $1 \
         ORDER BY geoname_id LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query_as::<_, LocationRecord>(&sql)
        .bind(&country_code)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
