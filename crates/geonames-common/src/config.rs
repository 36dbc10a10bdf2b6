//! Layered settings for the ingest CLI and the query server
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. An optional `config.{yaml,toml,json}` file in the working directory
//!    (or an explicit file passed to [`Settings::load_from`])
//! 3. Environment variables prefixed with `GEONAMES_`, using `__` between
//!    section and key, e.g. `GEONAMES_INGEST__BATCH_SIZE=500`
//! 4. `DATABASE_URL`, which always wins for the database URL
//!
//! A `.env` file is read first so its entries count as environment variables.

use crate::error::{GeonamesError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Defaults
// ============================================================================

/// Full gazetteer export.
pub const DEFAULT_SOURCE_URL: &str = "https://download.geonames.org/export/dump/allCountries.zip";

/// Where the downloaded archive is kept between runs.
pub const DEFAULT_CACHE_PATH: &str = "data/allCountries.zip";

/// Name of the tab-delimited entry inside the archive.
pub const DEFAULT_ENTRY_NAME: &str = "allCountries.txt";

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_FETCH_RETRIES: u32 = 3;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 3600;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/geonames";
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 50;
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DATABASE_MAX_LIFETIME_SECS: u64 = 1800;

pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Columns bound per location row in the upsert statement.
pub const COLUMNS_PER_ROW: usize = 15;

/// PostgreSQL refuses statements with more bind parameters than this.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

const ENV_PREFIX: &str = "GEONAMES";

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            max_lifetime_secs: DEFAULT_DATABASE_MAX_LIFETIME_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,

    /// Allowed CORS origins; empty or `*` allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            cors_origins: Vec::new(),
        }
    }
}

/// Everything one ingestion run needs besides the database pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Remote address of the zipped dump
    pub source_url: String,

    /// Local copy of the archive; checked before any network access
    pub cache_path: PathBuf,

    /// Entry to read inside the archive
    pub entry_name: String,

    /// Rows per upsert transaction
    pub batch_size: usize,

    /// Parser threads
    pub workers: usize,

    /// Lines buffered between the reader and the parsers
    pub queue_capacity: usize,

    /// Download attempts before giving up
    pub max_retries: u32,

    pub timeout_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            entry_name: DEFAULT_ENTRY_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_retries: DEFAULT_FETCH_RETRIES,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl IngestSettings {
    /// Largest batch whose upsert statement stays under the bind limit.
    pub const fn max_batch_size() -> usize {
        MAX_BIND_PARAMETERS / COLUMNS_PER_ROW
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_url.trim().is_empty() {
            return Err(GeonamesError::config("ingest.source_url cannot be empty"));
        }

        if self.entry_name.trim().is_empty() {
            return Err(GeonamesError::config("ingest.entry_name cannot be empty"));
        }

        if self.batch_size == 0 || self.batch_size > Self::max_batch_size() {
            return Err(GeonamesError::Config(format!(
                "ingest.batch_size must be between 1 and {} (got {})",
                Self::max_batch_size(),
                self.batch_size
            )));
        }

        if self.workers == 0 {
            return Err(GeonamesError::config("ingest.workers must be greater than 0"));
        }

        if self.queue_capacity == 0 {
            return Err(GeonamesError::config("ingest.queue_capacity must be greater than 0"));
        }

        if self.max_retries == 0 {
            return Err(GeonamesError::config("ingest.max_retries must be at least 1"));
        }

        Ok(())
    }
}

impl Settings {
    /// Load settings using `config.*` from the working directory if present
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings, reading `file` instead of the optional `config.*`
    ///
    /// An explicitly named file must exist.
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file_source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config").required(false),
        };

        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = layered.try_deserialize()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            settings.database.url = url;
        }

        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(GeonamesError::config("database.url cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(GeonamesError::config("database.max_connections must be greater than 0"));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(GeonamesError::Config(format!(
                "database.min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.server.port == 0 {
            return Err(GeonamesError::config("server.port must be greater than 0"));
        }

        self.ingest.validate()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "GEONAMES_INGEST__BATCH_SIZE",
            "GEONAMES_INGEST__SOURCE_URL",
            "GEONAMES_SERVER__PORT",
            "GEONAMES_SERVER__CORS_ORIGINS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.ingest.batch_size, 1000);
        assert_eq!(settings.ingest.workers, 10);
        assert_eq!(settings.ingest.cache_path, PathBuf::from("data/allCountries.zip"));
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn test_batch_size_bounded_by_bind_limit() {
        assert_eq!(IngestSettings::max_batch_size(), 4369);

        let mut ingest = IngestSettings::default();
        ingest.batch_size = 4369;
        assert!(ingest.validate().is_ok());

        ingest.batch_size = 4370;
        assert!(ingest.validate().is_err());

        ingest.batch_size = 0;
        assert!(ingest.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut ingest = IngestSettings::default();
        ingest.workers = 0;
        assert!(matches!(ingest.validate(), Err(GeonamesError::Config(_))));
    }

    #[test]
    fn test_rejects_inverted_pool_bounds() {
        let mut settings = Settings::default();
        settings.database.min_connections = 60;
        assert!(settings.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("GEONAMES_INGEST__BATCH_SIZE", "250");
        std::env::set_var("GEONAMES_SERVER__PORT", "9090");
        std::env::set_var("DATABASE_URL", "postgresql://localhost/geonames_test");

        let settings = Settings::load().unwrap();
        assert_eq!(settings.ingest.batch_size, 250);
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.database.url, "postgresql://localhost/geonames_test");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_cors_origins_from_env_list() {
        clear_env();
        std::env::set_var("GEONAMES_SERVER__CORS_ORIGINS", "http://localhost:3000,https://maps.example");

        let settings = Settings::load().unwrap();
        assert_eq!(
            settings.server.cors_origins,
            vec!["http://localhost:3000".to_string(), "https://maps.example".to_string()]
        );

        clear_env();
    }

    #[test]
    #[serial]
    fn test_explicit_file_layer() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[ingest]\nsource_url = \"http://mirror.local/dump.zip\"\nworkers = 4\n"
        )
        .unwrap();

        let settings = Settings::load_from(Some(file.path())).unwrap();
        assert_eq!(settings.ingest.source_url, "http://mirror.local/dump.zip");
        assert_eq!(settings.ingest.workers, 4);
        assert_eq!(settings.ingest.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    #[serial]
    fn test_explicit_file_must_exist() {
        clear_env();
        let result = Settings::load_from(Some(Path::new("/nonexistent/geonames.toml")));
        assert!(matches!(result, Err(GeonamesError::Settings(_))));
    }
}
