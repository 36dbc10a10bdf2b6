//! Geonames Common Library
//!
//! Shared configuration, logging and error types for the geonames workspace.
//!
//! - **Configuration**: layered settings (defaults, optional config file, environment)
//! - **Logging**: `tracing` subscriber setup for console and rolling file output
//! - **Errors**: the [`GeonamesError`] type used by the settings loader
//!
//! # Example
//!
//! ```no_run
//! use geonames_common::config::Settings;
//! use geonames_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     let settings = Settings::load()?;
//!     tracing::info!(url = %settings.ingest.source_url, "settings loaded");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod logging;

pub use error::{GeonamesError, Result};
