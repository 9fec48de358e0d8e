/// Tool packs served over MCP
///
/// Each pack builds a `ToolRegistry` that the binary exposes with
/// `serve <pack>`: weather lookups against the NWS API, and read-only SQL
/// exploration of a SQLite database.

pub mod sql;
pub mod weather;

pub use sql::{sql_registry, SqlDatabase, SqlError};
pub use weather::{weather_registry, NwsClient};

use thiserror::Error;

use crate::provider::RegistryError;

/// Errors raised while assembling a tool pack
#[derive(Error, Debug)]
pub enum ToolPackError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Sql(#[from] SqlError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
