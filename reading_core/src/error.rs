//! The single error type returned across reading_core.

use crate::catalog::OrderingKind;
use std::io;

/// Shorthand used by every fallible function in the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store, export or catalog file access failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A stored schedule or index could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catalog import or schedule export CSV problem
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// Config parsed but holds unusable values
    #[error("Configuration error: {0}")]
    Config(String),

    /// External catalog data is malformed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The catalog does not carry the requested ordering
    #[error("Catalog has no {0} ordering")]
    OrderingUnavailable(OrderingKind),

    /// A schedule request that cannot be generated
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A stored schedule already uses this name
    #[error("Schedule name '{0}' is already taken")]
    NameTaken(String),

    /// No stored schedule has this name
    #[error("Schedule '{0}' does not exist")]
    ScheduleNotFound(String),

    /// Generation was cancelled through its cancellation flag
    #[error("Schedule generation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
