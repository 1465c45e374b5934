//! Core error types for ritual-core.
//!
//! This module defines the error hierarchy using thiserror. [`EngineError`]
//! is what callers of the completion engine see; the narrower enums below it
//! describe failures of a single layer and convert into it with `?`.

use std::path::PathBuf;
use thiserror::Error;

use chrono::NaiveDate;

/// Error type surfaced by the completion engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Referenced ritual does not exist
    #[error("Ritual not found: {0}")]
    NotFound(String),

    /// Malformed identifiers or dates
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    /// Completion dated before the user's last recorded completion
    #[error("Completion for {completed} precedes last recorded completion on {last}")]
    BackdatedCompletion { completed: NaiveDate, last: NaiveDate },

    /// Underlying transaction or commit failure
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked or busy past the busy timeout
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty value
    #[error("'{field}' must not be empty")]
    Empty { field: &'static str },

    /// Value longer than allowed
    #[error("'{field}' exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(err.into())
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
