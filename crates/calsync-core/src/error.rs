//! Core error types for calsync-core.
//!
//! Provider failures carry a classification (auth expired, rate limited,
//! transient, permanent, single item) that the engine maps onto its run
//! outcome taxonomy; adapters must never leak provider-specific error types
//! past this boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for calsync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider-related errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Unknown profile name
    #[error("No profile named '{0}'")]
    UnknownProfile(String),

    /// Duplicate profile name
    #[error("Duplicate profile name '{0}'")]
    DuplicateProfile(String),
}

/// Classified provider failures.
///
/// The classification decides the run outcome: `AuthExpired` maps to
/// reconnect-then-retry, `RateLimited`/`Transient` to a single automatic
/// retry, `Permanent` abandons the run, `Item` is recorded and skipped.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Authentication/session expired; the provider needs to reconnect
    #[error("Provider session expired")]
    AuthExpired,

    /// Provider is rate limiting requests
    #[error("Provider rate limit hit")]
    RateLimited,

    /// Transient failure (network blip, timeout)
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Permanent failure; retrying will not help
    #[error("Permanent provider failure: {0}")]
    Permanent(String),

    /// A single item failed to read or write
    #[error("Item '{id}' failed: {message}")]
    Item { id: String, message: String },
}

/// Rejected or invalid sync requests.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyncRequestError {
    /// A sync is already running; the request was not queued
    #[error("A sync is already running. Please wait for it to complete and then try again.")]
    AlreadyRunning,

    /// Forced full compare is incompatible with two-way sync
    #[error("Forcing a full sync is not allowed whilst in 2-way sync mode.")]
    ForceCompareBidirectional,
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
