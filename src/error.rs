//! Error types for chat-forwarder
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (task rejection, platform failures, database)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for chat-forwarder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chat-forwarder
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "extensions")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Messaging platform call failed
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Task was rejected or is in the wrong state
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Worker client could not be prepared or lacks access to the chats
    #[error("task setup failed: {0}")]
    Setup(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task or record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Reasons a task cannot be started or operated on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The user already has a forwarding task in flight
    #[error("user {user_id} already has a running task")]
    UserBusy {
        /// The user holding the lock
        user_id: i64,
    },

    /// Another task is already writing into the destination
    #[error("destination {destination} is already claimed by another task")]
    DestinationBusy {
        /// The claimed destination, as displayed
        destination: String,
    },

    /// Requested index range is empty or inverted
    #[error("invalid range: skip {skip} is greater than limit {limit}")]
    InvalidRange {
        /// Starting index
        skip: u64,
        /// Exclusive upper bound
        limit: u64,
    },
}

/// Errors reported by a platform client implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The platform asked us to back off for the given duration
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited {
        /// Wait signaled by the platform
        retry_after: Duration,
    },

    /// The chat does not exist or is not visible to the account
    #[error("chat not found: {0}")]
    ChatNotFound(String),

    /// The account lacks permission for the operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Any other platform failure
    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Wait requested by the platform, if this is a throttling signal
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            PlatformError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "user_busy",
///     "message": "task error: user 42 already has a running task",
///     "details": {
///       "user_id": 42
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "user_busy")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::Task(TaskError::InvalidRange { .. }) => 400,

            Error::NotFound(_) => 404,
            Error::Database(DatabaseError::NotFound(_)) => 404,

            // A task already occupies the user or destination
            Error::Task(TaskError::UserBusy { .. }) => 409,
            Error::Task(TaskError::DestinationBusy { .. }) => 409,

            Error::Setup(_) => 422,

            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Serialization(_) => 500,
            Error::Other(_) => 500,

            Error::Platform(_) => 502,
            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Platform(e) => match e {
                PlatformError::RateLimited { .. } => "rate_limited",
                PlatformError::ChatNotFound(_) => "chat_not_found",
                PlatformError::Forbidden(_) => "forbidden",
                PlatformError::Other(_) => "platform_error",
            },
            Error::Task(e) => match e {
                TaskError::UserBusy { .. } => "user_busy",
                TaskError::DestinationBusy { .. } => "destination_busy",
                TaskError::InvalidRange { .. } => "invalid_range",
            },
            Error::Setup(_) => "setup_failed",
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Task(TaskError::UserBusy { user_id }) => Some(serde_json::json!({
                "user_id": user_id,
            })),
            Error::Task(TaskError::DestinationBusy { destination }) => Some(serde_json::json!({
                "destination": destination,
            })),
            Error::Task(TaskError::InvalidRange { skip, limit }) => Some(serde_json::json!({
                "skip": skip,
                "limit": limit,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
