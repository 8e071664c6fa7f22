//! Centralized Error Handling Module
//!
//! Every failure carries a unique code so per-item sync results and logs can be
//! grouped without string matching.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - INPUT_xxx: rejected before any external call
//! - EXTERNAL_xxx: provider failures (retryable, isolated to one item/source)
//! - STORE_xxx: relational/graph/cache failures
//! - NUMERIC_xxx: fixed-point coercion failures
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // ============================================
    // Input Errors (1xx)
    // ============================================
    /// Address is not a 20-byte hex string
    InvalidAddress,

    // ============================================
    // External Source Errors (2xx)
    // ============================================
    /// Provider returned non-2xx or a JSON-RPC error
    ExternalHttpError,
    /// Provider call exceeded its timeout
    ExternalTimeout,
    /// Provider answered HTTP 429
    ExternalRateLimited,
    /// Provider body could not be parsed
    ExternalInvalidResponse,

    // ============================================
    // Store Errors (3xx)
    // ============================================
    /// Relational upsert/insert failed (fatal to the item)
    RelationalWriteFailed,
    /// Read query against a store failed
    StoreReadFailed,
    /// Graph node/edge write failed (logged, absorbed)
    GraphWriteFailed,
    /// Cache write failed (logged, absorbed)
    CacheWriteFailed,
    /// Store operation exceeded its timeout
    StoreTimeout,

    // ============================================
    // Numeric Errors (4xx)
    // ============================================
    /// Value cannot be represented in a fixed-point integer column
    NumericRangeViolation,

    // ============================================
    // Configuration Errors (5xx)
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,
    /// Store binding could not be constructed
    ConfigStoreUnavailable,

    // ============================================
    // Pipeline Errors (6xx)
    // ============================================
    /// Batch was cancelled before this item started
    SyncCancelled,

    // ============================================
    // Generic Errors (9xx)
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAddress => "INPUT_INVALID_ADDRESS",

            Self::ExternalHttpError => "EXTERNAL_HTTP_ERROR",
            Self::ExternalTimeout => "EXTERNAL_TIMEOUT",
            Self::ExternalRateLimited => "EXTERNAL_RATE_LIMITED",
            Self::ExternalInvalidResponse => "EXTERNAL_INVALID_RESPONSE",

            Self::RelationalWriteFailed => "STORE_RELATIONAL_WRITE_FAILED",
            Self::StoreReadFailed => "STORE_READ_FAILED",
            Self::GraphWriteFailed => "STORE_GRAPH_WRITE_FAILED",
            Self::CacheWriteFailed => "STORE_CACHE_WRITE_FAILED",
            Self::StoreTimeout => "STORE_TIMEOUT",

            Self::NumericRangeViolation => "NUMERIC_RANGE_VIOLATION",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
            Self::ConfigStoreUnavailable => "CFG_STORE_UNAVAILABLE",

            Self::SyncCancelled => "SYNC_CANCELLED",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Check if error is retryable on the next scheduled run
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalHttpError
                | Self::ExternalTimeout
                | Self::ExternalRateLimited
                | Self::StoreTimeout
                | Self::RelationalWriteFailed
                | Self::SyncCancelled
        )
    }

    /// Failures that belong to an external provider rather than to us
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::ExternalHttpError
                | Self::ExternalTimeout
                | Self::ExternalRateLimited
                | Self::ExternalInvalidResponse
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalHttpError, msg)
    }

    pub fn external_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalTimeout, msg)
    }

    pub fn rate_limited(source: &str) -> Self {
        Self::new(
            ErrorCode::ExternalRateLimited,
            format!("{} rate limited (HTTP 429)", source),
        )
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalInvalidResponse, msg)
    }

    pub fn relational_write(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RelationalWriteFailed, msg)
    }

    pub fn store_read(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreReadFailed, msg)
    }

    pub fn graph_write(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::GraphWriteFailed, msg)
    }

    pub fn cache_write(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheWriteFailed, msg)
    }

    pub fn store_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreTimeout, msg)
    }

    pub fn numeric_range(field: &str, value: f64) -> Self {
        Self::new(
            ErrorCode::NumericRangeViolation,
            format!("{} = {} does not fit a fixed-point column", field, value),
        )
    }

    pub fn missing_env(key_name: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", key_name),
        )
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalidValue, msg)
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigStoreUnavailable, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::SyncCancelled, "batch cancelled before item started")
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::ExternalTimeout, "Request timeout")
        } else if err.is_decode() {
            Self::with_source(ErrorCode::ExternalInvalidResponse, "Malformed body", err)
        } else {
            Self::with_source(ErrorCode::ExternalHttpError, "Request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::ExternalInvalidResponse, "JSON parse error", err)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::with_source(ErrorCode::StoreReadFailed, "SQLite error", err)
    }
}
