//! Error types for rewind operations.
//!
//! Errors carry a structured [`ErrorCode`] and are classified by how a batch
//! should react to them: retry (throttling), abort (permission), or record the
//! failure against the single key that produced it.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for rewind operations.
pub type RewindResult<T> = Result<T, RewindError>;

/// Main error type for all rewind operations.
#[derive(Error, Debug)]
pub enum RewindError {
    /// The store rejected our credentials or the caller lacks access.
    #[error("Permission denied: {message}")]
    Permission {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The store is rate limiting us.
    #[error("Store throttled: {message}")]
    Throttled {
        message: String,
        code: ErrorCode,
        retry_after: Option<u64>,
    },

    /// Input validation failed.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        code: ErrorCode,
        details: HashMap<String, String>,
        suggestion: Option<String>,
    },

    /// Key or version not found.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        key: Option<String>,
    },

    /// A change notification could not be decoded.
    #[error("Malformed event: {message}")]
    MalformedEvent { message: String, code: ErrorCode },

    /// Versioned or live store operation failed.
    #[error("Store error: {message}")]
    Store {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    // Permission (AUTH_xxx)
    AuthDenied,

    // Throttling (RATE_xxx)
    RateLimitExceeded,

    // Validation (VAL_xxx)
    ValInvalidInput,
    ValInvalidKey,

    // Not found (NF_xxx)
    KeyNotFound,
    VersionNotFound,

    // Events (EVT_xxx)
    EventMalformed,
    EventMissingField,

    // Stores (STORE_xxx)
    StoreOperationFailed,
    StoreUnavailable,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthDenied => "AUTH_001",
            ErrorCode::RateLimitExceeded => "RATE_001",
            ErrorCode::ValInvalidInput => "VAL_001",
            ErrorCode::ValInvalidKey => "VAL_002",
            ErrorCode::KeyNotFound => "NF_001",
            ErrorCode::VersionNotFound => "NF_002",
            ErrorCode::EventMalformed => "EVT_001",
            ErrorCode::EventMissingField => "EVT_002",
            ErrorCode::StoreOperationFailed => "STORE_001",
            ErrorCode::StoreUnavailable => "STORE_002",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl RewindError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: None,
        }
    }

    /// Create a validation error with suggestion.
    pub fn validation_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            code: ErrorCode::ValInvalidInput,
            details: HashMap::new(),
            suggestion: Some(suggestion.into()),
        }
    }

    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: &str) -> Self {
        let key = key.into();
        let mut details = HashMap::new();
        details.insert("key".to_string(), key.clone());
        Self::Validation {
            message: format!("Invalid key '{}': {}", key, reason),
            code: ErrorCode::ValInvalidKey,
            details,
            suggestion: Some(
                "Keys use '/' separated segments of letters, digits, '_', '.', '-'".to_string(),
            ),
        }
    }

    /// Create a not found error for a key.
    pub fn not_found(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::NotFound {
            message: format!("Key '{}' not found", key),
            code: ErrorCode::KeyNotFound,
            key: Some(key),
        }
    }

    /// Create a not found error for a specific version of a key.
    pub fn version_not_found(key: impl Into<String>, version_id: &str) -> Self {
        let key = key.into();
        Self::NotFound {
            message: format!("Version '{}' of key '{}' not found", version_id, key),
            code: ErrorCode::VersionNotFound,
            key: Some(key),
        }
    }

    /// Create a malformed event error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedEvent {
            message: message.into(),
            code: ErrorCode::EventMalformed,
        }
    }

    /// Create a malformed event error for a missing field.
    pub fn missing_field(field: &str) -> Self {
        Self::MalformedEvent {
            message: format!("missing field '{}'", field),
            code: ErrorCode::EventMissingField,
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            code: ErrorCode::StoreOperationFailed,
            source: None,
        }
    }

    /// Create a store unavailable error (connectivity exhausted).
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            code: ErrorCode::StoreUnavailable,
            source: None,
        }
    }

    /// Create a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
            code: ErrorCode::AuthDenied,
            source: None,
        }
    }

    /// Create a throttling error.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
            code: ErrorCode::RateLimitExceeded,
            retry_after: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Permission { code, .. } => *code,
            Self::Throttled { code, .. } => *code,
            Self::Validation { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::MalformedEvent { code, .. } => *code,
            Self::Store { code, .. } => *code,
            Self::Database { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether the operation may succeed if retried after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    /// Whether the error must abort a whole batch instead of a single key.
    ///
    /// Permission failures apply to every key alike, and so does a store
    /// that stays throttled or unreachable once retries are exhausted.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Permission { .. } => true,
            Self::Store { code, .. } => *code == ErrorCode::StoreUnavailable,
            Self::Database { code, .. } => *code == ErrorCode::DbConnectionFailed,
            _ => false,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Permission { .. } => {
                Some("Check the credentials and policies used to reach the stores")
            }
            Self::Throttled { .. } => Some("Lower max_concurrency or retry later"),
            Self::Store {
                code: ErrorCode::StoreUnavailable,
                ..
            } => Some("Lower max_concurrency or raise retry.max_retries"),
            Self::NotFound { .. } => Some("Check the key name and the target time"),
            Self::Validation { suggestion, .. } => suggestion.as_deref(),
            Self::MalformedEvent { .. } => {
                Some("Check the notification payload against the change event contract")
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for RewindError {
    fn from(err: rusqlite::Error) -> Self {
        // Another connection holds the database; back off like any throttled store.
        if let rusqlite::Error::SqliteFailure(ref e, _) = err {
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return Self::Throttled {
                    message: err.to_string(),
                    code: ErrorCode::RateLimitExceeded,
                    retry_after: None,
                };
            }
        }

        let code = match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase
                ) =>
            {
                ErrorCode::DbConnectionFailed
            }
            _ => ErrorCode::DbOperationFailed,
        };
        Self::Database {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = RewindError::validation("Invalid input");
        assert_eq!(err.code(), ErrorCode::ValInvalidInput);
        assert!(err.to_string().contains("Invalid input"));
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_error() {
        let err = RewindError::not_found("/app/db/url");
        assert_eq!(err.code(), ErrorCode::KeyNotFound);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_classification() {
        assert!(RewindError::throttled("slow down").is_retryable());
        assert!(!RewindError::throttled("slow down").is_fatal());
        assert!(RewindError::permission("denied").is_fatal());
        assert!(RewindError::store_unavailable("gone").is_fatal());
        assert!(!RewindError::store("one key broke").is_fatal());
    }

    #[test]
    fn test_busy_database_is_throttling() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        let err = RewindError::from(busy);
        assert!(err.is_retryable());
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);

        let corrupt = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_NOTADB),
            None,
        );
        let err = RewindError::from(corrupt);
        assert!(err.is_fatal());
        assert_eq!(err.code(), ErrorCode::DbConnectionFailed);
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::AuthDenied.as_str(), "AUTH_001");
        assert_eq!(ErrorCode::StoreOperationFailed.as_str(), "STORE_001");
        assert_eq!(ErrorCode::EventMalformed.as_str(), "EVT_001");
    }
}
