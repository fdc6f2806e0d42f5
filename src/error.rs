//! Unified error hierarchy for FitTrack
//!
//! Lower-level collaborators (document store, routine oracle) report their own
//! error types; the session and routine layers translate them into
//! [`FitTrackError`], which can always be classified into an [`ErrorKind`].

use thiserror::Error;

/// Top-level error type for all FitTrack operations
#[derive(Debug, Error)]
pub enum FitTrackError {
    /// Document store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Routine oracle errors
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the current session state
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Referenced record or index does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Document (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Document store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or refused the write
    #[error("Store unavailable at {path}: {reason}")]
    Unavailable { path: String, reason: String },

    /// SQLite backend failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored document could not be decoded
    #[error("Corrupt document at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Merge target is not a JSON object
    #[error("Cannot merge into non-object document at {path}")]
    NotAnObject { path: String },
}

/// Routine oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    /// API key is not configured
    #[error("API key not configured (expected in ${env_var})")]
    MissingApiKey { env_var: String },

    /// Network-level failure
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-success HTTP response
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Service is overloaded or temporarily down
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// Response carried no usable content
    #[error("Empty response from oracle")]
    EmptyResponse,

    /// Response did not match the expected schema
    #[error("Malformed oracle payload: {0}")]
    Malformed(String),
}

/// Classification of errors into the categories callers act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or bad oracle payload; nothing was mutated
    Validation,
    /// Persistence or oracle call failed; the operation may be retried
    TransientIo,
    /// Operation not legal in the current lifecycle state
    InvariantViolation,
    /// Configuration problem
    Configuration,
    /// Bug or unexpected condition
    Internal,
}

/// Result type alias for FitTrack operations
pub type Result<T> = std::result::Result<T, FitTrackError>;

impl OracleError {
    /// Whether the call may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Request(_) | OracleError::Unavailable(_) => true,
            OracleError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl FitTrackError {
    /// Map onto the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            FitTrackError::Store(StoreError::Corrupt { .. }) => ErrorKind::Validation,
            FitTrackError::Store(StoreError::NotAnObject { .. }) => ErrorKind::Internal,
            FitTrackError::Store(_) | FitTrackError::Io(_) => ErrorKind::TransientIo,
            FitTrackError::Oracle(OracleError::MissingApiKey { .. }) => ErrorKind::Configuration,
            FitTrackError::Oracle(e) if e.is_transient() => ErrorKind::TransientIo,
            FitTrackError::Oracle(_) => ErrorKind::Validation,
            FitTrackError::Validation(_)
            | FitTrackError::NotFound(_)
            | FitTrackError::Serialization(_) => ErrorKind::Validation,
            FitTrackError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            FitTrackError::Configuration(_) => ErrorKind::Configuration,
            FitTrackError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InvariantViolation => ErrorSeverity::Warning,
            ErrorKind::TransientIo | ErrorKind::Configuration => ErrorSeverity::Error,
            ErrorKind::Internal => ErrorSeverity::Critical,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            FitTrackError::Oracle(OracleError::MissingApiKey { env_var }) => {
                format!("The AI coach is not configured. Set {} and try again.", env_var)
            }
            FitTrackError::Oracle(OracleError::EmptyResponse)
            | FitTrackError::Oracle(OracleError::Malformed(_)) => {
                "The AI coach could not produce a routine this time. Please try again.".to_string()
            }
            FitTrackError::Oracle(e) if e.is_transient() => {
                "The AI coach is busy right now. Please try again in a moment.".to_string()
            }
            FitTrackError::Store(StoreError::Unavailable { .. }) => {
                "Could not save your changes. Nothing was lost; please retry.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
        }
    }
}
