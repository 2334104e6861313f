//! Error types for the observable-metric performers

use thiserror::Error;

use crate::domain::MetricKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried as the source of callback failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while defining, mutating or observing metrics
#[derive(Error, Debug)]
pub enum Error {
    /// Caller broke a precondition (negative counter increment, bad bucket layout)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A user-supplied callback failed during one collection cycle
    #[error("callback failed for metric \"{metric}\": {source}")]
    OperationFailed {
        metric: String,
        #[source]
        source: BoxError,
    },

    /// The backend refused to create an instrument or register a callback
    #[error("create {kind} \"{metric}\" failed: {source}")]
    Internal {
        metric: String,
        kind: MetricKind,
        #[source]
        source: BackendError,
    },

    /// The backend refused a shared callback registration
    #[error("register callback for {metrics} failed: {source}")]
    Registration {
        metrics: String,
        #[source]
        source: BackendError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration could not be parsed
    #[error("Failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON configuration could not be parsed
    #[error("Failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::OperationFailed { .. } => ErrorCode::OperationFailed,
            Error::Internal { .. } | Error::Registration { .. } => ErrorCode::Internal,
            Error::Config(_) | Error::Io(_) | Error::Yaml(_) | Error::Json(_) => {
                ErrorCode::InvalidConfiguration
            }
        }
    }

    /// Name of the metric this error refers to, when there is one.
    pub fn metric(&self) -> Option<&str> {
        match self {
            Error::OperationFailed { metric, .. } | Error::Internal { metric, .. } => {
                Some(metric.as_str())
            }
            Error::Registration { metrics, .. } => Some(metrics.as_str()),
            _ => None,
        }
    }
}

/// Coarse error classification, stable across message wording changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidArgument,
    OperationFailed,
    Internal,
    InvalidConfiguration,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::InvalidArgument => write!(f, "invalid_argument"),
            ErrorCode::OperationFailed => write!(f, "operation_failed"),
            ErrorCode::Internal => write!(f, "internal"),
            ErrorCode::InvalidConfiguration => write!(f, "invalid_configuration"),
        }
    }
}

/// Errors returned by [`MetricBackend`](crate::domain::MetricBackend) implementations
#[derive(Error, Debug)]
pub enum BackendError {
    /// An instrument with the same name but a different shape already exists
    #[error("instrument \"{name}\" already registered as {existing}")]
    Conflict { name: String, existing: String },

    /// Descriptor cannot be represented by this backend
    #[error("invalid instrument \"{name}\": {reason}")]
    InvalidInstrument { name: String, reason: String },

    /// Referenced instrument was never created by this backend
    #[error("unknown instrument id {0}")]
    UnknownInstrument(u64),

    /// Backend refused the request
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// Prometheus client error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
