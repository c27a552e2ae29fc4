use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure categories surfaced to callers of the router.
///
/// An empty result set is not part of this taxonomy: it is a valid
/// [`QueryOutcome::Empty`](crate::model::QueryOutcome::Empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SchemaUnavailable,
    DatasetNotFound,
    DatasetParseError,
    TranslationError,
    ExecutionError,
    StoreError,
    ConfigError,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::SchemaUnavailable => "E_SCHEMA_UNAVAILABLE",
            ErrorKind::DatasetNotFound => "E_DATASET_NOT_FOUND",
            ErrorKind::DatasetParseError => "E_DATASET_PARSE",
            ErrorKind::TranslationError => "E_TRANSLATION",
            ErrorKind::ExecutionError => "E_EXECUTION",
            ErrorKind::StoreError => "E_STORE",
            ErrorKind::ConfigError => "E_CONFIG",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaUnavailable => "SchemaUnavailable",
            ErrorKind::DatasetNotFound => "DatasetNotFound",
            ErrorKind::DatasetParseError => "DatasetParseError",
            ErrorKind::TranslationError => "TranslationError",
            ErrorKind::ExecutionError => "ExecutionError",
            ErrorKind::StoreError => "StoreError",
            ErrorKind::ConfigError => "ConfigError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed failure: a kind plus diagnostic text.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RouteError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type RouteResult<T> = Result<T, RouteError>;

impl RouteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn schema_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaUnavailable, message)
    }

    pub fn dataset_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatasetNotFound, message)
    }

    pub fn dataset_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatasetParseError, message)
    }

    pub fn translation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TranslationError, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionError, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreError, message)
    }

    /// Maps an arbitrary error onto the taxonomy. Errors that already carry a
    /// kind keep it; everything else becomes `fallback`.
    pub fn classify(fallback: ErrorKind, err: &anyhow::Error) -> Self {
        if let Some(routed) = err.downcast_ref::<RouteError>() {
            return routed.clone();
        }
        Self::new(fallback, format!("{:#}", err))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "code": self.kind.code(),
            "message": self.message,
        })
    }
}

/// Invalid or unreadable configuration. Fatal at startup.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl From<ConfigError> for RouteError {
    fn from(e: ConfigError) -> Self {
        RouteError::new(ErrorKind::ConfigError, e.0)
    }
}
