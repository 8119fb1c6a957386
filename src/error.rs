use std::fmt;

use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(QueryFailure),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by the query service for a single statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub message: String,
    pub error_name: String,
    pub error_code: i64,
    pub error_type: String,
    pub query_id: Option<String>,
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error_name, self.error_type, self.message)?;
        if let Some(query_id) = &self.query_id {
            write!(f, " [query {}]", query_id)?;
        }
        Ok(())
    }
}

impl AppError {
    /// Short category label used when printing errors at the top level
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Query(_) => "QUERY_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The service-side failure, if the error came from a rejected statement
    pub fn query_failure(&self) -> Option<&QueryFailure> {
        match self {
            AppError::Query(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AppError::Connection(err.to_string())
        } else {
            AppError::Database(err.to_string())
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Validation(format!("Invalid URL: {}", err))
    }
}

impl From<datafusion::error::DataFusionError> for AppError {
    fn from(err: datafusion::error::DataFusionError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<object_store::Error> for AppError {
    fn from(err: object_store::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}
