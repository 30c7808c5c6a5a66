//! Error types for Quarry

use thiserror::Error;

/// The main error type for Quarry operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or execution error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid query configuration
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// Engine name that no dialect or driver can serve
    #[error("Unsupported database engine '{engine}'")]
    UnsupportedEngine { engine: String },

    /// Incomplete or inconsistent connection parameters
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The engine has no open connection
    #[error("Not connected to a database")]
    NotConnected,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create a new unsupported engine error
    pub fn unsupported_engine(engine: impl Into<String>) -> Self {
        Self::UnsupportedEngine {
            engine: engine.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_query_error() {
        let err = Error::invalid_query("select() was never called");
        assert!(matches!(err, Error::InvalidQuery { .. }));
        assert_eq!(err.to_string(), "Invalid query: select() was never called");
    }

    #[test]
    fn test_unsupported_engine_error() {
        let err = Error::unsupported_engine("oracle");
        assert!(matches!(err, Error::UnsupportedEngine { .. }));
        assert_eq!(err.to_string(), "Unsupported database engine 'oracle'");
    }

    #[test]
    fn test_configuration_error() {
        let err = Error::configuration("sqlite engine needs a file path");
        assert_eq!(
            err.to_string(),
            "Configuration error: sqlite engine needs a file path"
        );
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
